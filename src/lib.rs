//! # loggraph: Log Template Annotation and Entity Typing
//!
//! loggraph turns parsed log records into a labeled knowledge graph. Each log
//! line becomes a node linked to the typed entities (URL, Host, Domain, User,
//! Port, ...) found in its parameters.
//!
//! ## How it works
//!
//! - **Pattern registry**: an ordered list of regular expressions, each bound
//!   to an entity class and an output relation. Parameter-scoped patterns
//!   look at a single value; line-scoped patterns look at the whole message
//!   and only count if the match contains the value.
//! - **Template annotation**: one exemplar line per template is typed slot by
//!   slot, giving the template's type vector.
//! - **Template store**: templates are deduplicated by a SHA-256 fingerprint
//!   of their text and persisted across runs, so a template is annotated at
//!   most once no matter which event id it carries in a given batch.
//! - **Line typing**: the type vector is replayed over every line of the
//!   template, creating entity nodes or literal attributes in the graph.
//!
//! ## Example
//!
//! ```
//! use loggraph::{build_knowledge_graph, LogRecord, PatternRegistry, TemplateDefinition};
//!
//! let registry = PatternRegistry::builtin().unwrap();
//! let templates = vec![TemplateDefinition::new("E1", "User <*> logged in from <*>")];
//! let records = vec![
//!     LogRecord::with_values("1", "E1", "User alice logged in from 10.0.0.5", &["alice", "10.0.0.5"]),
//!     LogRecord::with_values("2", "E1", "User bob logged in from 10.0.0.5", &["bob", "10.0.0.5"]),
//! ];
//!
//! let build = build_knowledge_graph(&templates, &records, Vec::new(), &registry);
//! assert_eq!(build.graph.nodes_of_class("Host").len(), 1);
//! assert_eq!(build.graph.nodes_of_class("User").len(), 2);
//! ```

// Core modules
pub mod record;
pub mod pattern;
pub mod annotator;
pub mod store;
pub mod graph;
pub mod typer;
pub mod pipeline;

// Storage and I/O
pub mod persistence;
pub mod serialization;
pub mod ingest;
pub mod config;
pub mod error;

// Re-export key types
pub use record::{LogRecord, TemplateDefinition};
pub use pattern::{Pattern, PatternDef, PatternRegistry, PatternScope};
pub use annotator::{SlotType, TemplateAnnotator, TypeVector};
pub use store::{AnnotatedTemplate, Fingerprint, Resolution, TemplateStore};
pub use graph::{GraphSink, KnowledgeGraph, NodeRef, Object, Relation};
pub use typer::LineTyper;
pub use pipeline::{
    build_knowledge_graph, BuildReport, GraphBuilder, KnowledgeGraphBuild, Pipeline, RunOutcome,
};
pub use persistence::{JsonTemplateFile, TemplatePersistence};
pub use serialization::{write_graph, OutputFormat};
pub use config::PipelineConfig;
pub use error::{Error, Result};
