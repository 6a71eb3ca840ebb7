//! Batch pipeline: annotate templates, then type every line.
//!
//! Annotation finishes for all templates before any line is typed, because
//! typing reads the completed template index. Persistence happens at the
//! phase boundaries only, and a persistence failure never discards the graph
//! built for the current batch.

use std::fmt;
use std::ops::Add;

use rayon::prelude::*;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::annotator::{select_exemplars, TemplateAnnotator};
use crate::error::StoreError;
use crate::graph::{GraphSink, KnowledgeGraph};
use crate::pattern::PatternRegistry;
use crate::persistence::TemplatePersistence;
use crate::record::{LogRecord, TemplateDefinition};
use crate::store::{AnnotatedTemplate, Resolution, TemplateStore};
use crate::typer::{LineOutcome, LineTyper};

/// Counters collected over one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub templates_seen: usize,
    pub templates_annotated: usize,
    pub templates_reused: usize,
    pub missing_exemplars: usize,
    pub unrecognized_scopes: usize,
    pub lines_typed: usize,
    pub index_misses: usize,
    pub entity_relations: usize,
    pub literal_relations: usize,
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "templates: {} seen, {} annotated, {} reused, {} without exemplar",
            self.templates_seen,
            self.templates_annotated,
            self.templates_reused,
            self.missing_exemplars
        )?;
        writeln!(
            f,
            "lines: {} typed, {} with unknown template",
            self.lines_typed, self.index_misses
        )?;
        write!(
            f,
            "relations: {} entity, {} literal; {} unrecognized pattern scope reports",
            self.entity_relations, self.literal_relations, self.unrecognized_scopes
        )
    }
}

/// Per-line counters, summed across the typing phase.
#[derive(Debug, Clone, Copy, Default)]
struct LineTally {
    lines: usize,
    index_misses: usize,
    entities: usize,
    literals: usize,
}

impl From<LineOutcome> for LineTally {
    fn from(outcome: LineOutcome) -> Self {
        Self {
            lines: 1,
            index_misses: usize::from(!outcome.resolved),
            entities: outcome.entities,
            literals: outcome.literals,
        }
    }
}

impl Add for LineTally {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            lines: self.lines + other.lines,
            index_misses: self.index_misses + other.index_misses,
            entities: self.entities + other.entities,
            literals: self.literals + other.literals,
        }
    }
}

/// Result of one batch: the updated store, the graph and the counters.
#[derive(Debug)]
pub struct KnowledgeGraphBuild {
    pub store: TemplateStore,
    pub graph: KnowledgeGraph,
    pub report: BuildReport,
}

/// Runs the two phases of a batch against a pattern registry.
pub struct GraphBuilder<'r> {
    registry: &'r PatternRegistry,
    parallel: bool,
}

impl<'r> GraphBuilder<'r> {
    pub fn new(registry: &'r PatternRegistry) -> Self {
        Self {
            registry,
            parallel: true,
        }
    }

    /// Type lines on the rayon thread pool (default) or sequentially.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Annotation phase only.
    ///
    /// Every definition is resolved through the store; templates whose text
    /// is already known are not annotated again.
    pub fn annotate(
        &self,
        definitions: &[TemplateDefinition],
        records: &[LogRecord],
        store: &mut TemplateStore,
        report: &mut BuildReport,
    ) {
        let annotator = TemplateAnnotator::new(self.registry);
        let exemplars = select_exemplars(records);

        for definition in definitions {
            report.templates_seen += 1;

            let (_, resolution) = store.resolve(definition, || {
                let exemplar = exemplars.get(definition.template_id.as_str()).copied();
                let annotation = annotator.annotate(definition, exemplar);
                if !annotation.exemplar_found {
                    report.missing_exemplars += 1;
                }
                report.unrecognized_scopes += annotation.unrecognized_scopes;
                annotation.type_vector
            });

            match resolution {
                Resolution::Annotated => report.templates_annotated += 1,
                Resolution::Reused => report.templates_reused += 1,
            }
        }

        info!(
            seen = report.templates_seen,
            annotated = report.templates_annotated,
            reused = report.templates_reused,
            distinct = store.len(),
            "Annotation phase complete"
        );
    }

    /// Typing phase. Requires a store whose index covers this batch.
    pub fn type_lines<S: GraphSink + ?Sized>(
        &self,
        records: &[LogRecord],
        store: &TemplateStore,
        sink: &S,
        report: &mut BuildReport,
    ) {
        let typer = LineTyper::new(self.registry, store);

        let tally = if self.parallel {
            records
                .par_iter()
                .map(|record| LineTally::from(typer.type_line(record, sink)))
                .reduce(LineTally::default, |a, b| a + b)
        } else {
            records
                .iter()
                .map(|record| LineTally::from(typer.type_line(record, sink)))
                .fold(LineTally::default(), |a, b| a + b)
        };

        report.lines_typed += tally.lines;
        report.index_misses += tally.index_misses;
        report.entity_relations += tally.entities;
        report.literal_relations += tally.literals;

        if tally.index_misses > 0 {
            warn!(
                lines = tally.index_misses,
                "Lines referenced templates missing from the index; emitted with base attributes only"
            );
        }
        info!(lines = tally.lines, "Typing phase complete");
    }

    /// Run both phases over one batch.
    pub fn build(
        &self,
        definitions: &[TemplateDefinition],
        records: &[LogRecord],
        prior: Vec<AnnotatedTemplate>,
    ) -> KnowledgeGraphBuild {
        let mut store = TemplateStore::from_templates(prior);
        let mut report = BuildReport::default();
        let graph = KnowledgeGraph::new();

        self.annotate(definitions, records, &mut store, &mut report);
        self.type_lines(records, &store, &graph, &mut report);

        KnowledgeGraphBuild {
            store,
            graph,
            report,
        }
    }
}

/// Build a knowledge graph from one batch.
///
/// `prior` holds templates persisted by earlier runs; they take part in
/// deduplication exactly like templates annotated in this batch.
///
/// # Example
/// ```
/// use loggraph::{build_knowledge_graph, LogRecord, PatternRegistry, TemplateDefinition};
///
/// let registry = PatternRegistry::builtin().unwrap();
/// let templates = vec![TemplateDefinition::new("E1", "Connection from <*>")];
/// let records = vec![LogRecord::with_values("1", "E1", "Connection from 10.0.0.5", &["10.0.0.5"])];
///
/// let build = build_knowledge_graph(&templates, &records, Vec::new(), &registry);
/// assert_eq!(build.graph.nodes_of_class("Host").len(), 1);
/// ```
pub fn build_knowledge_graph(
    definitions: &[TemplateDefinition],
    records: &[LogRecord],
    prior: Vec<AnnotatedTemplate>,
    registry: &PatternRegistry,
) -> KnowledgeGraphBuild {
    GraphBuilder::new(registry).build(definitions, records, prior)
}

/// Outcome of [`Pipeline::run`].
///
/// The build is always complete; `persistence` tells whether the updated
/// template store reached durable storage.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub build: KnowledgeGraphBuild,
    pub persistence: Result<(), StoreError>,
}

/// Outcome of [`Pipeline::annotate`].
#[derive(Debug)]
pub struct AnnotateOutcome {
    pub run_id: Uuid,
    pub store: TemplateStore,
    pub report: BuildReport,
    pub persistence: Result<(), StoreError>,
}

/// Load → build → persist, around a template persistence backend.
pub struct Pipeline<P: TemplatePersistence> {
    registry: PatternRegistry,
    persistence: P,
    parallel: bool,
}

impl<P: TemplatePersistence> Pipeline<P> {
    pub fn new(registry: PatternRegistry, persistence: P) -> Self {
        Self {
            registry,
            persistence,
            parallel: true,
        }
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    /// Run a full batch and persist the updated template store.
    pub fn run(&self, definitions: &[TemplateDefinition], records: &[LogRecord]) -> RunOutcome {
        let run_id = Uuid::new_v4();
        let _span = info_span!("run", %run_id).entered();

        let (prior, load_error) = self.load_prior();
        let build = self.builder().build(definitions, records, prior);
        let persistence = self.persist(&build.store, load_error, run_id);

        RunOutcome {
            run_id,
            build,
            persistence,
        }
    }

    /// Run only the annotation phase and persist the result.
    pub fn annotate(
        &self,
        definitions: &[TemplateDefinition],
        records: &[LogRecord],
    ) -> AnnotateOutcome {
        let run_id = Uuid::new_v4();
        let _span = info_span!("annotate", %run_id).entered();

        let (prior, load_error) = self.load_prior();
        let mut store = TemplateStore::from_templates(prior);
        let mut report = BuildReport::default();
        self.builder()
            .annotate(definitions, records, &mut store, &mut report);
        let persistence = self.persist(&store, load_error, run_id);

        AnnotateOutcome {
            run_id,
            store,
            report,
            persistence,
        }
    }

    fn builder(&self) -> GraphBuilder<'_> {
        GraphBuilder::new(&self.registry).parallel(self.parallel)
    }

    /// Prior templates, or an empty set plus the load error.
    fn load_prior(&self) -> (Vec<AnnotatedTemplate>, Option<StoreError>) {
        match self.persistence.load_templates() {
            Ok(templates) => (templates, None),
            Err(err) => {
                warn!(error = %err, "Could not load template archive; continuing without prior templates");
                (Vec::new(), Some(err))
            }
        }
    }

    /// Persist unless the prior archive was unreadable, which would be overwritten.
    fn persist(
        &self,
        store: &TemplateStore,
        load_error: Option<StoreError>,
        run_id: Uuid,
    ) -> Result<(), StoreError> {
        if let Some(err) = load_error {
            return Err(StoreError::LoadFailed(err.to_string()));
        }

        let templates: Vec<AnnotatedTemplate> = store.templates().cloned().collect();
        self.persistence
            .persist_templates(&templates, run_id)
            .inspect_err(|err| warn!(error = %err, "Failed to persist template archive"))
    }
}
