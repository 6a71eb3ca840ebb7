//! Line typing.
//!
//! Replays a template's type vector over one log line and emits the line,
//! its base attributes and its typed entities into a [`GraphSink`].

use tracing::debug;

use crate::annotator::SlotType;
use crate::graph::{normalize_key, GraphSink, NodeRef, Object};
use crate::pattern::PatternRegistry;
use crate::record::LogRecord;
use crate::store::TemplateStore;

/// Node classes emitted for every line and template.
pub mod classes {
    pub const LOG_LINE: &str = "LogLine";
    pub const TEMPLATE: &str = "Template";
    pub const SOURCE: &str = "Source";
}

/// Relations emitted independently of the pattern registry.
pub mod relations {
    pub const CONTENT: &str = "has_content";
    pub const SEVERITY: &str = "has_severity";
    pub const SOURCE: &str = "has_source";
    pub const TIMESTAMP: &str = "has_timestamp";
    pub const TEMPLATE_ID: &str = "has_template_id";
    pub const INSTANCE_OF: &str = "instance_of";
    pub const TEXT: &str = "has_text";
    pub const VALUE: &str = "has_value";
}

/// What typing one line produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineOutcome {
    /// The line's template was found in the index
    pub resolved: bool,
    /// Parameter values attached as entity nodes
    pub entities: usize,
    /// Parameter values attached as typed literals
    pub literals: usize,
}

/// Types log lines against annotated templates.
pub struct LineTyper<'a> {
    registry: &'a PatternRegistry,
    store: &'a TemplateStore,
}

impl<'a> LineTyper<'a> {
    pub fn new(registry: &'a PatternRegistry, store: &'a TemplateStore) -> Self {
        Self { registry, store }
    }

    /// Emit one line into the sink.
    ///
    /// The line node and its base attributes are always emitted. Typed
    /// entities are added only when the line's template resolves; positions
    /// beyond the type vector and unknown slots are skipped.
    pub fn type_line<S: GraphSink + ?Sized>(&self, record: &LogRecord, sink: &S) -> LineOutcome {
        let line = self.emit_base(record, sink);

        let Some(template) = self.store.lookup(&record.template_id) else {
            debug!(
                line = %record.id,
                template_id = %record.template_id,
                "Template not in index; emitting base attributes only"
            );
            return LineOutcome::default();
        };

        let template_node =
            sink.create_or_get_node(classes::TEMPLATE, template.fingerprint.as_str());
        sink.add_relation(&template_node, relations::TEXT, Object::Literal(template.text.clone()));
        sink.add_relation(&line, relations::INSTANCE_OF, Object::Node(template_node));

        let mut outcome = LineOutcome {
            resolved: true,
            ..LineOutcome::default()
        };

        for (position, value) in record.parameter_values().iter().enumerate() {
            let SlotType::Matched(name) = template.slot(position) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            let Some(pattern) = self.registry.get(name) else {
                debug!(pattern = %name, "Archived slot names a pattern missing from the registry");
                continue;
            };

            if pattern.produces_node {
                let entity = sink.create_or_get_node(&pattern.name, &normalize_key(value));
                sink.add_relation(&entity, relations::VALUE, Object::Literal(value.clone()));
                sink.add_relation(&line, &pattern.relation, Object::Node(entity));
                outcome.entities += 1;
            } else {
                sink.add_relation(&line, &pattern.relation, Object::Literal(value.clone()));
                outcome.literals += 1;
            }
        }

        outcome
    }

    /// Line node plus base attributes.
    ///
    /// Line nodes are keyed by the raw record id; components become shared
    /// `Source` nodes.
    fn emit_base<S: GraphSink + ?Sized>(&self, record: &LogRecord, sink: &S) -> NodeRef {
        let line = sink.create_or_get_node(classes::LOG_LINE, &record.id);

        sink.add_relation(&line, relations::CONTENT, Object::Literal(record.content.clone()));

        let optional = [
            (relations::SEVERITY, Some(&record.severity)),
            (relations::TIMESTAMP, record.timestamp.as_ref()),
            (relations::TEMPLATE_ID, Some(&record.template_id)),
        ];
        for (relation, value) in optional {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                sink.add_relation(&line, relation, Object::Literal(value.clone()));
            }
        }

        if !record.component.is_empty() {
            let source =
                sink.create_or_get_node(classes::SOURCE, &normalize_key(&record.component));
            sink.add_relation(
                &source,
                relations::VALUE,
                Object::Literal(record.component.clone()),
            );
            sink.add_relation(&line, relations::SOURCE, Object::Node(source));
        }

        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::KnowledgeGraph;
    use crate::record::TemplateDefinition;

    fn setup() -> (PatternRegistry, TemplateStore) {
        let registry = PatternRegistry::builtin().unwrap();
        let mut store = TemplateStore::new();
        store.resolve(
            &TemplateDefinition::new("E1", "User <*> logged in from <*> port <*>"),
            || {
                vec![
                    SlotType::Matched("User".to_string()),
                    SlotType::Matched("Host".to_string()),
                    SlotType::Matched("Port".to_string()),
                ]
            },
        );
        (registry, store)
    }

    fn line_ref(id: &str) -> NodeRef {
        NodeRef::new(classes::LOG_LINE, id)
    }

    #[test]
    fn test_entities_and_literals() {
        let (registry, store) = setup();
        let typer = LineTyper::new(&registry, &store);
        let graph = KnowledgeGraph::new();

        let record = LogRecord::with_values(
            "1",
            "E1",
            "User bob logged in from 10.0.0.9 port 22",
            &["bob", "10.0.0.9", "22"],
        );
        let outcome = typer.type_line(&record, &graph);

        assert!(outcome.resolved);
        assert_eq!(outcome.entities, 2);
        assert_eq!(outcome.literals, 1);

        let host = NodeRef::new("Host", "10_0_0_9");
        assert!(graph.contains_node(&host));
        assert!(graph.contains_relation(&line_ref("1"), "has_host", &Object::Node(host.clone())));
        assert!(graph.contains_relation(
            &host,
            relations::VALUE,
            &Object::Literal("10.0.0.9".to_string())
        ));
        assert!(graph.contains_relation(
            &line_ref("1"),
            "has_port",
            &Object::Literal("22".to_string())
        ));
    }

    #[test]
    fn test_index_miss_keeps_base_attributes() {
        let (registry, store) = setup();
        let typer = LineTyper::new(&registry, &store);
        let graph = KnowledgeGraph::new();

        let mut record = LogRecord::with_values("7", "E404", "disk full on 10.0.0.5", &["10.0.0.5"]);
        record.severity = "ERROR".to_string();
        record.component = "kernel".to_string();

        let outcome = typer.type_line(&record, &graph);

        assert!(!outcome.resolved);
        assert_eq!(graph.node_count(), 2);
        let relations = graph.relations_from(&line_ref("7"));
        let predicates: Vec<&str> = relations.iter().map(|r| r.predicate.as_str()).collect();
        assert_eq!(
            predicates,
            vec!["has_content", "has_severity", "has_source", "has_template_id"]
        );
    }

    #[test]
    fn test_line_ids_are_not_normalized() {
        let (registry, store) = setup();
        let typer = LineTyper::new(&registry, &store);
        let graph = KnowledgeGraph::new();

        for (id, content) in [("1.5", "first"), ("1_5", "second")] {
            typer.type_line(&LogRecord::new(id, "E404", content, "[]"), &graph);
        }

        assert_eq!(graph.nodes_of_class(classes::LOG_LINE).len(), 2);
        assert!(graph.contains_relation(
            &line_ref("1.5"),
            relations::CONTENT,
            &Object::Literal("first".to_string())
        ));
        assert!(!graph.contains_relation(
            &line_ref("1.5"),
            relations::CONTENT,
            &Object::Literal("second".to_string())
        ));
    }

    #[test]
    fn test_lines_share_source_node() {
        let (registry, store) = setup();
        let typer = LineTyper::new(&registry, &store);
        let graph = KnowledgeGraph::new();

        for id in ["1", "2"] {
            let mut record = LogRecord::new(id, "E404", "session opened", "[]");
            record.component = "sshd".to_string();
            typer.type_line(&record, &graph);
        }

        let source = NodeRef::new(classes::SOURCE, "sshd");
        assert_eq!(graph.nodes_of_class(classes::SOURCE).len(), 1);
        for id in ["1", "2"] {
            assert!(graph.contains_relation(
                &line_ref(id),
                relations::SOURCE,
                &Object::Node(source.clone())
            ));
            assert!(graph.contains_relation(
                &line_ref(id),
                relations::TEMPLATE_ID,
                &Object::Literal("E404".to_string())
            ));
        }
    }

    #[test]
    fn test_extra_values_beyond_vector_are_ignored() {
        let (registry, store) = setup();
        let typer = LineTyper::new(&registry, &store);
        let graph = KnowledgeGraph::new();

        let record = LogRecord::with_values(
            "2",
            "E1",
            "User carol logged in from 10.0.0.1 port 80 via 10.0.0.2 10.0.0.3",
            &["carol", "10.0.0.1", "80", "10.0.0.2", "10.0.0.3"],
        );
        let outcome = typer.type_line(&record, &graph);

        assert_eq!(outcome.entities + outcome.literals, 3);
        assert!(!graph.contains_node(&NodeRef::new("Host", "10_0_0_2")));
    }

    #[test]
    fn test_same_value_on_two_lines_shares_node() {
        let (registry, store) = setup();
        let typer = LineTyper::new(&registry, &store);
        let graph = KnowledgeGraph::new();

        for id in ["a", "b"] {
            let record = LogRecord::with_values(
                id,
                "E1",
                "User dave logged in from 10.0.0.5 port 22",
                &["dave", "10.0.0.5", "22"],
            );
            typer.type_line(&record, &graph);
        }

        assert_eq!(graph.nodes_of_class("Host").len(), 1);
        assert_eq!(graph.nodes_of_class("User").len(), 1);
        assert_eq!(graph.nodes_of_class(classes::TEMPLATE).len(), 1);
        let host = Object::Node(NodeRef::new("Host", "10_0_0_5"));
        assert!(graph.contains_relation(&line_ref("a"), "has_host", &host));
        assert!(graph.contains_relation(&line_ref("b"), "has_host", &host));
    }

    #[test]
    fn test_unknown_slots_and_missing_patterns_are_skipped() {
        let registry = PatternRegistry::builtin().unwrap();
        let mut store = TemplateStore::new();
        store.resolve(&TemplateDefinition::new("E5", "<*> <*>"), || {
            vec![SlotType::Unknown, SlotType::Matched("Retired".to_string())]
        });
        let typer = LineTyper::new(&registry, &store);
        let graph = KnowledgeGraph::new();

        let record = LogRecord::with_values("1", "E5", "x y", &["x", "y"]);
        let outcome = typer.type_line(&record, &graph);

        assert!(outcome.resolved);
        assert_eq!(outcome.entities, 0);
        assert_eq!(outcome.literals, 0);
    }
}
