//! Serialization of the populated knowledge graph.
//!
//! Output is always sorted, so two runs over the same input produce
//! byte-identical files regardless of how lines were scheduled.

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::error::SerializationError;
use crate::graph::{KnowledgeGraph, Node, NodeRef, Object, Relation};

const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

/// Graph output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON object per node and per relation
    Ndjson,
    /// A single JSON array of nodes and relations
    Json,
    /// N-Triples, with one `rdf:type` triple per node
    Ntriples,
}

impl OutputFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ndjson" | "jsonl" => Some(OutputFormat::Ndjson),
            "json" => Some(OutputFormat::Json),
            "ntriples" | "nt" => Some(OutputFormat::Ntriples),
            _ => None,
        }
    }
}

/// One element of the JSON outputs.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GraphRecord<'a> {
    Node(&'a Node),
    Relation(&'a Relation),
}

/// Sink for the sorted contents of a graph: every node, then every relation.
pub trait GraphWriter {
    fn write_node(&mut self, node: &Node) -> Result<(), SerializationError>;

    fn write_relation(&mut self, relation: &Relation) -> Result<(), SerializationError>;

    /// Close the document and flush.
    fn finish(self) -> Result<(), SerializationError>;
}

/// One [`GraphRecord`] per line.
pub struct NdjsonGraphWriter<W: Write> {
    writer: W,
}

impl<W: Write> NdjsonGraphWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    fn write_record(&mut self, record: &GraphRecord<'_>) -> Result<(), SerializationError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

impl<W: Write> GraphWriter for NdjsonGraphWriter<W> {
    fn write_node(&mut self, node: &Node) -> Result<(), SerializationError> {
        self.write_record(&GraphRecord::Node(node))
    }

    fn write_relation(&mut self, relation: &Relation) -> Result<(), SerializationError> {
        self.write_record(&GraphRecord::Relation(relation))
    }

    fn finish(mut self) -> Result<(), SerializationError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// All [`GraphRecord`]s in a single JSON array.
pub struct JsonGraphWriter<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> JsonGraphWriter<W> {
    /// Open the array.
    pub fn new(mut writer: W) -> Result<Self, SerializationError> {
        writer.write_all(b"[")?;
        Ok(Self { writer, written: 0 })
    }

    fn write_record(&mut self, record: &GraphRecord<'_>) -> Result<(), SerializationError> {
        if self.written > 0 {
            self.writer.write_all(b",")?;
        }
        serde_json::to_writer(&mut self.writer, record)?;
        self.written += 1;
        Ok(())
    }
}

impl<W: Write> GraphWriter for JsonGraphWriter<W> {
    fn write_node(&mut self, node: &Node) -> Result<(), SerializationError> {
        self.write_record(&GraphRecord::Node(node))
    }

    fn write_relation(&mut self, relation: &Relation) -> Result<(), SerializationError> {
        self.write_record(&GraphRecord::Relation(relation))
    }

    fn finish(mut self) -> Result<(), SerializationError> {
        self.writer.write_all(b"]")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// N-Triples rooted at a base IRI, with one `rdf:type` triple per node.
pub struct NTriplesWriter<W: Write> {
    writer: W,
    base_iri: String,
}

impl<W: Write> NTriplesWriter<W> {
    pub fn new(writer: W, base_iri: impl Into<String>) -> Self {
        Self {
            writer,
            base_iri: base_iri.into(),
        }
    }

    fn node_iri(&self, id: &NodeRef) -> String {
        format!("<{}{}>", self.base_iri, escape_iri(id.as_str()))
    }
}

impl<W: Write> GraphWriter for NTriplesWriter<W> {
    fn write_node(&mut self, node: &Node) -> Result<(), SerializationError> {
        writeln!(
            self.writer,
            "{} <{}> <{}{}> .",
            self.node_iri(&node.id),
            RDF_TYPE,
            self.base_iri,
            escape_iri(&node.class)
        )?;
        Ok(())
    }

    fn write_relation(&mut self, relation: &Relation) -> Result<(), SerializationError> {
        let object = match &relation.object {
            Object::Node(id) => self.node_iri(id),
            Object::Literal(value) => format!("\"{}\"", escape_literal(value)),
        };
        writeln!(
            self.writer,
            "{} <{}{}> {} .",
            self.node_iri(&relation.subject),
            self.base_iri,
            escape_iri(&relation.predicate),
            object
        )?;
        Ok(())
    }

    fn finish(mut self) -> Result<(), SerializationError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Write the whole graph in `format`.
///
/// `base_iri` is only used by N-Triples output.
pub fn write_graph<W: Write>(
    graph: &KnowledgeGraph,
    format: OutputFormat,
    base_iri: &str,
    writer: W,
) -> Result<(), SerializationError> {
    match format {
        OutputFormat::Ndjson => write_sorted(graph, NdjsonGraphWriter::new(writer)),
        OutputFormat::Json => write_sorted(graph, JsonGraphWriter::new(writer)?),
        OutputFormat::Ntriples => write_sorted(graph, NTriplesWriter::new(writer, base_iri)),
    }
}

fn write_sorted<G: GraphWriter>(
    graph: &KnowledgeGraph,
    mut out: G,
) -> Result<(), SerializationError> {
    for node in graph.sorted_nodes() {
        out.write_node(&node)?;
    }
    for relation in graph.sorted_relations() {
        out.write_relation(&relation)?;
    }
    out.finish()
}

fn escape_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Percent-encode characters N-Triples forbids inside `<...>`, plus `%`, `#`
/// and `?` so raw record ids map to distinct path segments.
fn escape_iri(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c.is_control() || c == ' ' || "<>\"{}|^`\\%#?".contains(c) {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                escaped.push_str(&format!("%{:02X}", byte));
            }
        } else {
            escaped.push(c);
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphSink;

    fn sample_graph() -> KnowledgeGraph {
        let graph = KnowledgeGraph::new();
        let line = graph.create_or_get_node("LogLine", "1");
        let host = graph.create_or_get_node("Host", "10_0_0_5");
        graph.add_relation(&line, "has_host", Object::Node(host));
        graph.add_relation(&line, "has_content", Object::Literal("said \"hi\"\n".to_string()));
        graph
    }

    fn render(format: OutputFormat) -> String {
        let mut buf = Vec::new();
        write_graph(&sample_graph(), format, "http://example.org/", &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_ndjson_output() {
        let output = render(OutputFormat::Ndjson);
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], r#"{"kind":"node","id":"Host/10_0_0_5","class":"Host","key":"10_0_0_5"}"#);
        assert!(lines[2].contains(r#""kind":"relation""#));
    }

    #[test]
    fn test_json_array_output() {
        let output = render(OutputFormat::Json);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_ntriples_output() {
        let output = render(OutputFormat::Ntriples);

        assert!(output.contains(
            "<http://example.org/LogLine/1> <http://example.org/has_host> <http://example.org/Host/10_0_0_5> ."
        ));
        assert!(output.contains(
            "<http://example.org/Host/10_0_0_5> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://example.org/Host> ."
        ));
        assert!(output.contains(r#""said \"hi\"\n""#));
    }

    #[test]
    fn test_empty_graph_is_empty_array() {
        let mut buf = Vec::new();
        write_graph(&KnowledgeGraph::new(), OutputFormat::Json, "", &mut buf).unwrap();
        assert_eq!(buf, b"[]");
    }

    #[test]
    fn test_output_is_deterministic() {
        assert_eq!(render(OutputFormat::Ndjson), render(OutputFormat::Ndjson));
    }

    #[test]
    fn test_escape_iri() {
        assert_eq!(escape_iri("a b"), "a%20b");
        assert_eq!(escape_iri("x<y>"), "x%3Cy%3E");
        assert_eq!(escape_iri("plain"), "plain");
        assert_eq!(escape_iri("LogLine/a#1?%"), "LogLine/a%231%3F%25");
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(OutputFormat::parse("NT"), Some(OutputFormat::Ntriples));
        assert_eq!(OutputFormat::parse("jsonl"), Some(OutputFormat::Ndjson));
        assert_eq!(OutputFormat::parse("xml"), None);
    }
}
