//! Multi-run tests against the on-disk template archive

use std::fs;

use loggraph::persistence::TemplateArchive;
use loggraph::{
    write_graph, JsonTemplateFile, LogRecord, OutputFormat, Pipeline, PatternRegistry,
    SlotType, TemplateDefinition, TemplatePersistence,
};
use tempfile::TempDir;

fn pipeline(dir: &TempDir) -> Pipeline<JsonTemplateFile> {
    let registry = PatternRegistry::builtin().unwrap();
    Pipeline::new(registry, JsonTemplateFile::new(dir.path().join("templates.json")))
}

fn connection_batch(
    template_id: &str,
    line_id: &str,
    host: &str,
) -> (Vec<TemplateDefinition>, Vec<LogRecord>) {
    let templates = vec![TemplateDefinition::new(template_id, "Connection from <*>")];
    let content = format!("Connection from {}", host);
    let records = vec![LogRecord::with_values(line_id, template_id, &content, &[host])];
    (templates, records)
}

#[test]
fn test_second_run_reuses_archived_template() {
    let dir = TempDir::new().unwrap();

    let (templates, records) = connection_batch("E3", "1", "10.0.0.5");
    let first = pipeline(&dir).run(&templates, &records);
    assert!(first.persistence.is_ok());
    assert_eq!(first.build.report.templates_annotated, 1);

    let (templates, records) = connection_batch("E9", "2", "10.0.0.6");
    let second = pipeline(&dir).run(&templates, &records);
    assert!(second.persistence.is_ok());
    assert_eq!(second.build.report.templates_annotated, 0);
    assert_eq!(second.build.report.templates_reused, 1);
    assert_eq!(
        second.build.store.lookup("E9").unwrap().slot(0),
        &SlotType::Matched("Host".to_string())
    );

    let archived = JsonTemplateFile::new(dir.path().join("templates.json"))
        .load_templates()
        .unwrap();
    assert_eq!(archived.len(), 1);
}

#[test]
fn test_archive_records_run_id() {
    let dir = TempDir::new().unwrap();
    let (templates, records) = connection_batch("E1", "1", "10.0.0.5");

    let outcome = pipeline(&dir).run(&templates, &records);

    let raw = fs::read_to_string(dir.path().join("templates.json")).unwrap();
    let archive: TemplateArchive = serde_json::from_str(&raw).unwrap();
    assert_eq!(archive.version, 1);
    assert_eq!(archive.run_id, Some(outcome.run_id));
    assert!(!dir.path().join("templates.json.tmp").exists());
}

#[test]
fn test_corrupt_archive_is_not_overwritten() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("templates.json");
    fs::write(&path, "{ not json").unwrap();

    let (templates, records) = connection_batch("E1", "1", "10.0.0.5");
    let outcome = pipeline(&dir).run(&templates, &records);

    assert!(outcome.persistence.is_err());
    assert_eq!(outcome.build.report.templates_annotated, 1);
    assert_eq!(outcome.build.graph.nodes_of_class("Host").len(), 1);
    assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
}

#[test]
fn test_template_without_exemplar_is_archived_empty() {
    let dir = TempDir::new().unwrap();
    let templates = vec![TemplateDefinition::new("E7", "Shutdown requested by <*>")];

    let outcome = pipeline(&dir).annotate(&templates, &[]);

    assert!(outcome.persistence.is_ok());
    assert_eq!(outcome.report.missing_exemplars, 1);
    assert!(outcome.store.lookup("E7").unwrap().type_vector.is_empty());
}

#[test]
fn test_sequential_and_parallel_output_match() {
    let registry = PatternRegistry::builtin().unwrap();
    let templates = vec![TemplateDefinition::new("E1", "User <*> logged in from <*>")];
    let records: Vec<LogRecord> = (0..64)
        .map(|i| {
            let user = format!("user{}", i % 5);
            let host = format!("10.0.0.{}", i % 7);
            let content = format!("User {} logged in from {}", user, host);
            LogRecord::with_values(i.to_string(), "E1", content, &[user.as_str(), host.as_str()])
        })
        .collect();

    let render = |parallel: bool| {
        let build = loggraph::GraphBuilder::new(&registry)
            .parallel(parallel)
            .build(&templates, &records, Vec::new());
        let mut out = Vec::new();
        write_graph(&build.graph, OutputFormat::Ndjson, "http://example.org/", &mut out).unwrap();
        out
    };

    let sequential = render(false);
    assert_eq!(sequential, render(true));

    let text = String::from_utf8(sequential).unwrap();
    let hosts = text
        .lines()
        .filter(|l| l.contains("\"kind\":\"node\"") && l.contains("\"class\":\"Host\""))
        .count();
    assert_eq!(hosts, 7);
}

#[test]
fn test_ntriples_output() {
    let registry = PatternRegistry::builtin().unwrap();
    let (templates, records) = connection_batch("E1", "1", "10.0.0.5");
    let build = loggraph::build_knowledge_graph(&templates, &records, Vec::new(), &registry);

    let mut out = Vec::new();
    write_graph(&build.graph, OutputFormat::Ntriples, "http://example.org/loggraph/", &mut out)
        .unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(text.contains(
        "<http://example.org/loggraph/LogLine/1> <http://example.org/loggraph/has_host> <http://example.org/loggraph/Host/10_0_0_5> ."
    ));
    assert!(text.lines().all(|l| l.ends_with(" .")));
}
