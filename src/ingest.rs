//! NDJSON readers for parsed log records and template definitions.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::IngestError;
use crate::record::{LogRecord, TemplateDefinition};

/// Read log records from an NDJSON file.
pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<LogRecord>, IngestError> {
    read_ndjson_file(path.as_ref())
}

/// Read template definitions from an NDJSON file.
pub fn read_templates<P: AsRef<Path>>(path: P) -> Result<Vec<TemplateDefinition>, IngestError> {
    read_ndjson_file(path.as_ref())
}

fn read_ndjson_file<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, IngestError> {
    let file = File::open(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_ndjson(file).map_err(|err| match err {
        IngestError::Io { source, .. } => IngestError::Io {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })
}

/// Parse NDJSON from any reader. Blank lines are skipped; line numbers start at 1.
pub fn read_ndjson<T: DeserializeOwned, R: Read>(reader: R) -> Result<Vec<T>, IngestError> {
    let mut items = Vec::new();

    for (index, line) in BufReader::new(reader).lines().enumerate() {
        let line = line.map_err(|source| IngestError::Io {
            path: Default::default(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let item = serde_json::from_str(&line).map_err(|source| IngestError::Malformed {
            line: index + 1,
            source,
        })?;
        items.push(item);
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_read_templates_skips_blank_lines() {
        let input = "{\"template_id\":\"E1\",\"text\":\"a <*>\"}\n\n{\"template_id\":\"E2\",\"text\":\"b\"}\n";
        let templates: Vec<TemplateDefinition> = read_ndjson(input.as_bytes()).unwrap();

        assert_eq!(templates.len(), 2);
        assert_eq!(templates[1], TemplateDefinition::new("E2", "b"));
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let input = "{\"template_id\":\"E1\",\"text\":\"a\"}\nnot json\n";
        let result: Result<Vec<TemplateDefinition>, _> = read_ndjson(input.as_bytes());

        assert!(matches!(result, Err(IngestError::Malformed { line: 2, .. })));
    }

    #[test]
    fn test_read_records_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.ndjson");
        fs::write(
            &path,
            r#"{"id":"1","severity":"INFO","component":"sshd","content":"User alice logged in","template_id":"E1","parameters":"['alice']"}"#,
        )
        .unwrap();

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].parameter_values(), vec!["alice"]);
    }

    #[test]
    fn test_missing_file() {
        let result = read_records("/nonexistent/records.ndjson");
        assert!(matches!(result, Err(IngestError::Io { .. })));
    }
}
