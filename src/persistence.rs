//! Persistence of annotated templates across runs.
//!
//! The store decides which templates exist; this module only moves them to
//! and from durable storage. [`JsonTemplateFile`] keeps them in a single
//! pretty-printed JSON document, replaced atomically on every save.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{AnnotatedTemplate, Fingerprint};

/// Archive format version written by this crate.
pub const ARCHIVE_VERSION: u32 = 1;

/// On-disk document holding every annotated template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateArchive {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    /// Run that wrote this archive
    #[serde(default)]
    pub run_id: Option<Uuid>,
    pub templates: Vec<AnnotatedTemplate>,
}

impl TemplateArchive {
    pub fn new(templates: Vec<AnnotatedTemplate>, run_id: Uuid) -> Self {
        Self {
            version: ARCHIVE_VERSION,
            saved_at: Utc::now(),
            run_id: Some(run_id),
            templates,
        }
    }
}

/// Durable storage for annotated templates.
pub trait TemplatePersistence {
    /// Templates saved by earlier runs. A store that was never written is empty.
    fn load_templates(&self) -> Result<Vec<AnnotatedTemplate>, StoreError>;

    /// Replace the stored templates.
    fn persist_templates(
        &self,
        templates: &[AnnotatedTemplate],
        run_id: Uuid,
    ) -> Result<(), StoreError>;
}

/// Template archive kept in one JSON file.
#[derive(Debug, Clone)]
pub struct JsonTemplateFile {
    path: PathBuf,
}

impl JsonTemplateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole archive, or `None` if the file does not exist yet.
    pub fn read_archive(&self) -> Result<Option<TemplateArchive>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path).map_err(|source| self.io_error(source))?;
        let archive: TemplateArchive = serde_json::from_str(&contents)?;

        if archive.version != ARCHIVE_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: archive.version,
                expected: ARCHIVE_VERSION,
            });
        }

        Ok(Some(archive))
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl TemplatePersistence for JsonTemplateFile {
    fn load_templates(&self) -> Result<Vec<AnnotatedTemplate>, StoreError> {
        let Some(archive) = self.read_archive()? else {
            info!(path = %self.path.display(), "No template archive yet; starting empty");
            return Ok(Vec::new());
        };

        let templates: Vec<AnnotatedTemplate> = archive
            .templates
            .into_iter()
            .map(|mut template| {
                let expected = Fingerprint::of(&template.text);
                if template.fingerprint != expected {
                    warn!(
                        stored = %template.fingerprint,
                        computed = %expected,
                        "Archived fingerprint does not match template text; using computed value"
                    );
                    template.fingerprint = expected;
                }
                template
            })
            .collect();

        info!(
            path = %self.path.display(),
            templates = templates.len(),
            "Loaded template archive"
        );
        Ok(templates)
    }

    fn persist_templates(
        &self,
        templates: &[AnnotatedTemplate],
        run_id: Uuid,
    ) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }

        let archive = TemplateArchive::new(templates.to_vec(), run_id);
        let json = serde_json::to_string_pretty(&archive)?;

        let temp = self.temp_path();
        fs::write(&temp, json).map_err(|source| self.io_error(source))?;
        fs::rename(&temp, &self.path).map_err(|source| self.io_error(source))?;

        info!(
            path = %self.path.display(),
            templates = templates.len(),
            "Saved template archive"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotator::SlotType;
    use tempfile::TempDir;

    fn sample() -> Vec<AnnotatedTemplate> {
        vec![
            AnnotatedTemplate::new(
                "User <*> from <*>",
                vec![SlotType::Matched("User".to_string()), SlotType::Matched("Host".to_string())],
            ),
            AnnotatedTemplate::new("Service started", Vec::new()),
        ]
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let file = JsonTemplateFile::new(dir.path().join("templates.json"));

        assert!(file.load_templates().unwrap().is_empty());
    }

    #[test]
    fn test_persist_then_load() {
        let dir = TempDir::new().unwrap();
        let file = JsonTemplateFile::new(dir.path().join("nested").join("templates.json"));
        let run_id = Uuid::new_v4();

        file.persist_templates(&sample(), run_id).unwrap();
        let loaded = file.load_templates().unwrap();

        assert_eq!(loaded, sample());
        let archive = file.read_archive().unwrap().unwrap();
        assert_eq!(archive.run_id, Some(run_id));
        assert!(!file.temp_path().exists());
    }

    #[test]
    fn test_unsupported_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("templates.json");
        fs::write(
            &path,
            r#"{"version": 99, "saved_at": "2024-01-01T00:00:00Z", "templates": []}"#,
        )
        .unwrap();

        let result = JsonTemplateFile::new(&path).load_templates();
        assert!(matches!(
            result,
            Err(StoreError::UnsupportedVersion { found: 99, expected: 1 })
        ));
    }

    #[test]
    fn test_corrupt_archive_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("templates.json");
        fs::write(&path, "not json").unwrap();

        let result = JsonTemplateFile::new(&path).load_templates();
        assert!(matches!(result, Err(StoreError::Json(_))));
    }

    #[test]
    fn test_stale_fingerprint_is_recomputed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("templates.json");
        fs::write(
            &path,
            r#"{"version": 1, "saved_at": "2024-01-01T00:00:00Z",
                "templates": [{"fingerprint": "abc", "text": "Connect <*>", "type_vector": ["Host"]}]}"#,
        )
        .unwrap();

        let loaded = JsonTemplateFile::new(&path).load_templates().unwrap();
        assert_eq!(loaded[0].fingerprint, Fingerprint::of("Connect <*>"));
        assert_eq!(loaded[0].type_vector, vec![SlotType::Matched("Host".to_string())]);
    }

    #[test]
    fn test_write_failure_reports_io_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file, not a directory").unwrap();

        let file = JsonTemplateFile::new(blocker.join("templates.json"));
        let result = file.persist_templates(&sample(), Uuid::new_v4());
        assert!(matches!(result, Err(StoreError::Io { .. })));
    }
}
