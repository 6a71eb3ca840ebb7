//! Parsed log records and template definitions.
//!
//! Both types are produced by the upstream parser (template mining happens
//! before this crate sees any data). The engine only reads them.

use serde::{Deserialize, Deserializer, Serialize};

/// One parsed log line, already classified into a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Line identifier, unique within a batch
    pub id: String,

    /// Timestamp as emitted by the parser (no normalization is applied)
    #[serde(default)]
    pub timestamp: Option<String>,

    #[serde(default)]
    pub severity: String,

    /// Component or process that emitted the line
    #[serde(default)]
    pub component: String,

    /// Full message content
    pub content: String,

    /// Event id of the template, as labeled by the upstream parser for this batch
    pub template_id: String,

    /// Raw parameter list, e.g. `['alice', '10.0.0.5']`
    #[serde(default, deserialize_with = "deserialize_parameters")]
    pub parameters: String,
}

impl LogRecord {
    /// Create a record with empty optional fields.
    pub fn new(
        id: impl Into<String>,
        template_id: impl Into<String>,
        content: impl Into<String>,
        parameters: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp: None,
            severity: String::new(),
            component: String::new(),
            content: content.into(),
            template_id: template_id.into(),
            parameters: parameters.into(),
        }
    }

    /// Create a record from already-split parameter values.
    pub fn with_values(
        id: impl Into<String>,
        template_id: impl Into<String>,
        content: impl Into<String>,
        values: &[&str],
    ) -> Self {
        Self::new(id, template_id, content, format_parameters(values))
    }

    /// Ordered parameter values with the wrapper syntax removed.
    pub fn parameter_values(&self) -> Vec<String> {
        split_parameters(&self.parameters)
    }
}

/// A template as labeled by the upstream parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDefinition {
    pub template_id: String,

    /// Template wording with parameter placeholders, e.g. `User <*> logged in from <*>`
    pub text: String,
}

impl TemplateDefinition {
    pub fn new(template_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            template_id: template_id.into(),
            text: text.into(),
        }
    }
}

/// Split a raw parameter list into ordered values.
///
/// Strips the outer `[` `]` wrapper, splits on commas and removes the quotes
/// around each item. An empty list (after stripping) yields no values.
///
/// # Example
///
/// ```
/// use loggraph::record::split_parameters;
///
/// assert_eq!(split_parameters("['alice', '10.0.0.5']"), vec!["alice", "10.0.0.5"]);
/// assert!(split_parameters("[]").is_empty());
/// ```
pub fn split_parameters(raw: &str) -> Vec<String> {
    let stripped = strip_wrapper(raw);
    if stripped.is_empty() {
        return Vec::new();
    }

    stripped
        .split(',')
        .map(|item| strip_quotes(item.trim()).to_string())
        .collect()
}

/// Render values in the wrapper syntax accepted by [`split_parameters`].
pub fn format_parameters<S: AsRef<str>>(values: &[S]) -> String {
    let quoted: Vec<String> = values
        .iter()
        .map(|v| format!("'{}'", v.as_ref()))
        .collect();
    format!("[{}]", quoted.join(", "))
}

fn strip_wrapper(raw: &str) -> &str {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('[').unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix(']').unwrap_or(trimmed);
    trimmed.trim()
}

fn strip_quotes(item: &str) -> &str {
    for quote in ['\'', '"'] {
        if item.len() >= 2 && item.starts_with(quote) && item.ends_with(quote) {
            return &item[1..item.len() - 1];
        }
    }
    item
}

/// Accept either the raw list text or a JSON array of values.
fn deserialize_parameters<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawParameters {
        Text(String),
        Values(Vec<String>),
    }

    Ok(match RawParameters::deserialize(deserializer)? {
        RawParameters::Text(text) => text,
        RawParameters::Values(values) => format_parameters(&values),
    })
}
