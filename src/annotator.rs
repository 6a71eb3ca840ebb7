//! Template annotation.
//!
//! For each template, one exemplar log line is typed slot by slot against the
//! [`PatternRegistry`]. The result is the template's type vector, which is
//! later replayed over every line that shares the template.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, warn};

use crate::pattern::{PatternRegistry, PatternScope};
use crate::record::{LogRecord, TemplateDefinition};

/// Inferred type of one parameter position.
///
/// Serialized as the pattern name, or `null` when unknown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum SlotType {
    Matched(String),
    Unknown,
}

impl SlotType {
    pub fn pattern_name(&self) -> Option<&str> {
        match self {
            SlotType::Matched(name) => Some(name),
            SlotType::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, SlotType::Unknown)
    }
}

impl From<Option<String>> for SlotType {
    fn from(name: Option<String>) -> Self {
        name.map_or(SlotType::Unknown, SlotType::Matched)
    }
}

impl From<SlotType> for Option<String> {
    fn from(slot: SlotType) -> Self {
        match slot {
            SlotType::Matched(name) => Some(name),
            SlotType::Unknown => None,
        }
    }
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotType::Matched(name) => write!(f, "{}", name),
            SlotType::Unknown => write!(f, "?"),
        }
    }
}

/// One slot per parameter position, in order.
pub type TypeVector = Vec<SlotType>;

/// Outcome of typing a single value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub slot: SlotType,
    /// Registry entries with an unrecognized scope met while scanning
    pub unrecognized_scopes: usize,
}

/// Outcome of annotating one template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub type_vector: TypeVector,
    pub exemplar_found: bool,
    pub unrecognized_scopes: usize,
}

/// Types template slots using a pattern registry.
pub struct TemplateAnnotator<'r> {
    registry: &'r PatternRegistry,
}

impl<'r> TemplateAnnotator<'r> {
    pub fn new(registry: &'r PatternRegistry) -> Self {
        Self { registry }
    }

    /// Annotate a template from its exemplar line.
    ///
    /// Without an exemplar the template gets an empty type vector, so every
    /// line under it is later emitted with base attributes only.
    pub fn annotate(
        &self,
        definition: &TemplateDefinition,
        exemplar: Option<&LogRecord>,
    ) -> Annotation {
        let _span = debug_span!("annotate", template_id = %definition.template_id).entered();

        let Some(exemplar) = exemplar else {
            warn!("No exemplar line for template; annotating with an empty type vector");
            return Annotation {
                type_vector: Vec::new(),
                exemplar_found: false,
                unrecognized_scopes: 0,
            };
        };

        let mut type_vector = Vec::new();
        let mut unrecognized_scopes = 0;

        for value in exemplar.parameter_values() {
            let classification = self.classify(&value, &exemplar.content);
            unrecognized_scopes += classification.unrecognized_scopes;
            type_vector.push(classification.slot);
        }

        debug!(
            slots = type_vector.len(),
            typed = type_vector.iter().filter(|slot| !slot.is_unknown()).count(),
            "Template annotated"
        );

        Annotation {
            type_vector,
            exemplar_found: true,
            unrecognized_scopes,
        }
    }

    /// Type one value as it appears in `line`.
    ///
    /// Parameter-scoped patterns are tried first, in registry order, and the
    /// first match wins. Only if none match are line-scoped patterns tried;
    /// among those the last confirmed match wins.
    pub fn classify(&self, value: &str, line: &str) -> Classification {
        let mut unrecognized_scopes = 0;

        for pattern in self.registry.iter() {
            match &pattern.scope {
                PatternScope::Parameter => {
                    if pattern.matches(value, line) {
                        return Classification {
                            slot: SlotType::Matched(pattern.name.clone()),
                            unrecognized_scopes,
                        };
                    }
                }
                PatternScope::Line => {}
                PatternScope::Unrecognized(scope) => {
                    warn!(pattern = %pattern.name, scope = %scope, "Pattern has an unrecognized scope");
                    unrecognized_scopes += 1;
                }
            }
        }

        let mut slot = SlotType::Unknown;
        for pattern in self.registry.iter() {
            if pattern.scope == PatternScope::Line && pattern.matches(value, line) {
                slot = SlotType::Matched(pattern.name.clone());
            }
        }

        Classification {
            slot,
            unrecognized_scopes,
        }
    }
}

/// First record seen for each template id.
pub fn select_exemplars(records: &[LogRecord]) -> HashMap<&str, &LogRecord> {
    let mut exemplars = HashMap::new();
    for record in records {
        exemplars.entry(record.template_id.as_str()).or_insert(record);
    }
    exemplars
}
