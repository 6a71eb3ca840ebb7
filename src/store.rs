//! Template store.
//!
//! Annotated templates are identified by a content fingerprint of their
//! text, not by the event id the upstream parser happened to assign in a
//! given run. The store keeps one [`AnnotatedTemplate`] per fingerprint and
//! a per-run index from event id to fingerprint.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::annotator::{SlotType, TypeVector};
use crate::record::TemplateDefinition;

/// SHA-256 of the template text, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        Fingerprint(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

static UNKNOWN_SLOT: SlotType = SlotType::Unknown;

/// A template with its per-position types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedTemplate {
    pub fingerprint: Fingerprint,
    pub text: String,
    pub type_vector: TypeVector,
}

impl AnnotatedTemplate {
    pub fn new(text: impl Into<String>, type_vector: TypeVector) -> Self {
        let text = text.into();
        Self {
            fingerprint: Fingerprint::of(&text),
            text,
            type_vector,
        }
    }

    /// Slot type for a parameter position; positions past the vector are unknown.
    pub fn slot(&self, position: usize) -> &SlotType {
        self.type_vector.get(position).unwrap_or(&UNKNOWN_SLOT)
    }
}

/// How a template definition was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The text had not been seen; the annotator ran.
    Annotated,
    /// The text was already known (this run or a prior one); annotation was skipped.
    Reused,
}

/// Deduplicated annotated templates plus the event id index.
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    templates: IndexMap<Fingerprint, AnnotatedTemplate>,
    index: HashMap<String, Fingerprint>,
}

impl TemplateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with templates persisted by earlier runs.
    ///
    /// If the same fingerprint appears more than once, the first entry wins.
    pub fn from_templates(templates: impl IntoIterator<Item = AnnotatedTemplate>) -> Self {
        let mut store = Self::new();
        for template in templates {
            store
                .templates
                .entry(template.fingerprint.clone())
                .or_insert(template);
        }
        store
    }

    /// Resolve a template definition to its fingerprint.
    ///
    /// The annotator closure only runs when no template with the same text
    /// exists yet, so annotation happens at most once per distinct wording
    /// across the lifetime of the persisted store. Either way the event id is
    /// recorded in the index.
    pub fn resolve<F>(
        &mut self,
        definition: &TemplateDefinition,
        annotate: F,
    ) -> (Fingerprint, Resolution)
    where
        F: FnOnce() -> TypeVector,
    {
        let fingerprint = Fingerprint::of(&definition.text);

        let resolution = match self.templates.entry(fingerprint.clone()) {
            indexmap::map::Entry::Occupied(_) => {
                debug!(
                    template_id = %definition.template_id,
                    fingerprint = %fingerprint,
                    "Template already annotated; reusing"
                );
                Resolution::Reused
            }
            indexmap::map::Entry::Vacant(slot) => {
                slot.insert(AnnotatedTemplate {
                    fingerprint: fingerprint.clone(),
                    text: definition.text.clone(),
                    type_vector: annotate(),
                });
                Resolution::Annotated
            }
        };

        self.index
            .insert(definition.template_id.clone(), fingerprint.clone());

        (fingerprint, resolution)
    }

    /// Annotated template for an event id of the current run.
    pub fn lookup(&self, template_id: &str) -> Option<&AnnotatedTemplate> {
        self.index
            .get(template_id)
            .and_then(|fingerprint| self.templates.get(fingerprint))
    }

    pub fn fingerprint_for(&self, template_id: &str) -> Option<&Fingerprint> {
        self.index.get(template_id)
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&AnnotatedTemplate> {
        self.templates.get(fingerprint)
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.templates.contains_key(fingerprint)
    }

    /// Templates in insertion order.
    pub fn templates(&self) -> impl Iterator<Item = &AnnotatedTemplate> {
        self.templates.values()
    }

    pub fn into_templates(self) -> Vec<AnnotatedTemplate> {
        self.templates.into_values().collect()
    }

    /// Number of distinct annotated templates.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Number of event ids mapped this run.
    pub fn index_len(&self) -> usize {
        self.index.len()
    }
}
