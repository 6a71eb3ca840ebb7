//! Pattern registry for typing parameter values.
//!
//! A [`Pattern`] binds a regular expression to an entity class, an output
//! relation and a flag saying whether matches become graph nodes or literal
//! attributes. Registration order is the matching priority.

use std::fs;
use std::path::Path;

use convert_case::{Case, Casing};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PatternError;

/// Pattern file shipped with the crate, used when no other registry is configured.
const BUILTIN_PATTERNS: &str = include_str!("../config/patterns.yaml");

/// What a pattern is matched against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PatternScope {
    /// Matched directly against one parameter value.
    Parameter,
    /// Matched against the whole message; the first match span must contain the value.
    Line,
    /// A scope name this version does not understand. Never matches.
    Unrecognized(String),
}

impl PatternScope {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "parameter" | "param" => PatternScope::Parameter,
            "line" => PatternScope::Line,
            _ => PatternScope::Unrecognized(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PatternScope::Parameter => "parameter",
            PatternScope::Line => "line",
            PatternScope::Unrecognized(raw) => raw,
        }
    }
}

impl From<String> for PatternScope {
    fn from(raw: String) -> Self {
        PatternScope::parse(&raw)
    }
}

impl From<PatternScope> for String {
    fn from(scope: PatternScope) -> Self {
        scope.as_str().to_string()
    }
}

/// Pattern definition as written in a pattern file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternDef {
    /// Entity class label (e.g. "Host")
    pub name: String,

    pub scope: PatternScope,

    pub regex: String,

    /// Output relation; defaults to `has_<snake_case name>`
    #[serde(default)]
    pub relation: Option<String>,

    /// Whether a match becomes a graph node (true) or a literal attribute (false)
    #[serde(default = "default_node")]
    pub node: bool,
}

fn default_node() -> bool {
    true
}

impl PatternDef {
    pub fn new(name: impl Into<String>, scope: PatternScope, regex: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope,
            regex: regex.into(),
            relation: None,
            node: true,
        }
    }

    pub fn relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    pub fn literal(mut self) -> Self {
        self.node = false;
        self
    }
}

/// A compiled pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub name: String,
    pub scope: PatternScope,
    pub matcher: Regex,
    pub relation: String,
    pub produces_node: bool,
}

impl Pattern {
    /// Compile a definition.
    ///
    /// # Errors
    /// Returns `PatternError::InvalidRegex` if the expression does not compile
    pub fn compile(def: PatternDef) -> Result<Self, PatternError> {
        let matcher = Regex::new(&def.regex).map_err(|source| PatternError::InvalidRegex {
            name: def.name.clone(),
            source,
        })?;

        let relation = def
            .relation
            .unwrap_or_else(|| format!("has_{}", def.name.to_case(Case::Snake)));

        Ok(Self {
            name: def.name,
            scope: def.scope,
            matcher,
            relation,
            produces_node: def.node,
        })
    }

    /// Check whether this pattern accepts `value` as it appears in `line`.
    ///
    /// Parameter-scoped patterns look for a match inside the value itself.
    /// Line-scoped patterns search the whole line and accept only if the
    /// first match span contains the value. Empty values never match.
    pub fn matches(&self, value: &str, line: &str) -> bool {
        if value.is_empty() {
            return false;
        }

        match &self.scope {
            PatternScope::Parameter => self.matcher.is_match(value),
            PatternScope::Line => self
                .matcher
                .find(line)
                .is_some_and(|span| span.as_str().contains(value)),
            PatternScope::Unrecognized(_) => false,
        }
    }
}

/// Ordered set of patterns, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct PatternRegistry {
    patterns: IndexMap<String, Pattern>,
}

impl PatternRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile definitions in order.
    ///
    /// # Errors
    /// Fails on an invalid regex or a repeated pattern name. Unrecognized
    /// scopes are accepted and reported later, during annotation.
    pub fn from_defs(defs: impl IntoIterator<Item = PatternDef>) -> Result<Self, PatternError> {
        let mut registry = Self::new();
        for def in defs {
            registry.register(Pattern::compile(def)?)?;
        }
        Ok(registry)
    }

    /// Registry compiled from the bundled `config/patterns.yaml`.
    pub fn builtin() -> Result<Self, PatternError> {
        Self::from_yaml_str(BUILTIN_PATTERNS)
    }

    /// Parse a YAML list of pattern definitions.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, PatternError> {
        let defs: Vec<PatternDef> = serde_yaml::from_str(yaml)?;
        Self::from_defs(defs)
    }

    /// Load a pattern file.
    ///
    /// # Example
    /// ```ignore
    /// use loggraph::PatternRegistry;
    ///
    /// let registry = PatternRegistry::load_from_file("config/patterns.yaml")?;
    /// println!("{} patterns", registry.len());
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, PatternError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| PatternError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Append a pattern at the lowest priority.
    pub fn register(&mut self, pattern: Pattern) -> Result<(), PatternError> {
        if self.patterns.contains_key(&pattern.name) {
            return Err(PatternError::DuplicateName(pattern.name));
        }
        self.patterns.insert(pattern.name.clone(), pattern);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Pattern> {
        self.patterns.get(name)
    }

    /// Patterns in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &Pattern> {
        self.patterns.values()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.patterns.keys().map(String::as_str).collect()
    }
}
