//! Per-cycle variables: where they come from, how they are resolved from
//! responses, and how they are substituted into request templates.

pub mod resolver;
pub mod template;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use resolver::{resolve, ExtractionError};
pub use template::Substitutions;

/// Where a variable's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarSource {
    BodyJson,
    BodyYaml,
    BodyRaw,
    Headers,
    /// Supplied by configuration; never extracted and never cleared within a cycle.
    Provided,
}

impl fmt::Display for VarSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BodyJson => write!(f, "body_json"),
            Self::BodyYaml => write!(f, "body_yaml"),
            Self::BodyRaw => write!(f, "body_raw"),
            Self::Headers => write!(f, "headers"),
            Self::Provided => write!(f, "provided"),
        }
    }
}

/// A resolved variable. Lives only as long as the cycle that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub source: VarSource,
    pub value: String,
}

impl Variable {
    pub fn provided(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: VarSource::Provided,
            value: value.into(),
        }
    }
}

/// Ordered accumulation of variables for one execution cycle.
///
/// Entries are never removed; a later entry with the same name shadows an
/// earlier one once converted to [`Substitutions`].
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    entries: Vec<Variable>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, variable: Variable) {
        self.entries.push(variable);
    }

    pub fn extend(&mut self, variables: impl IntoIterator<Item = Variable>) {
        self.entries.extend(variables);
    }

    /// Current value of `name`, honouring last-write-wins.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|v| v.name == name)
            .map(|v| v.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn substitutions(&self) -> Substitutions {
        Substitutions::from_table(self)
    }
}
