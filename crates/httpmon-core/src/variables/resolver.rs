use serde_json::Value;
use thiserror::Error;

use super::{VarSource, Variable};
use crate::client::ProbeResponse;
use crate::definition::VariableExtractionRule;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("variable '{name}': nothing found at '{path}'")]
    NotFound { name: String, path: String },
    #[error("variable '{name}': response body is not valid {format}: {reason}")]
    Parse {
        name: String,
        format: &'static str,
        reason: String,
    },
    #[error("variable '{name}': invalid {kind} path '{path}'")]
    InvalidPath {
        name: String,
        kind: VarSource,
        path: String,
    },
}

/// Resolve one extraction rule against a buffered response.
///
/// The response is only borrowed, so any number of rules may read the same
/// body.
pub fn resolve(
    rule: &VariableExtractionRule,
    response: &ProbeResponse,
) -> Result<Variable, ExtractionError> {
    let value = match rule.from {
        VarSource::Provided => rule.value.clone(),
        VarSource::BodyRaw => String::from_utf8_lossy(&response.body).into_owned(),
        VarSource::BodyJson => {
            let document: Value =
                serde_json::from_slice(&response.body).map_err(|e| ExtractionError::Parse {
                    name: rule.name.clone(),
                    format: "JSON",
                    reason: e.to_string(),
                })?;
            from_document(rule, &document)?
        }
        VarSource::BodyYaml => {
            let document: Value =
                serde_yaml::from_slice(&response.body).map_err(|e| ExtractionError::Parse {
                    name: rule.name.clone(),
                    format: "YAML",
                    reason: e.to_string(),
                })?;
            from_document(rule, &document)?
        }
        VarSource::Headers => from_headers(rule, response)?,
    };

    Ok(Variable {
        name: rule.name.clone(),
        source: rule.from,
        value,
    })
}

/// Split a `/`-delimited path, dropping empty segments.
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn not_found(rule: &VariableExtractionRule) -> ExtractionError {
    ExtractionError::NotFound {
        name: rule.name.clone(),
        path: rule.json_path.clone(),
    }
}

fn from_document(rule: &VariableExtractionRule, document: &Value) -> Result<String, ExtractionError> {
    let leaf = lookup(document, &path_segments(&rule.json_path)).ok_or_else(|| not_found(rule))?;
    render_leaf(leaf).ok_or_else(|| not_found(rule))
}

fn lookup<'a>(root: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    segments.iter().try_fold(root, |node, segment| match node {
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        Value::Object(map) => map.get(*segment),
        _ => None,
    })
}

/// Text form of a resolved leaf. A JSON `null` counts as absent, so it yields `NotFound`.
fn render_leaf(leaf: &Value) -> Option<String> {
    match leaf {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => Some(leaf.to_string()),
    }
}

fn from_headers(rule: &VariableExtractionRule, response: &ProbeResponse) -> Result<String, ExtractionError> {
    let segments = path_segments(&rule.json_path);
    let invalid_path = || ExtractionError::InvalidPath {
        name: rule.name.clone(),
        kind: VarSource::Headers,
        path: rule.json_path.clone(),
    };

    let value = match segments.as_slice() {
        [header] => response.header_values(header).into_iter().next(),
        [header, index] => {
            let index: usize = index.parse().map_err(|_| invalid_path())?;
            response.header_values(header).into_iter().nth(index)
        }
        _ => return Err(invalid_path()),
    };

    value
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| not_found(rule))
}
