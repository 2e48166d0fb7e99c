//! Monitor definitions as consumed from the definition store.
//!
//! Definitions arrive as Kubernetes-style `HttpMonitor` resources (YAML or
//! JSON). [`parse_manifests`] turns one manifest document stream into
//! validated, immutable [`MonitorDefinition`]s.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::duration::{parse_duration, DurationError};
use crate::variables::VarSource;

pub const RESOURCE_KIND: &str = "HttpMonitor";
pub const DEFAULT_NAMESPACE: &str = "default";
pub const ALLOWED_METHODS: &[&str] = &["HEAD", "GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"];

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("failed to parse manifest: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("unsupported resource kind '{0}', expected {RESOURCE_KIND}")]
    UnsupportedKind(String),
    #[error("monitor {key}: {reason}")]
    Invalid { key: MonitorKey, reason: String },
    #[error("monitor {key}: invalid period: {source}")]
    Period {
        key: MonitorKey,
        #[source]
        source: DurationError,
    },
}

/// Identity of a monitor: namespace + name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonitorKey {
    pub namespace: String,
    pub name: String,
}

impl MonitorKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for MonitorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Opaque version marker used to detect definition changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableExtractionRule {
    pub name: String,
    pub from: VarSource,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub json_path: String,
    /// Only meaningful when `from` is `provided`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDefinition {
    pub name: String,
    /// Service label used for metrics.
    #[serde(default)]
    pub target_service: String,
    pub method: String,
    pub url: String,
    /// Go-style duration string. Empty means the default request timeout.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub timeout: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query_params: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, Vec<String>>,
    /// Empty means any 2xx status is accepted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expected_response_codes: Vec<u16>,
    #[serde(default, alias = "variables", skip_serializing_if = "Vec::is_empty")]
    pub vars_from_response: Vec<VariableExtractionRule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub namespace: Option<String>,
    pub name: String,
    #[serde(default, rename = "resourceVersion")]
    pub resource_version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpMonitorSpec {
    pub requests: Vec<RequestDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cleanup: Vec<RequestDefinition>,
    #[serde(default, alias = "variables", skip_serializing_if = "BTreeMap::is_empty")]
    pub globals: BTreeMap<String, String>,
    pub period: String,
}

/// Raw `HttpMonitor` resource document.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpMonitorResource {
    #[serde(default, rename = "apiVersion")]
    pub api_version: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    pub metadata: ObjectMeta,
    pub spec: HttpMonitorSpec,
}

/// A validated monitor definition. Immutable once built.
#[derive(Debug, Clone)]
pub struct MonitorDefinition {
    pub key: MonitorKey,
    pub fingerprint: Fingerprint,
    pub requests: Vec<RequestDefinition>,
    pub cleanup: Vec<RequestDefinition>,
    pub globals: BTreeMap<String, String>,
    pub period: Duration,
}

impl MonitorDefinition {
    pub fn from_resource(resource: HttpMonitorResource) -> Result<Self, DefinitionError> {
        if let Some(kind) = resource.kind.as_deref() {
            if kind != RESOURCE_KIND {
                return Err(DefinitionError::UnsupportedKind(kind.to_string()));
            }
        }

        let key = MonitorKey::new(
            resource
                .metadata
                .namespace
                .clone()
                .filter(|ns| !ns.is_empty())
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            resource.metadata.name.clone(),
        );
        let invalid = |reason: String| DefinitionError::Invalid {
            key: key.clone(),
            reason,
        };

        if key.name.is_empty() {
            return Err(invalid("metadata.name must not be empty".into()));
        }

        let period = parse_duration(&resource.spec.period).map_err(|source| {
            DefinitionError::Period {
                key: key.clone(),
                source,
            }
        })?;
        if period.is_zero() {
            return Err(invalid("period must be greater than zero".into()));
        }

        for request in resource.spec.requests.iter().chain(&resource.spec.cleanup) {
            validate_request(request).map_err(&invalid)?;
        }

        let fingerprint = match resource.metadata.resource_version.as_deref() {
            Some(version) if !version.is_empty() => Fingerprint(version.to_string()),
            _ => spec_digest(&resource.spec),
        };

        Ok(Self {
            key,
            fingerprint,
            requests: resource.spec.requests,
            cleanup: resource.spec.cleanup,
            globals: resource.spec.globals,
            period,
        })
    }
}

fn validate_request(request: &RequestDefinition) -> Result<(), String> {
    if request.name.is_empty() {
        return Err("request name must not be empty".into());
    }
    if !ALLOWED_METHODS.contains(&request.method.as_str()) {
        return Err(format!(
            "request '{}': unsupported method '{}'",
            request.name, request.method
        ));
    }
    if request.url.is_empty() {
        return Err(format!("request '{}': url must not be empty", request.name));
    }
    for rule in &request.vars_from_response {
        if rule.name.is_empty() {
            return Err(format!(
                "request '{}': variable name must not be empty",
                request.name
            ));
        }
    }
    Ok(())
}

/// SHA-256 over the canonical JSON encoding of the `spec` block. Maps are ordered, so
/// reformatting a manifest does not change the digest.
fn spec_digest(spec: &HttpMonitorSpec) -> Fingerprint {
    let canonical = serde_json::to_vec(spec).unwrap_or_default();
    Fingerprint(hex::encode(Sha256::digest(&canonical)))
}

/// Parse every `HttpMonitor` document in a YAML (or JSON) stream.
pub fn parse_manifests(content: &str) -> Result<Vec<MonitorDefinition>, DefinitionError> {
    let mut definitions = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        let resource: HttpMonitorResource = serde_yaml::from_value(value)?;
        definitions.push(MonitorDefinition::from_resource(resource)?);
    }
    Ok(definitions)
}
