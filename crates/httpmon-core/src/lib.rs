#![forbid(unsafe_code)]

pub mod client;
pub mod config;
pub mod controller;
pub mod definition;
pub mod duration;
pub mod metrics;
pub mod monitor;
pub mod registry;
pub mod source;
pub mod variables;

pub use client::{build_client, ProbeResponse};
pub use config::{parse_set_var, ControllerConfig};
pub use controller::{
    definition_channel, Controller, DefinitionChange, DefinitionEvent, Reconciled,
};
pub use definition::{
    parse_manifests, DefinitionError, Fingerprint, MonitorDefinition, MonitorKey,
    RequestDefinition, VariableExtractionRule,
};
pub use duration::{parse_duration, DurationError};
pub use metrics::{MetricsSink, ResponseCounters, ResponseRecord};
pub use monitor::{
    CycleReport, Engine, ExecuteError, Phase, RequestReport, Runner, RunnerInfo, RunnerState,
};
pub use registry::{RunnerRegistry, UpsertOutcome};
pub use source::{watch, DefinitionSource, DirectorySource};
pub use variables::{ExtractionError, VarSource, Variable, VariableTable};
