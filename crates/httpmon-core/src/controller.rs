//! Reconciliation of definition changes into runner lifecycle actions.
//!
//! A [`DefinitionSource`](crate::source::DefinitionSource) pushes
//! [`DefinitionEvent`]s through an mpsc channel. The [`Controller`] drains
//! that channel serially, so events for one identity are applied in the
//! order they were produced.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::definition::{MonitorDefinition, MonitorKey};
use crate::registry::{RunnerRegistry, UpsertOutcome};

#[derive(Debug, Clone)]
pub enum DefinitionChange {
    Applied(MonitorDefinition),
    Removed,
}

/// A created/updated or deleted definition, keyed by identity.
#[derive(Debug, Clone)]
pub struct DefinitionEvent {
    pub key: MonitorKey,
    pub change: DefinitionChange,
}

impl DefinitionEvent {
    pub fn applied(definition: MonitorDefinition) -> Self {
        Self {
            key: definition.key.clone(),
            change: DefinitionChange::Applied(definition),
        }
    }

    pub fn removed(key: MonitorKey) -> Self {
        Self {
            key,
            change: DefinitionChange::Removed,
        }
    }
}

/// What applying one event did to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reconciled {
    Upserted(UpsertOutcome),
    Removed,
    Absent,
}

pub fn definition_channel() -> (
    mpsc::UnboundedSender<DefinitionEvent>,
    mpsc::UnboundedReceiver<DefinitionEvent>,
) {
    mpsc::unbounded_channel()
}

pub struct Controller {
    registry: Arc<RunnerRegistry>,
}

impl Controller {
    pub fn new(registry: Arc<RunnerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<RunnerRegistry> {
        &self.registry
    }

    pub async fn apply(&self, event: DefinitionEvent) -> Reconciled {
        let DefinitionEvent { key, change } = event;
        match change {
            DefinitionChange::Applied(definition) => {
                let outcome = self.registry.upsert(definition).await;
                match outcome {
                    UpsertOutcome::Unchanged => {}
                    _ => info!(monitor = %key, ?outcome, "Definition applied"),
                }
                Reconciled::Upserted(outcome)
            }
            DefinitionChange::Removed => {
                if self.registry.remove(&key).await {
                    info!(monitor = %key, "Definition removed");
                    Reconciled::Removed
                } else {
                    Reconciled::Absent
                }
            }
        }
    }

    /// Apply events until every sender is dropped.
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<DefinitionEvent>) {
        debug!("Controller started");
        while let Some(event) = rx.recv().await {
            self.apply(event).await;
        }
        debug!("Controller shutting down");
    }
}
