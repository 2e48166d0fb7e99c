//! Identity → runner map enforcing at most one live runner per monitor.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::definition::{MonitorDefinition, MonitorKey};
use crate::monitor::{Engine, Runner, RunnerInfo};

/// What [`RunnerRegistry::upsert`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    /// No runner existed; one was started.
    Started,
    /// The fingerprint changed; the old runner was stopped and a new one started.
    Replaced,
    /// Same fingerprint already running; nothing touched.
    Unchanged,
}

/// All mutation goes through [`upsert`](Self::upsert) and
/// [`remove`](Self::remove). A replaced runner is taken out of the map and
/// fully stopped before its successor starts; the map lock is never held
/// while a runner drains.
pub struct RunnerRegistry {
    engine: Arc<Engine>,
    runners: Mutex<HashMap<MonitorKey, Runner>>,
}

impl RunnerRegistry {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            runners: Mutex::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub async fn upsert(&self, definition: MonitorDefinition) -> UpsertOutcome {
        let key = definition.key.clone();

        let previous = {
            let mut runners = self.runners.lock().await;
            match runners.get(&key) {
                Some(existing) if existing.fingerprint() == &definition.fingerprint => {
                    debug!(monitor = %key, fingerprint = %definition.fingerprint, "Definition unchanged");
                    return UpsertOutcome::Unchanged;
                }
                Some(existing) => {
                    info!(
                        monitor = %key,
                        from = %existing.fingerprint(),
                        to = %definition.fingerprint,
                        "Definition changed, replacing runner"
                    );
                    runners.remove(&key)
                }
                None => None,
            }
        };

        let outcome = match previous {
            Some(mut old) => {
                old.stop().await;
                UpsertOutcome::Replaced
            }
            None => UpsertOutcome::Started,
        };

        let mut runner = Runner::new(Arc::new(definition), Arc::clone(&self.engine));
        runner.start();
        let displaced = self.runners.lock().await.insert(key.clone(), runner);
        if let Some(mut displaced) = displaced {
            debug!(monitor = %key, "Concurrent upsert displaced a runner");
            displaced.stop().await;
        }
        outcome
    }

    /// Stop and forget the runner for `key`. Returns whether one existed.
    pub async fn remove(&self, key: &MonitorKey) -> bool {
        let taken = self.runners.lock().await.remove(key);
        match taken {
            Some(mut runner) => {
                runner.stop().await;
                info!(monitor = %key, "Runner removed");
                true
            }
            None => {
                debug!(monitor = %key, "No runner to remove");
                false
            }
        }
    }

    pub async fn lookup(&self, key: &MonitorKey) -> Option<RunnerInfo> {
        let runners = self.runners.lock().await;
        match runners.get(key) {
            Some(runner) => Some(runner.info().await),
            None => None,
        }
    }

    /// Every registered runner, ordered by identity.
    pub async fn list(&self) -> Vec<RunnerInfo> {
        let runners = self.runners.lock().await;
        let mut keys: Vec<_> = runners.keys().collect();
        keys.sort();
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(runners[key].info().await);
        }
        out
    }

    pub async fn len(&self) -> usize {
        self.runners.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.runners.lock().await.is_empty()
    }

    /// Stop and drop every runner concurrently. Returns how many were stopped.
    pub async fn stop_all(&self) -> usize {
        let mut runners = self.runners.lock().await;
        let mut drained: Vec<Runner> = runners.drain().map(|(_, r)| r).collect();
        let count = drained.len();
        join_all(drained.iter_mut().map(|r| r.stop())).await;
        count
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::client::build_client;
    use crate::config::ControllerConfig;
    use crate::definition::Fingerprint;
    use crate::metrics::ResponseCounters;
    use crate::monitor::RunnerState;

    fn registry() -> RunnerRegistry {
        let engine = Engine::new(
            build_client(Duration::from_secs(5)).unwrap(),
            Arc::new(ResponseCounters::new()),
            &ControllerConfig::default(),
        );
        RunnerRegistry::new(Arc::new(engine))
    }

    fn definition(name: &str, fingerprint: &str) -> MonitorDefinition {
        MonitorDefinition {
            key: MonitorKey::new("ns", name),
            fingerprint: Fingerprint::from(fingerprint),
            requests: Vec::new(),
            cleanup: Vec::new(),
            globals: Default::default(),
            period: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn same_fingerprint_is_a_noop() {
        let reg = registry();
        assert_eq!(reg.upsert(definition("a", "1")).await, UpsertOutcome::Started);
        let before = reg.lookup(&MonitorKey::new("ns", "a")).await.unwrap();

        assert_eq!(reg.upsert(definition("a", "1")).await, UpsertOutcome::Unchanged);
        let after = reg.lookup(&MonitorKey::new("ns", "a")).await.unwrap();

        assert_eq!(reg.len().await, 1);
        assert_eq!(before.started_at, after.started_at);
        assert_eq!(after.state, RunnerState::Running);
        reg.stop_all().await;
    }

    #[tokio::test]
    async fn new_fingerprint_replaces_runner() {
        let reg = registry();
        reg.upsert(definition("a", "1")).await;
        assert_eq!(reg.upsert(definition("a", "2")).await, UpsertOutcome::Replaced);

        let info = reg.lookup(&MonitorKey::new("ns", "a")).await.unwrap();
        assert_eq!(info.fingerprint, Fingerprint::from("2"));
        assert_eq!(info.state, RunnerState::Running);
        assert_eq!(reg.len().await, 1);
        reg.stop_all().await;
    }

    #[tokio::test]
    async fn remove_stops_and_forgets() {
        let reg = registry();
        let key = MonitorKey::new("ns", "a");
        reg.upsert(definition("a", "1")).await;
        assert!(reg.remove(&key).await);
        assert!(reg.lookup(&key).await.is_none());
        assert!(!reg.remove(&key).await);
        assert!(reg.is_empty().await);
    }

    #[tokio::test]
    async fn list_is_sorted_and_stop_all_drains() {
        let reg = registry();
        reg.upsert(definition("b", "1")).await;
        reg.upsert(definition("a", "1")).await;
        let names: Vec<_> = reg.list().await.into_iter().map(|i| i.monitor.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(reg.stop_all().await, 2);
        assert!(reg.is_empty().await);
    }
}
