//! Definition sources: where `HttpMonitor` resources come from.
//!
//! [`DirectorySource`] polls a directory of manifests and diffs each scan
//! against the previous one, turning file edits into [`DefinitionEvent`]s.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::controller::DefinitionEvent;
use crate::definition::{parse_manifests, Fingerprint, MonitorDefinition, MonitorKey};

const MANIFEST_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

#[async_trait]
pub trait DefinitionSource: Send {
    /// Changes since the previous poll, in a stable order.
    async fn poll(&mut self) -> Vec<DefinitionEvent>;
}

pub struct DirectorySource {
    dir: PathBuf,
    known: HashMap<MonitorKey, Fingerprint>,
    files: HashMap<PathBuf, Vec<MonitorKey>>,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            known: HashMap::new(),
            files: HashMap::new(),
        }
    }

    async fn manifest_paths(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_manifest = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| MANIFEST_EXTENSIONS.contains(&e));
            if is_manifest && entry.file_type().await?.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    async fn load(path: &Path) -> Result<Vec<MonitorDefinition>, String> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| e.to_string())?;
        parse_manifests(&content).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl DefinitionSource for DirectorySource {
    async fn poll(&mut self) -> Vec<DefinitionEvent> {
        let paths = match self.manifest_paths().await {
            Ok(paths) => paths,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Failed to scan manifest directory");
                return Vec::new();
            }
        };

        let mut events = Vec::new();
        let mut seen: HashSet<MonitorKey> = HashSet::new();
        let mut files: HashMap<PathBuf, Vec<MonitorKey>> = HashMap::new();

        for path in paths {
            let definitions = match Self::load(&path).await {
                Ok(defs) => defs,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Skipping invalid manifest");
                    // Whatever this file defined before stays live.
                    if let Some(previous) = self.files.remove(&path) {
                        seen.extend(previous.iter().cloned());
                        files.insert(path, previous);
                    }
                    continue;
                }
            };

            let mut keys = Vec::with_capacity(definitions.len());
            for definition in definitions {
                if !seen.insert(definition.key.clone()) {
                    warn!(
                        file = %path.display(),
                        monitor = %definition.key,
                        "Duplicate monitor definition ignored"
                    );
                    continue;
                }
                keys.push(definition.key.clone());
                if self.known.get(&definition.key) != Some(&definition.fingerprint) {
                    self.known
                        .insert(definition.key.clone(), definition.fingerprint.clone());
                    events.push(DefinitionEvent::applied(definition));
                }
            }
            files.insert(path, keys);
        }

        let mut vanished: Vec<MonitorKey> = self
            .known
            .keys()
            .filter(|k| !seen.contains(*k))
            .cloned()
            .collect();
        vanished.sort();
        for key in vanished {
            self.known.remove(&key);
            events.push(DefinitionEvent::removed(key));
        }

        self.files = files;
        if !events.is_empty() {
            debug!(dir = %self.dir.display(), changes = events.len(), "Manifest scan found changes");
        }
        events
    }
}

/// Poll `source` every `interval` and forward its events until `shutdown`
/// fires or the receiver goes away. The first poll is immediate.
pub async fn watch<S: DefinitionSource>(
    mut source: S,
    interval: Duration,
    tx: mpsc::UnboundedSender<DefinitionEvent>,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_ms = interval.as_millis() as u64, "Watching for definition changes");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        for event in source.poll().await {
            if tx.send(event).is_err() {
                debug!("Definition receiver dropped, stopping watch");
                return;
            }
        }
    }

    debug!("Definition watch stopped");
}
