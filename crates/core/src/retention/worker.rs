use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use super::{RetentionCommand, RetentionHandle, RetentionPolicy};
use crate::config::RetentionConfig;
use crate::metrics::{RETENTION_DELETIONS, SWEEP_REMOVALS};

struct Pending {
    dir: PathBuf,
    deadline: Instant,
}

/// Background task that owns every deletion of job directories.
///
/// Each directory is removed exactly once: whichever of delivery
/// confirmation, deadline expiry, age sweep or shutdown comes first wins,
/// and later triggers find nothing to do.
pub struct RetentionWorker {
    rx: mpsc::UnboundedReceiver<RetentionCommand>,
    staging_root: PathBuf,
    sweep_interval: Duration,
    max_age: Duration,
    /// Directories of jobs that have not reached a terminal state.
    active: HashMap<String, PathBuf>,
    /// Packaged artifacts waiting for delivery or their deadline.
    pending: HashMap<String, Pending>,
}

impl RetentionWorker {
    pub fn new(
        rx: mpsc::UnboundedReceiver<RetentionCommand>,
        staging_root: PathBuf,
        sweep_interval: Duration,
        max_age: Duration,
    ) -> Self {
        Self {
            rx,
            staging_root,
            sweep_interval,
            max_age,
            active: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    /// Run the worker until every handle is dropped.
    ///
    /// The first sweep happens immediately, which clears directories left
    /// behind by a previous process. On shutdown every tracked directory is
    /// removed.
    pub async fn run(mut self) {
        tracing::info!(
            staging_root = %self.staging_root.display(),
            sweep_interval_secs = self.sweep_interval.as_secs(),
            max_age_secs = self.max_age.as_secs(),
            "Retention worker started"
        );

        let mut sweep = tokio::time::interval(self.sweep_interval.max(Duration::from_millis(10)));
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let next_deadline = self.pending.values().map(|p| p.deadline).min();
            let expiry = async {
                match next_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;
                command = self.rx.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                _ = expiry => self.expire().await,
                _ = sweep.tick() => self.sweep().await,
            }
        }

        tracing::info!(
            pending = self.pending.len(),
            active = self.active.len(),
            "Retention worker shutting down"
        );
        let pending: Vec<_> = self.pending.drain().map(|(id, p)| (id, p.dir)).collect();
        let active: Vec<_> = self.active.drain().collect();
        for (job_id, dir) in pending.into_iter().chain(active) {
            delete(&job_id, &dir, "shutdown").await;
        }
    }

    async fn handle(&mut self, command: RetentionCommand) {
        match command {
            RetentionCommand::Track { job_id, dir } => {
                self.active.insert(job_id, dir);
            }
            RetentionCommand::Schedule {
                job_id,
                dir,
                policy,
            } => {
                self.active.remove(&job_id);
                match policy {
                    RetentionPolicy::Immediate => {
                        self.pending.remove(&job_id);
                        delete(&job_id, &dir, "immediate").await;
                    }
                    RetentionPolicy::DeliveryOrDeadline(delay) => {
                        tracing::debug!(
                            job_id = %job_id,
                            delay_secs = delay.as_secs(),
                            "Artifact retained until delivery"
                        );
                        self.pending.insert(
                            job_id,
                            Pending {
                                dir,
                                deadline: Instant::now() + delay,
                            },
                        );
                    }
                }
            }
            RetentionCommand::Confirm { job_id } => match self.pending.remove(&job_id) {
                Some(pending) => {
                    delete(&job_id, &pending.dir, "delivered").await;
                }
                None => tracing::debug!(job_id = %job_id, "Delivery confirmed after cleanup"),
            },
            RetentionCommand::Flush(reply) => {
                let _ = reply.send(());
            }
        }
    }

    async fn expire(&mut self) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for job_id in expired {
            if let Some(pending) = self.pending.remove(&job_id) {
                tracing::info!(job_id = %job_id, "Artifact not delivered before deadline");
                delete(&job_id, &pending.dir, "deadline").await;
            }
        }
    }

    /// Remove stale directories under the staging root that no live job owns.
    async fn sweep(&mut self) {
        let mut entries = match tokio::fs::read_dir(&self.staging_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                tracing::warn!(
                    staging_root = %self.staging_root.display(),
                    error = %e,
                    "Failed to read staging root"
                );
                return;
            }
        };

        let mut removed = 0usize;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to list staging root");
                    break;
                }
            };
            let job_id = entry.file_name().to_string_lossy().to_string();
            if self.active.contains_key(&job_id) || self.pending.contains_key(&job_id) {
                continue;
            }
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_dir() {
                continue;
            }
            let age = meta
                .modified()
                .ok()
                .and_then(|m| SystemTime::now().duration_since(m).ok())
                .unwrap_or_default();
            if age >= self.max_age && delete(&job_id, &entry.path(), "sweep").await {
                SWEEP_REMOVALS.inc();
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!(removed, "Swept stale job directories");
        }
    }
}

/// Remove a job directory. A directory that is already gone counts as removed.
async fn delete(job_id: &str, dir: &Path, trigger: &str) -> bool {
    let ok = match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            tracing::warn!(
                job_id = %job_id,
                path = %dir.display(),
                trigger,
                error = %e,
                "Failed to remove job directory"
            );
            false
        }
    };
    if ok {
        tracing::debug!(job_id = %job_id, trigger, "Removed job directory");
    }
    RETENTION_DELETIONS
        .with_label_values(&[trigger, if ok { "ok" } else { "error" }])
        .inc();
    ok
}

/// Create the retention system.
///
/// Returns the handle to share with the orchestrator and the worker to spawn
/// with `tokio::spawn(worker.run())`.
pub fn create_retention_system(
    config: &RetentionConfig,
    staging_root: PathBuf,
) -> (RetentionHandle, RetentionWorker) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = RetentionHandle::new(tx);
    let worker = RetentionWorker::new(rx, staging_root, config.sweep_interval(), config.max_age());
    (handle, worker)
}
