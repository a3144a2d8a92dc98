use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// When a job directory may be removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Remove now. Used for failed and abandoned jobs.
    Immediate,
    /// Remove on delivery confirmation or when the delay runs out, whichever
    /// comes first.
    DeliveryOrDeadline(Duration),
}

/// Messages consumed by the retention worker.
#[derive(Debug)]
pub enum RetentionCommand {
    /// A live job owns this directory; the sweep must leave it alone.
    Track { job_id: String, dir: PathBuf },
    /// Hand the directory over to a deletion policy.
    Schedule {
        job_id: String,
        dir: PathBuf,
        policy: RetentionPolicy,
    },
    /// The artifact was delivered.
    Confirm { job_id: String },
    /// Reply once every earlier command has been processed.
    Flush(oneshot::Sender<()>),
}

/// Handle for scheduling job directory cleanup.
///
/// Cheaply cloneable. Every method is synchronous so it can be called from
/// `Drop` implementations.
#[derive(Debug, Clone)]
pub struct RetentionHandle {
    tx: mpsc::UnboundedSender<RetentionCommand>,
}

impl RetentionHandle {
    pub fn new(tx: mpsc::UnboundedSender<RetentionCommand>) -> Self {
        Self { tx }
    }

    pub fn track(&self, job_id: &str, dir: PathBuf) {
        self.send(RetentionCommand::Track {
            job_id: job_id.to_string(),
            dir,
        });
    }

    /// Hand a directory to the worker.
    ///
    /// If the worker is gone the directory is removed inline, whatever the policy.
    pub fn schedule(&self, job_id: &str, dir: PathBuf, policy: RetentionPolicy) {
        let command = RetentionCommand::Schedule {
            job_id: job_id.to_string(),
            dir,
            policy,
        };
        if let Err(mpsc::error::SendError(command)) = self.tx.send(command) {
            tracing::warn!(job_id = %job_id, "Retention worker gone, cleaning up inline");
            if let RetentionCommand::Schedule { dir, .. } = command {
                if let Err(e) = std::fs::remove_dir_all(&dir) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(path = %dir.display(), error = %e, "Inline cleanup failed");
                    }
                }
            }
        }
    }

    pub fn confirm(&self, job_id: &str) {
        self.send(RetentionCommand::Confirm {
            job_id: job_id.to_string(),
        });
    }

    /// Wait until the worker has processed everything sent so far.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(RetentionCommand::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    fn send(&self, command: RetentionCommand) {
        if let Err(e) = self.tx.send(command) {
            tracing::warn!("Failed to send retention command: {:?}", e.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_commands_reach_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = RetentionHandle::new(tx);

        handle.track("j1", PathBuf::from("/tmp/j1"));
        handle.confirm("j1");

        assert!(matches!(
            rx.try_recv().unwrap(),
            RetentionCommand::Track { job_id, .. } if job_id == "j1"
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            RetentionCommand::Confirm { job_id } if job_id == "j1"
        ));
    }

    #[test]
    fn test_schedule_without_worker_deletes_inline() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let handle = RetentionHandle::new(tx);

        let dir = TempDir::new().unwrap();
        let job_dir = dir.path().join("job");
        std::fs::create_dir_all(job_dir.join("output")).unwrap();
        std::fs::write(job_dir.join("output/a.pdf"), b"x").unwrap();

        handle.schedule("job", job_dir.clone(), RetentionPolicy::Immediate);
        assert!(!job_dir.exists());
    }

    #[tokio::test]
    async fn test_flush_without_worker_returns() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        RetentionHandle::new(tx).flush().await;
    }
}
