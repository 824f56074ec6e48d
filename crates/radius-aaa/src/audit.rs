//! Authentication audit trail
//!
//! Records one [`AuthLog`] per Access-Request. The pipelines hand entries to
//! a bounded queue and move on; a single worker task writes them to the
//! session store and, optionally, to a JSON-lines file. A full queue drops
//! the entry with a warning rather than stalling authentication.

use crate::models::{AuthLog, AuthResult};
use crate::store::SessionStore;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

/// Which attempts are written to the auth log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthLogLevel {
    #[default]
    All,
    Success,
    #[serde(alias = "error")]
    Failure,
    None,
}

impl AuthLogLevel {
    pub fn admits(self, result: AuthResult) -> bool {
        match self {
            AuthLogLevel::All => true,
            AuthLogLevel::Success => result == AuthResult::Success,
            AuthLogLevel::Failure => result == AuthResult::Failure,
            AuthLogLevel::None => false,
        }
    }
}

enum AuditCommand {
    Record(AuthLog),
    Flush(oneshot::Sender<()>),
}

/// Handle to the audit worker. Cheap to clone.
#[derive(Clone)]
pub struct AuditLogger {
    level: AuthLogLevel,
    tx: mpsc::Sender<AuditCommand>,
}

impl AuditLogger {
    /// Start the worker. Must be called inside a tokio runtime.
    pub fn spawn(
        store: Arc<dyn SessionStore>,
        level: AuthLogLevel,
        file_path: Option<&Path>,
        capacity: usize,
    ) -> std::io::Result<Self> {
        let file = match file_path {
            Some(path) => Some(OpenOptions::new().create(true).append(true).open(path)?),
            None => None,
        };

        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(run_worker(rx, store, file));
        Ok(AuditLogger { level, tx })
    }

    pub fn level(&self) -> AuthLogLevel {
        self.level
    }

    /// Queue `entry` if the configured level admits it.
    pub fn log(&self, entry: AuthLog) {
        if !self.level.admits(entry.result) {
            return;
        }
        match self.tx.try_send(AuditCommand::Record(entry)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(AuditCommand::Record(entry))) => {
                warn!(username = %entry.username, "Auth log queue full, dropping entry");
            }
            Err(_) => error!("Auth log worker has stopped"),
        }
    }

    /// Wait until everything queued before this call has been written.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(AuditCommand::Flush(done)).await.is_err() {
            return;
        }
        let _ = wait.await;
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<AuditCommand>,
    store: Arc<dyn SessionStore>,
    mut file: Option<File>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            AuditCommand::Record(entry) => {
                if let Err(e) = store.insert_auth_log(&entry).await {
                    error!(username = %entry.username, error = %e, "Failed to store auth log");
                }
                if let Some(ref mut f) = file {
                    match serde_json::to_string(&entry) {
                        Ok(json) => {
                            if let Err(e) = writeln!(f, "{}", json) {
                                error!(error = %e, "Failed to write auth log file");
                            }
                        }
                        Err(e) => error!(error = %e, "Failed to serialize auth log"),
                    }
                }
            }
            AuditCommand::Flush(done) => {
                if let Some(ref mut f) = file {
                    if let Err(e) = f.flush() {
                        error!(error = %e, "Failed to flush auth log file");
                    }
                }
                let _ = done.send(());
            }
        }
    }
    debug!("Auth log worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::fs;
    use tempfile::NamedTempFile;

    #[test]
    fn test_level_filter() {
        assert!(AuthLogLevel::All.admits(AuthResult::Failure));
        assert!(AuthLogLevel::Failure.admits(AuthResult::Failure));
        assert!(!AuthLogLevel::Failure.admits(AuthResult::Success));
        assert!(!AuthLogLevel::None.admits(AuthResult::Success));

        let level: AuthLogLevel = serde_json::from_str(r#""error""#).unwrap();
        assert_eq!(level, AuthLogLevel::Failure);
        let level: AuthLogLevel = serde_json::from_str(r#""none""#).unwrap();
        assert_eq!(level, AuthLogLevel::None);
    }

    #[tokio::test]
    async fn test_entries_reach_store_and_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let logger =
            AuditLogger::spawn(store.clone(), AuthLogLevel::All, Some(temp_file.path()), 16).unwrap();

        logger.log(AuthLog::success("alice", "10.0.0.1", 4));
        logger.log(AuthLog::failure("bob", "10.0.0.1", "user:bob not exists", 2));
        logger.flush().await;

        let logs = store.auth_logs().await;
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].reason, "user:bob not exists");

        let contents = fs::read_to_string(temp_file.path()).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains(r#""result":"failure""#));
    }

    #[tokio::test]
    async fn test_failures_only() {
        let store = Arc::new(MemoryStore::new());
        let logger = AuditLogger::spawn(store.clone(), AuthLogLevel::Failure, None, 16).unwrap();

        logger.log(AuthLog::success("alice", "10.0.0.1", 4));
        logger.log(AuthLog::failure("alice", "10.0.0.1", "bad password", 4));
        logger.flush().await;

        let logs = store.auth_logs().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].result, AuthResult::Failure);
    }
}
