//! Per-attempt deployment logs
//!
//! One append-only text file per scope (service or project). Each
//! attempt clears its file first, then appends line by line so a
//! concurrent reader always sees live progress.

use std::path::PathBuf;

use tokio::io::AsyncWriteExt;

use crate::errors::Error;

/// Handle on the log directory
#[derive(Debug, Clone)]
pub struct BuildLogs {
    dir: PathBuf,
}

/// Scope key for one log stream
#[derive(Debug, Clone, Copy)]
pub enum LogScope<'a> {
    Service(&'a str),
    Project(&'a str),
}

impl LogScope<'_> {
    fn file_name(&self) -> String {
        match self {
            LogScope::Service(id) => format!("{}.build.log", id),
            LogScope::Project(id) => format!("{}.compose.log", id),
        }
    }
}

impl BuildLogs {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path(&self, scope: LogScope<'_>) -> PathBuf {
        self.dir.join(scope.file_name())
    }

    /// Truncate the log at the start of a new attempt
    pub async fn clear(&self, scope: LogScope<'_>) -> Result<(), Error> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.path(scope), b"").await?;
        Ok(())
    }

    /// Append one line; failures here never fail the deployment
    pub async fn append(&self, scope: LogScope<'_>, message: &str) {
        let result: Result<(), std::io::Error> = async {
            tokio::fs::create_dir_all(&self.dir).await?;
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.path(scope))
                .await?;
            file.write_all(message.as_bytes()).await?;
            file.write_all(b"\n").await?;
            Ok(())
        }
        .await;
        if let Err(e) = result {
            tracing::warn!("failed to append deploy log: {}", e);
        }
    }

    /// Full current text of the most recent attempt (empty when absent)
    pub async fn read(&self, scope: LogScope<'_>) -> Result<String, Error> {
        match tokio::fs::read_to_string(self.path(scope)).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }
}
