//! Cleanup of rolled log files past their retention period.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::path::Path;
use tracing::{debug, warn};

use super::LOG_FILE_PREFIX;

/// Delete rolled log files in `log_dir` last modified more than `retention_days` ago.
///
/// Returns the number of files deleted.
pub async fn cleanup_old_logs(log_dir: impl AsRef<Path>, retention_days: u32) -> Result<usize> {
    let log_dir = log_dir.as_ref();
    if !log_dir.exists() {
        warn!(path = %log_dir.display(), "log directory does not exist");
        return Ok(0);
    }

    let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
    let mut deleted = 0;
    let mut entries = tokio::fs::read_dir(log_dir)
        .await
        .context("failed to read log directory")?;

    while let Some(entry) = entries.next_entry().await.context("failed to read directory entry")? {
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX));
        if !is_log {
            continue;
        }

        let modified: DateTime<Utc> = tokio::fs::metadata(&path)
            .await
            .and_then(|m| m.modified())
            .context("failed to read log file metadata")?
            .into();
        if modified < cutoff {
            tokio::fs::remove_file(&path)
                .await
                .with_context(|| format!("failed to delete {}", path.display()))?;
            debug!(path = %path.display(), "deleted expired log file");
            deleted += 1;
        }
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_only_log_files_are_considered() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("procflow.log.2026-01-01"), "old").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        // Zero days of retention expires every log file modified before now.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let deleted = cleanup_old_logs(dir.path(), 0).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(dir.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_missing_directory_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let deleted = cleanup_old_logs(dir.path().join("absent"), 30).await.unwrap();
        assert_eq!(deleted, 0);
    }
}
