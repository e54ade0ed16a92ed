use crate::services::storage::LocalStorage;
use anyhow::Result;
use std::time::{Duration, SystemTime};

/// Age-based retention for the local data directory.
pub struct StorageLifecycleService;

impl StorageLifecycleService {
    /// Removes transfer entries last modified more than `max_age` ago.
    ///
    /// Returns the number of entries removed. Entries that fail to delete are
    /// logged and skipped so one bad path does not block the sweep.
    pub async fn purge_stale(storage: &LocalStorage, max_age: Duration) -> Result<usize> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        Self::purge_modified_before(storage, cutoff).await
    }

    pub async fn purge_modified_before(
        storage: &LocalStorage,
        cutoff: SystemTime,
    ) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(storage.root()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!("Cannot stat {}: {}", entry.path().display(), e);
                    continue;
                }
            };
            let modified = metadata.modified().unwrap_or(SystemTime::now());
            if modified >= cutoff {
                continue;
            }

            let path = entry.path();
            let result = if metadata.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            match result {
                Ok(()) => {
                    tracing::debug!("Removed stale transfer {}", path.display());
                    removed += 1;
                }
                Err(e) => tracing::error!("Failed to remove {}: {}", path.display(), e),
            }
        }

        if removed > 0 {
            tracing::info!("Removed {} stale transfers from local storage", removed);
        }
        Ok(removed)
    }
}
