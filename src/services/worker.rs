use crate::services::progress_channel::ProgressChannel;
use crate::services::resumable::ResumableUploader;
use crate::services::storage::LocalStorage;
use crate::services::storage_lifecycle::StorageLifecycleService;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

pub struct BackgroundWorker {
    storage: LocalStorage,
    progress: Arc<ProgressChannel>,
    uploader: Arc<dyn ResumableUploader>,
    retention: Duration,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl BackgroundWorker {
    pub fn new(
        storage: LocalStorage,
        progress: Arc<ProgressChannel>,
        uploader: Arc<dyn ResumableUploader>,
        retention: Duration,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            storage,
            progress,
            uploader,
            retention,
            interval,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Background worker started");

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Background worker shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    self.perform_cleanup().await;
                }
            }
        }
    }

    pub async fn perform_cleanup(&self) {
        tracing::debug!("🧹 Running background cleanup tasks...");

        // 1. Local transfers past retention
        if let Err(e) = StorageLifecycleService::purge_stale(&self.storage, self.retention).await {
            tracing::error!("Local storage cleanup failed: {}", e);
        }

        // 2. Idle progress topics
        self.progress.purge_expired();

        // 3. Resumable sessions whose local file has aged out
        self.uploader.purge_expired(self.retention);
    }
}
