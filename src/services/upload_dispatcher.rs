use crate::models::{ProgressEvent, Protocol, TransferOptions, TransferToken};
use crate::services::progress_channel::ProgressChannel;
use crate::services::resumable::{ProgressFn, ResumableUpload, ResumableUploader};
use crate::services::storage::LocalStorage;
use crate::services::transfer_identity;
use reqwest::{Client, header};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("failed to read local file: {0}")]
    LocalRead(#[from] std::io::Error),
}

/// How a finished local file was handed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No destination requested; the file stays in local storage.
    StoredLocally,
    /// The destination accepted the single-shot POST.
    Delivered { status: u16 },
    /// The destination answered with a non-2xx status.
    Rejected { status: u16 },
    /// The destination could not be reached.
    Unreachable { reason: String },
    /// A resumable upload was started in the background.
    Started { token: TransferToken },
}

pub struct UploadDispatcher {
    http: Client,
    uploader: Arc<dyn ResumableUploader>,
    progress: Arc<ProgressChannel>,
    storage: LocalStorage,
    delete_after_upload: bool,
}

impl UploadDispatcher {
    pub fn new(
        http: Client,
        uploader: Arc<dyn ResumableUploader>,
        progress: Arc<ProgressChannel>,
        storage: LocalStorage,
        delete_after_upload: bool,
    ) -> Self {
        Self {
            http,
            uploader,
            progress,
            storage,
            delete_after_upload,
        }
    }

    /// Sends the finished file at `local_path` wherever `options` say.
    /// `namespace` prefixes the progress topic of a resumable upload.
    pub async fn dispatch(
        &self,
        local_path: &Path,
        options: &TransferOptions,
        namespace: &str,
    ) -> Result<DispatchOutcome, DispatchError> {
        let Some(destination) = options.destination.as_ref() else {
            return Ok(DispatchOutcome::StoredLocally);
        };

        match options.protocol.unwrap_or(Protocol::Http) {
            Protocol::Http => self.post_file(local_path, destination).await,
            Protocol::Tus => self.start_resumable(local_path, destination, namespace).await,
        }
    }

    async fn post_file(
        &self,
        local_path: &Path,
        destination: &Url,
    ) -> Result<DispatchOutcome, DispatchError> {
        let data = tokio::fs::read(local_path).await?;
        let length = data.len();

        let response = self
            .http
            .post(destination.clone())
            .header(header::CONTENT_TYPE, mime::APPLICATION_OCTET_STREAM.as_ref())
            .header(header::CONTENT_LENGTH, length)
            .body(data)
            .send()
            .await;

        let outcome = match response {
            Ok(response) if response.status().is_success() => {
                tracing::info!(
                    "Transfer to {} was successful ({} bytes, status {})",
                    destination,
                    length,
                    response.status()
                );
                DispatchOutcome::Delivered {
                    status: response.status().as_u16(),
                }
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                tracing::warn!(
                    "Destination {} rejected transfer with status {}: {}",
                    destination,
                    status,
                    body
                );
                DispatchOutcome::Rejected {
                    status: status.as_u16(),
                }
            }
            Err(e) => {
                tracing::warn!("Problem with request to {}: {}", destination, e);
                DispatchOutcome::Unreachable {
                    reason: e.to_string(),
                }
            }
        };

        if matches!(outcome, DispatchOutcome::Delivered { .. }) && self.delete_after_upload {
            self.release(local_path).await;
        }
        Ok(outcome)
    }

    async fn start_resumable(
        &self,
        local_path: &Path,
        destination: &Url,
        namespace: &str,
    ) -> Result<DispatchOutcome, DispatchError> {
        let size = tokio::fs::metadata(local_path).await?.len();
        let filename = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let token = transfer_identity::generate();
        let topic = token.topic(namespace);
        self.progress.open(&topic);
        tracing::info!(
            "Starting resumable upload of {} to {} as {}",
            filename,
            destination,
            token
        );

        let request = ResumableUpload {
            endpoint: destination.clone(),
            path: local_path.to_path_buf(),
            size,
            filename,
            resume: true,
        };

        let on_progress: ProgressFn = {
            let progress = self.progress.clone();
            let topic = topic.clone();
            Arc::new(move |uploaded: u64, total: u64| {
                let event = ProgressEvent::progress(uploaded, total);
                if let ProgressEvent::Progress { percentage, .. } = &event {
                    tracing::debug!("{} {} {} {:.2}%", topic, uploaded, total, percentage);
                }
                progress.publish(&topic, event);
            })
        };

        let uploader = self.uploader.clone();
        let progress = self.progress.clone();
        let cleanup = self
            .delete_after_upload
            .then(|| (self.storage.clone(), local_path.to_path_buf()));

        // The upload outlives the request that started it.
        tokio::spawn(async move {
            match uploader.upload(request, on_progress).await {
                Ok(url) => {
                    tracing::info!("Upload finished: {}", url);
                    progress.publish(&topic, ProgressEvent::Complete);
                    if let Some((storage, path)) = cleanup {
                        release_with(&storage, &path).await;
                    }
                }
                Err(e) => {
                    tracing::error!("Resumable upload for {} failed: {}", topic, e);
                    progress.publish(
                        &topic,
                        ProgressEvent::Error {
                            message: e.to_string(),
                        },
                    );
                }
            }
        });

        Ok(DispatchOutcome::Started { token })
    }

    async fn release(&self, path: &Path) {
        release_with(&self.storage, path).await;
    }
}

async fn release_with(storage: &LocalStorage, path: &Path) {
    if let Err(e) = storage.release(path).await {
        tracing::warn!("Failed to remove uploaded file {}: {}", path.display(), e);
    }
}
