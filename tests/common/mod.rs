#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use drive_relay::models::FileMetadata;
use drive_relay::services::cloud_providers::{ContentStream, DriveProvider, ProviderError};
use drive_relay::services::resumable::{ProgressFn, ResumableUpload, ResumableUploader, UploadError};
use futures::StreamExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;
use url::Url;

pub const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// In-memory provider serving a fixed set of files.
#[derive(Default)]
pub struct MockProvider {
    files: HashMap<String, (FileMetadata, Vec<u8>)>,
    pub content_status: Option<u16>,
    pub metadata_calls: AtomicUsize,
    pub content_calls: AtomicUsize,
    pub exports: Mutex<Vec<String>>,
    pub credentials: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, id: &str, title: &str, mime_type: &str, content: &[u8]) -> Self {
        self.files.insert(
            id.to_string(),
            (
                FileMetadata {
                    title: title.to_string(),
                    mime_type: mime_type.to_string(),
                },
                content.to_vec(),
            ),
        );
        self
    }

    pub fn failing_content(mut self, status: u16) -> Self {
        self.content_status = Some(status);
        self
    }

    fn stream(&self, file_id: &str) -> Result<ContentStream, ProviderError> {
        if let Some(status) = self.content_status {
            return Err(ProviderError::Status {
                status,
                message: "content unavailable".to_string(),
            });
        }
        let (_, content) = self.files.get(file_id).ok_or_else(|| ProviderError::Status {
            status: 404,
            message: "File not found".to_string(),
        })?;

        // Hand the body over in small pieces, like a network response.
        let chunks: Vec<Result<Bytes, ProviderError>> = content
            .chunks(3)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(ContentStream {
            content_type: Some("application/octet-stream".to_string()),
            body: futures::stream::iter(chunks).boxed(),
        })
    }
}

#[async_trait]
impl DriveProvider for MockProvider {
    fn provider_id(&self) -> &'static str {
        "google"
    }

    async fn get_metadata(
        &self, access_token: &str, file_id: &str,
    ) -> Result<FileMetadata, ProviderError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.credentials.lock().unwrap().push(access_token.to_string());
        self.files
            .get(file_id)
            .map(|(meta, _)| meta.clone())
            .ok_or_else(|| ProviderError::Status {
                status: 404,
                message: "File not found".to_string(),
            })
    }

    async fn get_content(
        &self, _access_token: &str, file_id: &str,
    ) -> Result<ContentStream, ProviderError> {
        self.content_calls.fetch_add(1, Ordering::SeqCst);
        self.stream(file_id)
    }

    async fn get_export(
        &self, _access_token: &str, file_id: &str, mime_type: &str,
    ) -> Result<ContentStream, ProviderError> {
        self.exports.lock().unwrap().push(mime_type.to_string());
        self.stream(file_id)
    }
}

/// Resumable uploader that reports half and full progress once released.
pub struct FakeUploader {
    gate: Semaphore,
    fail: bool,
    pub requests: Mutex<Vec<ResumableUpload>>,
}

impl FakeUploader {
    /// Starts uploads immediately.
    pub fn open() -> Self {
        Self {
            gate: Semaphore::new(Semaphore::MAX_PERMITS),
            fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Holds every upload until `release` is called.
    pub fn gated() -> Self {
        Self {
            gate: Semaphore::new(0),
            fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::open()
        }
    }

    pub fn release(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl ResumableUploader for FakeUploader {
    async fn upload(
        &self,
        request: ResumableUpload,
        on_progress: ProgressFn,
    ) -> Result<Url, UploadError> {
        self.requests.lock().unwrap().push(request.clone());
        let _permit = self.gate.acquire().await.expect("gate closed");

        if self.fail {
            return Err(UploadError::UnexpectedStatus {
                stage: "creation",
                status: 500,
            });
        }

        on_progress(request.size / 2, request.size);
        on_progress(request.size, request.size);
        Ok(request.endpoint.join("uploads/1").expect("valid url"))
    }
}

/// Every regular file below the data directory.
pub fn stored_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let Ok(entries) = std::fs::read_dir(root) else {
        return files;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            files.extend(stored_files(&path));
        } else {
            files.push(path);
        }
    }
    files
}
