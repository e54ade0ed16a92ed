use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use dashmap::DashMap;
use reqwest::{Body, Client, StatusCode, header};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, UNIX_EPOCH};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use url::Url;

const TUS_VERSION: &str = "1.0.0";
const OFFSET_CONTENT_TYPE: &str = "application/offset+octet-stream";

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("upload request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("reading local file failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected status {status} during {stage}")]
    UnexpectedStatus { stage: &'static str, status: u16 },

    #[error("server response missing or invalid {0} header")]
    InvalidHeader(&'static str),

    #[error("server did not advance the upload offset past {0}")]
    Stalled(u64),
}

/// Progress callback, invoked with `(bytes_uploaded, bytes_total)`.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// One file to push to a resumable-upload endpoint.
#[derive(Debug, Clone)]
pub struct ResumableUpload {
    pub endpoint: Url,
    pub path: PathBuf,
    pub size: u64,
    pub filename: String,
    /// Continue a previously interrupted upload of the same file if known.
    pub resume: bool,
}

impl ResumableUpload {
    /// Identifies this exact local file at this endpoint. The path is unique
    /// per transfer and the modification time changes if the file is
    /// rewritten, so another file with the same name and size never matches.
    async fn fingerprint(&self) -> Result<String, UploadError> {
        let modified = tokio::fs::metadata(&self.path)
            .await?
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        Ok(fingerprint_key(&self.path, self.size, modified, &self.endpoint))
    }
}

fn fingerprint_key(path: &Path, size: u64, modified_nanos: u128, endpoint: &Url) -> String {
    format!(
        "tus::{}::{}::{}::{}",
        path.display(),
        size,
        modified_nanos,
        endpoint
    )
}

struct Session {
    upload_url: Url,
    touched: Instant,
}

#[async_trait]
pub trait ResumableUploader: Send + Sync {
    /// Uploads the file to completion, returning the upload's URL.
    async fn upload(
        &self,
        request: ResumableUpload,
        on_progress: ProgressFn,
    ) -> Result<Url, UploadError>;

    /// Forgets resumable sessions idle for longer than `max_age`. Returns how
    /// many were dropped.
    fn purge_expired(&self, _max_age: Duration) -> usize {
        0
    }
}

/// tus 1.0.0 client (core protocol plus the creation extension).
pub struct TusClient {
    http: Client,
    chunk_size: u64,
    sessions: DashMap<String, Session>,
}

impl TusClient {
    pub fn new(http: Client, chunk_size: u64) -> Self {
        Self {
            http,
            chunk_size: chunk_size.max(1),
            sessions: DashMap::new(),
        }
    }

    async fn create(&self, request: &ResumableUpload) -> Result<Url, UploadError> {
        let metadata = format!("filename {}", STANDARD.encode(request.filename.as_bytes()));
        let response = self
            .http
            .post(request.endpoint.clone())
            .header("Tus-Resumable", TUS_VERSION)
            .header("Upload-Length", request.size.to_string())
            .header("Upload-Metadata", metadata)
            .header(header::CONTENT_LENGTH, "0")
            .send()
            .await?;

        if response.status() != StatusCode::CREATED {
            return Err(UploadError::UnexpectedStatus {
                stage: "creation",
                status: response.status().as_u16(),
            });
        }

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(UploadError::InvalidHeader("Location"))?;
        request
            .endpoint
            .join(location)
            .map_err(|_| UploadError::InvalidHeader("Location"))
    }

    /// Asks the server how much of an existing upload it already holds.
    async fn current_offset(&self, upload_url: &Url) -> Result<u64, UploadError> {
        let response = self
            .http
            .head(upload_url.clone())
            .header("Tus-Resumable", TUS_VERSION)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UploadError::UnexpectedStatus {
                stage: "offset lookup",
                status: response.status().as_u16(),
            });
        }
        read_offset(response.headers())
    }

    async fn patch_chunk(
        &self,
        upload_url: &Url,
        request: &ResumableUpload,
        offset: u64,
    ) -> Result<u64, UploadError> {
        let length = self.chunk_size.min(request.size - offset);
        let mut file = tokio::fs::File::open(&request.path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        let body = Body::wrap_stream(ReaderStream::new(file.take(length)));

        let response = self
            .http
            .patch(upload_url.clone())
            .header("Tus-Resumable", TUS_VERSION)
            .header("Upload-Offset", offset.to_string())
            .header(header::CONTENT_TYPE, OFFSET_CONTENT_TYPE)
            .header(header::CONTENT_LENGTH, length.to_string())
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UploadError::UnexpectedStatus {
                stage: "chunk upload",
                status: response.status().as_u16(),
            });
        }

        let next = read_offset(response.headers())?;
        if next <= offset || next > request.size {
            return Err(UploadError::Stalled(offset));
        }
        Ok(next)
    }

    async fn resume_or_create(
        &self,
        request: &ResumableUpload,
        fingerprint: &str,
    ) -> Result<(Url, u64), UploadError> {
        let known = if request.resume {
            self.sessions
                .get(fingerprint)
                .map(|session| session.upload_url.clone())
        } else {
            None
        };

        if let Some(upload_url) = known {
            match self.current_offset(&upload_url).await {
                Ok(offset) if offset <= request.size => {
                    tracing::info!("Resuming upload {} at offset {}", upload_url, offset);
                    return Ok((upload_url, offset));
                }
                Ok(offset) => {
                    tracing::warn!(
                        "Server reports offset {} beyond size {} for {}, starting over",
                        offset,
                        request.size,
                        upload_url
                    );
                }
                Err(e) => {
                    tracing::debug!("Cannot resume {}: {}, starting over", upload_url, e);
                }
            }
            self.sessions.remove(fingerprint);
        }

        let upload_url = self.create(request).await?;
        tracing::debug!("Created upload {} for {}", upload_url, request.filename);
        if request.resume {
            self.sessions.insert(
                fingerprint.to_string(),
                Session {
                    upload_url: upload_url.clone(),
                    touched: Instant::now(),
                },
            );
        }
        Ok((upload_url, 0))
    }
}

fn read_offset(headers: &header::HeaderMap) -> Result<u64, UploadError> {
    headers
        .get("Upload-Offset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .ok_or(UploadError::InvalidHeader("Upload-Offset"))
}

#[async_trait]
impl ResumableUploader for TusClient {
    async fn upload(
        &self,
        request: ResumableUpload,
        on_progress: ProgressFn,
    ) -> Result<Url, UploadError> {
        let fingerprint = request.fingerprint().await?;
        let (upload_url, mut offset) = self.resume_or_create(&request, &fingerprint).await?;

        if offset > 0 {
            on_progress(offset, request.size);
        }

        while offset < request.size {
            offset = self.patch_chunk(&upload_url, &request, offset).await?;
            on_progress(offset, request.size);
        }

        self.sessions.remove(&fingerprint);
        Ok(upload_url)
    }

    fn purge_expired(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| now.duration_since(session.touched) < max_age);
        let purged = before.saturating_sub(self.sessions.len());
        if purged > 0 {
            tracing::debug!("Forgot {} stale resumable sessions", purged);
        }
        purged
    }
}
