use crate::models::FileMetadata;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    /// The provider answered with a non-success status.
    #[error("provider returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ProviderError {
    /// HTTP status reported by the provider, if it got that far.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Status { status, .. } => Some(*status),
            ProviderError::Transport(e) => e.status().map(|s| s.as_u16()),
        }
    }
}

/// Response body of a content or export request, streamed as it arrives.
pub struct ContentStream {
    pub content_type: Option<String>,
    pub body: BoxStream<'static, Result<Bytes, ProviderError>>,
}

#[async_trait]
pub trait DriveProvider: Send + Sync {
    /// Provider identifier, also used as the progress topic namespace.
    fn provider_id(&self) -> &'static str;

    /// Get metadata for a single file
    async fn get_metadata(
        &self, access_token: &str, file_id: &str,
    ) -> Result<FileMetadata, ProviderError>;

    /// Download the raw bytes of a regular file
    async fn get_content(
        &self, access_token: &str, file_id: &str,
    ) -> Result<ContentStream, ProviderError>;

    /// Export a provider-native document to the given MIME type
    async fn get_export(
        &self, access_token: &str, file_id: &str, mime_type: &str,
    ) -> Result<ContentStream, ProviderError>;
}

pub mod google_drive;
