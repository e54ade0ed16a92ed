use crate::models::{ExportSpec, FileMetadata, Protocol, RelayResult, TransferOptions};
use crate::services::cloud_providers::{ContentStream, DriveProvider, ProviderError};
use crate::services::local_sink::{LocalSink, SinkError, WrittenFile};
use crate::services::storage::LocalStorage;
use crate::services::type_resolver;
use crate::services::upload_dispatcher::{DispatchError, DispatchOutcome, UploadDispatcher};
use reqwest::StatusCode;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

pub const LOCAL_STORAGE_TEXT: &str = "File written to uppy server local storage";
pub const DELIVERED_TEXT: &str = "File transferred to destination";
pub const UPLOAD_STARTED_TEXT: &str = "Upload started";

/// Caller input for one relay, as received.
#[derive(Debug, Clone, Default)]
pub struct RelayRequest {
    pub file_id: Option<String>,
    pub target: Option<String>,
    pub protocol: Option<String>,
}

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("An invalid fileId was provided")]
    InvalidFileId,

    #[error("An invalid target was provided")]
    InvalidTarget(String),

    #[error("An invalid protocol was provided")]
    InvalidProtocol(String),

    #[error("There was an error fetching the file information.")]
    MetadataFetchFailed(#[source] ProviderError),

    #[error("Uppy Server cannot export this type of file")]
    ExportUnsupported(String),

    #[error("There was an error fetching the file content.")]
    ContentFetchFailed(#[source] ProviderError),

    #[error("Failed to write file to local storage")]
    LocalWriteFailed(#[source] std::io::Error),

    #[error("Failed to read file from local storage")]
    LocalReadFailed(#[source] std::io::Error),
}

impl RelayError {
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::InvalidFileId
            | RelayError::InvalidTarget(_)
            | RelayError::InvalidProtocol(_) => 400,
            RelayError::ContentFetchFailed(e) => e.status().unwrap_or(500),
            RelayError::MetadataFetchFailed(_)
            | RelayError::ExportUnsupported(_)
            | RelayError::LocalWriteFailed(_)
            | RelayError::LocalReadFailed(_) => 500,
        }
    }

    /// Text reported to the caller. Content failures carry the provider's
    /// own status reason when there is one.
    pub fn status_text(&self) -> String {
        match self {
            RelayError::ContentFetchFailed(e) => e
                .status()
                .and_then(|s| StatusCode::from_u16(s).ok())
                .and_then(|s| s.canonical_reason())
                .map(str::to_string)
                .unwrap_or_else(|| self.to_string()),
            _ => self.to_string(),
        }
    }
}

impl From<RelayError> for RelayResult {
    fn from(error: RelayError) -> Self {
        RelayResult::new(error.status_code(), error.status_text())
    }
}

/// Progress of one relay through its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayStage {
    Idle,
    FetchingMetadata,
    ExportingContent,
    FetchingPlainContent,
    Writing,
    Dispatching,
    Done,
}

impl fmt::Display for RelayStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelayStage::Idle => "idle",
            RelayStage::FetchingMetadata => "fetching_metadata",
            RelayStage::ExportingContent => "exporting_content",
            RelayStage::FetchingPlainContent => "fetching_plain_content",
            RelayStage::Writing => "writing",
            RelayStage::Dispatching => "dispatching",
            RelayStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// How the file's bytes are obtained, decided from its metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentPlan {
    Export(ExportSpec),
    Plain,
}

impl ContentPlan {
    fn for_metadata(metadata: &FileMetadata) -> Result<Self, RelayError> {
        if !type_resolver::is_export_required(metadata) {
            return Ok(ContentPlan::Plain);
        }
        type_resolver::resolve_export(&metadata.mime_type)
            .map(ContentPlan::Export)
            .ok_or_else(|| RelayError::ExportUnsupported(metadata.mime_type.clone()))
    }

    fn stage(&self) -> RelayStage {
        match self {
            ContentPlan::Export(_) => RelayStage::ExportingContent,
            ContentPlan::Plain => RelayStage::FetchingPlainContent,
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            ContentPlan::Export(spec) => spec.extension,
            ContentPlan::Plain => "",
        }
    }
}

/// Drives one file from the provider, through local storage, to its
/// destination.
pub struct RelayService {
    provider: Arc<dyn DriveProvider>,
    storage: LocalStorage,
    dispatcher: UploadDispatcher,
}

impl RelayService {
    pub fn new(
        provider: Arc<dyn DriveProvider>,
        storage: LocalStorage,
        dispatcher: UploadDispatcher,
    ) -> Self {
        Self {
            provider,
            storage,
            dispatcher,
        }
    }

    pub fn namespace(&self) -> &'static str {
        self.provider.provider_id()
    }

    /// Runs the whole pipeline and reports exactly one result. For resumable
    /// uploads the result only acknowledges the start; the outcome is
    /// published on the progress channel.
    pub async fn fetch_and_relay(&self, credential: &str, request: RelayRequest) -> RelayResult {
        let file_id = request.file_id.clone().unwrap_or_default();
        let mut stage = RelayStage::Idle;

        match self.run(credential, request, &mut stage).await {
            Ok(result) => result,
            Err(e) => {
                match &e {
                    RelayError::InvalidFileId
                    | RelayError::InvalidTarget(_)
                    | RelayError::InvalidProtocol(_) => {
                        tracing::warn!("Rejected relay request for '{}': {:?}", file_id, e);
                    }
                    _ => {
                        tracing::error!(
                            "Relay of {} failed during {}: {:?}",
                            file_id,
                            stage,
                            e
                        );
                    }
                }
                e.into()
            }
        }
    }

    async fn run(
        &self,
        credential: &str,
        request: RelayRequest,
        stage: &mut RelayStage,
    ) -> Result<RelayResult, RelayError> {
        let file_id = request
            .file_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(RelayError::InvalidFileId)?;
        let options = parse_options(request.target.as_deref(), request.protocol.as_deref())?;

        *stage = RelayStage::FetchingMetadata;
        let metadata = self
            .provider
            .get_metadata(credential, file_id)
            .await
            .map_err(RelayError::MetadataFetchFailed)?;
        tracing::debug!("{} is '{}' ({})", file_id, metadata.title, metadata.mime_type);

        let plan = ContentPlan::for_metadata(&metadata)?;
        *stage = plan.stage();
        let content = self.open_content(credential, file_id, plan).await?;

        *stage = RelayStage::Writing;
        let written = self.write_local(&metadata, plan, content).await?;

        *stage = RelayStage::Dispatching;
        let outcome = self
            .dispatcher
            .dispatch(&written.path, &options, self.namespace())
            .await
            .map_err(|e| match e {
                DispatchError::LocalRead(io) => RelayError::LocalReadFailed(io),
            })?;

        *stage = RelayStage::Done;
        Ok(match outcome {
            DispatchOutcome::StoredLocally => RelayResult::new(200, LOCAL_STORAGE_TEXT),
            DispatchOutcome::Delivered { .. } => RelayResult::new(200, DELIVERED_TEXT),
            DispatchOutcome::Rejected { status } => {
                tracing::warn!(
                    "{} kept in local storage, destination answered {}",
                    written.path.display(),
                    status
                );
                RelayResult::new(200, LOCAL_STORAGE_TEXT)
            }
            DispatchOutcome::Unreachable { reason } => {
                tracing::warn!(
                    "{} kept in local storage, destination unreachable: {}",
                    written.path.display(),
                    reason
                );
                RelayResult::new(200, LOCAL_STORAGE_TEXT)
            }
            DispatchOutcome::Started { token } => {
                RelayResult::new(200, UPLOAD_STARTED_TEXT).with_token(&token)
            }
        })
    }

    async fn open_content(
        &self,
        credential: &str,
        file_id: &str,
        plan: ContentPlan,
    ) -> Result<ContentStream, RelayError> {
        let content = match plan {
            ContentPlan::Export(spec) => {
                self.provider
                    .get_export(credential, file_id, spec.mime_type)
                    .await
            }
            ContentPlan::Plain => self.provider.get_content(credential, file_id).await,
        };
        content.map_err(RelayError::ContentFetchFailed)
    }

    async fn write_local(
        &self,
        metadata: &FileMetadata,
        plan: ContentPlan,
        content: ContentStream,
    ) -> Result<WrittenFile, RelayError> {
        let path = self
            .storage
            .allocate(&metadata.title, plan.extension())
            .await
            .map_err(RelayError::LocalWriteFailed)?;

        match plan {
            ContentPlan::Export(spec) => tracing::info!(
                "Saving exported file with content-type `{}` as export mimeType `{}` to `{}`",
                content.content_type.as_deref().unwrap_or("unknown"),
                spec.mime_type,
                path.display()
            ),
            ContentPlan::Plain => tracing::info!(
                "Saving regular file with content-type `{}` to `{}`",
                content.content_type.as_deref().unwrap_or("unknown"),
                path.display()
            ),
        }

        let result = match LocalSink::open(&path).await {
            Ok(sink) => sink.drain(content.body).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(written) => Ok(written),
            Err(e) => {
                if let Err(cleanup) = self.storage.release(&path).await {
                    tracing::warn!("Failed to clean up {}: {}", path.display(), cleanup);
                }
                Err(match e {
                    SinkError::Source(provider) => RelayError::ContentFetchFailed(provider),
                    SinkError::Io(io) => RelayError::LocalWriteFailed(io),
                })
            }
        }
    }
}

fn parse_options(
    target: Option<&str>,
    protocol: Option<&str>,
) -> Result<TransferOptions, RelayError> {
    let destination = match target.map(str::trim).filter(|t| !t.is_empty()) {
        None => None,
        Some(raw) => {
            let url = Url::parse(raw).map_err(|_| RelayError::InvalidTarget(raw.to_string()))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(RelayError::InvalidTarget(raw.to_string()));
            }
            Some(url)
        }
    };

    let protocol = match protocol.map(str::trim).filter(|p| !p.is_empty()) {
        None => None,
        Some(raw) => Some(
            Protocol::parse(raw).ok_or_else(|| RelayError::InvalidProtocol(raw.to_string()))?,
        ),
    };

    Ok(TransferOptions {
        destination,
        protocol,
    })
}
