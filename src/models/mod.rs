use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use url::Url;
use utoipa::ToSchema;

/// File information as reported by the content provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub title: String,
    pub mime_type: String,
}

/// Office format a provider-native document is exported to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSpec {
    pub mime_type: &'static str,
    pub extension: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tus,
    Http,
}

impl Protocol {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tus" => Some(Self::Tus),
            "http" => Some(Self::Http),
            _ => None,
        }
    }
}

/// Where the fetched file goes once it is on local disk.
/// `destination: None` keeps the file in local storage only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferOptions {
    pub destination: Option<Url>,
    pub protocol: Option<Protocol>,
}

/// Unguessable id correlating an asynchronous upload with its progress topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferToken(String);

impl TransferToken {
    pub(crate) fn new(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Progress topic name, `<namespace>:<token>`.
    pub fn topic(&self, namespace: &str) -> String {
        format!("{}:{}", namespace, self.0)
    }
}

impl fmt::Display for TransferToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Progress {
        bytes_uploaded: u64,
        bytes_total: u64,
        percentage: f64,
    },
    Complete,
    Error {
        message: String,
    },
}

impl ProgressEvent {
    /// Builds a progress tick, rounding the percentage to two decimals.
    pub fn progress(bytes_uploaded: u64, bytes_total: u64) -> Self {
        let percentage = if bytes_total == 0 {
            100.0
        } else {
            let raw = bytes_uploaded as f64 / bytes_total as f64 * 100.0;
            (raw * 100.0).round() / 100.0
        };
        Self::Progress {
            bytes_uploaded,
            bytes_total,
            percentage,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error { .. })
    }

    /// JSON payload delivered to subscribers.
    pub fn to_wire(&self) -> Value {
        match self {
            Self::Progress {
                bytes_uploaded,
                bytes_total,
                percentage,
            } => json!({
                "action": "progress",
                "payload": {
                    "progress": format!("{:.2}", percentage),
                    "bytesUploaded": bytes_uploaded,
                    "bytesTotal": bytes_total,
                }
            }),
            Self::Complete => json!({
                "action": "progress",
                "payload": { "complete": true }
            }),
            Self::Error { message } => json!({
                "action": "error",
                "payload": { "error": message }
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TokenBody {
    pub token: String,
}

/// The single outcome reported to the caller of a relay request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RelayResult {
    pub status_code: u16,
    pub status_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<TokenBody>,
}

impl RelayResult {
    pub fn new(status_code: u16, status_text: impl Into<String>) -> Self {
        Self {
            status_code,
            status_text: status_text.into(),
            body: None,
        }
    }

    pub fn with_token(mut self, token: &TransferToken) -> Self {
        self.body = Some(TokenBody {
            token: token.to_string(),
        });
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.body.as_ref().map(|b| b.token.as_str())
    }
}
