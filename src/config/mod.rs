use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for the relay service
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Directory receiving fetched files (default: "./data")
    pub data_dir: PathBuf,

    /// Bearer credential used when a request asks for demo mode
    pub demo_token: Option<String>,

    /// Base URL of the Drive API (default: Google Drive v2)
    pub drive_api_url: String,

    /// Chunk size for resumable uploads in bytes (default: 8 MB)
    pub tus_chunk_size: u64,

    /// How long an idle progress topic is retained, in seconds (default: 3600)
    pub progress_ttl_secs: u64,

    /// Age after which local transfer files are removed, in hours (default: 24)
    pub local_retention_hours: u64,

    /// Remove the local copy as soon as the destination accepted it (default: false)
    pub delete_after_upload: bool,

    /// Interval between background cleanup passes, in seconds (default: 600)
    pub cleanup_interval_secs: u64,

    /// Allowed CORS Origins (comma separated)
    pub allowed_origins: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            demo_token: None,
            drive_api_url: "https://www.googleapis.com/drive/v2".to_string(),
            tus_chunk_size: 8 * 1024 * 1024, // 8 MB
            progress_ttl_secs: 3600,
            local_retention_hours: 24,
            delete_after_upload: false,
            cleanup_interval_secs: 600,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(), // Vite default
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

impl RelayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            data_dir: env::var("RELAY_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.data_dir),

            demo_token: env::var("RELAY_DEMO_TOKEN")
                .ok()
                .filter(|v| !v.trim().is_empty()),

            drive_api_url: env::var("GOOGLE_DRIVE_API_URL").unwrap_or(default.drive_api_url),

            tus_chunk_size: env::var("TUS_CHUNK_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &u64| *v > 0)
                .unwrap_or(default.tus_chunk_size),

            progress_ttl_secs: env::var("PROGRESS_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.progress_ttl_secs),

            local_retention_hours: env::var("LOCAL_RETENTION_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.local_retention_hours),

            delete_after_upload: env::var("DELETE_AFTER_UPLOAD")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(default.delete_after_upload),

            cleanup_interval_secs: env::var("CLEANUP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &u64| *v > 0)
                .unwrap_or(default.cleanup_interval_secs),

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(default.allowed_origins),
        }
    }

    /// Create config for development (short retention, local data dir)
    pub fn development() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            demo_token: None,
            drive_api_url: "https://www.googleapis.com/drive/v2".to_string(),
            tus_chunk_size: 1024 * 1024,
            progress_ttl_secs: 600,
            local_retention_hours: 1,
            delete_after_upload: false,
            cleanup_interval_secs: 60,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(), // Vite default
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }

    pub fn progress_ttl(&self) -> Duration {
        Duration::from_secs(self.progress_ttl_secs)
    }

    pub fn local_retention(&self) -> Duration {
        Duration::from_secs(self.local_retention_hours * 3600)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}
