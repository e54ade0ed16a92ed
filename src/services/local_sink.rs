use crate::services::cloud_providers::ProviderError;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

#[derive(Error, Debug)]
pub enum SinkError {
    /// The content stream broke off before its end.
    #[error("content stream failed: {0}")]
    Source(#[from] ProviderError),

    #[error("local write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A fully written and flushed local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub bytes_written: u64,
}

/// Durable file sink a content stream is drained into.
pub struct LocalSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl LocalSink {
    /// Creates (or truncates) the file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).await?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes every chunk of `source` as it arrives, then flushes and syncs.
    ///
    /// Each chunk is written before the next one is polled, so a slow disk
    /// holds back the network read. Consuming the sink means completion is
    /// reported once. On failure the partial file is removed.
    pub async fn drain<S>(mut self, mut source: S) -> Result<WrittenFile, SinkError>
    where
        S: Stream<Item = Result<Bytes, ProviderError>> + Unpin,
    {
        let mut bytes_written = 0u64;
        let result = async {
            while let Some(chunk) = source.next().await {
                let chunk = chunk?;
                self.writer.write_all(&chunk).await?;
                bytes_written += chunk.len() as u64;
            }
            self.writer.flush().await?;
            self.writer.get_ref().sync_all().await?;
            Ok::<(), SinkError>(())
        }
        .await;

        match result {
            Ok(()) => {
                tracing::debug!("Wrote {} bytes to {}", bytes_written, self.path.display());
                Ok(WrittenFile {
                    path: self.path,
                    bytes_written,
                })
            }
            Err(e) => {
                drop(self.writer);
                if let Err(remove_err) = tokio::fs::remove_file(&self.path).await {
                    tracing::warn!(
                        "Failed to remove partial file {}: {}",
                        self.path.display(),
                        remove_err
                    );
                }
                Err(e)
            }
        }
    }
}
