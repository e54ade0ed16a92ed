use crate::config::RelayConfig;
use crate::services::storage::LocalStorage;
use anyhow::Context;
use tracing::info;

pub async fn setup_storage(config: &RelayConfig) -> anyhow::Result<LocalStorage> {
    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("cannot create data dir {}", config.data_dir.display()))?;

    info!("💾 Local storage: {}", config.data_dir.display());
    Ok(LocalStorage::new(config.data_dir.clone()))
}
