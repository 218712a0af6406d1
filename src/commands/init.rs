//! Init command implementation

use crate::blob::{BlobStore, LocalBlobStore};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::MetaDb;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Base directory (defaults to ~/.leadpipe)
    pub base_dir: Option<PathBuf>,
    /// Overwrite an existing config file
    pub force: bool,
}

/// Initialize leadpipe configuration, blob root and database
pub async fn cmd_init(options: InitOptions) -> Result<Config> {
    let mut config = Config::default();
    config.init_paths(options.base_dir);

    if config.paths.config_file.exists() && !options.force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config.paths.config_file.display()
        )));
    }

    info!("Initializing leadpipe in {:?}", config.paths.base_dir);

    std::fs::create_dir_all(&config.paths.base_dir)?;
    std::fs::create_dir_all(&config.paths.blob_root)?;
    config.save()?;

    let db = MetaDb::connect(&config).await?;
    db.init_schema().await?;

    Ok(config)
}

/// Open the metadata database, failing if `init` has not run
pub async fn open_db(config: &Config) -> Result<MetaDb> {
    if !config.paths.db_file.exists() {
        return Err(Error::NotInitialized);
    }
    let db = MetaDb::connect(config).await?;
    if !db.is_initialized().await? {
        return Err(Error::NotInitialized);
    }
    Ok(db)
}

/// Open the local blob store under the configured root
pub fn open_store(config: &Config) -> Result<Arc<dyn BlobStore>> {
    Ok(Arc::new(LocalBlobStore::new(config.paths.blob_root.clone())?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_creates_layout() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("home");
        let config = cmd_init(InitOptions {
            base_dir: Some(base.clone()),
            force: false,
        })
        .await
        .unwrap();

        assert!(config.is_initialized());
        assert!(config.paths.blob_root.is_dir());
        assert!(open_db(&config).await.is_ok());

        let again = cmd_init(InitOptions {
            base_dir: Some(base.clone()),
            force: false,
        })
        .await;
        assert!(matches!(again, Err(Error::Config(_))));

        let forced = cmd_init(InitOptions {
            base_dir: Some(base),
            force: true,
        })
        .await;
        assert!(forced.is_ok());
    }

    #[tokio::test]
    async fn test_open_db_requires_init() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        assert!(matches!(open_db(&config).await, Err(Error::NotInitialized)));
    }
}
