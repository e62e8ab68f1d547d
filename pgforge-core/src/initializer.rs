//! Strategies for bringing a stopped, uninitialized cluster's data directory
//! into existence: either `initdb` from scratch, or restore it from a
//! previously archived snapshot (see [`crate::cluster::archive`]). A
//! `Compound` initializer chains several, aborting on the first failure.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::cluster::archive::{restore, ClusterArchiveError};
use crate::controller::{initdb::InitDbError, ClusterConfig, InitDb};

#[derive(thiserror::Error, Debug)]
pub enum InitializerError {
    #[error(transparent)]
    InitDbError(#[from] InitDbError),
    #[error(transparent)]
    ArchiveError(#[from] ClusterArchiveError),
    #[error("archive file {0} does not exist")]
    ArchiveMissing(std::path::PathBuf),
    #[error("Input/output error")]
    IoError(#[from] std::io::Error),
}

#[async_trait]
pub trait Initializer: Send + Sync {
    async fn initialize(&self, cluster: &ClusterConfig, cancel: &CancellationToken) -> Result<(), InitializerError>;
}

/// Run `initdb`; if already initialized and `force_reinitialization` is
/// set, delete the data directory first.
pub struct InitDbInitializer {
    pub init_db: InitDb,
    pub force_reinitialization: bool,
}

#[async_trait]
impl Initializer for InitDbInitializer {
    async fn initialize(&self, cluster: &ClusterConfig, cancel: &CancellationToken) -> Result<(), InitializerError> {
        if self.init_db.is_initialized(cluster) {
            if !self.force_reinitialization {
                return Ok(());
            }
            tokio::fs::remove_dir_all(&cluster.data_full_path).await?;
        }
        self.init_db.initialize(cluster, cancel).await?;
        Ok(())
    }
}

/// Extract a previously archived data directory (see `cluster::archive`)
/// into the cluster's data directory.
pub struct ArchiveRestoreInitializer {
    pub archive_path: std::path::PathBuf,
    pub force_reinitialization: bool,
}

#[async_trait]
impl Initializer for ArchiveRestoreInitializer {
    async fn initialize(&self, cluster: &ClusterConfig, _cancel: &CancellationToken) -> Result<(), InitializerError> {
        if !self.archive_path.is_file() {
            return Err(InitializerError::ArchiveMissing(self.archive_path.clone()));
        }
        let already_initialized = cluster.data_full_path.join("PG_VERSION").is_file();
        if already_initialized {
            if !self.force_reinitialization {
                return Ok(());
            }
            tokio::fs::remove_dir_all(&cluster.data_full_path).await?;
        }
        let archive_path = self.archive_path.clone();
        let data_dir = cluster.data_full_path.clone();
        tokio::task::spawn_blocking(move || restore(&archive_path, &data_dir))
            .await
            .expect("restore task panicked")?;
        Ok(())
    }
}

/// Run a sequence of initializers in order; the first failure aborts the
/// remainder.
pub struct CompoundInitializer {
    pub strategies: Vec<Box<dyn Initializer>>,
}

#[async_trait]
impl Initializer for CompoundInitializer {
    async fn initialize(&self, cluster: &ClusterConfig, cancel: &CancellationToken) -> Result<(), InitializerError> {
        for strategy in &self.strategies {
            strategy.initialize(cluster, cancel).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ArchiveRestoreInitializer, Initializer, InitializerError};
    use crate::controller::ClusterConfig;
    use tokio_util::sync::CancellationToken;

    fn config(data_full_path: std::path::PathBuf) -> ClusterConfig {
        ClusterConfig {
            unique_id: "main".into(),
            data_full_path,
            superuser: "postgres".into(),
            encoding: "UTF-8".into(),
            locale: None,
            allow_group_access: None,
            host: "localhost".into(),
            port: 5432,
            parameters: Vec::new(),
        }
    }

    #[tokio::test]
    async fn archive_restore_fails_fast_when_archive_is_missing() {
        let initializer = ArchiveRestoreInitializer { archive_path: "/nonexistent.zip".into(), force_reinitialization: false };
        let cluster = config(tempfile::tempdir().unwrap().path().to_owned());
        let cancel = CancellationToken::new();
        let result = initializer.initialize(&cluster, &cancel).await;
        assert!(matches!(result, Err(InitializerError::ArchiveMissing(_))));
    }
}
