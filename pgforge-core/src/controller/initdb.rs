//! Wraps `initdb`: create a fresh data directory.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::command::{self, CommandError, Invocation};

use super::ClusterConfig;

#[derive(thiserror::Error, Debug)]
pub enum InitDbError {
    #[error(transparent)]
    CommandError(#[from] CommandError),
}

/// Binds the `initdb` binary for one environment.
#[derive(Debug, Clone)]
pub struct InitDb {
    binary: PathBuf,
}

impl InitDb {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    /// True iff `cluster`'s data directory already looks initialized.
    pub fn is_initialized(&self, cluster: &ClusterConfig) -> bool {
        cluster.data_full_path.join("PG_VERSION").is_file()
    }

    /// Run `initdb` against `cluster`'s data directory. No-op if already
    /// initialized.
    pub async fn initialize(&self, cluster: &ClusterConfig, cancel: &CancellationToken) -> Result<(), InitDbError> {
        if self.is_initialized(cluster) {
            return Ok(());
        }
        let data_full_path = cluster.data_full_path.as_path();

        let mut invocation = Invocation::new(&self.binary)
            .arg("-U")
            .arg(&cluster.superuser)
            .arg("-D")
            .arg(data_full_path)
            .arg("-E")
            .arg(&cluster.encoding);

        if let Some(locale) = &cluster.locale {
            invocation = invocation.arg("--locale").arg(locale);
        }
        if cluster.allow_group_access == Some(true) {
            invocation = invocation.arg("--allow-group-access");
        }

        command::execute(&invocation, true, cancel).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ClusterConfig, InitDb};

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

    #[test]
    fn not_initialized_without_pg_version() {
        let dir = tempfile::tempdir().unwrap();
        let initdb = InitDb::new("/usr/bin/initdb");
        assert!(!initdb.is_initialized(&config(dir.path().to_owned())));
    }

    #[test]
    fn initialized_once_pg_version_exists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("PG_VERSION"), b"16\n").unwrap();
        let initdb = InitDb::new("/usr/bin/initdb");
        assert!(initdb.is_initialized(&config(dir.path().to_owned())));
    }
}
