//! The full cluster lifecycle state machine: `Uninitialized → Initialized →
//! Running ↔ Stopped → Destroyed`.
//!
//! Where [`crate::cluster::Cluster`] drives a single, already-installed
//! runtime synchronously, [`DataCluster`] is the richer, async counterpart
//! built on an [`Environment`][`crate::environment::Environment`]'s
//! controllers – the shape a [`crate::server::Server`] façade manages many
//! of at once.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::controller::{ClusterConfig, DataClusterController, RuntimeStatus, ShutdownParams};
use crate::environment::Environment;
use crate::initializer::{Initializer, InitializerError};

#[derive(thiserror::Error, Debug)]
pub enum LifecycleError {
    #[error(transparent)]
    PgCtlError(#[from] crate::controller::pg_ctl::PgCtlError),
    #[error(transparent)]
    InitializerError(#[from] InitializerError),
    #[error("cluster must be initialized before it can be started")]
    NotInitialized,
    #[error("cluster is still running; stop it before this operation")]
    StillRunning,
    #[error("timed out waiting for the server to accept connections")]
    StartupTimeout,
    #[error("this environment has no {0} controller (Minimal mode)")]
    UnavailableCapability(&'static str),
    #[error(transparent)]
    ArchiveError(#[from] super::archive::ClusterArchiveError),
    #[error("cluster must be running for this operation")]
    NotRunning,
    #[error(transparent)]
    PsqlError(#[from] crate::controller::psql::PsqlError),
    #[error(transparent)]
    DumpError(#[from] crate::controller::dump::DumpError),
    #[error(transparent)]
    RestoreError(#[from] crate::controller::restore::RestoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStatus {
    Uninitialized,
    Initialized,
    Running,
    Stopped,
    Destroyed,
}

/// A coarse, lock-free glance at a cluster: does its data directory exist,
/// and does its `postmaster.pid` look valid. Derived purely from filesystem
/// probes, not from a `pg_ctl status` round-trip, so it's cheap enough to
/// poll freely. Distinct from the richer [`LifecycleStatus`] machine, which
/// additionally distinguishes "never initialized" from "destroyed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterStatus {
    Missing,
    Stopped,
    Running,
}

#[derive(Debug, Clone, Copy)]
pub struct StartupParams {
    pub wait: bool,
    pub wait_timeout: Duration,
}

impl Default for StartupParams {
    fn default() -> Self {
        Self { wait: true, wait_timeout: Duration::from_secs(30) }
    }
}

/// A cluster managed through its full lifecycle, bound to one environment.
///
/// Holds an `Arc<Environment>` rather than a borrow so a [`crate::server::Server`]
/// can move owned `DataCluster`s into `tokio::spawn`ed fan-out tasks.
pub struct DataCluster {
    environment: Arc<Environment>,
    config: ClusterConfig,
}

impl DataCluster {
    pub fn new(environment: Arc<Environment>, config: ClusterConfig) -> Self {
        Self { environment, config }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// The environment this cluster is bound to, for callers (such as
    /// [`super::backup`]) that need direct access to the instance's `bin/`
    /// directory or controller set rather than a lifecycle operation.
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// A cloned handle to this cluster's `initdb` controller, for callers
    /// (such as [`crate::server::Server`]'s fan-out) that build their own
    /// default initializer rather than supplying one.
    pub fn init_db(&self) -> crate::controller::InitDb {
        self.environment.init_db.clone()
    }

    fn pg_ctl(&self) -> &DataClusterController {
        &self.environment.data_cluster_controller
    }

    async fn runtime_status(&self, cancel: &CancellationToken) -> Result<RuntimeStatus, LifecycleError> {
        Ok(self.pg_ctl().get_status(&self.config, cancel).await?)
    }

    pub async fn status(&self, cancel: &CancellationToken) -> Result<LifecycleStatus, LifecycleError> {
        if !self.environment.instance_dir.join("bin").is_dir() {
            return Ok(LifecycleStatus::Destroyed);
        }
        if !self.config.data_full_path.join("PG_VERSION").is_file() {
            return Ok(LifecycleStatus::Uninitialized);
        }
        let status = self.runtime_status(cancel).await?;
        Ok(if status.is_valid() { LifecycleStatus::Running } else { LifecycleStatus::Stopped })
    }

    /// A cheap, lock-free glance derived from `PG_VERSION` and
    /// `postmaster.pid` alone, for callers that want a quick read without
    /// paying for the `pg_ctl status` round-trip [`status`][Self::status]
    /// makes.
    pub fn glance(&self) -> Result<ClusterStatus, LifecycleError> {
        if !self.config.data_full_path.join("PG_VERSION").is_file() {
            return Ok(ClusterStatus::Missing);
        }
        let running = self.pg_ctl().read_status(&self.config)?.is_some_and(|status| status.is_valid());
        Ok(if running { ClusterStatus::Running } else { ClusterStatus::Stopped })
    }

    /// Delegate to `initializer`; a no-op if already initialized unless the
    /// initializer itself forces reinitialization.
    pub async fn initialize(&self, initializer: &dyn Initializer, cancel: &CancellationToken) -> Result<(), LifecycleError> {
        if self.status(cancel).await? == LifecycleStatus::Running {
            return Err(LifecycleError::StillRunning);
        }
        initializer.initialize(&self.config, cancel).await?;
        Ok(())
    }

    /// Start the cluster, running `initializer` first if it's not yet
    /// initialized. No-op if already running.
    pub async fn start(
        &self,
        params: StartupParams,
        initializer: Option<&dyn Initializer>,
        cancel: &CancellationToken,
    ) -> Result<(), LifecycleError> {
        match self.status(cancel).await? {
            LifecycleStatus::Running => return Ok(()),
            LifecycleStatus::Uninitialized => match initializer {
                Some(initializer) => initializer.initialize(&self.config, cancel).await?,
                None => return Err(LifecycleError::NotInitialized),
            },
            LifecycleStatus::Initialized | LifecycleStatus::Stopped | LifecycleStatus::Destroyed => {}
        }

        self.pg_ctl().start(&self.config, cancel).await?;

        if params.wait {
            self.wait_for_port(params.wait_timeout).await?;
        }
        Ok(())
    }

    async fn wait_for_port(&self, wait_timeout: Duration) -> Result<(), LifecycleError> {
        let address = (self.config.host.as_str(), self.config.port);
        let poll = async {
            loop {
                if TcpStream::connect(address).await.is_ok() {
                    return;
                }
                sleep(Duration::from_millis(100)).await;
            }
        };
        timeout(wait_timeout, poll).await.map_err(|_| LifecycleError::StartupTimeout)
    }

    pub async fn stop(&self, shutdown: ShutdownParams, cancel: &CancellationToken) -> Result<(), LifecycleError> {
        if self.status(cancel).await? != LifecycleStatus::Running {
            return Ok(());
        }
        self.pg_ctl().stop(&self.config, shutdown, cancel).await?;
        Ok(())
    }

    pub async fn reload_configuration(&self, cancel: &CancellationToken) -> Result<(), LifecycleError> {
        self.pg_ctl().reload_configuration(&self.config, cancel).await?;
        Ok(())
    }

    /// Stop if running, then compress the data directory into `archive_path`.
    pub async fn archive(&self, archive_path: &std::path::Path, shutdown: ShutdownParams, cancel: &CancellationToken) -> Result<(), LifecycleError> {
        if self.status(cancel).await? == LifecycleStatus::Running {
            self.stop(shutdown, cancel).await?;
        }
        let data_dir = self.config.data_full_path.clone();
        let archive_path = archive_path.to_owned();
        tokio::task::spawn_blocking(move || super::archive::compress(&data_dir, &archive_path))
            .await
            .expect("compress task panicked")?;
        Ok(())
    }

    /// Stop if running, then delete the data directory if present.
    pub async fn destroy(&self, shutdown: ShutdownParams, cancel: &CancellationToken) -> Result<(), LifecycleError> {
        self.pg_ctl().destroy(&self.config, shutdown, cancel).await?;
        Ok(())
    }

    pub async fn list_databases(
        &self,
        on_row: impl FnMut(crate::controller::psql::DatabaseRow),
        cancel: &CancellationToken,
    ) -> Result<(), LifecycleError> {
        self.require_running(cancel).await?;
        let sql = self.environment.sql_controller.as_ref().ok_or(LifecycleError::UnavailableCapability("psql"))?;
        sql.list_databases(&self.config, on_row, cancel).await?;
        Ok(())
    }

    /// `-c <sql>` through the bound `psql` controller. Requires Running and
    /// Standard mode (or at least a bound `SqlController`).
    #[allow(clippy::too_many_arguments)]
    pub async fn execute_sql(
        &self,
        sql: &str,
        db: Option<&str>,
        user: Option<&str>,
        format: crate::controller::OutputFormat<'_>,
        on_output: Option<impl FnMut(crate::command::Line)>,
        cancel: &CancellationToken,
    ) -> Result<(), LifecycleError> {
        self.require_running(cancel).await?;
        let sql_controller = self.environment.sql_controller.as_ref().ok_or(LifecycleError::UnavailableCapability("psql"))?;
        sql_controller.execute_sql(&self.config, sql, db, user, format, on_output, cancel).await?;
        Ok(())
    }

    /// `-f <path>` through the bound `psql` controller.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute_file(
        &self,
        path: &std::path::Path,
        db: Option<&str>,
        user: Option<&str>,
        format: crate::controller::OutputFormat<'_>,
        on_output: Option<impl FnMut(crate::command::Line)>,
        cancel: &CancellationToken,
    ) -> Result<(), LifecycleError> {
        self.require_running(cancel).await?;
        let sql_controller = self.environment.sql_controller.as_ref().ok_or(LifecycleError::UnavailableCapability("psql"))?;
        sql_controller.execute_file(&self.config, path, db, user, format, on_output, cancel).await?;
        Ok(())
    }

    /// `pg_restore` the given options into this cluster through the bound
    /// `pg_restore` controller.
    pub async fn import_dump(&self, options: &crate::controller::RestoreOptions, cancel: &CancellationToken) -> Result<(), LifecycleError> {
        self.require_running(cancel).await?;
        let restore = self.environment.restore_controller.as_ref().ok_or(LifecycleError::UnavailableCapability("pg_restore"))?;
        restore.restore(&self.config, options, cancel).await?;
        Ok(())
    }

    /// `pg_dump` this cluster per the given options through the bound
    /// `pg_dump` controller.
    pub async fn export_dump(&self, options: &crate::controller::DumpOptions, cancel: &CancellationToken) -> Result<(), LifecycleError> {
        self.require_running(cancel).await?;
        let dump = self.environment.dump_controller.as_ref().ok_or(LifecycleError::UnavailableCapability("pg_dump"))?;
        dump.dump(&self.config, options, cancel).await?;
        Ok(())
    }

    async fn require_running(&self, cancel: &CancellationToken) -> Result<(), LifecycleError> {
        if self.status(cancel).await? != LifecycleStatus::Running {
            return Err(LifecycleError::NotRunning);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ClusterConfig, ClusterStatus, DataCluster, StartupParams};
    use crate::controller::{DataClusterController, InitDb};
    use crate::environment::Environment;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn default_startup_params_wait_thirty_seconds() {
        let params = StartupParams::default();
        assert!(params.wait);
        assert_eq!(params.wait_timeout, Duration::from_secs(30));
    }

    fn bare_environment(instance_dir: std::path::PathBuf) -> Environment {
        let bin_dir = instance_dir.join("bin");
        Environment {
            init_db: InitDb::new(bin_dir.join("initdb")),
            data_cluster_controller: DataClusterController::new(bin_dir.join("pg_ctl")),
            sql_controller: None,
            dump_controller: None,
            restore_controller: None,
            versions: HashMap::new(),
            parsed_versions: HashMap::new(),
            instance_dir,
        }
    }

    #[test]
    fn glance_reports_missing_for_an_uninitialized_data_directory() {
        let tempdir = tempfile::tempdir().unwrap();
        let environment = Arc::new(bare_environment(tempdir.path().join("instance")));

        let config = ClusterConfig {
            unique_id: "main".into(),
            data_full_path: tempdir.path().join("data"),
            superuser: "postgres".into(),
            encoding: "UTF-8".into(),
            locale: None,
            allow_group_access: Some(true),
            host: "localhost".into(),
            port: 5432,
            parameters: Vec::new(),
        };
        let cluster = DataCluster::new(environment, config);
        assert_eq!(cluster.glance().unwrap(), ClusterStatus::Missing);
    }

    #[test]
    fn glance_reports_stopped_once_initialized_but_not_running() {
        let tempdir = tempfile::tempdir().unwrap();
        let data_full_path = tempdir.path().join("data");
        std::fs::create_dir_all(&data_full_path).unwrap();
        std::fs::write(data_full_path.join("PG_VERSION"), "16\n").unwrap();
        let environment = Arc::new(bare_environment(tempdir.path().join("instance")));

        let config = ClusterConfig {
            unique_id: "main".into(),
            data_full_path,
            superuser: "postgres".into(),
            encoding: "UTF-8".into(),
            locale: None,
            allow_group_access: Some(true),
            host: "localhost".into(),
            port: 5432,
            parameters: Vec::new(),
        };
        let cluster = DataCluster::new(environment, config);
        assert_eq!(cluster.glance().unwrap(), ClusterStatus::Stopped);
    }
}
