//! Wraps `pg_ctl`: status, start, stop, restart, reload, destroy.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::command::{self, CommandError, Invocation};

use super::ClusterConfig;

#[derive(thiserror::Error, Debug)]
pub enum PgCtlError {
    #[error(transparent)]
    CommandError(#[from] CommandError),
    #[error("Input/output error")]
    IoError(#[from] std::io::Error),
}

/// Parsed from the first five lines of `postmaster.pid`. Trailing lines
/// (their shape varies by server version) are tolerated and ignored.
///
/// An invalid status (`pid == 0`) carries `status_error`, the `pg_ctl
/// status` exit code, so callers can distinguish "cluster genuinely
/// stopped" from "the status probe itself failed".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeStatus {
    pub pid: u32,
    pub data_directory: PathBuf,
    pub start_time: String,
    pub port: u16,
    pub host: String,
    pub status_error: Option<i32>,
}

impl RuntimeStatus {
    /// A status is valid iff its pid is non-zero.
    pub fn is_valid(&self) -> bool {
        self.pid != 0
    }

    fn invalid(status_error: Option<i32>) -> Self {
        Self {
            pid: 0,
            data_directory: PathBuf::new(),
            start_time: String::new(),
            port: 0,
            host: String::new(),
            status_error,
        }
    }

    fn parse(contents: &str) -> Option<Self> {
        let mut lines = contents.lines();
        let pid: u32 = lines.next()?.trim().parse().ok()?;
        let data_directory = PathBuf::from(lines.next()?.trim());
        let start_time = lines.next()?.trim().to_owned();
        let port: u16 = lines.next()?.trim().parse().ok()?;
        let host = lines.next()?.trim().to_owned();
        Some(Self { pid, data_directory, start_time, port, host, status_error: None })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    Smart,
    Fast,
    Immediate,
}

impl ShutdownMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Smart => "smart",
            Self::Fast => "fast",
            Self::Immediate => "immediate",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ShutdownParams {
    pub mode: ShutdownMode,
    pub wait: bool,
    pub timeout_secs: u32,
}

impl Default for ShutdownParams {
    fn default() -> Self {
        Self { mode: ShutdownMode::Fast, wait: true, timeout_secs: 180 }
    }
}

/// Binds the `pg_ctl` binary for one environment.
#[derive(Debug, Clone)]
pub struct DataClusterController {
    binary: PathBuf,
}

impl DataClusterController {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    /// Parse `<dataFullPath>/postmaster.pid`, returning `None` if it
    /// doesn't exist (the server has never started, or stopped cleanly).
    pub fn read_status(&self, cluster: &ClusterConfig) -> Result<Option<RuntimeStatus>, PgCtlError> {
        let pidfile = cluster.data_full_path.join("postmaster.pid");
        match std::fs::read_to_string(&pidfile) {
            Ok(contents) => Ok(RuntimeStatus::parse(&contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// `pg_ctl status`, tolerant of a non-zero exit (that's the expected
    /// "not running" case, not an error). Returns an invalid [`RuntimeStatus`]
    /// carrying the exit code as `status_error` when the probe doesn't
    /// confirm a running server, rather than collapsing "stopped" and
    /// "probe failed" into the same result.
    pub async fn get_status(&self, cluster: &ClusterConfig, cancel: &CancellationToken) -> Result<RuntimeStatus, PgCtlError> {
        let invocation = Invocation::new(&self.binary).arg("status").arg("-D").arg(&cluster.data_full_path);
        let status = command::execute(&invocation, false, cancel).await?;
        if status.success() {
            if let Some(parsed) = self.read_status(cluster)? {
                return Ok(parsed);
            }
        }
        Ok(RuntimeStatus::invalid(status.code()))
    }

    /// Build the `-o "..."` options string `pg_ctl start` passes through to
    /// `postgres`: `-F -p <port>` followed by `-c key=value` per parameter.
    fn postgres_options(cluster: &ClusterConfig) -> String {
        let mut options = format!("-F -p {}", cluster.port);
        for (key, value) in &cluster.parameters {
            options.push_str(&format!(" -c {key}={value}"));
        }
        options
    }

    pub async fn start(&self, cluster: &ClusterConfig, cancel: &CancellationToken) -> Result<(), PgCtlError> {
        let options = Self::postgres_options(cluster);
        let invocation = Invocation::new(&self.binary)
            .arg("start")
            .arg("-U")
            .arg(&cluster.superuser)
            .arg("-D")
            .arg(&cluster.data_full_path)
            .arg("-o")
            .arg(&options);
        command::execute(&invocation, true, cancel).await?;
        Ok(())
    }

    pub async fn stop(&self, cluster: &ClusterConfig, shutdown: ShutdownParams, cancel: &CancellationToken) -> Result<(), PgCtlError> {
        let timeout = shutdown.timeout_secs.to_string();
        let mut invocation = Invocation::new(&self.binary)
            .arg("stop")
            .arg("-U")
            .arg(&cluster.superuser)
            .arg("-D")
            .arg(&cluster.data_full_path)
            .arg("-m")
            .arg(shutdown.mode.as_str())
            .arg("-t")
            .arg(&timeout);
        invocation = if shutdown.wait { invocation.arg("--wait") } else { invocation.arg("--no-wait") };
        command::execute(&invocation, true, cancel).await?;
        Ok(())
    }

    pub async fn restart(&self, cluster: &ClusterConfig, shutdown: ShutdownParams, cancel: &CancellationToken) -> Result<(), PgCtlError> {
        let timeout = shutdown.timeout_secs.to_string();
        let options = Self::postgres_options(cluster);
        let invocation = Invocation::new(&self.binary)
            .arg("restart")
            .arg("-U")
            .arg(&cluster.superuser)
            .arg("-D")
            .arg(&cluster.data_full_path)
            .arg("-m")
            .arg(shutdown.mode.as_str())
            .arg("-t")
            .arg(&timeout)
            .arg("-o")
            .arg(&options);
        command::execute(&invocation, true, cancel).await?;
        Ok(())
    }

    pub async fn reload_configuration(&self, cluster: &ClusterConfig, cancel: &CancellationToken) -> Result<(), PgCtlError> {
        let invocation = Invocation::new(&self.binary).arg("reload").arg("-D").arg(&cluster.data_full_path);
        command::execute(&invocation, true, cancel).await?;
        Ok(())
    }

    /// Stop if running, then delete the data directory.
    pub async fn destroy(&self, cluster: &ClusterConfig, shutdown: ShutdownParams, cancel: &CancellationToken) -> Result<(), PgCtlError> {
        if self.get_status(cluster, cancel).await?.is_valid() {
            self.stop(cluster, shutdown, cancel).await?;
        }
        match std::fs::remove_dir_all(&cluster.data_full_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
