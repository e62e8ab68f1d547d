//! Continuous WAL archiving: configure a running cluster's `archive_command`
//! GUCs and take base backups into a numbered, lock-coordinated directory.
//!
//! A different feature from [`super::archive`]'s stop-and-zip snapshot: this
//! drives a *running* cluster through its bound `psql` controller (GUC
//! reads/writes are plain SQL, same as any other [`super::lifecycle::DataCluster::execute_sql`]
//! call) and shells out to `pg_basebackup` directly, reusing the locked-
//! temp-dir-then-atomic-rename idiom from [`super::archive::compress`].

use std::{
    ffi::OsStr,
    io,
    path::PathBuf,
    process::ExitStatus,
    sync::{Arc, Mutex},
};

use tempfile::TempDir;
use tokio::{fs, task::block_in_place};
use tokio_stream::{wrappers::ReadDirStream, StreamExt};
use tokio_util::sync::CancellationToken;

use super::lifecycle::{DataCluster, LifecycleError};
use crate::command::{self, CommandError, Invocation, Line};
use crate::controller::OutputFormat;
use crate::environment::binary_name;
use crate::lock;
use crate::prelude::CoordinateError;

// ----------------------------------------------------------------------------

#[derive(Debug)]
pub struct Backup {
    pub backup_dir: PathBuf,
    pub backup_wal_dir: PathBuf,
}

impl Backup {
    /// Creates the destination directory and the WAL archive directory if these
    /// do not exist, and allocates a temporary location for the base backup.
    pub async fn prepare<D: AsRef<std::path::Path>>(backup_dir: D) -> Result<Self, BackupError> {
        fs::create_dir_all(&backup_dir).await?;
        let backup_dir = backup_dir.as_ref().canonicalize()?;
        let backup_wal_dir = backup_dir.join("wal");
        fs::create_dir_all(&backup_wal_dir).await?;
        Ok(Self { backup_dir, backup_wal_dir })
    }

    /// Configures the cluster for continuous archiving.
    ///
    /// Returns a flag indicating if the cluster must be restarted for changes
    /// to take effect. If the cluster is already configured appropriately, this
    /// does nothing (and returns `false`).
    pub async fn do_configure_archiving(
        &self,
        cluster: &DataCluster,
        archive_command: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, BackupError> {
        let mut restart = false;

        // Ensure that `wal_level` is set to `replica` or `logical`. If not,
        // set it to `replica`.
        match show_parameter(cluster, WAL_LEVEL, cancel).await? {
            Some(level) if level == "replica" || level == "logical" => {
                log::debug!("{WAL_LEVEL:?} already set to {level:?}");
            }
            Some(_) => {
                log::info!("Setting {WAL_LEVEL:?} to 'replica'");
                set_parameter(cluster, WAL_LEVEL, "replica", cancel).await?;
                restart = true;
            }
            None => return Err(BackupError::ConfigError("WAL is not supported; cannot proceed".into())),
        }

        // Ensure that `archive_mode` is set to `on` or `always`. If not,
        // set it to `on`.
        match show_parameter(cluster, ARCHIVE_MODE, cancel).await? {
            Some(level) if level == "on" || level == "always" => {
                log::debug!("{ARCHIVE_MODE:?} already set to {level:?}");
            }
            Some(_) => {
                log::info!("Setting {ARCHIVE_MODE:?} to 'on'");
                set_parameter(cluster, ARCHIVE_MODE, "on", cancel).await?;
                restart = true;
            }
            None => return Err(BackupError::ConfigError("Archiving is not supported; cannot proceed".into())),
        }

        // We can't set `archive_command` if `archive_library` is already set.
        match show_parameter(cluster, ARCHIVE_LIBRARY, cancel).await? {
            Some(library) if library.is_empty() => {
                log::debug!("{ARCHIVE_LIBRARY:?} not set (good for us)");
            }
            Some(archive_library) => {
                return Err(BackupError::ConfigError(format!(
                    "{ARCHIVE_LIBRARY:?} is already set to {archive_library:?}; cannot proceed"
                )))
            }
            None => {
                log::debug!("{ARCHIVE_LIBRARY:?} is not supported (good for us)");
            }
        }

        match show_parameter(cluster, ARCHIVE_COMMAND, cancel).await? {
            Some(command) if command == archive_command => {
                log::debug!("{ARCHIVE_COMMAND:?} already set to {archive_command:?}");
            }
            // Re. "(disabled)", see `show_archive_command` in xlog.c.
            Some(command) if command.is_empty() || command == "(disabled)" => {
                log::info!("Setting {ARCHIVE_COMMAND:?} to {archive_command:?}");
                set_parameter(cluster, ARCHIVE_COMMAND, archive_command, cancel).await?;
            }
            Some(command) => {
                return Err(BackupError::ConfigError(format!(
                    "{ARCHIVE_COMMAND:?} is already set to {command:?}; cannot proceed"
                )))
            }
            None => return Err(BackupError::ConfigError("Archiving is not supported; cannot proceed".into())),
        }

        Ok(restart)
    }

    /// Performs a "base backup" of the cluster.
    ///
    /// Returns the directory into which the backup has been created. This is
    /// always a subdirectory of [`Self::backup_dir`].
    ///
    /// This must be performed _after_ configuring continuous archiving (see
    /// [`Backup::do_configure_archiving`]).
    pub async fn do_base_backup(&self, cluster: &DataCluster, cancel: &CancellationToken) -> Result<PathBuf, BackupError> {
        // Temporary location into which we'll make the base backup.
        let backup_tmp_dir = block_in_place(|| TempDir::with_prefix_in(BACKUP_DATA_PREFIX_TMP, &self.backup_dir))?;

        let config = cluster.config();
        let port = config.port.to_string();
        let binary = cluster.environment().bin_dir().join(binary_name("pg_basebackup"));
        let args: &[&OsStr] = &[
            "-h".as_ref(),
            config.host.as_ref(),
            "-p".as_ref(),
            port.as_ref(),
            "-U".as_ref(),
            config.superuser.as_ref(),
            "--pgdata".as_ref(),
            backup_tmp_dir.path().as_ref(),
            "--format".as_ref(),
            "plain".as_ref(),
            "--progress".as_ref(),
        ];
        let mut invocation = Invocation::new(&binary);
        for arg in args {
            invocation = invocation.arg(arg);
        }
        let status = command::execute(&invocation, false, cancel).await?;
        if !status.success() {
            return Err(BackupError::BaseBackupFailed(status));
        }

        // Before calculating the target directory name or doing the actual
        // rename, take out a coordinating lock in `backup_dir`.
        let backup_lock = block_in_place(|| {
            lock::UnlockedFile::try_from(&self.backup_dir.join(BACKUP_LOCK_NAME))?
                .lock_exclusive()
                .map_err(CoordinateError::UnixError)
        })?;

        // Where we're going to move the new backup to. This is always a
        // directory named `{BACKUP_DATA_PREFIX}.NNNNNNNNNN` where NNNNNNNNNN is
        // a zero-padded integer, the next available in `destination`.
        let backup_data_dir = self.backup_dir.join(format!(
            "{BACKUP_DATA_PREFIX}{:010}",
            ReadDirStream::new(fs::read_dir(&self.backup_dir).await?)
                .filter_map(Result::ok)
                .filter_map(|entry| match entry.file_name().to_str() {
                    Some(name) if name.starts_with(BACKUP_DATA_PREFIX) =>
                        name[BACKUP_DATA_PREFIX.len()..].parse::<u32>().ok(),
                    Some(_) | None => None,
                })
                .fold(0, Ord::max)
                .await
                + 1
        ));

        // Do the rename.
        fs::rename(&backup_tmp_dir, &backup_data_dir).await?;
        drop(backup_lock);

        Ok(backup_data_dir)
    }
}

/// Read one GUC via `psql`, mirroring `pg_catalog.pg_settings`'s
/// "no such row" → absent-on-this-version semantics.
async fn show_parameter(cluster: &DataCluster, name: &str, cancel: &CancellationToken) -> Result<Option<String>, BackupError> {
    let sql = format!("SELECT setting FROM pg_catalog.pg_settings WHERE name = '{name}'");
    let captured = Arc::new(Mutex::new(None));
    let sink = captured.clone();
    let format = OutputFormat { tuples_only: true, no_align: true, ..OutputFormat::default() };
    cluster
        .execute_sql(
            &sql,
            None,
            None,
            format,
            Some(move |line: Line| {
                if let Line::Stdout(line) = line {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        *sink.lock().unwrap() = Some(trimmed.to_owned());
                    }
                }
            }),
            cancel,
        )
        .await?;
    Ok(Arc::try_unwrap(captured).expect("no other sink handle survives execute_sql").into_inner().unwrap())
}

/// Set a GUC via `ALTER SYSTEM`; takes effect on reload/restart depending on
/// the parameter's context, same as the original `postgresql.auto.conf` path.
async fn set_parameter(cluster: &DataCluster, name: &str, value: &str, cancel: &CancellationToken) -> Result<(), BackupError> {
    let escaped = value.replace('\'', "''");
    let sql = format!("ALTER SYSTEM SET {name} = '{escaped}'");
    cluster.execute_sql(&sql, None, None, OutputFormat::default(), None::<fn(Line)>, cancel).await?;
    Ok(())
}

// ----------------------------------------------------------------------------

static ARCHIVE_MODE: &str = "archive_mode";
static ARCHIVE_COMMAND: &str = "archive_command";
static ARCHIVE_LIBRARY: &str = "archive_library";
static WAL_LEVEL: &str = "wal_level";

// Successful backups have this directory name prefix.
pub static BACKUP_DATA_PREFIX: &str = "data.";

// In-progress backups have this directory name prefix.
static BACKUP_DATA_PREFIX_TMP: &str = ".tmp.data.";

// Coordinating lock for working in the backup directory.
static BACKUP_LOCK_NAME: &str = ".lock";

// ----------------------------------------------------------------------------

#[derive(thiserror::Error, miette::Diagnostic, Debug)]
pub enum BackupError {
    #[error("input/output error: {0}")]
    IoError(#[from] io::Error),
    #[error("configuration error: {0}")]
    ConfigError(String),
    #[error(transparent)]
    LifecycleError(#[from] LifecycleError),
    #[error(transparent)]
    CommandError(#[from] CommandError),
    #[error("pg_basebackup failed: {0:?}")]
    BaseBackupFailed(ExitStatus),
    #[error(transparent)]
    CoordinateError(#[from] CoordinateError<std::convert::Infallible>),
}

#[cfg(test)]
mod tests {
    use super::Backup;

    #[tokio::test]
    async fn prepare_creates_the_backup_and_wal_directories() {
        let root = tempfile::tempdir().unwrap();
        let backup_dir = root.path().join("backups");
        let backup = Backup::prepare(&backup_dir).await.unwrap();
        assert!(backup.backup_dir.is_dir());
        assert!(backup.backup_wal_dir.is_dir());
        assert_eq!(backup.backup_wal_dir, backup.backup_dir.join("wal"));
    }
}
