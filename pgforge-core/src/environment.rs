//! Bind an [`crate::instance::Instance`] to the controllers needed to drive
//! it: probe the required binaries exist and report a version, then
//! construct an [`InitDb`]/[`DataClusterController`] pair plus whichever
//! optional `psql`/`pg_dump`/`pg_restore` controllers are actually present.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::command::{self, CommandError, Invocation};
use crate::controller::{DataClusterController, DumpController, InitDb, RestoreController, SqlController};
use crate::fs::{self, touch_sentinel, FsError};
use crate::version::Version;

#[derive(thiserror::Error, Debug)]
pub enum EnvironmentError {
    #[error("Input/output error")]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    FsError(#[from] FsError),
    #[error("required binary {0} is missing")]
    MissingBinary(String),
    #[error("{0} --version failed")]
    ProbeFailed(String, #[source] CommandError),
    #[error("could not determine the current user")]
    CurrentUserError(#[from] crate::util::CurrentUserError),
    #[error("platform permission command failed")]
    CommandFailed(#[from] CommandError),
}

const REQUIRED_BINARIES: &[&str] = &["initdb", "pg_ctl", "postgres"];
const OPTIONAL_BINARIES: &[&str] = &["psql", "pg_dump", "pg_restore"];

pub(crate) fn binary_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{name}.exe")
    } else {
        name.to_owned()
    }
}

/// Whether every optional controller is present (`Standard`) or at least one
/// is missing (`Minimal`, per-controller capability still reported
/// individually via `Environment::has_sql`/`has_dump`/`has_restore`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Standard,
    Minimal,
}

/// Platform fix-ups to apply when building an environment for a freshly
/// extracted instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformParameters {
    pub normalize_attributes: bool,
    pub set_executable_attributes: bool,
    pub add_local_user_access_permission: bool,
}

/// Probe `instance_dir/bin` for the required binaries in parallel, invoking
/// each with `--version`. Fails on any missing binary or non-zero exit.
pub async fn validate(instance_dir: &Path) -> Result<HashMap<String, String>, EnvironmentError> {
    let bin_dir = instance_dir.join("bin");
    let results: Vec<Result<(String, String), EnvironmentError>> = stream::iter(REQUIRED_BINARIES.iter())
        .map(|name| {
            let bin_dir = bin_dir.clone();
            async move { probe_version(&bin_dir, name).await }
        })
        .buffer_unordered(REQUIRED_BINARIES.len())
        .collect()
        .await;
    results.into_iter().collect()
}

async fn probe_version(bin_dir: &Path, name: &str) -> Result<(String, String), EnvironmentError> {
    let path = bin_dir.join(binary_name(name));
    if !path.is_file() {
        return Err(EnvironmentError::MissingBinary(name.to_owned()));
    }
    let cancel = CancellationToken::new();
    let output = std::sync::Arc::new(std::sync::Mutex::new(String::new()));
    let sink_output = output.clone();
    let invocation = Invocation::new(&path).arg("--version");
    command::execute_streaming(
        &invocation,
        true,
        move |line: command::Line| {
            if let command::Line::Stdout(line) = line {
                *sink_output.lock().unwrap() = line;
            }
        },
        &cancel,
    )
    .await
    .map_err(|err| EnvironmentError::ProbeFailed(name.to_owned(), err))?;
    let version_string = output.lock().unwrap().clone();
    Ok((name.to_owned(), version_string))
}

/// Apply platform fix-ups and construct the controller set for `instance_dir`.
pub async fn build(instance_dir: &Path, platform: PlatformParameters) -> Result<Environment, EnvironmentError> {
    let bin_dir = instance_dir.join("bin");

    if platform.normalize_attributes {
        fs::ensure_directory(instance_dir)?; // cheap existence assertion before walking it
        normalize_attributes(instance_dir).await?;
    }

    if platform.set_executable_attributes {
        #[cfg(unix)]
        for name in REQUIRED_BINARIES.iter().chain(OPTIONAL_BINARIES.iter()) {
            let path = bin_dir.join(binary_name(name));
            if path.is_file() {
                set_executable(&path)?;
            }
        }
    }

    if platform.add_local_user_access_permission {
        let sentinel = instance_dir.join("permissions.sentinel");
        if touch_sentinel(&sentinel)? {
            if let Err(err) = grant_local_user_access(instance_dir).await {
                let _ = std::fs::remove_file(&sentinel);
                return Err(err);
            }
        }
    }

    let required = validate(instance_dir).await?;
    let parsed_versions = required
        .iter()
        .filter_map(|(name, raw)| raw.parse::<Version>().ok().map(|v| (name.clone(), v)))
        .collect();

    let init_db = InitDb::new(bin_dir.join(binary_name("initdb")));
    let data_cluster_controller = DataClusterController::new(bin_dir.join(binary_name("pg_ctl")));

    let sql_controller = probe_optional(&bin_dir, "psql").await.map(|_| SqlController::new(bin_dir.join(binary_name("psql"))));
    let dump_controller =
        probe_optional(&bin_dir, "pg_dump").await.map(|_| DumpController::new(bin_dir.join(binary_name("pg_dump"))));
    let restore_controller =
        probe_optional(&bin_dir, "pg_restore").await.map(|_| RestoreController::new(bin_dir.join(binary_name("pg_restore"))));

    Ok(Environment {
        instance_dir: instance_dir.to_owned(),
        versions: required,
        parsed_versions,
        init_db,
        data_cluster_controller,
        sql_controller,
        dump_controller,
        restore_controller,
    })
}

/// Probe an optional binary with `noThrow` semantics: absence, or a failing
/// `--version`, just means the slot stays empty.
async fn probe_optional(bin_dir: &Path, name: &str) -> Option<String> {
    probe_version(bin_dir, name).await.ok().map(|(_, version)| version)
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<(), EnvironmentError> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o111);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

/// List every file and directory under `root`, recursively.
fn collect_entries(root: &Path) -> Result<Vec<PathBuf>, EnvironmentError> {
    let mut entries = Vec::new();
    let mut pending = vec![root.to_owned()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path.clone());
            }
            entries.push(path);
        }
    }
    Ok(entries)
}

/// Recursively reset every entry under `instance_dir` to its platform's
/// normal attributes, with bounded fan-out so a large extracted tree
/// doesn't spawn thousands of concurrent syscalls/processes at once.
async fn normalize_attributes(instance_dir: &Path) -> Result<(), EnvironmentError> {
    let entries = collect_entries(instance_dir)?;
    stream::iter(entries)
        .map(|path| async move { reset_attributes(&path).await })
        .buffer_unordered(32)
        .collect::<Vec<Result<(), EnvironmentError>>>()
        .await
        .into_iter()
        .collect()
}

/// Reset a single entry's permission bits to a standard owner-writable
/// mode, clearing whatever an archive extractor left behind.
#[cfg(unix)]
async fn reset_attributes(path: &Path) -> Result<(), EnvironmentError> {
    use std::os::unix::fs::PermissionsExt;
    let mode = if path.is_dir() { 0o755 } else { 0o644 };
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

/// Reset a single entry's read-only/hidden/system attributes via `attrib`,
/// which is what zip extraction on Windows leaves set.
#[cfg(windows)]
async fn reset_attributes(path: &Path) -> Result<(), EnvironmentError> {
    let cancel = CancellationToken::new();
    let invocation = Invocation::new(Path::new("attrib")).arg("-r").arg("-h").arg("-s").arg(path);
    command::execute(&invocation, true, &cancel).await?;
    Ok(())
}

/// Grant the current user full control over `instance_dir`, recursively,
/// via `icacls`. Extracted archives on Windows can leave ACLs that deny the
/// invoking user access to their own freshly-downloaded instance.
#[cfg(windows)]
async fn grant_local_user_access(instance_dir: &Path) -> Result<(), EnvironmentError> {
    let user = crate::util::current_user()?;
    let permission = format!("{user}:(OI)(CI)F");
    let cancel = CancellationToken::new();
    let invocation =
        Invocation::new(Path::new("icacls")).arg(instance_dir).arg("/t").arg("/grant:r").arg(&permission);
    command::execute(&invocation, true, &cancel).await?;
    Ok(())
}

#[cfg(unix)]
async fn grant_local_user_access(_instance_dir: &Path) -> Result<(), EnvironmentError> {
    // `icacls` is Windows-only; nothing to do on POSIX, where
    // `set_executable_attributes` already covers the permission bits that
    // matter.
    Ok(())
}

/// A bound environment: an instance plus the controllers it supports.
/// Absence of `sql_controller`/`dump_controller`/`restore_controller`
/// defines Minimal mode for that capability.
pub struct Environment {
    pub instance_dir: PathBuf,
    pub versions: HashMap<String, String>,
    pub parsed_versions: HashMap<String, Version>,
    pub init_db: InitDb,
    pub data_cluster_controller: DataClusterController,
    pub sql_controller: Option<SqlController>,
    pub dump_controller: Option<DumpController>,
    pub restore_controller: Option<RestoreController>,
}

impl Environment {
    /// The `bin/` subdirectory of the bound instance, where `pg_basebackup`
    /// and other tools not wrapped by a dedicated controller still live.
    pub fn bin_dir(&self) -> PathBuf {
        self.instance_dir.join("bin")
    }

    pub fn mode(&self) -> Mode {
        if self.sql_controller.is_some() && self.dump_controller.is_some() && self.restore_controller.is_some() {
            Mode::Standard
        } else {
            Mode::Minimal
        }
    }

    pub fn has_sql(&self) -> bool {
        self.sql_controller.is_some()
    }

    pub fn has_dump(&self) -> bool {
        self.dump_controller.is_some()
    }

    pub fn has_restore(&self) -> bool {
        self.restore_controller.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::{binary_name, REQUIRED_BINARIES};

    #[test]
    fn required_binaries_cover_the_core_trio() {
        assert_eq!(REQUIRED_BINARIES, &["initdb", "pg_ctl", "postgres"]);
    }

    #[test]
    fn binary_name_is_platform_dependent() {
        let name = binary_name("pg_ctl");
        assert!(name == "pg_ctl" || name == "pg_ctl.exe");
    }
}
