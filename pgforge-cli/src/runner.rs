use std::os::unix::prelude::OsStrExt;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use miette::{IntoDiagnostic, Result};
use url::Url;

use pgforge::{artifact::Artifact, lock};

use crate::args;

/// Check the exit status of a process and return an appropriate exit code.
pub(crate) fn check_exit(code: i32) -> ExitCode {
    u8::try_from(code).map(ExitCode::from).unwrap_or(ExitCode::FAILURE)
}

const UUID_NS: uuid::Uuid = uuid::Uuid::from_u128(93875103436633470414348750305797058811);

#[derive(thiserror::Error, miette::Diagnostic, Debug)]
pub(crate) enum LockForError {
    #[error("Could not canonicalize directory ({1})")]
    DirectoryError(#[source] std::io::Error, PathBuf),
    #[error("Could not create UUID-based lock file (uuid = {1})")]
    UuidLockError(#[source] std::io::Error, uuid::Uuid),
}

/// Provide an unlocked lock scoped to a path, so that two in-process
/// callers racing on the same instance or cluster directory serialize
/// through the same `flock`-based discipline.
pub(crate) fn lock_for<P: AsRef<Path>>(path: P) -> Result<(PathBuf, lock::UnlockedFile), LockForError> {
    let path = path.as_ref();
    let path = path.canonicalize().map_err(|err| LockForError::DirectoryError(err, path.into()))?;
    let name = path.as_os_str().as_bytes();
    let lock_uuid = uuid::Uuid::new_v5(&UUID_NS, name);
    let lock = lock::UnlockedFile::try_from(&lock_uuid).map_err(|err| LockForError::UuidLockError(err, lock_uuid))?;
    Ok((path, lock))
}

#[derive(thiserror::Error, miette::Diagnostic, Debug)]
pub(crate) enum ArtifactSpecError {
    #[error("{0:?} is neither a URL nor an existing local path")]
    Unrecognized(String),
}

/// Parse one `--main`/`--extension` argument: an `http(s)://` URL is a
/// remote artifact, anything else is treated as a local path.
fn parse_artifact_source(spec: &str) -> Result<pgforge::artifact::Source, ArtifactSpecError> {
    match Url::parse(spec) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(pgforge::artifact::Source::Remote(url)),
        _ => Ok(pgforge::artifact::Source::Local(PathBuf::from(spec))),
    }
}

pub(crate) fn parse_main_artifact(spec: &str) -> Result<Artifact, ArtifactSpecError> {
    Ok(match parse_artifact_source(spec)? {
        pgforge::artifact::Source::Local(path) => Artifact::main_local(path),
        pgforge::artifact::Source::Remote(url) => Artifact::main_remote(url),
    })
}

pub(crate) fn parse_extension_artifact(spec: &str) -> Result<Artifact, ArtifactSpecError> {
    Ok(match parse_artifact_source(spec)? {
        pgforge::artifact::Source::Local(path) => Artifact::extension_local(path),
        pgforge::artifact::Source::Remote(url) => Artifact::extension_remote(url),
    })
}

pub(crate) fn cache_dir(given: Option<PathBuf>) -> Result<PathBuf> {
    match given {
        Some(dir) => Ok(dir),
        None => dirs::cache_dir()
            .map(|dir| dir.join("pgforge"))
            .ok_or_else(|| miette::miette!("Could not determine a default cache directory; pass --cache-dir")),
    }
}

/// Build a `ClusterConfig` resolving `data_directory` against `instance_dir`
/// when it's relative.
pub(crate) fn cluster_config(
    instance_dir: &Path,
    args: args::ClusterArgs,
) -> Result<pgforge::controller::ClusterConfig> {
    let data_full_path =
        if args.data_directory.is_absolute() { args.data_directory.clone() } else { instance_dir.join(&args.data_directory) };
    let parameters = args.parameters().into_diagnostic()?;
    Ok(pgforge::controller::ClusterConfig {
        unique_id: args.unique_id,
        data_full_path,
        superuser: args.superuser,
        encoding: args.encoding,
        locale: args.locale,
        allow_group_access: Some(args.allow_group_access),
        host: args.host,
        port: args.port,
        parameters,
    })
}

/// Build a multi-thread tokio runtime; `Server`'s fan-out spawns one task
/// per cluster and expects them to make real parallel progress.
pub(crate) fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("building the tokio runtime failed")
        .block_on(future)
}
