//! Compress a cluster's data directory to a zip file, and restore one back.
//!
//! A different feature from [`super::backup`]'s continuous WAL archiving:
//! this is the spec's "stop, zip the data directory, done" snapshot, not an
//! `archive_command` pipeline. Reuses `backup`'s locked-temp-file-then-
//! atomic-rename idiom so a reader never observes a half-written archive.

use std::io;
use std::path::Path;

use tokio::task::block_in_place;

use crate::archive::{ArchiveError, Compressor, ExtractOptions, ExtractorFactory};
use crate::lock;
use crate::prelude::CoordinateError;

#[derive(thiserror::Error, Debug)]
pub enum ClusterArchiveError {
    #[error("Input/output error")]
    IoError(#[from] io::Error),
    #[error(transparent)]
    ArchiveError(#[from] ArchiveError),
    #[error(transparent)]
    CoordinateError(#[from] CoordinateError<std::convert::Infallible>),
}

/// Compress `data_dir` into `archive_path`, without including `data_dir`'s
/// own name as a path prefix inside the zip. The caller is responsible for
/// making sure the cluster is stopped first.
pub fn compress(data_dir: &Path, archive_path: &Path) -> Result<(), ClusterArchiveError> {
    let parent = archive_path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let lock_path = parent.join(".archive.lock");
    let lock = block_in_place(|| {
        lock::UnlockedFile::try_from(lock_path.as_path())?
            .lock_exclusive()
            .map_err(CoordinateError::UnixError)
    })?;

    let staging = tempfile::NamedTempFile::new_in(parent)?;
    Compressor { include_root: false, exclude: None }.compress(data_dir, staging.path())?;
    staging.persist(archive_path).map_err(|err| err.error)?;

    lock.unlock().map_err(CoordinateError::UnixError)?;
    Ok(())
}

/// Extract `archive_path` into `data_dir`, which must not already contain a
/// cluster (the caller runs this as part of the archive-restore
/// initializer).
pub fn restore(archive_path: &Path, data_dir: &Path) -> Result<(), ClusterArchiveError> {
    std::fs::create_dir_all(data_dir)?;
    let factory = ExtractorFactory::new();
    let extractor = factory.for_extension(archive_path);
    let cancel = tokio_util::sync::CancellationToken::new();
    extractor.extract(archive_path, data_dir, &ExtractOptions::default(), &cancel)?;
    Ok(())
}
