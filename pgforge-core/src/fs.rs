//! Filesystem helpers shared by the archive, download, and instance-building
//! code: path-type probes, idempotent directory creation, filename
//! sanitisation, and atomic sentinel files.
//!
//! Sentinel creation is layered the same way [`crate::lock`] layers
//! process-safety over in-process safety: `O_CREAT|O_EXCL` (via
//! [`std::fs::OpenOptions::create_new`]) makes the touch atomic across
//! processes, and an `flock`-based [`crate::lock::UnlockedFile`] additionally
//! serializes racing callers within this process.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::lock;

#[derive(thiserror::Error, Debug)]
pub enum FsError {
    #[error("Input/output error")]
    IoError(#[from] io::Error),
    #[error("UNIX error")]
    UnixError(#[from] nix::Error),
    #[error("expected {0} to be a file")]
    NotAFile(PathBuf),
    #[error("expected {0} to be a directory")]
    NotADirectory(PathBuf),
    #[error("expected {0} not to be a file")]
    UnexpectedFile(PathBuf),
    #[error("expected {0} not to be a directory")]
    UnexpectedDirectory(PathBuf),
}

/// What kind of thing, if anything, exists at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    DoesNotExist,
    File,
    Directory,
}

pub fn probe(path: impl AsRef<Path>) -> PathKind {
    match fs::metadata(path) {
        Err(_) => PathKind::DoesNotExist,
        Ok(meta) if meta.is_dir() => PathKind::Directory,
        Ok(_) => PathKind::File,
    }
}

pub fn require_file(path: impl AsRef<Path>) -> Result<(), FsError> {
    match probe(&path) {
        PathKind::File => Ok(()),
        _ => Err(FsError::NotAFile(path.as_ref().to_owned())),
    }
}

pub fn require_directory(path: impl AsRef<Path>) -> Result<(), FsError> {
    match probe(&path) {
        PathKind::Directory => Ok(()),
        _ => Err(FsError::NotADirectory(path.as_ref().to_owned())),
    }
}

pub fn require_not_file(path: impl AsRef<Path>) -> Result<(), FsError> {
    match probe(&path) {
        PathKind::File => Err(FsError::UnexpectedFile(path.as_ref().to_owned())),
        _ => Ok(()),
    }
}

pub fn require_not_directory(path: impl AsRef<Path>) -> Result<(), FsError> {
    match probe(&path) {
        PathKind::Directory => Err(FsError::UnexpectedDirectory(path.as_ref().to_owned())),
        _ => Ok(()),
    }
}

/// Create `dir` and its parents if they don't exist. Fails if `dir` already
/// exists as a file.
pub fn ensure_directory(dir: impl AsRef<Path>) -> Result<(), FsError> {
    let dir = dir.as_ref();
    require_not_file(dir)?;
    if probe(dir) == PathKind::DoesNotExist {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Recursively copy `src` into `dest`.
pub fn copy_directory(src: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<(), FsError> {
    let src = src.as_ref();
    let dest = dest.as_ref();
    ensure_directory(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let dest_entry = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_directory(entry.path(), dest_entry)?;
        } else {
            fs::copy(entry.path(), dest_entry)?;
        }
    }
    Ok(())
}

/// Strip characters that are invalid in filenames on common platforms. If
/// anything was stripped, append a short hash of the original name so
/// distinct inputs still map to distinct, stable filenames.
pub fn convert_to_valid_filename(name: &str) -> String {
    const INVALID: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|', '\0'];
    let cleaned: String = name.chars().filter(|c| !INVALID.contains(c)).collect();
    if cleaned == name {
        return cleaned;
    }
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();
    format!("{cleaned}-{:x}", digest)
        .chars()
        .take(200)
        .collect()
}

/// Atomically create `path` if it does not already exist. Returns `true` iff
/// this call created it.
///
/// Serializes racing callers within this process with an `flock`, then
/// relies on `O_CREAT|O_EXCL` to make the actual creation atomic across
/// processes too.
pub fn touch_sentinel(path: impl AsRef<Path>) -> Result<bool, FsError> {
    let path = path.as_ref();
    let lock_path = path.with_extension("sentinel-lock");
    let lock = lock::UnlockedFile::try_from(lock_path.as_path())?;
    let lock = lock.lock_exclusive()?;
    let created = match fs::OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(_) => true,
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => false,
        Err(err) => return Err(err.into()),
    };
    lock.unlock()?;
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::{convert_to_valid_filename, ensure_directory, probe, touch_sentinel, PathKind};

    #[test]
    fn probe_distinguishes_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(probe(dir.path().join("missing")), PathKind::DoesNotExist);
        assert_eq!(probe(dir.path()), PathKind::Directory);
        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        assert_eq!(probe(&file), PathKind::File);
    }

    #[test]
    fn ensure_directory_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        ensure_directory(&nested).unwrap();
        ensure_directory(&nested).unwrap();
        assert_eq!(probe(&nested), PathKind::Directory);
    }

    #[test]
    fn valid_filenames_pass_through_unchanged() {
        assert_eq!(convert_to_valid_filename("postgres-16.2.zip"), "postgres-16.2.zip");
    }

    #[test]
    fn invalid_filenames_are_sanitized_distinctly() {
        let a = convert_to_valid_filename("weird/name:a");
        let b = convert_to_valid_filename("weird/name:b");
        assert_ne!(a, b);
        assert!(!a.contains('/') && !a.contains(':'));
    }

    #[test]
    fn touch_sentinel_only_creates_once() {
        let dir = tempfile::tempdir().unwrap();
        let sentinel = dir.path().join("permissions.sentinel");
        assert!(touch_sentinel(&sentinel).unwrap());
        assert!(!touch_sentinel(&sentinel).unwrap());
    }
}
