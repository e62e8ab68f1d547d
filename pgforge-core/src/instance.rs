//! Materialize a usable PostgreSQL installation on disk from a set of
//! [`crate::artifact::Artifact`]s.
//!
//! Where [`crate::runtime::strategy`] finds a runtime that's already
//! installed, an [`Instance`] builds one: it downloads/extracts the Main
//! artifact plus any Extension artifacts into a directory, and hands back a
//! [`crate::runtime::Runtime`] bound to it (`Strategy::Single`, see the
//! `runtime` module's doc comment).

use std::io;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::archive::{ArchiveError, ExtractOptions, ExtractorFactory};
use crate::artifact::{ArtifactError, Kind, LocalArtifact};
use crate::fs::{ensure_directory, FsError};

#[derive(thiserror::Error, Debug)]
pub enum InstanceError {
    #[error("Input/output error")]
    IoError(#[from] io::Error),
    #[error(transparent)]
    FsError(#[from] FsError),
    #[error(transparent)]
    ArtifactError(#[from] ArtifactError),
    #[error(transparent)]
    ArchiveError(#[from] ArchiveError),
    #[error("Extraction was cancelled")]
    Cancelled,
}

/// Where an [`Instance`] is built, and how.
#[derive(Debug, Clone)]
pub struct InstanceOptions {
    pub instance_dir: PathBuf,
    /// Delete `instance_dir` before building, if it already exists.
    pub clean_install: bool,
    /// Drop `pgsql/pgAdmin*` entries from the Main artifact, matching the
    /// upstream EDB distribution layout that bundles pgAdmin alongside the
    /// engine.
    pub exclude_pg_admin: bool,
}

/// A PostgreSQL installation materialized on disk from downloaded artifacts.
#[derive(Debug, Clone)]
pub struct Instance {
    dir: PathBuf,
}

impl Instance {
    /// The directory this instance was extracted into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The `bin/` subdirectory, where `pg_ctl`/`initdb`/`postgres` live.
    pub fn bin_dir(&self) -> PathBuf {
        self.dir.join("bin")
    }

    /// Build an instance at `options.instance_dir` from already-localized
    /// `artifacts` (see [`crate::artifact::build`]).
    pub async fn build(
        options: &InstanceOptions,
        artifacts: &[LocalArtifact],
        cancel: &CancellationToken,
    ) -> Result<Self, InstanceError> {
        if options.clean_install && options.instance_dir.exists() {
            tokio::fs::remove_dir_all(&options.instance_dir).await?;
        }
        ensure_directory(&options.instance_dir)?;

        let factory = ExtractorFactory::new();

        let main = artifacts
            .iter()
            .find(|a| a.kind == Kind::Main)
            .expect("artifact::build already validated exactly one Main artifact");

        let exclude_pg_admin = options.exclude_pg_admin;
        let extract_options = ExtractOptions {
            exclude: exclude_pg_admin.then_some(exclude_pg_admin_entry as fn(&str) -> bool),
            ignore_root_dir: true,
            only_under: None,
        };
        let extractor = match main.extraction_strategy {
            Some(strategy) => factory.for_strategy(strategy),
            None => factory.for_extension(&main.path),
        };
        let instance_dir = options.instance_dir.clone();
        let main_path = main.path.clone();
        let main_cancel = cancel.clone();
        tokio::task::spawn_blocking(move || extractor.extract(&main_path, &instance_dir, &extract_options, &main_cancel))
            .await
            .expect("extraction task panicked")?;

        let extension_results: Vec<Result<(), InstanceError>> = stream::iter(
            artifacts.iter().filter(|a| a.kind == Kind::Extension).cloned(),
        )
        .map(|artifact| {
            let factory = factory.clone();
            let instance_dir = options.instance_dir.clone();
            let cancel = cancel.clone();
            async move {
                tokio::task::spawn_blocking(move || {
                    extract_extension(&factory, &artifact.path, artifact.extraction_strategy, &instance_dir, &cancel)
                })
                .await
                .expect("extraction task panicked")
            }
        })
        .buffer_unordered(4)
        .collect()
        .await;
        extension_results.into_iter().collect::<Result<Vec<()>, _>>()?;

        Ok(Self { dir: options.instance_dir.clone() })
    }

    /// Delete the instance directory if it exists.
    pub async fn destroy(options: &InstanceOptions) -> Result<(), InstanceError> {
        match tokio::fs::remove_dir_all(&options.instance_dir).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn exclude_pg_admin_entry(key: &str) -> bool {
    key.starts_with("pgsql/pgAdmin")
}

/// Extensions are sometimes wrapped in a single top-level directory (one
/// with `bin/`, `lib/`, or `share/` beneath it); detect that and drop the
/// wrapper, otherwise extract as-is.
fn extract_extension(
    factory: &ExtractorFactory,
    archive_path: &Path,
    extraction_strategy: Option<crate::archive::Strategy>,
    instance_dir: &Path,
    cancel: &CancellationToken,
) -> Result<(), InstanceError> {
    let extractor = match extraction_strategy {
        Some(strategy) => factory.for_strategy(strategy),
        None => factory.for_extension(archive_path),
    };
    let entries = extractor.enumerate(archive_path)?;
    let container = entries.iter().find_map(|entry| {
        ["/bin/", "/lib/", "/share/"]
            .iter()
            .find_map(|marker| entry.key.split_once(marker).map(|(root, _)| format!("{root}{marker}")))
    });

    let options = match &container {
        Some(prefix) => ExtractOptions { only_under: Some(prefix.trim_end_matches('/')), ..ExtractOptions::default() },
        None => ExtractOptions::default(),
    };
    extractor.extract(archive_path, instance_dir, &options, cancel)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{exclude_pg_admin_entry, Instance, InstanceOptions};
    use crate::archive::Compressor;
    use crate::artifact::{Kind, LocalArtifact};
    use std::fs;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn excludes_pgadmin_entries_by_prefix() {
        assert!(exclude_pg_admin_entry("pgsql/pgAdmin 4/web"));
        assert!(!exclude_pg_admin_entry("pgsql/bin/postgres"));
    }

    #[tokio::test]
    async fn build_extracts_main_artifact_into_instance_dir() {
        let src = tempfile::tempdir().unwrap();
        fs::create_dir(src.path().join("pgsql")).unwrap();
        fs::create_dir(src.path().join("pgsql/bin")).unwrap();
        fs::write(src.path().join("pgsql/bin/pg_ctl"), b"fake").unwrap();

        let zip_path = src.path().join("../main.zip");
        Compressor::default().compress(src.path(), &zip_path).unwrap();

        let instance_dir = tempfile::tempdir().unwrap();
        let options = InstanceOptions {
            instance_dir: instance_dir.path().to_owned(),
            clean_install: false,
            exclude_pg_admin: false,
        };
        let artifacts = vec![LocalArtifact { kind: Kind::Main, path: zip_path, extraction_strategy: None }];
        let cancel = CancellationToken::new();
        let instance = Instance::build(&options, &artifacts, &cancel).await.unwrap();
        assert!(instance.bin_dir().join("pg_ctl").is_file());
    }
}
