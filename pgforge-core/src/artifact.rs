//! Describe where to get a PostgreSQL engine (or extension) from, and
//! materialize a set of such descriptions into local files.
//!
//! Grounded on the `PgFetchSettings`/cache-directory pattern from the
//! pg-embed-style examples, expressed with this crate's `thiserror` +
//! bounded-parallelism idioms (`futures::stream::buffer_unordered`, as used
//! for the `Server` façade's fan-out).

use std::io;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::archive::Strategy;
use crate::download::{self, DownloadError};
use crate::fs::FsError;

#[derive(thiserror::Error, miette::Diagnostic, Debug)]
pub enum ArtifactError {
    #[error("Artifact set must contain exactly one Main artifact, found {0}")]
    #[diagnostic(help("Add exactly one artifact with kind = Main"))]
    MissingMainArtifact(usize),
    #[error("Artifact sources must be unique; {0} is used more than once")]
    DuplicateSource(String),
    #[error("Local artifact {0} does not exist")]
    LocalArtifactMissing(PathBuf),
    #[error("Input/output error")]
    IoError(#[from] io::Error),
    #[error(transparent)]
    FsError(#[from] FsError),
    #[error(transparent)]
    DownloadError(#[from] DownloadError),
}

/// What role an artifact plays when building an [`crate::instance::Instance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// The PostgreSQL engine itself.
    Main,
    /// An additional extension archive, layered on top.
    Extension,
}

/// Where an artifact's bytes come from.
#[derive(Debug, Clone)]
pub enum Source {
    Local(PathBuf),
    Remote(Url),
}

/// A description of one artifact to acquire.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub kind: Kind,
    pub source: Source,
    /// Re-download even if a file with the expected name already sits in the
    /// cache directory.
    pub force: bool,
    /// Force a particular archive reader instead of inferring one from the
    /// downloaded/local file's extension.
    pub extraction_strategy: Option<Strategy>,
}

impl Artifact {
    pub fn main_remote(url: Url) -> Self {
        Self { kind: Kind::Main, source: Source::Remote(url), force: false, extraction_strategy: None }
    }

    pub fn main_local(path: impl Into<PathBuf>) -> Self {
        Self { kind: Kind::Main, source: Source::Local(path.into()), force: false, extraction_strategy: None }
    }

    pub fn extension_remote(url: Url) -> Self {
        Self { kind: Kind::Extension, source: Source::Remote(url), force: false, extraction_strategy: None }
    }

    pub fn extension_local(path: impl Into<PathBuf>) -> Self {
        Self { kind: Kind::Extension, source: Source::Local(path.into()), force: false, extraction_strategy: None }
    }

    fn source_key(&self) -> String {
        match &self.source {
            Source::Local(path) => path.display().to_string(),
            Source::Remote(url) => url.to_string(),
        }
    }
}

/// An [`Artifact`] whose bytes are now available on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalArtifact {
    pub kind: Kind,
    pub path: PathBuf,
    pub extraction_strategy: Option<Strategy>,
}

fn validate(artifacts: &[Artifact]) -> Result<(), ArtifactError> {
    let main_count = artifacts.iter().filter(|a| a.kind == Kind::Main).count();
    if main_count != 1 {
        return Err(ArtifactError::MissingMainArtifact(main_count));
    }
    let mut seen = std::collections::HashSet::new();
    for artifact in artifacts {
        if !seen.insert(artifact.source_key()) {
            return Err(ArtifactError::DuplicateSource(artifact.source_key()));
        }
        if let Source::Local(path) = &artifact.source {
            if !path.is_file() {
                return Err(ArtifactError::LocalArtifactMissing(path.clone()));
            }
        }
    }
    Ok(())
}

/// Materialize `artifacts`, downloading any remote ones into `cache_dir`
/// with bounded parallelism.
pub async fn build(
    client: &reqwest::Client,
    artifacts: &[Artifact],
    cache_dir: impl AsRef<Path>,
    max_parallel: usize,
    cancel: &CancellationToken,
) -> Result<Vec<LocalArtifact>, ArtifactError> {
    validate(artifacts)?;
    let cache_dir = cache_dir.as_ref();

    let results: Vec<Result<LocalArtifact, ArtifactError>> = stream::iter(artifacts.iter().cloned())
        .map(|artifact| async move {
            match artifact.source {
                Source::Local(path) => {
                    Ok(LocalArtifact { kind: artifact.kind, path, extraction_strategy: artifact.extraction_strategy })
                }
                Source::Remote(url) => {
                    let path = download::download(client, &url, cache_dir, None, artifact.force, cancel).await?;
                    Ok(LocalArtifact { kind: artifact.kind, path, extraction_strategy: artifact.extraction_strategy })
                }
            }
        })
        .buffer_unordered(max_parallel.max(1))
        .collect()
        .await;

    results.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::{validate, Artifact};
    use url::Url;

    #[test]
    fn rejects_when_no_main_artifact_present() {
        let artifacts = vec![Artifact::extension_remote(Url::parse("https://example.com/ext.zip").unwrap())];
        assert!(validate(&artifacts).is_err());
    }

    #[test]
    fn rejects_when_local_artifact_is_missing() {
        let artifacts = vec![Artifact::main_local("/nonexistent/path/to/postgres.zip")];
        assert!(validate(&artifacts).is_err());
    }

    #[test]
    fn accepts_single_main_local_artifact() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let artifacts = vec![Artifact::main_local(file.path())];
        assert!(validate(&artifacts).is_ok());
    }

    #[test]
    fn rejects_duplicate_sources() {
        let url = Url::parse("https://example.com/pg.zip").unwrap();
        let artifacts = vec![Artifact::main_remote(url.clone()), Artifact::extension_remote(url)];
        assert!(validate(&artifacts).is_err());
    }
}
