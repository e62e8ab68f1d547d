//! Download a file over HTTP(S) with retries, straight to disk.
//!
//! Built on `reqwest` with `default-features = false` plus `rustls-tls`, so
//! that this crate never shells out to a system OpenSSL. Retries are driven
//! by the same `backoff` idiom [`crate::coordinate::guard::Guard`] already
//! uses for cluster-startup contention (see [`crate::retry`]).

use std::io;
use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::fs::{convert_to_valid_filename, ensure_directory, require_not_directory, FsError};
use crate::retry;

#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    #[error("Input/output error")]
    IoError(#[from] io::Error),
    #[error(transparent)]
    FsError(#[from] FsError),
    #[error("HTTP request failed")]
    RequestError(#[from] reqwest::Error),
    #[error("Download was cancelled")]
    Cancelled,
}

/// Derive a deterministic local filename for `url`, sanitising it for the
/// local filesystem.
pub fn filename_for_url(url: &Url) -> String {
    let name = url
        .path_segments()
        .and_then(Iterator::last)
        .filter(|s| !s.is_empty())
        .unwrap_or("download");
    convert_to_valid_filename(name)
}

/// Download `url` into `dest_dir`, naming the file `dest_filename` or else
/// deriving one from the URL. If the file already exists and `force` is
/// false, the existing path is returned without any network activity.
pub async fn download(
    client: &reqwest::Client,
    url: &Url,
    dest_dir: impl AsRef<Path>,
    dest_filename: Option<&str>,
    force: bool,
    cancel: &CancellationToken,
) -> Result<PathBuf, DownloadError> {
    let dest_dir = dest_dir.as_ref();
    ensure_directory(dest_dir)?;

    let filename = dest_filename.map(ToOwned::to_owned).unwrap_or_else(|| filename_for_url(url));
    let dest_path = dest_dir.join(filename);

    if dest_path.exists() {
        require_not_directory(&dest_path)?;
        if !force {
            return Ok(dest_path);
        }
        tokio::fs::remove_file(&dest_path).await?;
    }

    let response = retry::retry_http(|| async {
        client
            .get(url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
    })
    .await?;

    let mut stream = response.bytes_stream();
    let mut file = tokio::fs::File::create(&dest_path).await?;
    loop {
        tokio::select! {
            chunk = stream.next() => {
                match chunk {
                    Some(chunk) => file.write_all(&chunk?).await?,
                    None => break,
                }
            }
            () = cancel.cancelled() => {
                drop(file);
                let _ = tokio::fs::remove_file(&dest_path).await;
                return Err(DownloadError::Cancelled);
            }
        }
    }
    file.flush().await?;
    Ok(dest_path)
}
