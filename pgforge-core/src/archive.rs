//! Read and write the archive formats that PostgreSQL binary distributions
//! ship in: plain zip, tar+xz/gzip, and the two-level "zonky" jar-wrapping-a-txz
//! layout used by some Maven-published distributions.
//!
//! Archive extraction has no precedent elsewhere in this codebase –
//! PostgreSQL was always assumed pre-installed – so this module follows
//! the conventions of pg-embed-style archive handling instead, adapted to
//! this crate's `thiserror` conventions.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

#[derive(thiserror::Error, Debug)]
pub enum ArchiveError {
    #[error("Input/output error")]
    IoError(#[from] io::Error),
    #[error("Zip error")]
    ZipError(#[from] zip::result::ZipError),
    #[error("Archive extraction was cancelled")]
    Cancelled,
    #[error("Unrecognised archive strategy: {0}")]
    UnknownStrategy(String),
    #[error("Archive has no recognisable entries to extract")]
    Empty,
}

/// One entry in an archive, as reported by [`Extractor::enumerate`].
#[derive(Debug, Clone)]
pub struct Entry {
    pub key: String,
    pub is_directory: bool,
    pub size: u64,
}

/// Which extraction/compression strategy to use, selected by name or by file
/// extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Plain zip reader; skips directory entries.
    System,
    /// Dispatches between zip and tar+(xz|gz) based on probed content.
    Sharp,
    /// A `.jar` wrapping a `.txz`, unpacked in two stages.
    Zonky,
}

impl Strategy {
    /// Infer a strategy from a file's extension, defaulting to [`Strategy::Sharp`].
    pub fn from_extension(path: impl AsRef<Path>) -> Self {
        match path.as_ref().extension().and_then(|ext| ext.to_str()) {
            Some("jar") => Self::Zonky,
            _ => Self::Sharp,
        }
    }
}

impl std::str::FromStr for Strategy {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zonky" => Ok(Self::Zonky),
            "system" => Ok(Self::System),
            "sharp" => Ok(Self::Sharp),
            other => Err(ArchiveError::UnknownStrategy(other.to_owned())),
        }
    }
}

/// Options controlling an extraction.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions<'a> {
    /// Skip entries whose key this predicate rejects.
    pub exclude: Option<fn(&str) -> bool>,
    /// Drop the first path segment of every entry's key.
    pub ignore_root_dir: bool,
    pub only_under: Option<&'a str>,
}

/// A cheaply-clonable handle that dispatches to the right [`Strategy`].
///
/// `Arc`-wrapped because the Zonky strategy needs to call back into the
/// factory to extract the `.txz` it unwraps – expressing this as a handle
/// avoids a construction cycle between Zonky and System/Sharp.
#[derive(Clone)]
pub struct ExtractorFactory(Arc<()>);

impl Default for ExtractorFactory {
    fn default() -> Self {
        Self(Arc::new(()))
    }
}

impl ExtractorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_strategy(&self, strategy: Strategy) -> Extractor {
        Extractor { factory: self.clone(), strategy }
    }

    pub fn for_extension(&self, path: impl AsRef<Path>) -> Extractor {
        self.for_strategy(Strategy::from_extension(path))
    }
}

pub struct Extractor {
    factory: ExtractorFactory,
    strategy: Strategy,
}

impl Extractor {
    pub fn enumerate(&self, source: impl AsRef<Path>) -> Result<Vec<Entry>, ArchiveError> {
        match self.strategy {
            Strategy::System => enumerate_zip(source.as_ref()),
            Strategy::Sharp => enumerate_sharp(source.as_ref()),
            Strategy::Zonky => enumerate_zip(source.as_ref()),
        }
    }

    pub fn extract(
        &self,
        source: impl AsRef<Path>,
        dest_dir: impl AsRef<Path>,
        options: &ExtractOptions<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), ArchiveError> {
        let source = source.as_ref();
        let dest_dir = dest_dir.as_ref();
        fs::create_dir_all(dest_dir)?;
        match self.strategy {
            Strategy::System => extract_zip(source, dest_dir, options, cancel),
            Strategy::Sharp => extract_sharp(source, dest_dir, options, cancel),
            Strategy::Zonky => {
                let staging = tempfile::tempdir()?;
                extract_zip(source, staging.path(), &ExtractOptions::default(), cancel)?;
                let txz = find_single_entry_with_extension(staging.path(), "txz")?;
                self.factory
                    .for_strategy(Strategy::Sharp)
                    .extract(txz, dest_dir, options, cancel)
            }
        }
    }
}

fn find_single_entry_with_extension(dir: &Path, ext: &str) -> Result<PathBuf, ArchiveError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.path().extension().and_then(|e| e.to_str()) == Some(ext) {
            return Ok(entry.path());
        }
    }
    Err(ArchiveError::Empty)
}

fn strip_root(key: &str) -> String {
    match key.split_once('/') {
        Some((_, rest)) => rest.to_owned(),
        None => key.to_owned(),
    }
}

fn is_included(key: &str, options: &ExtractOptions<'_>) -> Option<String> {
    if let Some(exclude) = options.exclude {
        if exclude(key) {
            return None;
        }
    }
    let key = if options.ignore_root_dir { strip_root(key) } else { key.to_owned() };
    match options.only_under {
        Some(prefix) => key.strip_prefix(prefix).map(|rest| rest.trim_start_matches('/').to_owned()),
        None => Some(key),
    }
}

fn enumerate_zip(source: &Path) -> Result<Vec<Entry>, ArchiveError> {
    let file = fs::File::open(source)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        entries.push(Entry {
            key: entry.name().to_owned(),
            is_directory: entry.is_dir(),
            size: entry.size(),
        });
    }
    Ok(entries)
}

fn extract_zip(
    source: &Path,
    dest_dir: &Path,
    options: &ExtractOptions<'_>,
    cancel: &CancellationToken,
) -> Result<(), ArchiveError> {
    let file = fs::File::open(source)?;
    let mut archive = zip::ZipArchive::new(file)?;
    for i in 0..archive.len() {
        if cancel.is_cancelled() {
            return Err(ArchiveError::Cancelled);
        }
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let Some(key) = is_included(entry.name(), options) else { continue };
        if key.is_empty() {
            continue;
        }
        let dest_path = dest_dir.join(&key);
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&dest_path)?;
        io::copy(&mut entry, &mut out)?;
    }
    Ok(())
}

fn enumerate_sharp(source: &Path) -> Result<Vec<Entry>, ArchiveError> {
    if source.extension().and_then(|e| e.to_str()) == Some("zip") {
        return enumerate_zip(source);
    }
    let mut archive = open_tar(source)?;
    let mut entries = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        entries.push(Entry {
            key: entry.path()?.to_string_lossy().into_owned(),
            is_directory: entry.header().entry_type().is_dir(),
            size: entry.header().size()?,
        });
    }
    Ok(entries)
}

/// A general multi-format reader: dispatches between zip and tar+(xz|gz)
/// based on the extension (full content sniffing is left to a future
/// revision; the corpus's extractors all key off the download's declared
/// extension).
fn extract_sharp(
    source: &Path,
    dest_dir: &Path,
    options: &ExtractOptions<'_>,
    cancel: &CancellationToken,
) -> Result<(), ArchiveError> {
    if source.extension().and_then(|e| e.to_str()) == Some("zip") {
        return extract_zip(source, dest_dir, options, cancel);
    }

    let mut archive = open_tar(source)?;
    let mut symlinks = Vec::new();
    for entry in archive.entries()? {
        if cancel.is_cancelled() {
            return Err(ArchiveError::Cancelled);
        }
        let mut entry = entry?;
        let path_in_archive = entry.path()?.to_string_lossy().into_owned();
        let Some(key) = is_included(&path_in_archive, options) else { continue };
        if key.is_empty() {
            continue;
        }
        let dest_path = dest_dir.join(&key);
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }
        if let Some(link_target) = entry.link_name()? {
            symlinks.push((dest_path, link_target.into_owned()));
            continue;
        }
        match entry.header().entry_type() {
            tar::EntryType::Directory => fs::create_dir_all(&dest_path)?,
            _ if entry.header().size()? == 0 => {
                fs::File::create(&dest_path)?;
            }
            _ => {
                let mut out = fs::File::create(&dest_path)?;
                io::copy(&mut entry, &mut out)?;
            }
        }
    }
    // Materialise recorded symlinks by copying their target, as a
    // portability fallback for platforms without symlink permissions.
    for (dest_path, target) in symlinks {
        let target_path = dest_path.parent().unwrap_or(dest_dir).join(target);
        if target_path.is_dir() {
            copy_dir_recursive(&target_path, &dest_path)?;
        } else if let Ok(mut src) = fs::File::open(&target_path) {
            let mut out = fs::File::create(&dest_path)?;
            io::copy(&mut src, &mut out)?;
        }
    }
    Ok(())
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<(), ArchiveError> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let dest_entry = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &dest_entry)?;
        } else {
            fs::copy(entry.path(), dest_entry)?;
        }
    }
    Ok(())
}

fn open_tar(source: &Path) -> Result<tar::Archive<Box<dyn Read>>, ArchiveError> {
    let file = fs::File::open(source)?;
    let reader: Box<dyn Read> = match source.extension().and_then(|e| e.to_str()) {
        Some("xz") | Some("txz") => Box::new(xz2::read::XzDecoder::new(file)),
        Some("gz") | Some("tgz") => Box::new(flate2::read::GzDecoder::new(file)),
        _ => Box::new(file),
    };
    Ok(tar::Archive::new(reader))
}

/// Write a zip archive from a file or directory tree.
#[derive(Default)]
pub struct Compressor {
    pub include_root: bool,
    pub exclude: Option<fn(&Path) -> bool>,
}

impl Compressor {
    pub fn compress(&self, source: impl AsRef<Path>, dest_zip: impl AsRef<Path>) -> Result<(), ArchiveError> {
        let source = source.as_ref();
        let dest_zip = dest_zip.as_ref();
        let file = fs::File::create(dest_zip)?;
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        if source.is_file() {
            let name = source.file_name().unwrap_or_default().to_string_lossy().into_owned();
            writer.start_file(name, options)?;
            let mut input = fs::File::open(source)?;
            io::copy(&mut input, &mut writer)?;
        } else {
            let base = if self.include_root {
                source.parent().unwrap_or(source)
            } else {
                source
            };
            self.add_directory(&mut writer, source, base, options)?;
        }
        writer.finish()?;
        Ok(())
    }

    fn add_directory(
        &self,
        writer: &mut zip::ZipWriter<fs::File>,
        dir: &Path,
        base: &Path,
        options: zip::write::SimpleFileOptions,
    ) -> Result<(), ArchiveError> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if let Some(exclude) = self.exclude {
                if exclude(&path) {
                    continue;
                }
            }
            let relative = path.strip_prefix(base).unwrap_or(&path).to_string_lossy().replace('\\', "/");
            if entry.file_type()?.is_dir() {
                writer.add_directory(format!("{relative}/"), options)?;
                self.add_directory(writer, &path, base, options)?;
            } else {
                writer.start_file(relative, options)?;
                let mut input = fs::File::open(&path)?;
                io::copy(&mut input, writer)?;
            }
        }
        Ok(())
    }
}
