//! Bind to a concrete, installed PostgreSQL runtime: a `bindir` containing
//! `pg_ctl`, `initdb`, `postgres`, etc., plus the version it reports.
//!
//! A [`Runtime`] may come from a pre-existing installation discovered via
//! [`strategy`], or from an [`Instance`][`crate::instance::Instance`] this
//! crate has downloaded and extracted; either way, once bound, it's used
//! the same way.

pub mod constraint;
pub mod error;
pub mod strategy;

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

pub use error::RuntimeError;

use crate::version::Version;

/// A concrete, usable PostgreSQL installation.
#[derive(Clone, Debug)]
pub struct Runtime {
    /// Directory containing `pg_ctl`, `initdb`, `postgres`, etc.
    pub bindir: PathBuf,
    /// The version reported by this runtime's `pg_ctl --version`.
    pub version: Version,
}

impl Runtime {
    /// Bind to the runtime at the given `bindir`, probing its version.
    ///
    /// Fails if `pg_ctl --version` cannot be run, or its output cannot be
    /// parsed as a [`Version`].
    pub fn new<P: AsRef<Path>>(bindir: P) -> Result<Self, RuntimeError> {
        let bindir = bindir.as_ref().to_owned();
        let version = version(&bindir)?;
        Ok(Self { bindir, version })
    }

    /// Build a [`Command`] that will invoke the named binary in this
    /// runtime's `bindir`, with no arguments.
    pub fn command<T: AsRef<OsStr>>(&self, name: T) -> Command {
        Command::new(self.bindir.join(name.as_ref()))
    }

    /// Build a [`Command`] that will invoke the named binary in this
    /// runtime's `bindir`, with `bindir` additionally prepended to `PATH`
    /// so the binary can find its siblings.
    pub fn execute<T: AsRef<OsStr>>(&self, name: T) -> Command {
        let mut command = self.command(name);
        if let Ok(path) = crate::util::prepend_to_path(&self.bindir, std::env::var_os("PATH")) {
            command.env("PATH", path);
        }
        command
    }
}

/// Run `pg_ctl --version` in the given `bindir` and parse the result.
fn version<P: AsRef<Path>>(bindir: P) -> Result<Version, RuntimeError> {
    let bindir = bindir.as_ref();
    let output = Command::new(bindir.join("pg_ctl")).arg("--version").output()?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.parse()?)
}
