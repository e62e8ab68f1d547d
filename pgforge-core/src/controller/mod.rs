//! Typed wrappers around the PostgreSQL CLI tools, each binding
//! `{binary path, cluster configuration, command executor}`.
//!
//! Covers the full set of tools an [`crate::environment::Environment`] may
//! have available (`initdb`, `pg_ctl`, `psql`, `pg_dump`, `pg_restore`).

pub mod dump;
pub mod initdb;
pub mod pg_ctl;
pub mod psql;
pub mod restore;

use std::path::PathBuf;

pub use dump::{DumpController, DumpOptions};
pub use initdb::InitDb;
pub use pg_ctl::{DataClusterController, RuntimeStatus, ShutdownMode, ShutdownParams};
pub use psql::{OutputFormat, SqlController};
pub use restore::{RestoreController, RestoreOptions, TargetFormat};

/// The subset of `DataClusterConfiguration` every controller needs: enough
/// to locate the data directory and authenticate against it.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub unique_id: String,
    /// Resolved, absolute path (the "dataFullPath" in the wider spec's
    /// vocabulary); relative `dataDirectory`/instance-dir joining is the
    /// caller's responsibility before constructing this.
    pub data_full_path: PathBuf,
    pub superuser: String,
    pub encoding: String,
    pub locale: Option<String>,
    pub allow_group_access: Option<bool>,
    pub host: String,
    pub port: u16,
    pub parameters: Vec<(String, String)>,
}
