use std::path::PathBuf;

use clap::Args;

#[derive(Args, Debug)]
pub struct InstanceArgs {
    /// The directory the instance lives (or will be materialized) in.
    #[clap(short = 'I', long = "instance-dir", env = "PGFORGE_INSTANCE", value_name = "DIR", display_order = 1)]
    pub dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct ArtifactArgs {
    /// Where to get the PostgreSQL engine from: a local path or an
    /// `http(s)://` URL to a binary bundle.
    #[clap(long = "main", value_name = "PATH-OR-URL", display_order = 10)]
    pub main: String,

    /// An extension archive to layer on top of the engine (local path or
    /// URL). May be given more than once.
    #[clap(long = "extension", value_name = "PATH-OR-URL", display_order = 11)]
    pub extensions: Vec<String>,

    /// Where downloaded artifacts are cached.
    #[clap(long = "cache-dir", env = "PGFORGE_CACHE", value_name = "DIR", display_order = 12)]
    pub cache_dir: Option<PathBuf>,

    /// How many artifacts to download concurrently.
    #[clap(long = "max-parallel-downloads", default_value_t = 4, display_order = 13)]
    pub max_parallel_downloads: usize,
}

#[derive(Args, Debug, Default)]
pub struct PlatformArgs {
    /// Reset file attributes on every extracted entry after unpacking.
    #[clap(long = "normalize-attributes", display_order = 20)]
    pub normalize_attributes: bool,

    /// `chmod +x` the required binaries after extraction (POSIX only).
    #[clap(long = "set-executable-attributes", default_value_t = true, display_order = 21)]
    pub set_executable_attributes: bool,

    /// Grant the current user full control of the instance tree (Windows
    /// only; a no-op elsewhere).
    #[clap(long = "add-local-user-access", display_order = 22)]
    pub add_local_user_access_permission: bool,
}

impl From<PlatformArgs> for pgforge::environment::PlatformParameters {
    fn from(args: PlatformArgs) -> Self {
        Self {
            normalize_attributes: args.normalize_attributes,
            set_executable_attributes: args.set_executable_attributes,
            add_local_user_access_permission: args.add_local_user_access_permission,
        }
    }
}

#[derive(Args, Debug)]
pub struct ClusterArgs {
    /// An identifier for this cluster, unique within the instance.
    #[clap(short = 'c', long = "cluster", default_value = "main", display_order = 30)]
    pub unique_id: String,

    /// The cluster's data directory, relative to the instance directory
    /// unless given as an absolute path.
    #[clap(short = 'D', long = "datadir", env = "PGDATA", value_name = "PGDATA", default_value = "data", display_order = 31)]
    pub data_directory: PathBuf,

    #[clap(long = "superuser", env = "PGUSER", default_value = "postgres", display_order = 32)]
    pub superuser: String,

    #[clap(long = "encoding", default_value = "UTF-8", display_order = 33)]
    pub encoding: String,

    #[clap(long = "locale", display_order = 34)]
    pub locale: Option<String>,

    #[clap(long = "allow-group-access", display_order = 35)]
    pub allow_group_access: bool,

    #[clap(long = "host", env = "PGHOST", default_value = "localhost", display_order = 36)]
    pub host: String,

    #[clap(short = 'p', long = "port", env = "PGPORT", display_order = 37)]
    pub port: u16,

    /// A PostgreSQL server parameter, `key=value`, passed via `-c` at
    /// start. May be given more than once.
    #[clap(long = "param", value_name = "KEY=VALUE", display_order = 38)]
    pub parameters: Vec<String>,
}

#[derive(thiserror::Error, miette::Diagnostic, Debug)]
pub enum ClusterArgsError {
    #[error("cluster parameter {0:?} is not in KEY=VALUE form")]
    MalformedParameter(String),
}

impl ClusterArgs {
    pub fn parameters(&self) -> Result<Vec<(String, String)>, ClusterArgsError> {
        self.parameters
            .iter()
            .map(|entry| {
                entry
                    .split_once('=')
                    .map(|(key, value)| (key.to_owned(), value.to_owned()))
                    .ok_or_else(|| ClusterArgsError::MalformedParameter(entry.clone()))
            })
            .collect()
    }
}

#[derive(Args, Debug, Default)]
pub struct ShutdownArgs {
    /// How `pg_ctl stop` should ask the server to shut down.
    #[clap(long = "shutdown-mode", value_enum, default_value_t = ShutdownMode::Fast, display_order = 90)]
    pub mode: ShutdownMode,

    /// Wait for the server to actually stop before returning.
    #[clap(long = "wait", default_value_t = true, display_order = 91)]
    pub wait: bool,

    #[clap(long = "shutdown-timeout-secs", default_value_t = 60, display_order = 92)]
    pub timeout_secs: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ShutdownMode {
    Smart,
    Fast,
    Immediate,
}

impl Default for ShutdownMode {
    fn default() -> Self {
        Self::Fast
    }
}

impl From<ShutdownArgs> for pgforge::controller::ShutdownParams {
    fn from(args: ShutdownArgs) -> Self {
        let mode = match args.mode {
            ShutdownMode::Smart => pgforge::controller::ShutdownMode::Smart,
            ShutdownMode::Fast => pgforge::controller::ShutdownMode::Fast,
            ShutdownMode::Immediate => pgforge::controller::ShutdownMode::Immediate,
        };
        Self { mode, wait: args.wait, timeout_secs: args.timeout_secs }
    }
}
