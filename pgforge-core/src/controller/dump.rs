//! Wraps `pg_dump`.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::command::{self, CommandError, Invocation, Line};

use super::restore::TargetFormat;
use super::ClusterConfig;

#[derive(thiserror::Error, Debug)]
pub enum DumpError {
    #[error(transparent)]
    CommandError(#[from] CommandError),
    #[error("data-only and schema-only are mutually exclusive")]
    ConflictingScopeOptions,
}

#[derive(Debug, Clone, Default)]
pub struct DumpOptions {
    pub database: String,
    pub format: TargetFormat,
    pub output_path: PathBuf,
    pub data_only: bool,
    pub schema_only: bool,
    pub schemas_to_dump: Vec<String>,
    pub schemas_to_exclude: Vec<String>,
    pub tables_to_dump: Vec<String>,
    pub tables_to_exclude: Vec<String>,
    pub password: Option<String>,
}

impl DumpOptions {
    fn validate(&self) -> Result<(), DumpError> {
        if self.data_only && self.schema_only {
            return Err(DumpError::ConflictingScopeOptions);
        }
        Ok(())
    }
}

/// Binds the `pg_dump` binary for one environment.
#[derive(Debug, Clone)]
pub struct DumpController {
    binary: PathBuf,
}

impl DumpController {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    pub async fn dump(&self, cluster: &ClusterConfig, options: &DumpOptions, cancel: &CancellationToken) -> Result<(), DumpError> {
        options.validate()?;
        let port = cluster.port.to_string();

        let mut invocation = Invocation::new(&self.binary)
            .arg("-U")
            .arg(&cluster.superuser)
            .arg("-h")
            .arg(&cluster.host)
            .arg("-p")
            .arg(&port)
            .arg("-F")
            .arg(options.format.as_flag())
            .arg("-f")
            .arg(&options.output_path);

        if options.data_only {
            invocation = invocation.arg("--data-only");
        }
        if options.schema_only {
            invocation = invocation.arg("--schema-only");
        }
        for schema in &options.schemas_to_dump {
            invocation = invocation.arg("-n").arg(schema);
        }
        for schema in &options.schemas_to_exclude {
            invocation = invocation.arg("-N").arg(schema);
        }
        for table in &options.tables_to_dump {
            invocation = invocation.arg("-t").arg(table);
        }
        for table in &options.tables_to_exclude {
            invocation = invocation.arg("-T").arg(table);
        }
        invocation = invocation.arg(&options.database);
        if let Some(password) = &options.password {
            invocation = invocation.env("PGPASSWORD", password);
        }

        command::execute_streaming(&invocation, true, route_stderr_to_log, cancel).await?;
        Ok(())
    }
}

fn route_stderr_to_log(line: Line) {
    if let Line::Stderr(line) = line {
        log::warn!("pg_dump: {line}");
    }
}
