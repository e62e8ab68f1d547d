//! Wraps `pg_restore`.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::command::{self, CommandError, Invocation, Line};

use super::ClusterConfig;

#[derive(thiserror::Error, Debug)]
pub enum RestoreError {
    #[error(transparent)]
    CommandError(#[from] CommandError),
    #[error("data-only and schema-only are mutually exclusive")]
    ConflictingScopeOptions,
}

/// `pg_dump -F`/`pg_restore -F` format letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetFormat {
    Custom,
    Directory,
    Tar,
    #[default]
    Plain,
}

impl TargetFormat {
    pub fn as_flag(self) -> &'static str {
        match self {
            Self::Custom => "c",
            Self::Directory => "d",
            Self::Tar => "t",
            Self::Plain => "p",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    pub database: String,
    pub format: TargetFormat,
    pub input_path: PathBuf,
    pub data_only: bool,
    pub schema_only: bool,
    pub tables_to_restore: Vec<String>,
    pub password: Option<String>,
}

impl RestoreOptions {
    fn validate(&self) -> Result<(), RestoreError> {
        if self.data_only && self.schema_only {
            return Err(RestoreError::ConflictingScopeOptions);
        }
        Ok(())
    }
}

/// Binds the `pg_restore` binary for one environment.
#[derive(Debug, Clone)]
pub struct RestoreController {
    binary: PathBuf,
}

impl RestoreController {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    pub async fn restore(&self, cluster: &ClusterConfig, options: &RestoreOptions, cancel: &CancellationToken) -> Result<(), RestoreError> {
        options.validate()?;
        let port = cluster.port.to_string();

        let mut invocation = Invocation::new(&self.binary)
            .arg("-U")
            .arg(&cluster.superuser)
            .arg("-h")
            .arg(&cluster.host)
            .arg("-p")
            .arg(&port)
            .arg("-d")
            .arg(&options.database)
            .arg("-F")
            .arg(options.format.as_flag());

        if options.data_only {
            invocation = invocation.arg("--data-only");
        }
        if options.schema_only {
            invocation = invocation.arg("--schema-only");
        }
        for table in &options.tables_to_restore {
            invocation = invocation.arg("-t").arg(table);
        }
        invocation = invocation.arg(&options.input_path);
        if let Some(password) = &options.password {
            invocation = invocation.env("PGPASSWORD", password);
        }

        command::execute_streaming(&invocation, true, route_stderr_to_log, cancel).await?;
        Ok(())
    }
}

fn route_stderr_to_log(line: Line) {
    if let Line::Stderr(line) = line {
        log::warn!("pg_restore: {line}");
    }
}

#[cfg(test)]
mod tests {
    use super::{RestoreError, RestoreOptions, TargetFormat};

    #[test]
    fn rejects_data_only_and_schema_only_together() {
        let options = RestoreOptions { data_only: true, schema_only: true, ..RestoreOptions::default() };
        assert!(matches!(options.validate(), Err(RestoreError::ConflictingScopeOptions)));
    }

    #[test]
    fn format_flags_match_pg_dump_conventions() {
        assert_eq!(TargetFormat::Custom.as_flag(), "c");
        assert_eq!(TargetFormat::Directory.as_flag(), "d");
        assert_eq!(TargetFormat::Tar.as_flag(), "t");
        assert_eq!(TargetFormat::Plain.as_flag(), "p");
    }
}
