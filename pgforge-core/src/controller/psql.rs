//! Wraps `psql`: list databases, execute ad-hoc SQL or a script file.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use crate::command::{self, CommandError, Invocation, Line};

use super::ClusterConfig;

#[derive(thiserror::Error, Debug)]
pub enum PsqlError {
    #[error(transparent)]
    CommandError(#[from] CommandError),
}

/// One row from `psql --list --csv --tuples-only`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseRow {
    pub name: String,
    pub owner: String,
    pub encoding: String,
    pub locale_provider: String,
    pub collate: String,
    pub ctype: String,
    pub locale: String,
    pub icu_rules: String,
    pub access_privileges: String,
}

fn parse_csv_row(line: &str) -> Vec<String> {
    // A minimal CSV splitter: psql's `--csv` output quotes fields containing
    // commas, quotes, or newlines with doubled internal quotes, which is
    // enough to handle here without pulling in a full CSV parser for nine
    // mostly-identifier-shaped columns.
    let mut fields = Vec::new();
    let mut chars = line.chars().peekable();
    let mut current = String::new();
    let mut in_quotes = false;
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}

impl DatabaseRow {
    fn from_csv_line(line: &str) -> Option<Self> {
        let fields = parse_csv_row(line);
        if fields.len() != 9 {
            return None;
        }
        Some(Self {
            name: fields[0].clone(),
            owner: fields[1].clone(),
            encoding: fields[2].clone(),
            locale_provider: fields[3].clone(),
            collate: fields[4].clone(),
            ctype: fields[5].clone(),
            locale: fields[6].clone(),
            icu_rules: fields[7].clone(),
            access_privileges: fields[8].clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OutputFormat<'a> {
    pub no_align: bool,
    pub csv: bool,
    pub field_separator: Option<&'a str>,
    pub record_separator: Option<&'a str>,
    pub tuples_only: bool,
    pub out_file: Option<&'a std::path::Path>,
}

/// Binds the `psql` binary for one environment.
#[derive(Debug, Clone)]
pub struct SqlController {
    binary: PathBuf,
}

impl SqlController {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    fn base_invocation<'a>(
        &'a self,
        cluster: &'a ClusterConfig,
        db: Option<&'a str>,
        user: Option<&'a str>,
        port: &'a str,
    ) -> Invocation<'a> {
        let mut invocation = Invocation::new(&self.binary)
            .arg("-U")
            .arg(user.unwrap_or(&cluster.superuser))
            .arg("-h")
            .arg(&cluster.host)
            .arg("-p")
            .arg(port);
        if let Some(db) = db {
            invocation = invocation.arg(db);
        }
        invocation
    }

    pub async fn list_databases(
        &self,
        cluster: &ClusterConfig,
        mut on_row: impl FnMut(DatabaseRow),
        cancel: &CancellationToken,
    ) -> Result<(), PsqlError> {
        let port = cluster.port.to_string();
        let invocation = self
            .base_invocation(cluster, None, None, &port)
            .arg("--list")
            .arg("--csv")
            .arg("--tuples-only");
        command::execute_streaming(
            &invocation,
            true,
            |line: Line| {
                if let Line::Stdout(line) = line {
                    if let Some(row) = DatabaseRow::from_csv_line(&line) {
                        on_row(row);
                    }
                }
            },
            cancel,
        )
        .await?;
        Ok(())
    }

    pub async fn execute_sql(
        &self,
        cluster: &ClusterConfig,
        sql: &str,
        db: Option<&str>,
        user: Option<&str>,
        format: OutputFormat<'_>,
        on_output: Option<impl FnMut(Line)>,
        cancel: &CancellationToken,
    ) -> Result<(), PsqlError> {
        self.run(cluster, db, user, "-c", sql, format, on_output, cancel).await
    }

    pub async fn execute_file(
        &self,
        cluster: &ClusterConfig,
        path: &std::path::Path,
        db: Option<&str>,
        user: Option<&str>,
        format: OutputFormat<'_>,
        on_output: Option<impl FnMut(Line)>,
        cancel: &CancellationToken,
    ) -> Result<(), PsqlError> {
        self.run(cluster, db, user, "-f", &path.to_string_lossy(), format, on_output, cancel).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn run(
        &self,
        cluster: &ClusterConfig,
        db: Option<&str>,
        user: Option<&str>,
        source_flag: &str,
        source_value: &str,
        format: OutputFormat<'_>,
        on_output: Option<impl FnMut(Line)>,
        cancel: &CancellationToken,
    ) -> Result<(), PsqlError> {
        let port = cluster.port.to_string();
        let mut invocation = self.base_invocation(cluster, db, user, &port).arg(source_flag).arg(source_value);
        if format.no_align {
            invocation = invocation.arg("--no-align");
        }
        if format.csv {
            invocation = invocation.arg("--csv");
        }
        if let Some(sep) = format.field_separator {
            invocation = invocation.arg("-F").arg(sep);
        }
        if let Some(sep) = format.record_separator {
            invocation = invocation.arg("-R").arg(sep);
        }
        if format.tuples_only {
            invocation = invocation.arg("--tuples-only");
        }
        if let Some(out_file) = format.out_file {
            invocation = invocation.arg("-o").arg(out_file);
        }

        // An explicit output file and a stdout listener are mutually
        // exclusive: psql writes query results to the file, not stdout.
        match (format.out_file.is_some(), on_output) {
            (true, _) | (false, None) => {
                command::execute(&invocation, true, cancel).await?;
            }
            (false, Some(sink)) => {
                command::execute_streaming(&invocation, true, sink, cancel).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::DatabaseRow;

    #[test]
    fn parses_a_plain_csv_row() {
        let line = "postgres,postgres,UTF8,libc,en_US.UTF-8,en_US.UTF-8,,,";
        let row = DatabaseRow::from_csv_line(line).unwrap();
        assert_eq!(row.name, "postgres");
        assert_eq!(row.owner, "postgres");
    }

    #[test]
    fn parses_a_quoted_field_containing_a_comma() {
        let line = r#"mydb,"owner, with comma",UTF8,libc,C,C,,,"#;
        let row = DatabaseRow::from_csv_line(line).unwrap();
        assert_eq!(row.owner, "owner, with comma");
    }

    #[test]
    fn rejects_rows_with_the_wrong_column_count() {
        assert!(DatabaseRow::from_csv_line("too,few,columns").is_none());
    }
}
