use std::process::ExitCode;

use miette::{IntoDiagnostic, Result};
use tokio_util::sync::CancellationToken;

use pgforge::environment;
use pgforge::instance::{self, InstanceOptions};

use crate::{args, runner};

/// Manage a PostgreSQL instance: acquire its binaries, validate an
/// existing one, or tear one down.
#[derive(clap::Args)]
pub struct InstanceCommand {
    #[clap(subcommand)]
    pub action: Instance,
}

impl InstanceCommand {
    pub fn invoke(self) -> Result<ExitCode> {
        self.action.invoke()
    }
}

#[derive(clap::Subcommand)]
pub enum Instance {
    /// Validate that an instance directory's binaries are present and
    /// runnable, reporting each one's version and the environment's
    /// Standard/Minimal capability.
    #[clap(display_order = 1)]
    Check(Check),

    /// Download/extract the engine (and any extensions) into an instance
    /// directory.
    #[clap(display_order = 2)]
    Create(Create),

    /// Delete an instance directory.
    #[clap(display_order = 3)]
    Destroy(Destroy),
}

impl Instance {
    pub fn invoke(self) -> Result<ExitCode> {
        match self {
            Self::Check(check) => check.invoke(),
            Self::Create(create) => create.invoke(),
            Self::Destroy(destroy) => destroy.invoke(),
        }
    }
}

#[derive(clap::Args)]
#[clap(next_help_heading = Some("Options for instance check"))]
pub struct Check {
    #[clap(flatten)]
    pub instance: args::InstanceArgs,
}

impl Check {
    pub fn invoke(self) -> Result<ExitCode> {
        runner::block_on(async {
            let env = environment::build(&self.instance.dir, environment::PlatformParameters::default())
                .await
                .into_diagnostic()?;
            for (binary, version) in &env.versions {
                println!("{binary:10} {version}");
            }
            println!("mode: {:?}", env.mode());
            Ok(ExitCode::SUCCESS)
        })
    }
}

#[derive(clap::Args)]
#[clap(next_help_heading = Some("Options for instance create"))]
pub struct Create {
    #[clap(flatten)]
    pub instance: args::InstanceArgs,

    #[clap(flatten)]
    pub artifacts: args::ArtifactArgs,

    #[clap(flatten)]
    pub platform: args::PlatformArgs,

    /// Delete the instance directory first, if it already exists.
    #[clap(long = "clean", display_order = 40)]
    pub clean_install: bool,

    /// Drop `pgsql/pgAdmin*` entries from the extracted Main artifact.
    #[clap(long = "exclude-pgadmin", display_order = 41)]
    pub exclude_pg_admin: bool,
}

impl Create {
    pub fn invoke(self) -> Result<ExitCode> {
        runner::block_on(async {
            let cancel = CancellationToken::new();
            let client = reqwest::Client::new();
            let cache_dir = runner::cache_dir(self.artifacts.cache_dir)?;

            let mut specs = vec![runner::parse_main_artifact(&self.artifacts.main).into_diagnostic()?];
            for extension in &self.artifacts.extensions {
                specs.push(runner::parse_extension_artifact(extension).into_diagnostic()?);
            }

            log::info!("fetching {} artifact(s) into {}", specs.len(), cache_dir.display());
            let local_artifacts =
                pgforge::artifact::build(&client, &specs, &cache_dir, self.artifacts.max_parallel_downloads, &cancel)
                    .await
                    .into_diagnostic()?;

            let options = InstanceOptions {
                instance_dir: self.instance.dir.clone(),
                clean_install: self.clean_install,
                exclude_pg_admin: self.exclude_pg_admin,
            };
            instance::Instance::build(&options, &local_artifacts, &cancel).await.into_diagnostic()?;

            let env = environment::build(&self.instance.dir, self.platform.into()).await.into_diagnostic()?;
            println!("instance ready at {}", self.instance.dir.display());
            println!("mode: {:?}", env.mode());
            Ok(ExitCode::SUCCESS)
        })
    }
}

#[derive(clap::Args)]
#[clap(next_help_heading = Some("Options for instance destroy"))]
pub struct Destroy {
    #[clap(flatten)]
    pub instance: args::InstanceArgs,
}

impl Destroy {
    pub fn invoke(self) -> Result<ExitCode> {
        runner::block_on(async {
            let options = InstanceOptions { instance_dir: self.instance.dir.clone(), clean_install: false, exclude_pg_admin: false };
            instance::Instance::destroy(&options).await.into_diagnostic()?;
            println!("destroyed {}", self.instance.dir.display());
            Ok(ExitCode::SUCCESS)
        })
    }
}
