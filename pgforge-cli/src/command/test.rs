use std::process::ExitCode;

use miette::{IntoDiagnostic, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use pgforge::controller::ShutdownParams;
use pgforge::instance::{self, InstanceOptions};
use pgforge::server::Server;
use pgforge::environment;

use crate::{args, runner};

/// Smoke-test an instance: build it if needed, bring one cluster up
/// through the full lifecycle, confirm it accepts connections, then tear
/// it back down. Exists mainly to exercise the library end to end and
/// give its event stream somewhere to print to.
#[derive(clap::Args)]
#[clap(next_help_heading = Some("Options for test"))]
pub struct Test {
    #[clap(flatten)]
    pub instance: args::InstanceArgs,

    #[clap(flatten)]
    pub artifacts: args::ArtifactArgs,

    #[clap(flatten)]
    pub platform: args::PlatformArgs,

    #[clap(flatten)]
    pub cluster: args::ClusterArgs,

    #[clap(flatten)]
    pub shutdown: args::ShutdownArgs,

    /// Leave the cluster's data directory in place instead of destroying
    /// it once the smoke test completes.
    #[clap(long = "keep", display_order = 95)]
    pub keep: bool,
}

impl Test {
    pub fn invoke(self) -> Result<ExitCode> {
        runner::block_on(async {
            let cancel = CancellationToken::new();
            std::fs::create_dir_all(&self.instance.dir).into_diagnostic()?;
            let (_lock_path, _lock) = runner::lock_for(&self.instance.dir).into_diagnostic()?;

            if !self.instance.dir.join("bin").is_dir() {
                let client = reqwest::Client::new();
                let cache_dir = runner::cache_dir(self.artifacts.cache_dir.clone())?;
                let mut specs = vec![runner::parse_main_artifact(&self.artifacts.main).into_diagnostic()?];
                for extension in &self.artifacts.extensions {
                    specs.push(runner::parse_extension_artifact(extension).into_diagnostic()?);
                }
                let local_artifacts = pgforge::artifact::build(
                    &client,
                    &specs,
                    &cache_dir,
                    self.artifacts.max_parallel_downloads,
                    &cancel,
                )
                .await
                .into_diagnostic()?;
                let options = InstanceOptions {
                    instance_dir: self.instance.dir.clone(),
                    clean_install: false,
                    exclude_pg_admin: false,
                };
                instance::Instance::build(&options, &local_artifacts, &cancel).await.into_diagnostic()?;
            }

            let env = environment::build(&self.instance.dir, self.platform.into()).await.into_diagnostic()?;
            let unique_id = self.cluster.unique_id.clone();
            let shutdown: ShutdownParams = self.shutdown.into();
            let keep = self.keep;
            let config = runner::cluster_config(&self.instance.dir, self.cluster)?;

            let server = Server::new(env);
            server.add_cluster(config).into_diagnostic()?;

            let (tx, mut rx) = mpsc::unbounded_channel();
            let ids = [unique_id.clone()];

            log::info!("starting cluster {unique_id}");
            server
                .start(Some(&ids), 1, Default::default(), Some(tx.clone()), cancel.clone())
                .await
                .into_diagnostic()?;
            report_events(&mut rx);

            let cluster = server.get_cluster(&unique_id).expect("just registered");
            let mut row_count = 0usize;
            cluster
                .list_databases(
                    |row| {
                        println!("database: {}", row.name);
                        row_count += 1;
                    },
                    &cancel,
                )
                .await
                .into_diagnostic()?;
            println!("{row_count} database(s) visible");

            let (tx, mut rx) = mpsc::unbounded_channel();
            server.stop(Some(&ids), 1, shutdown, Some(tx), cancel.clone()).await.into_diagnostic()?;
            report_events(&mut rx);

            if !keep {
                cluster.destroy(ShutdownParams::default(), &cancel).await.into_diagnostic()?;
            }

            Ok(ExitCode::SUCCESS)
        })
    }
}

fn report_events(rx: &mut mpsc::UnboundedReceiver<pgforge::server::ClusterEvent>) {
    while let Ok(event) = rx.try_recv() {
        match event.error {
            Some(error) => eprintln!("{}: {:?} failed: {error}", event.unique_id, event.operation),
            None => println!("{}: {:?} ok", event.unique_id, event.operation),
        }
    }
}
