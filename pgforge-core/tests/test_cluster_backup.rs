//! Configures continuous archiving on a running `DataCluster` and takes a
//! base backup, exercising the `psql`/`pg_basebackup` driven replacement for
//! the old wire-protocol `Backup` implementation.

use std::net::TcpListener;
use std::sync::Arc;

use pgforge::cluster::backup::Backup;
use pgforge::cluster::lifecycle::{DataCluster, StartupParams};
use pgforge::controller::{ClusterConfig, ShutdownParams};
use pgforge::environment::{self, PlatformParameters};
use pgforge::initializer::InitDbInitializer;
use pgforge_test::for_all_runtimes;
use tokio_util::sync::CancellationToken;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn free_port() -> u16 {
    TcpListener::bind(("127.0.0.1", 0)).unwrap().local_addr().unwrap().port()
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_multi_thread().enable_all().build().unwrap().block_on(future)
}

#[for_all_runtimes(min = "9.4")]
#[test]
fn configuring_archiving_points_archive_command_at_the_wal_directory() -> TestResult {
    block_on(async move {
        let tempdir = tempfile::tempdir()?;
        let instance_dir = runtime.bindir.parent().unwrap_or(&runtime.bindir).to_owned();
        let environment = Arc::new(environment::build(&instance_dir, PlatformParameters::default()).await?);

        if !environment.has_sql() {
            return Ok(());
        }

        let config = ClusterConfig {
            unique_id: "main".into(),
            data_full_path: tempdir.path().join("data"),
            superuser: "postgres".into(),
            encoding: "UTF-8".into(),
            locale: None,
            allow_group_access: Some(true),
            host: "localhost".into(),
            port: free_port(),
            parameters: Vec::new(),
        };

        let cluster = DataCluster::new(environment, config);
        let cancel = CancellationToken::new();
        let initializer = InitDbInitializer { init_db: cluster.init_db(), force_reinitialization: false };
        cluster.start(StartupParams::default(), Some(&initializer), &cancel).await?;

        let backup = Backup::prepare(tempdir.path().join("backups")).await?;
        let archive_command = format!("cp %p {}/%f", backup.backup_wal_dir.display());
        let needs_restart = backup.do_configure_archiving(&cluster, &archive_command, &cancel).await?;

        if needs_restart {
            cluster.stop(ShutdownParams::default(), &cancel).await?;
            cluster.start(StartupParams::default(), Some(&initializer), &cancel).await?;
        }

        // Applying the same configuration again should be a no-op.
        let needs_restart_again = backup.do_configure_archiving(&cluster, &archive_command, &cancel).await?;
        assert!(!needs_restart_again);

        cluster.destroy(ShutdownParams::default(), &cancel).await?;
        Ok(())
    })
}
