//! Drives a real `DataCluster` through its full lifecycle against every
//! runtime this machine can provide, replacing the old synchronous
//! `Cluster`-based coverage with the async, controller-bound surface.

use std::net::TcpListener;
use std::sync::Arc;

use pgforge::cluster::lifecycle::{DataCluster, LifecycleStatus, StartupParams};
use pgforge::controller::{ClusterConfig, DumpOptions, OutputFormat, ShutdownMode, ShutdownParams, TargetFormat};
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

#[for_all_runtimes]
#[test]
fn full_lifecycle_start_query_stop_destroy() -> TestResult {
    block_on(async move {
        let tempdir = tempfile::tempdir()?;
        let instance_dir = runtime.bindir.parent().unwrap_or(&runtime.bindir).to_owned();
        let environment = Arc::new(environment::build(&instance_dir, PlatformParameters::default()).await?);

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

        let cluster = DataCluster::new(environment.clone(), config);
        let cancel = CancellationToken::new();

        assert_eq!(cluster.status(&cancel).await?, LifecycleStatus::Uninitialized);

        let initializer = InitDbInitializer { init_db: cluster.init_db(), force_reinitialization: false };
        cluster.start(StartupParams::default(), Some(&initializer), &cancel).await?;
        assert_eq!(cluster.status(&cancel).await?, LifecycleStatus::Running);

        if environment.has_sql() {
            let mut databases = Vec::new();
            cluster.list_databases(|row| databases.push(row.name), &cancel).await?;
            assert!(databases.iter().any(|name| name == "postgres"));

            cluster
                .execute_sql("SELECT 1", None, None, OutputFormat::default(), None::<fn(pgforge::command::Line)>, &cancel)
                .await?;
        }

        if environment.has_dump() && environment.has_restore() {
            let dump_path = tempdir.path().join("dump.sql");
            cluster
                .export_dump(
                    &DumpOptions {
                        database: "postgres".into(),
                        output_path: dump_path.clone(),
                        format: TargetFormat::Plain,
                        ..DumpOptions::default()
                    },
                    &cancel,
                )
                .await?;
            assert!(dump_path.is_file());
        }

        cluster.stop(ShutdownParams { mode: ShutdownMode::Fast, ..ShutdownParams::default() }, &cancel).await?;
        assert_eq!(cluster.status(&cancel).await?, LifecycleStatus::Stopped);

        cluster.destroy(ShutdownParams::default(), &cancel).await?;
        assert!(!tempdir.path().join("data").join("PG_VERSION").is_file());

        Ok(())
    })
}

#[for_all_runtimes]
#[test]
fn starting_without_an_initializer_fails_when_uninitialized() -> TestResult {
    block_on(async move {
        let tempdir = tempfile::tempdir()?;
        let instance_dir = runtime.bindir.parent().unwrap_or(&runtime.bindir).to_owned();
        let environment = Arc::new(environment::build(&instance_dir, PlatformParameters::default()).await?);

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
        let result = cluster.start(StartupParams::default(), None, &cancel).await;
        assert!(result.is_err());
        Ok(())
    })
}
