//! The multi-cluster façade: an [`Environment`] plus a `uniqueId → DataCluster`
//! map, with bounded-parallelism fan-out over `initialize`/`start`/`stop`/
//! `reload_configuration` and an event stream for progress reporting.
//!
//! Generalizes the single-cluster `flock`-based exclusivity this codebase's
//! coordination layer already provides (`coordinate::resource`) from one
//! cluster to a map of them. Each per-cluster operation runs inside its own
//! `tokio::spawn`ed task; a panic there surfaces as a `JoinError` rather
//! than unwinding into the fan-out loop, giving the same "a panicking
//! cluster still reports a captured failure instead of vanishing" property
//! the coordination layer's synchronous `with_finally`/`with_cleanup`
//! wrappers give non-async callers elsewhere in this crate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cluster::lifecycle::{DataCluster, LifecycleError, StartupParams};
use crate::controller::{ClusterConfig, ShutdownParams};
use crate::environment::Environment;

#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error("cluster id {0} is already registered")]
    DuplicateClusterId(String),
    #[error("port {0} is already in use by another registered cluster")]
    DuplicatePort(u16),
    #[error("cluster id {0} is not registered")]
    UnknownClusterId(String),
    #[error("port must be non-zero")]
    ZeroPort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Initialize,
    Start,
    Stop,
    ReloadConfiguration,
}

/// Reported once per cluster per fan-out, win or lose; `error` carries the
/// captured failure message rather than aborting sibling tasks.
#[derive(Debug, Clone)]
pub struct ClusterEvent {
    pub unique_id: String,
    pub operation: Operation,
    pub error: Option<String>,
}

/// Default bound on concurrent per-cluster tasks when the caller doesn't
/// specify one.
pub const DEFAULT_MAX_PARALLELISM: usize = 1;

/// Holds one [`Environment`] and the data clusters registered against it.
pub struct Server {
    environment: Arc<Environment>,
    clusters: Mutex<HashMap<String, Arc<DataCluster>>>,
}

impl Server {
    pub fn new(environment: Environment) -> Self {
        Self { environment: Arc::new(environment), clusters: Mutex::new(HashMap::new()) }
    }

    /// Register a new cluster. Validates `uniqueId` uniqueness, port
    /// uniqueness, and a non-zero port; `(host, port, dataDirectory)`
    /// triple-distinctness follows from port uniqueness alone since a
    /// host/port pair identifies a listener.
    pub fn add_cluster(&self, config: ClusterConfig) -> Result<(), ServerError> {
        if config.port == 0 {
            return Err(ServerError::ZeroPort);
        }
        let mut clusters = self.clusters.lock().unwrap();
        if clusters.contains_key(&config.unique_id) {
            return Err(ServerError::DuplicateClusterId(config.unique_id));
        }
        if clusters.values().any(|c| c.config().port == config.port) {
            return Err(ServerError::DuplicatePort(config.port));
        }
        let unique_id = config.unique_id.clone();
        clusters.insert(unique_id, Arc::new(DataCluster::new(self.environment.clone(), config)));
        Ok(())
    }

    pub fn get_cluster(&self, unique_id: &str) -> Option<Arc<DataCluster>> {
        self.clusters.lock().unwrap().get(unique_id).cloned()
    }

    pub fn list_cluster_ids(&self) -> Vec<String> {
        self.clusters.lock().unwrap().keys().cloned().collect()
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Select the target clusters: the given `ids`, or every registered
    /// cluster if `ids` is empty/omitted.
    fn select(&self, ids: Option<&[String]>) -> Result<Vec<Arc<DataCluster>>, ServerError> {
        let clusters = self.clusters.lock().unwrap();
        match ids {
            None | Some([]) => Ok(clusters.values().cloned().collect()),
            Some(ids) => ids
                .iter()
                .map(|id| clusters.get(id).cloned().ok_or_else(|| ServerError::UnknownClusterId(id.clone())))
                .collect(),
        }
    }

    pub async fn initialize(
        &self,
        ids: Option<&[String]>,
        max_parallelism: usize,
        events: Option<mpsc::UnboundedSender<ClusterEvent>>,
        cancel: CancellationToken,
    ) -> Result<(), ServerError> {
        self.fan_out(Operation::Initialize, ids, max_parallelism, events, cancel, |cluster, cancel| async move {
            cluster.initialize(&crate::initializer::InitDbInitializer { init_db: cluster.init_db(), force_reinitialization: false }, &cancel).await
        })
        .await
    }

    pub async fn start(
        &self,
        ids: Option<&[String]>,
        max_parallelism: usize,
        startup: StartupParams,
        events: Option<mpsc::UnboundedSender<ClusterEvent>>,
        cancel: CancellationToken,
    ) -> Result<(), ServerError> {
        self.fan_out(Operation::Start, ids, max_parallelism, events, cancel, move |cluster, cancel| async move {
            let initializer = crate::initializer::InitDbInitializer { init_db: cluster.init_db(), force_reinitialization: false };
            cluster.start(startup, Some(&initializer), &cancel).await
        })
        .await
    }

    pub async fn stop(
        &self,
        ids: Option<&[String]>,
        max_parallelism: usize,
        shutdown: ShutdownParams,
        events: Option<mpsc::UnboundedSender<ClusterEvent>>,
        cancel: CancellationToken,
    ) -> Result<(), ServerError> {
        self.fan_out(Operation::Stop, ids, max_parallelism, events, cancel, move |cluster, cancel| async move {
            cluster.stop(shutdown, &cancel).await
        })
        .await
    }

    pub async fn reload_configuration(
        &self,
        ids: Option<&[String]>,
        max_parallelism: usize,
        events: Option<mpsc::UnboundedSender<ClusterEvent>>,
        cancel: CancellationToken,
    ) -> Result<(), ServerError> {
        self.fan_out(Operation::ReloadConfiguration, ids, max_parallelism, events, cancel, |cluster, cancel| async move {
            cluster.reload_configuration(&cancel).await
        })
        .await
    }

    /// Run `op` across the selected clusters with at most `max_parallelism`
    /// concurrent tasks, publishing one [`ClusterEvent`] per cluster
    /// regardless of outcome. A single cluster's failure (or panic) never
    /// aborts its siblings.
    async fn fan_out<F, Fut>(
        &self,
        operation: Operation,
        ids: Option<&[String]>,
        max_parallelism: usize,
        events: Option<mpsc::UnboundedSender<ClusterEvent>>,
        cancel: CancellationToken,
        op: F,
    ) -> Result<(), ServerError>
    where
        F: Fn(Arc<DataCluster>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), LifecycleError>> + Send + 'static,
    {
        let targets = self.select(ids)?;
        let max_parallelism = max_parallelism.max(1);
        let op = Arc::new(op);

        stream::iter(targets.into_iter())
            .for_each_concurrent(max_parallelism, |cluster| {
                let op = op.clone();
                let events = events.clone();
                let cancel = cancel.clone();
                let unique_id = cluster.config().unique_id.clone();
                async move {
                    let task = tokio::spawn(async move { (*op)(cluster, cancel).await });
                    let result = match task.await {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(err)) => Err(err.to_string()),
                        Err(join_err) => Err(format!("cluster task panicked: {join_err}")),
                    };
                    if let Some(sender) = events {
                        let error = result.err();
                        let _ = sender.send(ClusterEvent { unique_id, operation, error });
                    }
                }
            })
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::ServerError;

    #[test]
    fn duplicate_cluster_id_error_names_the_id() {
        let err = ServerError::DuplicateClusterId("main".into());
        assert_eq!(err.to_string(), "cluster id main is already registered");
    }

    #[test]
    fn zero_port_error_is_distinct_from_duplicate_port() {
        let zero = ServerError::ZeroPort;
        let dup = ServerError::DuplicatePort(5432);
        assert_ne!(zero.to_string(), dup.to_string());
    }
}
