//! Prelude for `pgforge`.

pub use crate::{
    artifact::{self, Artifact},
    cluster::{self, lifecycle::{ClusterStatus, DataCluster, LifecycleError, LifecycleStatus}},
    coordinate,
    environment::{self, Environment},
    instance::{self, Instance},
    lock,
    runtime::{self, Runtime, RuntimeError},
    server::{self, Server},
    version::{self, Version, VersionError},
};

// Traits.
pub use crate::runtime::strategy::StrategyLike;
