//! Controller module for Pulp reconciliation
//! This module contains the main controller loop, the drift corrector and
//! the builders for every object a Pulp deployment consists of.

pub mod child;
pub mod cluster;
pub mod conditions;
pub mod derivative;
pub mod drift;
pub mod environment;
#[cfg(test)]
mod fake;
#[cfg(feature = "metrics")]
pub mod metrics;
mod reconciler;
pub mod resources;
#[cfg(test)]
mod resources_test;
pub mod routes;

pub use cluster::{Cluster, KubeCluster};
pub use reconciler::{
    reconcile_pulp, run_controller, Context, ControllerState, PassOutcome, ReconcileConfig,
};
