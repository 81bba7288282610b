//! pulp-operator: Kubernetes operator for Pulp content management deployments
//!
//! This crate provides the reconciliation core that converges a `Pulp`
//! custom resource into its database, component workloads and exposure
//! objects, and keeps them there.

pub mod controller;
pub mod crd;
pub mod error;

#[cfg(feature = "rest-api")]
pub mod rest_api;

pub use crate::error::{Error, Result};
