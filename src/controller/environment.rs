//! Environment prober
//!
//! Answers the cluster-level questions the synthesizer needs before it can
//! decide on storage layout. The answers are recomputed every pass.

use k8s_openapi::api::storage::v1::StorageClass;
use kube::ResourceExt;
use tracing::{debug, instrument};

use super::cluster::Cluster;
use crate::crd::Pulp;
use crate::error::Result;

pub const DEFAULT_CLASS_ANNOTATION: &str = "storageclass.kubernetes.io/is-default-class";
pub const DEFAULT_CLASS_ANNOTATION_BETA: &str = "storageclass.beta.kubernetes.io/is-default-class";

/// Facts gathered once per pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnvironmentFacts {
    /// A StorageClass is annotated as the cluster default
    pub default_storage_class: bool,
    /// Artifacts go to S3 or Azure instead of a shared volume
    pub object_storage: bool,
    /// The components talk to an externally managed database
    pub external_database: bool,
}

pub fn is_default_storage_class(class: &StorageClass) -> bool {
    let annotations = class.annotations();
    [DEFAULT_CLASS_ANNOTATION, DEFAULT_CLASS_ANNOTATION_BETA]
        .iter()
        .any(|key| annotations.get(*key).map(String::as_str) == Some("true"))
}

/// Whether any StorageClass is marked as the cluster default
pub async fn default_storage_class_defined<C: Cluster>(cluster: &C) -> Result<bool> {
    let classes = cluster.storage_classes().await?;
    Ok(classes.iter().any(is_default_storage_class))
}

#[instrument(skip(cluster, pulp), fields(name = %pulp.name_any()))]
pub async fn probe<C: Cluster>(cluster: &C, pulp: &Pulp) -> Result<EnvironmentFacts> {
    let facts = EnvironmentFacts {
        default_storage_class: default_storage_class_defined(cluster).await?,
        object_storage: pulp.spec.object_storage_configured(),
        external_database: pulp.spec.database.is_external(),
    };
    debug!(?facts, "Probed environment");
    Ok(facts)
}
