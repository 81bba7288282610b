//! Drift corrector
//!
//! Brings one child object in line with its desired form: create it when
//! missing, overwrite its tracked fields when they drifted, otherwise leave
//! it alone. Unchanged objects cost exactly one read and no write.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use tracing::{debug, info, instrument, warn};

use super::child::ManagedChild;
use super::cluster::Cluster;
use super::derivative::derivative_eq;
use super::resources::owner_reference;
use crate::crd::Pulp;
use crate::error::Error;

/// What a successful call to [`ensure`] did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    Created,
    Updated,
    Unchanged,
}

impl Applied {
    pub fn changed(&self) -> bool {
        !matches!(self, Applied::Unchanged)
    }
}

/// Step of [`ensure`] that failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Create,
    Update,
}

/// A failed [`ensure`] call
#[derive(Debug)]
pub struct DriftFailure {
    pub stage: Stage,
    pub kind: String,
    pub name: String,
    pub error: Error,
}

impl DriftFailure {
    /// Condition reason for this failure
    pub fn reason(&self) -> &'static str {
        match self.stage {
            Stage::Fetch => "FetchFailed",
            Stage::Create => "CreationFailed",
            Stage::Update => "UpdateFailed",
        }
    }

    pub fn message(&self) -> String {
        let verb = match self.stage {
            Stage::Fetch => "read",
            Stage::Create => "create",
            Stage::Update => "update",
        };
        format!("Failed to {} {} {}: {}", verb, self.kind, self.name, self.error)
    }
}

fn is_owned_by(obj: &impl Resource, owner: &OwnerReference) -> bool {
    obj.meta()
        .owner_references
        .as_ref()
        .is_some_and(|refs| refs.iter().any(|r| r.uid == owner.uid))
}

/// Ensure `desired` exists in the owner's namespace with its tracked fields
/// intact.
///
/// The ownership back-reference is attached on creation so the child is
/// garbage collected with its Pulp.
#[instrument(skip(cluster, owner, desired), fields(kind = %K::kind(&()), name = %desired.name_any()))]
pub async fn ensure<C, K>(cluster: &C, owner: &Pulp, mut desired: K) -> Result<Applied, DriftFailure>
where
    C: Cluster,
    K: ManagedChild,
{
    let namespace = owner.namespace().unwrap_or_else(|| "default".to_string());
    let name = desired.name_any();
    let failure = |stage: Stage, error: Error| DriftFailure {
        stage,
        kind: K::kind(&()).to_string(),
        name: name.clone(),
        error,
    };

    let live = cluster
        .get::<K>(&namespace, &name)
        .await
        .map_err(|e| failure(Stage::Fetch, e))?;

    let Some(mut live) = live else {
        desired.meta_mut().owner_references = Some(vec![owner_reference(owner)]);
        info!("Creating {} {}", K::kind(&()), name);
        cluster
            .create(&namespace, &desired)
            .await
            .map_err(|e| failure(Stage::Create, e))?;
        record_write(K::kind(&()).as_ref(), "create");
        return Ok(Applied::Created);
    };

    if derivative_eq(&desired.tracked(), &live.tracked()) {
        debug!("{} {} matches desired state", K::kind(&()), name);
        return Ok(Applied::Unchanged);
    }

    if !is_owned_by(&live, &owner_reference(owner)) {
        warn!(
            "{} {} exists but is not owned by Pulp {}; taking over its tracked fields",
            K::kind(&()),
            name,
            owner.name_any()
        );
    }

    info!("{} {} drifted from desired state, updating", K::kind(&()), name);
    live.adopt(&desired);
    cluster
        .replace(&namespace, &name, &live)
        .await
        .map_err(|e| failure(Stage::Update, e))?;
    record_write(K::kind(&()).as_ref(), "update");
    Ok(Applied::Updated)
}

/// Delete a child left behind by an earlier configuration.
///
/// Objects not owned by `owner` are never touched.
#[instrument(skip(cluster, owner), fields(kind = %K::kind(&())))]
pub async fn remove<C, K>(cluster: &C, owner: &Pulp, name: &str) -> crate::error::Result<bool>
where
    C: Cluster,
    K: ManagedChild,
{
    let namespace = owner.namespace().unwrap_or_else(|| "default".to_string());
    let Some(live) = cluster.get::<K>(&namespace, name).await? else {
        return Ok(false);
    };
    if !is_owned_by(&live, &owner_reference(owner)) {
        debug!("Leaving {} {} alone, not owned by this Pulp", K::kind(&()), name);
        return Ok(false);
    }

    info!("Removing stale {} {}", K::kind(&()), name);
    let deleted = cluster.delete::<K>(&namespace, name).await?;
    if deleted {
        record_write(K::kind(&()).as_ref(), "delete");
    }
    Ok(deleted)
}

#[cfg(feature = "metrics")]
fn record_write(kind: &str, operation: &str) {
    super::metrics::inc_child_write(kind, operation);
}

#[cfg(not(feature = "metrics"))]
fn record_write(_kind: &str, _operation: &str) {}
