//! Main reconciler for Pulp resources
//!
//! Implements the controller pattern using kube-rs runtime. One pass runs
//! validation, the environment probe, the synthesizer, the drift corrector
//! for every child kind in a fixed order (database, components, exposure)
//! and finally derives the aggregate status condition.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::NamespaceResourceScope;
use kube::{
    api::{Api, ListParams},
    runtime::{
        controller::{Action, Controller},
        watcher::Config,
    },
    Resource, ResourceExt,
};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, instrument, warn};

use super::child::ManagedChild;
use super::cluster::{Cluster, EventType, KubeCluster};
use super::conditions::{
    StatusTracker, Subsystem, REASON_INTROSPECTION_FAILED, REASON_INVALID_SPEC,
    REASON_WAITING_FOR_CONTENT,
};
use super::drift::{self, Applied};
use super::environment;
use super::resources::{self, Component};
use super::routes::{self, Resolution};
use crate::crd::{IngressType, Pulp};
use crate::error::{Error, Result};

/// Timing knobs for a reconcile pass
#[derive(Clone, Debug)]
pub struct ReconcileConfig {
    /// Restrict the controller to one namespace; all namespaces when unset
    pub namespace: Option<String>,
    /// Requeue delay after a converged pass
    pub resync_interval: Duration,
    /// Requeue delay after a pass that created or updated children
    pub requeue_interval: Duration,
    /// Requeue delay while no content pod is Running
    pub pod_wait_interval: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            resync_interval: Duration::from_secs(300),
            requeue_interval: Duration::from_secs(5),
            pod_wait_interval: Duration::from_secs(5),
        }
    }
}

/// Shared state for the controller
pub struct Context<C> {
    pub cluster: C,
    pub config: ReconcileConfig,
    /// Only the leader writes; followers requeue without doing work
    pub is_leader: Arc<AtomicBool>,
}

impl<C> Context<C> {
    pub fn new(cluster: C, config: ReconcileConfig) -> Self {
        Self {
            cluster,
            config,
            is_leader: Arc::new(AtomicBool::new(true)),
        }
    }
}

pub type ControllerState = Context<KubeCluster>;

/// How a pass that did not fail ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    /// Everything matched; come back at the next resync
    Converged,
    /// Work is in flight; come back after the given delay
    RequeueAfter(Duration),
}

impl PassOutcome {
    pub fn into_action(self, config: &ReconcileConfig) -> Action {
        match self {
            PassOutcome::Converged => Action::requeue(config.resync_interval),
            PassOutcome::RequeueAfter(delay) => Action::requeue(delay),
        }
    }
}

fn scoped_api<K>(client: &kube::Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope> + Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Main entry point to start the controller
pub async fn run_controller(state: Arc<ControllerState>) -> Result<()> {
    let client = state.cluster.client().clone();
    let namespace = state.config.namespace.clone();
    let ns = namespace.as_deref();
    let pulps: Api<Pulp> = scoped_api(&client, ns);

    info!("Starting Pulp controller");

    // Verify CRD exists
    match pulps.list(&ListParams::default().limit(1)).await {
        Ok(_) => info!("Pulp CRD is available"),
        Err(e) => {
            error!("Pulp CRD not found. Please install the CRD first: {:?}", e);
            return Err(Error::ConfigError("Pulp CRD not installed".to_string()));
        }
    }

    Controller::new(pulps, Config::default())
        // Watch owned resources for changes
        .owns::<Deployment>(scoped_api(&client, ns), Config::default())
        .owns::<StatefulSet>(scoped_api(&client, ns), Config::default())
        .owns::<Service>(scoped_api(&client, ns), Config::default())
        .owns::<Ingress>(scoped_api(&client, ns), Config::default())
        .owns::<PersistentVolumeClaim>(scoped_api(&client, ns), Config::default())
        .owns::<Secret>(scoped_api(&client, ns), Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok(obj) => debug!("Reconciled: {:?}", obj),
                Err(e) => error!("Reconcile error: {:?}", e),
            }
        })
        .await;

    Ok(())
}

/// The kube-rs reconcile callback
///
/// This function is called whenever:
/// - A Pulp is created or updated
/// - An owned resource changes
/// - The requeue timer expires
#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<Pulp>, ctx: Arc<ControllerState>) -> Result<Action> {
    if !ctx.is_leader.load(Ordering::Relaxed) {
        debug!("Not the leader, skipping reconcile");
        return Ok(Action::requeue(ctx.config.requeue_interval));
    }

    #[cfg(feature = "metrics")]
    let started = std::time::Instant::now();

    let outcome = reconcile_pulp(&obj, &ctx).await;

    #[cfg(feature = "metrics")]
    {
        super::metrics::observe_reconcile_duration_seconds("pulp", started.elapsed().as_secs_f64());
        if let Ok(outcome) = &outcome {
            super::metrics::inc_reconcile_outcome(match outcome {
                PassOutcome::Converged => "converged",
                PassOutcome::RequeueAfter(_) => "requeued",
            });
        }
    }

    Ok(outcome?.into_action(&ctx.config))
}

/// Error policy for the controller
fn error_policy(pulp: Arc<Pulp>, error: &Error, _ctx: Arc<ControllerState>) -> Action {
    error!("Reconciliation error for {}: {:?}", pulp.name_any(), error);

    #[cfg(feature = "metrics")]
    super::metrics::inc_reconcile_error("pulp", error.metric_label());

    // Use shorter retry for retriable errors
    let retry_duration = if error.is_retriable() {
        Duration::from_secs(15)
    } else {
        Duration::from_secs(60)
    };

    Action::requeue(retry_duration)
}

/// One reconcile pass over a Pulp, against any [`Cluster`]
#[instrument(skip(pulp, ctx), fields(name = %pulp.name_any()))]
pub async fn reconcile_pulp<C: Cluster>(pulp: &Pulp, ctx: &Context<C>) -> Result<PassOutcome> {
    let namespace = pulp.namespace().unwrap_or_else(|| "default".to_string());
    let name = pulp.name_any();

    if pulp.metadata.deletion_timestamp.is_some() {
        debug!("Pulp {}/{} is being deleted, children are garbage collected", namespace, name);
        return Ok(PassOutcome::Converged);
    }

    info!(
        "Reconciling Pulp {}/{} (ingressType: {})",
        namespace, name, pulp.spec.ingress_type
    );

    let mut pass = Pass {
        cluster: &ctx.cluster,
        pulp,
        tracker: StatusTracker::new(&ctx.cluster, pulp),
        changed: false,
    };

    if let Err(errors) = pulp.spec.validate() {
        let err = Error::ValidationError(errors);
        warn!("Validation failed for {}/{}: {}", namespace, name, err);
        pass.tracker.fail(REASON_INVALID_SPEC, &err.to_string()).await?;
        return Err(err);
    }

    let facts = environment::probe(&ctx.cluster, pulp).await?;
    let desired = resources::synthesize(pulp, &facts);

    // 1. Database
    if let Some(database) = desired.database {
        // Only used when the secret does not exist yet
        let secret = resources::build_postgres_secret(pulp, &resources::generate_password());
        let results = [
            pass.apply(Subsystem::Database, secret).await?,
            pass.apply(Subsystem::Database, database.service).await?,
            pass.apply(Subsystem::Database, database.statefulset).await?,
        ];
        pass.report(Subsystem::Database, &results).await?;
    }

    // 2. Components
    let mut results = Vec::new();
    if let Some(pvc) = desired.file_storage {
        results.push(pass.apply(Subsystem::Api, pvc).await?);
    }
    results.extend(pass.apply_workload(Subsystem::Api, desired.api).await?);
    pass.report(Subsystem::Api, &results).await?;

    let results = pass.apply_workload(Subsystem::Content, desired.content).await?;
    pass.report(Subsystem::Content, &results).await?;

    let results = pass.apply_workload(Subsystem::Worker, desired.worker).await?;
    pass.report(Subsystem::Worker, &results).await?;

    match desired.web {
        Some(web) => {
            let results = pass.apply_workload(Subsystem::Web, web).await?;
            pass.report(Subsystem::Web, &results).await?;
        }
        None => {
            let web = resources::resource_name(pulp, Component::Web.as_str());
            let web_svc = resources::service_name(pulp, Component::Web);
            pass.prune::<Deployment>(&web).await?;
            pass.prune::<Service>(&web_svc).await?;
        }
    }

    // 3. Exposure
    if pulp.spec.ingress_type != IngressType::Ingress {
        pass.prune::<Ingress>(&name).await?;
    }
    if pulp.spec.ingress_type.resolves_routes() {
        if let Some(delay) = pass.expose(ctx.config.pod_wait_interval).await? {
            pass.tracker.finish().await?;
            return Ok(PassOutcome::RequeueAfter(delay));
        }
    }

    pass.tracker.finish().await?;

    if pass.changed {
        info!("Pulp {}/{} has pending changes, requeueing", namespace, name);
        Ok(PassOutcome::RequeueAfter(ctx.config.requeue_interval))
    } else {
        info!("Pulp {}/{} is converged", namespace, name);
        Ok(PassOutcome::Converged)
    }
}

/// State carried through one pass
struct Pass<'a, C: Cluster> {
    cluster: &'a C,
    pulp: &'a Pulp,
    tracker: StatusTracker<'a, C>,
    changed: bool,
}

impl<'a, C: Cluster> Pass<'a, C> {
    /// Drift-correct one child; failures to write it are reported on the
    /// subsystem's condition before the error is returned
    async fn apply<K: ManagedChild>(&mut self, subsystem: Subsystem, desired: K) -> Result<Applied> {
        match drift::ensure(self.cluster, self.pulp, desired).await {
            Ok(applied) => Ok(applied),
            Err(failure) if failure.stage == drift::Stage::Fetch => {
                warn!("{}", failure.message());
                Err(failure.error)
            }
            Err(failure) => {
                let message = failure.message();
                error!("{}", message);
                let flipped = self
                    .tracker
                    .subsystem(subsystem, false, failure.reason(), &message)
                    .await?;
                if !flipped {
                    if let Err(e) = self
                        .cluster
                        .publish_event(self.pulp, EventType::Warning, failure.reason(), &message)
                        .await
                    {
                        warn!("Failed to publish event: {}", e);
                    }
                }
                Err(failure.error)
            }
        }
    }

    async fn apply_workload(
        &mut self,
        subsystem: Subsystem,
        workload: resources::Workload,
    ) -> Result<Vec<Applied>> {
        let mut results = vec![self.apply(subsystem, workload.deployment).await?];
        if let Some(service) = workload.service {
            results.push(self.apply(subsystem, service).await?);
        }
        Ok(results)
    }

    /// Set the subsystem condition from what the pass did to its children
    async fn report(&mut self, subsystem: Subsystem, results: &[Applied]) -> Result<()> {
        let label = subsystem.label();
        let pulp_name = self.pulp.name_any();

        if results.iter().any(Applied::changed) {
            self.changed = true;
        }

        if results.contains(&Applied::Created) {
            self.tracker
                .subsystem(
                    subsystem,
                    false,
                    &subsystem.creating_reason(),
                    &format!("Creating {pulp_name} {label} resources"),
                )
                .await?;
        } else if results.contains(&Applied::Updated) {
            self.tracker
                .subsystem(
                    subsystem,
                    false,
                    &subsystem.updating_reason(),
                    &format!("Reconciling {pulp_name} {label} resources"),
                )
                .await?;
        } else {
            self.tracker
                .subsystem(
                    subsystem,
                    true,
                    &subsystem.finished_reason(),
                    &format!("All {label} tasks ran successfully"),
                )
                .await?;
        }
        Ok(())
    }

    async fn prune<K: ManagedChild>(&mut self, name: &str) -> Result<()> {
        if drift::remove::<C, K>(self.cluster, self.pulp, name).await? {
            self.changed = true;
        }
        Ok(())
    }

    /// Resolve routes and converge the exposure objects.
    ///
    /// Returns a requeue delay when discovery has to wait for a content pod.
    async fn expose(&mut self, pod_wait: Duration) -> Result<Option<Duration>> {
        let pulp = self.pulp;
        let subsystem = match pulp.spec.ingress_type {
            IngressType::Ingress => Subsystem::Ingress,
            _ => Subsystem::Route,
        };

        let descriptors = match routes::resolve(self.cluster, pulp).await {
            Ok(Resolution::Resolved(descriptors)) => descriptors,
            Ok(Resolution::ContentPodNotRunning) => {
                self.tracker
                    .subsystem(
                        subsystem,
                        false,
                        REASON_WAITING_FOR_CONTENT,
                        "Waiting for a running content pod to discover routes",
                    )
                    .await?;
                return Ok(Some(pod_wait));
            }
            Err(e @ Error::ExecError { .. }) => {
                self.tracker
                    .subsystem(subsystem, false, REASON_INTROSPECTION_FAILED, &e.to_string())
                    .await?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let mut results = Vec::new();
        match pulp.spec.ingress_type {
            IngressType::Ingress => {
                let ingress = routes::build_ingress(pulp, &descriptors);
                results.push(self.apply(subsystem, ingress).await?);
            }
            _ => {
                for route in routes::build_routes(pulp, &descriptors) {
                    results.push(self.apply(subsystem, route).await?);
                }
            }
        }
        self.report(subsystem, &results).await?;
        Ok(None)
    }
}
