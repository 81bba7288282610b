use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{Api, ListParams, ObjectMeta, Patch, PatchParams, PostParams};
use kube::ResourceExt;
use pulp_operator::controller::{self, Context, KubeCluster, ReconcileConfig};
use pulp_operator::crd::Pulp;
use pulp_operator::Error;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the operator
    Run(RunArgs),
    /// Show version information
    Version,
    /// Show the Pulp resources in a namespace
    Info(InfoArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Watch a single namespace instead of the whole cluster
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Seconds between passes over a converged Pulp
    #[arg(long, env = "RESYNC_SECS", default_value_t = 300)]
    resync_secs: u64,

    /// Seconds before re-checking a Pulp whose children were just written
    #[arg(long, env = "REQUEUE_SECS", default_value_t = 5)]
    requeue_secs: u64,

    /// Seconds between checks for a running content pod
    #[arg(long, env = "POD_WAIT_SECS", default_value_t = 5)]
    pod_wait_secs: u64,

    /// Address for /healthz, /readyz and /metrics
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: SocketAddr,

    /// Coordinate through a Lease so only one replica reconciles
    #[arg(long, env = "LEADER_ELECT")]
    leader_elect: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

#[derive(Parser, Debug)]
struct InfoArgs {
    #[arg(long, env = "WATCH_NAMESPACE", default_value = "default")]
    namespace: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("Pulp Operator v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Info(info_args) => run_info(info_args).await,
        Commands::Run(run_args) => run_operator(run_args).await,
    }
}

async fn run_info(args: InfoArgs) -> Result<(), Error> {
    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;

    let api: Api<Pulp> = Api::namespaced(client, &args.namespace);
    let pulps = api
        .list(&ListParams::default())
        .await
        .map_err(Error::KubeError)?;

    println!("Managed Pulp deployments: {}", pulps.items.len());
    for pulp in &pulps.items {
        println!("  {} ({})", pulp.name_any(), pulp.spec.ingress_type);
    }
    Ok(())
}

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

async fn run_operator(args: RunArgs) -> Result<(), Error> {
    init_tracing(args.log_json);

    info!("Starting Pulp Operator v{}", env!("CARGO_PKG_VERSION"));

    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;

    info!("Connected to Kubernetes cluster");

    let config = ReconcileConfig {
        namespace: args.namespace.clone(),
        resync_interval: Duration::from_secs(args.resync_secs),
        requeue_interval: Duration::from_secs(args.requeue_secs),
        pod_wait_interval: Duration::from_secs(args.pod_wait_secs),
    };
    let state = Arc::new(Context::new(KubeCluster::new(client.clone()), config));

    if args.leader_elect {
        // Followers stay idle until the lease is won
        state.is_leader.store(false, Ordering::Relaxed);

        let leader_namespace = std::env::var("POD_NAMESPACE")
            .ok()
            .or_else(|| args.namespace.clone())
            .unwrap_or_else(|| "default".to_string());
        let holder_identity = std::env::var("HOSTNAME").unwrap_or_else(|_| {
            hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown-host".to_string())
        });

        info!("Leader election using holder ID: {}", holder_identity);

        let lease_client = client.clone();
        let is_leader = Arc::clone(&state.is_leader);
        tokio::spawn(async move {
            run_leader_election(lease_client, &leader_namespace, &holder_identity, is_leader)
                .await;
        });
    }

    #[cfg(feature = "rest-api")]
    {
        let api_state = state.clone();
        let addr = args.metrics_addr;
        tokio::spawn(async move {
            if let Err(e) = pulp_operator::rest_api::run_server(api_state, addr).await {
                tracing::error!("HTTP server error: {:?}", e);
            }
        });
    }
    #[cfg(not(feature = "rest-api"))]
    let _ = args.metrics_addr;

    controller::run_controller(state).await
}

const LEASE_NAME: &str = "pulp-operator-leader";
const LEASE_DURATION_SECS: i32 = 15;
const RENEW_INTERVAL: Duration = Duration::from_secs(10);
const RETRY_INTERVAL: Duration = Duration::from_secs(5);

async fn run_leader_election(
    client: kube::Client,
    namespace: &str,
    identity: &str,
    is_leader: Arc<AtomicBool>,
) {
    let leases: Api<Lease> = Api::namespaced(client, namespace);

    loop {
        match try_acquire_or_renew(&leases, namespace, identity).await {
            Ok(true) => {
                if !is_leader.load(Ordering::Relaxed) {
                    info!("Acquired leadership for lease {}", LEASE_NAME);
                }
                is_leader.store(true, Ordering::Relaxed);
                tokio::time::sleep(RENEW_INTERVAL).await;
            }
            Ok(false) => {
                if is_leader.load(Ordering::Relaxed) {
                    warn!("Lost leadership for lease {}", LEASE_NAME);
                }
                is_leader.store(false, Ordering::Relaxed);
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
            Err(e) => {
                warn!("Leader election error: {:?}", e);
                is_leader.store(false, Ordering::Relaxed);
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
        }
    }
}

async fn try_acquire_or_renew(
    leases: &Api<Lease>,
    namespace: &str,
    identity: &str,
) -> Result<bool, kube::Error> {
    let now = Utc::now();

    let Some(existing) = leases.get_opt(LEASE_NAME).await? else {
        let lease = Lease {
            metadata: ObjectMeta {
                name: Some(LEASE_NAME.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: Some(LeaseSpec {
                holder_identity: Some(identity.to_string()),
                acquire_time: Some(MicroTime(now)),
                renew_time: Some(MicroTime(now)),
                lease_duration_seconds: Some(LEASE_DURATION_SECS),
                ..Default::default()
            }),
        };
        leases.create(&PostParams::default(), &lease).await?;
        info!("Created lease {} with holder {}", LEASE_NAME, identity);
        return Ok(true);
    };

    let spec = existing.spec.as_ref();
    let current_holder = spec.and_then(|s| s.holder_identity.as_deref());

    if current_holder == Some(identity) {
        let patch = serde_json::json!({
            "spec": {
                "renewTime": MicroTime(now),
                "leaseDurationSeconds": LEASE_DURATION_SECS,
            }
        });
        leases
            .patch(LEASE_NAME, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        return Ok(true);
    }

    let expired = spec
        .and_then(|s| s.renew_time.as_ref())
        .map(|renew| {
            let duration = spec
                .and_then(|s| s.lease_duration_seconds)
                .unwrap_or(LEASE_DURATION_SECS);
            now > renew.0 + chrono::Duration::seconds(duration as i64)
        })
        .unwrap_or(true);

    if !expired {
        return Ok(false);
    }

    info!("Lease held by {:?} has expired, taking over", current_holder);
    let patch = takeover_patch(&existing, identity, now);
    match leases
        .patch(LEASE_NAME, &PatchParams::default(), &Patch::Merge(&patch))
        .await
    {
        Ok(_) => Ok(true),
        // Another replica took the lease first
        Err(kube::Error::Api(e)) if e.code == 409 => Ok(false),
        Err(e) => Err(e),
    }
}

/// Takeover patch, conditional on the lease not having changed since it was read
fn takeover_patch(existing: &Lease, identity: &str, now: DateTime<Utc>) -> serde_json::Value {
    serde_json::json!({
        "metadata": {
            "resourceVersion": existing.resource_version(),
        },
        "spec": {
            "holderIdentity": identity,
            "acquireTime": MicroTime(now),
            "renewTime": MicroTime(now),
            "leaseDurationSeconds": LEASE_DURATION_SECS,
        }
    })
}
