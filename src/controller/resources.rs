//! Desired-state synthesizer
//!
//! Pure functions from a `Pulp` plus the [`EnvironmentFacts`] of the pass to
//! the Kubernetes objects the deployment consists of. Nothing here performs
//! I/O; the same inputs always yield the same objects.
//!
//! Objects are declarations of intent: fields the operator does not care
//! about stay unset so the API server and other controllers may fill them.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EmptyDirVolumeSource, EnvFromSource, EnvVar, EnvVarSource,
    ExecAction, HTTPGetAction, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, Probe, Secret, SecretEnvSource,
    SecretKeySelector, Service, ServicePort, ServiceSpec, TCPSocketAction, Volume, VolumeMount,
    VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Resource, ResourceExt};
use rand::distributions::Alphanumeric;
use rand::Rng;

use super::environment::EnvironmentFacts;
use crate::crd::{ComponentConfig, IngressType, Pulp};

pub const API_PORT: i32 = 24817;
pub const API_PORT_NAME: &str = "api-24817";
pub const CONTENT_PORT: i32 = 24816;
pub const CONTENT_PORT_NAME: &str = "content-24816";
pub const WEB_PORT: i32 = 8080;
pub const WEB_SERVICE_PORT: i32 = 24880;
pub const WEB_PORT_NAME: &str = "web-8080";
pub const POSTGRES_PORT: i32 = 5432;

pub const DEFAULT_POSTGRES_IMAGE: &str = "postgres:13";
pub const DEFAULT_POSTGRES_STORAGE: &str = "8Gi";
pub const DEFAULT_FILE_STORAGE_SIZE: &str = "20Gi";
pub const DEFAULT_FILE_STORAGE_ACCESS_MODE: &str = "ReadWriteOnce";

const POSTGRES_DATA_PATH: &str = "/var/lib/postgresql/data";
const FILE_STORAGE_PATH: &str = "/var/lib/pulp";
const OWNER_LABEL_VALUE: &str = "pulp-dev";

/// The stateless Pulp components
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Component {
    Api,
    Content,
    Worker,
    Web,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Api => "api",
            Component::Content => "content",
            Component::Worker => "worker",
            Component::Web => "web",
        }
    }

    fn config<'a>(&self, pulp: &'a Pulp) -> &'a ComponentConfig {
        match self {
            Component::Api => &pulp.spec.api,
            Component::Content => &pulp.spec.content,
            Component::Worker => &pulp.spec.worker,
            Component::Web => &pulp.spec.web,
        }
    }
}

/// Self-managed PostgreSQL objects
#[derive(Clone, Debug)]
pub struct DatabaseState {
    pub statefulset: StatefulSet,
    pub service: Service,
}

/// A component's Deployment and, when it serves traffic, its Service
#[derive(Clone, Debug)]
pub struct Workload {
    pub deployment: Deployment,
    pub service: Option<Service>,
}

/// Everything a pass converges towards, except the credentials secret
/// (random, see [`build_postgres_secret`]) and the exposure objects
/// (depend on discovered routes, see `routes`).
#[derive(Clone, Debug)]
pub struct DesiredState {
    pub database: Option<DatabaseState>,
    pub file_storage: Option<PersistentVolumeClaim>,
    pub api: Workload,
    pub content: Workload,
    pub worker: Workload,
    pub web: Option<Workload>,
}

/// Synthesize the desired children of `pulp`
pub fn synthesize(pulp: &Pulp, facts: &EnvironmentFacts) -> DesiredState {
    let file_storage = build_file_storage_pvc(pulp, facts);
    let file_claim = file_storage.as_ref().map(|pvc| pvc.name_any());

    DesiredState {
        database: (!facts.external_database).then(|| DatabaseState {
            statefulset: build_database_statefulset(pulp, facts),
            service: build_database_service(pulp),
        }),
        api: Workload {
            deployment: build_deployment(pulp, Component::Api, file_claim.as_deref()),
            service: Some(build_component_service(pulp, Component::Api)),
        },
        content: Workload {
            deployment: build_deployment(pulp, Component::Content, file_claim.as_deref()),
            service: Some(build_component_service(pulp, Component::Content)),
        },
        worker: Workload {
            deployment: build_deployment(pulp, Component::Worker, file_claim.as_deref()),
            service: None,
        },
        web: pulp.spec.ingress_type.deploys_web().then(|| Workload {
            deployment: build_deployment(pulp, Component::Web, None),
            service: Some(build_web_service(pulp)),
        }),
        file_storage,
    }
}

// ============================================================================
// Names, labels, ownership
// ============================================================================

/// Name of a child object: `<pulp name>-<suffix>`
pub fn resource_name(pulp: &Pulp, suffix: &str) -> String {
    format!("{}-{}", pulp.name_any(), suffix)
}

pub fn postgres_secret_name(pulp: &Pulp) -> String {
    resource_name(pulp, "postgres-configuration")
}

pub fn service_name(pulp: &Pulp, component: Component) -> String {
    resource_name(pulp, &format!("{}-svc", component.as_str()))
}

fn database_service_name(pulp: &Pulp) -> String {
    resource_name(pulp, "database-svc")
}

fn service_account_name(pulp: &Pulp) -> String {
    format!("{}-operator-controller-manager", pulp.spec.deployment_type)
}

/// Create an OwnerReference for garbage collection
pub fn owner_reference(pulp: &Pulp) -> OwnerReference {
    OwnerReference {
        api_version: Pulp::api_version(&()).to_string(),
        kind: Pulp::kind(&()).to_string(),
        name: pulp.name_any(),
        uid: pulp.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

fn managed_by(pulp: &Pulp) -> String {
    format!("{}-operator", pulp.spec.deployment_type)
}

/// Labels carried by a component's objects and pods
pub fn component_labels(pulp: &Pulp, component: &str) -> BTreeMap<String, String> {
    let dt = &pulp.spec.deployment_type;
    BTreeMap::from([
        (
            "app.kubernetes.io/name".to_string(),
            format!("{dt}-{component}"),
        ),
        (
            "app.kubernetes.io/instance".to_string(),
            format!("{dt}-{component}-{}", pulp.name_any()),
        ),
        ("app.kubernetes.io/component".to_string(), component.to_string()),
        ("app.kubernetes.io/part-of".to_string(), dt.clone()),
        ("app.kubernetes.io/managed-by".to_string(), managed_by(pulp)),
        ("owner".to_string(), OWNER_LABEL_VALUE.to_string()),
        ("pulp_cr".to_string(), pulp.name_any()),
    ])
}

/// Subset of the content labels used to find content pods
pub fn content_pod_selector(pulp: &Pulp) -> BTreeMap<String, String> {
    let dt = &pulp.spec.deployment_type;
    BTreeMap::from([
        ("app.kubernetes.io/part-of".to_string(), dt.clone()),
        ("app.kubernetes.io/managed-by".to_string(), managed_by(pulp)),
        (
            "app.kubernetes.io/instance".to_string(),
            format!("{dt}-content-{}", pulp.name_any()),
        ),
        ("app.kubernetes.io/component".to_string(), "content".to_string()),
    ])
}

pub fn database_labels(pulp: &Pulp) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".to_string(), "postgres".to_string()),
        (
            "app.kubernetes.io/instance".to_string(),
            format!("postgres-{}", pulp.name_any()),
        ),
        ("app.kubernetes.io/component".to_string(), "database".to_string()),
        (
            "app.kubernetes.io/part-of".to_string(),
            pulp.spec.deployment_type.clone(),
        ),
        ("app.kubernetes.io/managed-by".to_string(), managed_by(pulp)),
        ("owner".to_string(), OWNER_LABEL_VALUE.to_string()),
    ])
}

/// Database labels plus the pod selector keys
pub fn database_selector_labels(pulp: &Pulp) -> BTreeMap<String, String> {
    let mut labels = database_labels(pulp);
    labels.insert("app".to_string(), "postgresql".to_string());
    labels.insert("pulp_cr".to_string(), pulp.name_any());
    labels
}

fn metadata(pulp: &Pulp, name: String, labels: BTreeMap<String, String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: pulp.namespace(),
        labels: Some(labels),
        ..Default::default()
    }
}

fn secret_env(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: Some(secret.to_string()),
                key: key.to_string(),
                optional: None,
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn plain_env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn empty_dir(name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }
}

fn storage_request(size: &str) -> VolumeResourceRequirements {
    VolumeResourceRequirements {
        requests: Some(BTreeMap::from([(
            "storage".to_string(),
            Quantity(size.to_string()),
        )])),
        ..Default::default()
    }
}

// ============================================================================
// Database credentials
// ============================================================================

/// Random password for a freshly created database
pub fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Connection secret for the self-managed database
///
/// Only ever created; an existing secret keeps its password.
pub fn build_postgres_secret(pulp: &Pulp, password: &str) -> Secret {
    let dt = &pulp.spec.deployment_type;
    Secret {
        metadata: metadata(pulp, postgres_secret_name(pulp), database_labels(pulp)),
        string_data: Some(BTreeMap::from([
            ("database".to_string(), dt.clone()),
            ("username".to_string(), dt.clone()),
            ("password".to_string(), password.to_string()),
            ("host".to_string(), database_service_name(pulp)),
            ("port".to_string(), POSTGRES_PORT.to_string()),
            ("sslmode".to_string(), "prefer".to_string()),
            ("type".to_string(), "managed".to_string()),
        ])),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

// ============================================================================
// Database StatefulSet and Service
// ============================================================================

fn pg_isready_probe(pulp: &Pulp, initial_delay: i32) -> Probe {
    Probe {
        exec: Some(ExecAction {
            command: Some(vec![
                "/bin/sh".to_string(),
                "-i".to_string(),
                "-c".to_string(),
                format!(
                    "pg_isready -U {} -h 127.0.0.1 -p {}",
                    pulp.spec.deployment_type, POSTGRES_PORT
                ),
            ]),
        }),
        initial_delay_seconds: Some(initial_delay),
        period_seconds: Some(10),
        timeout_seconds: Some(5),
        failure_threshold: Some(6),
        success_threshold: Some(1),
        ..Default::default()
    }
}

fn database_env(pulp: &Pulp) -> Vec<EnvVar> {
    let secret = postgres_secret_name(pulp);
    vec![
        secret_env("POSTGRESQL_DATABASE", &secret, "database"),
        secret_env("POSTGRESQL_USER", &secret, "username"),
        secret_env("POSTGRESQL_PASSWORD", &secret, "password"),
        secret_env("POSTGRES_DB", &secret, "database"),
        secret_env("POSTGRES_USER", &secret, "username"),
        secret_env("POSTGRES_PASSWORD", &secret, "password"),
        plain_env("PGDATA", format!("{POSTGRES_DATA_PATH}/pgdata")),
        plain_env("POSTGRES_INITDB_ARGS", "--auth-host=scram-sha-256"),
        plain_env("POSTGRES_HOST_AUTH_METHOD", "scram-sha-256"),
    ]
}

/// Whether the database gets a claim template instead of scratch space
pub fn database_uses_claim(pulp: &Pulp, facts: &EnvironmentFacts) -> bool {
    !facts.external_database
        && (pulp.spec.database.postgres_storage_class.is_some() || facts.default_storage_class)
}

pub fn build_database_statefulset(pulp: &Pulp, facts: &EnvironmentFacts) -> StatefulSet {
    let db = &pulp.spec.database;
    let selector_labels = database_selector_labels(pulp);

    let (volumes, claim_templates) = if database_uses_claim(pulp, facts) {
        let size = db
            .postgres_storage_requirements
            .as_deref()
            .unwrap_or(DEFAULT_POSTGRES_STORAGE);
        let template = PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some("postgres".to_string()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                storage_class_name: db.postgres_storage_class.clone(),
                resources: Some(storage_request(size)),
                ..Default::default()
            }),
            status: None,
        };
        (None, Some(vec![template]))
    } else {
        (Some(vec![empty_dir("postgres")]), None)
    };

    let container = Container {
        name: "postgres".to_string(),
        image: Some(
            db.postgres_image
                .clone()
                .unwrap_or_else(|| DEFAULT_POSTGRES_IMAGE.to_string()),
        ),
        env: Some(database_env(pulp)),
        ports: Some(vec![ContainerPort {
            name: Some("postgres".to_string()),
            container_port: POSTGRES_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        liveness_probe: Some(pg_isready_probe(pulp, 30)),
        readiness_probe: Some(pg_isready_probe(pulp, 5)),
        resources: db.postgres_resource_requirements.clone(),
        volume_mounts: Some(vec![VolumeMount {
            name: "postgres".to_string(),
            mount_path: POSTGRES_DATA_PATH.to_string(),
            sub_path: Some("pgdata".to_string()),
            ..Default::default()
        }]),
        ..Default::default()
    };

    StatefulSet {
        metadata: metadata(pulp, resource_name(pulp, "database"), database_labels(pulp)),
        spec: Some(StatefulSetSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector_labels.clone()),
                ..Default::default()
            },
            service_name: database_service_name(pulp),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(selector_labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    affinity: db.affinity.clone(),
                    containers: vec![container],
                    restart_policy: Some("Always".to_string()),
                    service_account_name: Some(service_account_name(pulp)),
                    volumes,
                    ..Default::default()
                }),
            },
            volume_claim_templates: claim_templates,
            ..Default::default()
        }),
        status: None,
    }
}

pub fn build_database_service(pulp: &Pulp) -> Service {
    Service {
        metadata: metadata(pulp, database_service_name(pulp), database_labels(pulp)),
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            selector: Some(database_selector_labels(pulp)),
            ports: Some(vec![ServicePort {
                name: Some("postgres".to_string()),
                port: POSTGRES_PORT,
                target_port: Some(IntOrString::Int(POSTGRES_PORT)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

// ============================================================================
// File storage
// ============================================================================

pub fn build_file_storage_pvc(
    pulp: &Pulp,
    facts: &EnvironmentFacts,
) -> Option<PersistentVolumeClaim> {
    let spec = &pulp.spec;
    if facts.object_storage || (spec.file_storage_class.is_none() && !facts.default_storage_class)
    {
        return None;
    }

    Some(PersistentVolumeClaim {
        metadata: metadata(
            pulp,
            resource_name(pulp, "file-storage"),
            component_labels(pulp, "storage"),
        ),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec![spec
                .file_storage_access_mode
                .clone()
                .unwrap_or_else(|| DEFAULT_FILE_STORAGE_ACCESS_MODE.to_string())]),
            storage_class_name: spec.file_storage_class.clone(),
            resources: Some(storage_request(
                spec.file_storage_size
                    .as_deref()
                    .unwrap_or(DEFAULT_FILE_STORAGE_SIZE),
            )),
            ..Default::default()
        }),
        status: None,
    })
}

// ============================================================================
// Component Deployments
// ============================================================================

fn connection_env(pulp: &Pulp) -> Vec<EnvVar> {
    let secret = pulp
        .spec
        .database
        .external_db_secret
        .clone()
        .unwrap_or_else(|| postgres_secret_name(pulp));
    vec![
        secret_env("POSTGRES_SERVICE_HOST", &secret, "host"),
        secret_env("POSTGRES_SERVICE_PORT", &secret, "port"),
        secret_env("POSTGRES_DB", &secret, "database"),
        secret_env("POSTGRES_USER", &secret, "username"),
        secret_env("POSTGRES_PASSWORD", &secret, "password"),
    ]
}

fn content_origin(pulp: &Pulp) -> String {
    let host = match pulp.spec.ingress_type {
        IngressType::Route => pulp.spec.route_host.as_deref(),
        IngressType::Ingress => pulp.spec.ingress_host.as_deref(),
        _ => None,
    };
    match host {
        Some(host) => format!("https://{host}"),
        None => format!(
            "http://{}.{}.svc:{}",
            service_name(pulp, Component::Content),
            pulp.namespace().unwrap_or_else(|| "default".to_string()),
            CONTENT_PORT
        ),
    }
}

fn settings_env(pulp: &Pulp) -> Vec<EnvVar> {
    let settings = &pulp.spec.pulp_settings;
    let mut env = vec![
        plain_env("PULP_API_ROOT", settings.api_root.clone()),
        plain_env("PULP_CONTENT_PATH_PREFIX", settings.content_path_prefix.clone()),
        plain_env("PULP_CONTENT_ORIGIN", content_origin(pulp)),
    ];

    let backend = if pulp.spec.object_storage_s3_secret.is_some() {
        Some("storages.backends.s3boto3.S3Boto3Storage")
    } else if pulp.spec.object_storage_azure_secret.is_some() {
        Some("storages.backends.azure_storage.AzureStorage")
    } else {
        None
    };
    if let Some(backend) = backend {
        env.push(plain_env("PULP_DEFAULT_FILE_STORAGE", backend));
    }
    env
}

fn object_storage_env_from(pulp: &Pulp) -> Option<Vec<EnvFromSource>> {
    let secret = pulp
        .spec
        .object_storage_s3_secret
        .as_ref()
        .or(pulp.spec.object_storage_azure_secret.as_ref())?;
    Some(vec![EnvFromSource {
        secret_ref: Some(SecretEnvSource {
            name: Some(secret.clone()),
            optional: None,
        }),
        ..Default::default()
    }])
}

fn component_probe(pulp: &Pulp, component: Component) -> Option<Probe> {
    let probe = |action: Probe, delay: i32| Probe {
        initial_delay_seconds: Some(delay),
        period_seconds: Some(10),
        timeout_seconds: Some(10),
        failure_threshold: Some(8),
        success_threshold: Some(1),
        ..action
    };
    let http = |path: String, port: i32| Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path),
            port: IntOrString::Int(port),
            ..Default::default()
        }),
        ..Default::default()
    };

    match component {
        Component::Api => Some(probe(
            http(format!("{}api/v3/status/", pulp.spec.pulp_settings.api_root), API_PORT),
            60,
        )),
        Component::Content => Some(probe(
            Probe {
                tcp_socket: Some(TCPSocketAction {
                    port: IntOrString::Int(CONTENT_PORT),
                    ..Default::default()
                }),
                ..Default::default()
            },
            10,
        )),
        Component::Web => Some(probe(http("/".to_string(), WEB_PORT), 10)),
        Component::Worker => None,
    }
}

fn build_container(pulp: &Pulp, component: Component, file_claim: Option<&str>) -> Container {
    let config = component.config(pulp);

    if component == Component::Web {
        return Container {
            name: component.as_str().to_string(),
            image: Some(pulp.spec.web_image()),
            ports: Some(vec![ContainerPort {
                container_port: WEB_PORT,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            readiness_probe: component_probe(pulp, component),
            resources: config.resource_requirements.clone(),
            ..Default::default()
        };
    }

    let mut env = connection_env(pulp);
    env.extend(settings_env(pulp));

    let port = match component {
        Component::Api => Some(API_PORT),
        Component::Content => Some(CONTENT_PORT),
        _ => None,
    };

    let mut mounts = Vec::new();
    if file_claim.is_some() {
        mounts.push(VolumeMount {
            name: "file-storage".to_string(),
            mount_path: FILE_STORAGE_PATH.to_string(),
            ..Default::default()
        });
    } else if component == Component::Api {
        mounts.push(VolumeMount {
            name: "tmp-file-storage".to_string(),
            mount_path: format!("{FILE_STORAGE_PATH}/tmp"),
            ..Default::default()
        });
        mounts.push(VolumeMount {
            name: "assets-file-storage".to_string(),
            mount_path: format!("{FILE_STORAGE_PATH}/assets"),
            ..Default::default()
        });
    }

    Container {
        name: component.as_str().to_string(),
        image: Some(pulp.spec.pulp_image()),
        args: Some(vec![format!("pulp-{}", component.as_str())]),
        env: Some(env),
        env_from: object_storage_env_from(pulp),
        ports: port.map(|port| {
            vec![ContainerPort {
                container_port: port,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]
        }),
        readiness_probe: component_probe(pulp, component),
        resources: config.resource_requirements.clone(),
        volume_mounts: (!mounts.is_empty()).then_some(mounts),
        ..Default::default()
    }
}

fn component_volumes(component: Component, file_claim: Option<&str>) -> Option<Vec<Volume>> {
    match (component, file_claim) {
        (Component::Web, _) => None,
        (_, Some(claim)) => Some(vec![Volume {
            name: "file-storage".to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: claim.to_string(),
                read_only: None,
            }),
            ..Default::default()
        }]),
        (Component::Api, None) => Some(vec![
            empty_dir("tmp-file-storage"),
            empty_dir("assets-file-storage"),
        ]),
        (_, None) => None,
    }
}

/// Deployment for one stateless component
pub fn build_deployment(pulp: &Pulp, component: Component, file_claim: Option<&str>) -> Deployment {
    let labels = component_labels(pulp, component.as_str());
    let config = component.config(pulp);

    Deployment {
        metadata: metadata(pulp, resource_name(pulp, component.as_str()), labels.clone()),
        spec: Some(DeploymentSpec {
            replicas: Some(config.replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![build_container(pulp, component, file_claim)],
                    service_account_name: Some(service_account_name(pulp)),
                    volumes: component_volumes(component, file_claim),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

// ============================================================================
// Component Services
// ============================================================================

/// ClusterIP service in front of the api or content pods
pub fn build_component_service(pulp: &Pulp, component: Component) -> Service {
    let labels = component_labels(pulp, component.as_str());
    let (port, port_name) = match component {
        Component::Content => (CONTENT_PORT, CONTENT_PORT_NAME),
        _ => (API_PORT, API_PORT_NAME),
    };

    Service {
        metadata: metadata(pulp, service_name(pulp, component), labels.clone()),
        spec: Some(ServiceSpec {
            selector: Some(labels),
            ports: Some(vec![ServicePort {
                name: Some(port_name.to_string()),
                port,
                target_port: Some(IntOrString::Int(port)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

/// Web service; its type follows the exposure mode
pub fn build_web_service(pulp: &Pulp) -> Service {
    let labels = component_labels(pulp, Component::Web.as_str());
    let (type_, node_port) = match pulp.spec.ingress_type {
        IngressType::Nodeport => ("NodePort", pulp.spec.nodeport_port),
        IngressType::Loadbalancer => ("LoadBalancer", None),
        IngressType::Ingress | IngressType::Route => ("ClusterIP", None),
    };

    Service {
        metadata: metadata(pulp, service_name(pulp, Component::Web), labels.clone()),
        spec: Some(ServiceSpec {
            type_: Some(type_.to_string()),
            selector: Some(labels),
            ports: Some(vec![ServicePort {
                name: Some(WEB_PORT_NAME.to_string()),
                port: WEB_SERVICE_PORT,
                target_port: Some(IntOrString::Int(WEB_PORT)),
                protocol: Some("TCP".to_string()),
                node_port,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    }
}
