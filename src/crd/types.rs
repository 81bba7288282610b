//! Shared types for the Pulp CRD

use k8s_openapi::api::core::v1::{Affinity, ResourceRequirements};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How the deployment is exposed outside the cluster
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IngressType {
    /// Web component behind a NodePort service
    #[default]
    Nodeport,
    /// Web component behind a LoadBalancer service
    Loadbalancer,
    /// Ingress object with discovered plugin paths, web component kept
    Ingress,
    /// OpenShift Routes per path, no web component
    Route,
}

impl IngressType {
    /// Whether this mode needs the dynamic route resolver
    pub fn resolves_routes(&self) -> bool {
        matches!(self, IngressType::Ingress | IngressType::Route)
    }

    /// Whether the nginx based web component is deployed
    pub fn deploys_web(&self) -> bool {
        !matches!(self, IngressType::Route)
    }
}

impl std::fmt::Display for IngressType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngressType::Nodeport => write!(f, "nodeport"),
            IngressType::Loadbalancer => write!(f, "loadbalancer"),
            IngressType::Ingress => write!(f, "ingress"),
            IngressType::Route => write!(f, "route"),
        }
    }
}

/// Sizing for one stateless component (api, content, worker, web)
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentConfig {
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub resource_requirements: Option<ResourceRequirements>,
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self {
            replicas: default_replicas(),
            resource_requirements: None,
        }
    }
}

fn default_replicas() -> i32 {
    1
}

/// Database settings
///
/// Either the operator runs its own PostgreSQL (`externalDbSecret` unset) or
/// the components connect to the database described by `externalDbSecret`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    /// Secret with `host`, `port`, `database`, `username` and `password` keys
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_db_secret: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres_storage_requirements: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres_storage_class: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres_image: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub postgres_resource_requirements: Option<ResourceRequirements>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub affinity: Option<Affinity>,
}

impl DatabaseConfig {
    pub fn is_external(&self) -> bool {
        self.external_db_secret.is_some()
    }
}

/// Application settings forwarded to the Pulp components
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PulpSettings {
    #[serde(default = "default_api_root")]
    pub api_root: String,

    #[serde(default = "default_content_path_prefix")]
    pub content_path_prefix: String,
}

impl Default for PulpSettings {
    fn default() -> Self {
        Self {
            api_root: default_api_root(),
            content_path_prefix: default_content_path_prefix(),
        }
    }
}

fn default_api_root() -> String {
    "/pulp/".to_string()
}

fn default_content_path_prefix() -> String {
    "/pulp/content/".to_string()
}

/// Kubernetes-style condition on the Pulp status
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    /// "True" or "False"
    pub status: String,
    pub last_transition_time: String,
    /// Machine-readable reason for the condition
    pub reason: String,
    /// Human-readable message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    pub fn new(type_: &str, state: bool, reason: &str, message: &str) -> Self {
        Self {
            type_: type_.to_string(),
            status: if state { "True" } else { "False" }.to_string(),
            last_transition_time: chrono::Utc::now().to_rfc3339(),
            reason: reason.to_string(),
            message: message.to_string(),
            observed_generation: None,
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}
