//! Pulp Custom Resource Definition
//!
//! A Pulp resource declares one complete Pulp deployment: database, API,
//! content, worker and web components plus how they are exposed.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{ComponentConfig, Condition, DatabaseConfig, IngressType, PulpSettings};

/// Structured validation error for `PulpSpec`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpecValidationError {
    pub field: String,
    pub message: String,
    pub how_to_fix: String,
}

impl SpecValidationError {
    pub fn new(
        field: impl Into<String>,
        message: impl Into<String>,
        how_to_fix: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            how_to_fix: how_to_fix.into(),
        }
    }
}

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "repo-manager.pulpproject.org",
    version = "v1alpha1",
    kind = "Pulp",
    namespaced,
    status = "PulpStatus",
    shortname = "pulp",
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.deploymentType"}"#,
    printcolumn = r#"{"name":"Ingress","type":"string","jsonPath":".spec.ingressType"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PulpSpec {
    #[serde(default = "default_deployment_type")]
    pub deployment_type: String,

    #[serde(default = "default_image")]
    pub image: String,

    #[serde(default = "default_image_version")]
    pub image_version: String,

    #[serde(default = "default_image_web")]
    pub image_web: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_web_version: Option<String>,

    #[serde(default)]
    pub api: ComponentConfig,

    #[serde(default)]
    pub content: ComponentConfig,

    #[serde(default)]
    pub worker: ComponentConfig,

    #[serde(default)]
    pub web: ComponentConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_storage_access_mode: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_storage_size: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_storage_class: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_storage_s3_secret: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_storage_azure_secret: Option<String>,

    #[serde(default)]
    pub ingress_type: IngressType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress_host: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress_class_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_host: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodeport_port: Option<i32>,

    #[serde(default = "default_haproxy_timeout")]
    pub haproxy_timeout: String,

    #[serde(default)]
    pub pulp_settings: PulpSettings,
}

fn default_deployment_type() -> String {
    "pulp".to_string()
}

fn default_image() -> String {
    "quay.io/pulp/pulp-minimal".to_string()
}

fn default_image_version() -> String {
    "stable".to_string()
}

fn default_image_web() -> String {
    "quay.io/pulp/pulp-web".to_string()
}

fn default_haproxy_timeout() -> String {
    "180s".to_string()
}

impl PulpSpec {
    /// Validate cross-field invariants the schema cannot express
    ///
    /// # Errors
    ///
    /// Returns every violation found, not just the first one.
    pub fn validate(&self) -> Result<(), Vec<SpecValidationError>> {
        let mut errors = Vec::new();

        if self.deployment_type.trim().is_empty() {
            errors.push(SpecValidationError::new(
                "spec.deploymentType",
                "deploymentType must not be empty",
                "Remove the field to use the default \"pulp\"",
            ));
        }

        if self.database.is_external() && self.database.postgres_storage_class.is_some() {
            errors.push(SpecValidationError::new(
                "spec.database.postgresStorageClass",
                "postgresStorageClass cannot be combined with externalDbSecret",
                "Remove postgresStorageClass or externalDbSecret",
            ));
        }

        if self.object_storage_s3_secret.is_some() && self.object_storage_azure_secret.is_some() {
            errors.push(SpecValidationError::new(
                "spec.objectStorageS3Secret",
                "only one object storage backend may be configured",
                "Keep either objectStorageS3Secret or objectStorageAzureSecret",
            ));
        }

        if self.object_storage_configured() && self.file_storage_class.is_some() {
            errors.push(SpecValidationError::new(
                "spec.fileStorageClass",
                "fileStorageClass cannot be combined with object storage",
                "Remove fileStorageClass or the object storage secret",
            ));
        }

        for (field, component) in [
            ("spec.api.replicas", &self.api),
            ("spec.content.replicas", &self.content),
            ("spec.worker.replicas", &self.worker),
            ("spec.web.replicas", &self.web),
        ] {
            if component.replicas < 0 {
                errors.push(SpecValidationError::new(
                    field,
                    "replicas must not be negative",
                    "Set replicas to 0 or more",
                ));
            }
        }

        match self.ingress_type {
            IngressType::Route if is_blank(&self.route_host) => {
                errors.push(SpecValidationError::new(
                    "spec.routeHost",
                    "routeHost is required when ingressType is route",
                    "Set spec.routeHost to the externally reachable hostname",
                ));
            }
            IngressType::Ingress if is_blank(&self.ingress_host) => {
                errors.push(SpecValidationError::new(
                    "spec.ingressHost",
                    "ingressHost is required when ingressType is ingress",
                    "Set spec.ingressHost to the externally reachable hostname",
                ));
            }
            _ => {}
        }

        if !self.pulp_settings.api_root.starts_with('/') || !self.pulp_settings.api_root.ends_with('/')
        {
            errors.push(SpecValidationError::new(
                "spec.pulpSettings.apiRoot",
                "apiRoot must start and end with '/'",
                "Use a value such as \"/pulp/\"",
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn object_storage_configured(&self) -> bool {
        self.object_storage_s3_secret.is_some() || self.object_storage_azure_secret.is_some()
    }

    /// Image reference used by the api, content and worker containers
    pub fn pulp_image(&self) -> String {
        format!("{}:{}", self.image, self.image_version)
    }

    pub fn web_image(&self) -> String {
        let version = self
            .image_web_version
            .as_deref()
            .unwrap_or(&self.image_version);
        format!("{}:{}", self.image_web, version)
    }

    /// Deployment type with its first letter upper-cased, used as the
    /// condition type prefix ("pulp" -> "Pulp")
    pub fn title(&self) -> String {
        let mut chars = self.deployment_type.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
            None => String::new(),
        }
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).map_or(true, str::is_empty)
}

/// Status of a Pulp resource, written only by the operator
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PulpStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
