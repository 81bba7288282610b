//! Dynamic route resolver
//!
//! Plugins installed in the Pulp image contribute URL paths that are only
//! known at runtime. They are discovered by running an introspection
//! command inside a running content pod, merged with a fixed default set and
//! assembled into either one Ingress or a set of OpenShift Routes.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, instrument, warn};

use super::cluster::Cluster;
use super::resources::{
    component_labels, content_pod_selector, service_name, Component, API_PORT_NAME,
    CONTENT_PORT_NAME,
};
use crate::crd::route::{annotations, route_annotations};
use crate::crd::{IngressType, Pulp, Route, RoutePort, RouteSpec, RouteTargetReference, TlsConfig};
use crate::error::Result;

/// Script in the Pulp image that prints plugin routes as JSON
pub const ROUTE_PATHS_COMMAND: &str = "/usr/bin/route_paths.py";
pub const CONTENT_CONTAINER: &str = "content";

pub const CONFIGURATION_SNIPPET: &str = "nginx.ingress.kubernetes.io/configuration-snippet";

/// One unit of external routing intent
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct RouteDescriptor {
    #[serde(deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub path: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub service_name: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub target_port: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub rewrite: String,
}

// Plugins print `null` for fields they leave unset
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl RouteDescriptor {
    fn new(name: String, path: String, service_name: String, target_port: &str) -> Self {
        Self {
            name,
            path,
            service_name,
            target_port: target_port.to_string(),
            rewrite: String::new(),
        }
    }
}

/// Outcome of route discovery
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// No content pod is Running yet; try again shortly
    ContentPodNotRunning,
    /// Defaults followed by discovered descriptors
    Resolved(Vec<RouteDescriptor>),
}

pub fn first_running_pod(pods: &[Pod]) -> Option<&Pod> {
    pods.iter().find(|pod| {
        let phase = pod.status.as_ref().and_then(|s| s.phase.as_deref());
        debug!("Content pod {} is {}", pod.name_any(), phase.unwrap_or("Unknown"));
        phase == Some("Running")
    })
}

/// Parse the introspection output.
///
/// Anything that is not a JSON array of descriptors yields no descriptors.
pub fn parse_descriptors(output: &str) -> Vec<RouteDescriptor> {
    let output = output.trim();
    if output.is_empty() {
        return Vec::new();
    }
    match serde_json::from_str(output) {
        Ok(descriptors) => descriptors,
        Err(e) => {
            warn!("Ignoring unparseable route discovery output: {}", e);
            Vec::new()
        }
    }
}

fn ingress_defaults(pulp: &Pulp) -> Vec<RouteDescriptor> {
    let name = pulp.name_any();
    let settings = &pulp.spec.pulp_settings;
    let api_svc = service_name(pulp, Component::Api);
    vec![
        RouteDescriptor::new(
            format!("{name}-content"),
            settings.content_path_prefix.clone(),
            service_name(pulp, Component::Content),
            CONTENT_PORT_NAME,
        ),
        RouteDescriptor::new(
            format!("{name}-api-v3"),
            format!("{}api/v3/", settings.api_root),
            api_svc.clone(),
            API_PORT_NAME,
        ),
        RouteDescriptor::new(
            format!("{name}-auth"),
            "/auth/login/".to_string(),
            api_svc.clone(),
            API_PORT_NAME,
        ),
        RouteDescriptor::new(name, "/".to_string(), api_svc, API_PORT_NAME),
    ]
}

fn route_defaults(pulp: &Pulp) -> Vec<RouteDescriptor> {
    let name = pulp.name_any();
    let api_svc = service_name(pulp, Component::Api);
    vec![
        RouteDescriptor::new(name.clone(), "/".to_string(), api_svc.clone(), API_PORT_NAME),
        RouteDescriptor::new(
            format!("{name}-content"),
            "/pulp/content/".to_string(),
            service_name(pulp, Component::Content),
            "api-24816",
        ),
        RouteDescriptor::new(
            format!("{name}-api-v3"),
            format!("{}api/v3", pulp.spec.pulp_settings.api_root),
            api_svc.clone(),
            API_PORT_NAME,
        ),
        RouteDescriptor::new(
            format!("{name}-auth"),
            "/auth/login".to_string(),
            api_svc,
            API_PORT_NAME,
        ),
    ]
}

/// The fixed routes every deployment exposes, per exposure mechanism
pub fn default_descriptors(pulp: &Pulp) -> Vec<RouteDescriptor> {
    match pulp.spec.ingress_type {
        IngressType::Ingress => ingress_defaults(pulp),
        IngressType::Route => route_defaults(pulp),
        IngressType::Nodeport | IngressType::Loadbalancer => Vec::new(),
    }
}

/// Defaults first, then discovered descriptors, in order.
///
/// Entries sharing a path are all kept.
pub fn merge_descriptors(
    defaults: Vec<RouteDescriptor>,
    discovered: Vec<RouteDescriptor>,
) -> Vec<RouteDescriptor> {
    defaults.into_iter().chain(discovered).collect()
}

/// Discover the routes of a running deployment.
///
/// # Errors
///
/// Listing pods or running the introspection command may fail; a content
/// pod that simply isn't Running yet is reported as
/// [`Resolution::ContentPodNotRunning`] instead.
#[instrument(skip(cluster, pulp), fields(name = %pulp.name_any()))]
pub async fn resolve<C: Cluster>(cluster: &C, pulp: &Pulp) -> Result<Resolution> {
    let namespace = pulp.namespace().unwrap_or_else(|| "default".to_string());
    let pods: Vec<Pod> = cluster.list(&namespace, &content_pod_selector(pulp)).await?;

    let Some(pod) = first_running_pod(&pods) else {
        info!("Content pod isn't running yet");
        return Ok(Resolution::ContentPodNotRunning);
    };

    let output = cluster
        .exec(
            &namespace,
            &pod.name_any(),
            CONTENT_CONTAINER,
            vec![ROUTE_PATHS_COMMAND.to_string(), pulp.name_any()],
        )
        .await?;

    let discovered = parse_descriptors(&output);
    debug!("Discovered {} plugin routes", discovered.len());
    Ok(Resolution::Resolved(merge_descriptors(
        default_descriptors(pulp),
        discovered,
    )))
}

// ============================================================================
// Ingress
// ============================================================================

fn ingress_annotations(pulp: &Pulp) -> BTreeMap<String, String> {
    let mut annotations = route_annotations(&pulp.spec.haproxy_timeout);
    for (key, value) in [
        ("nginx.ingress.kubernetes.io/proxy-body-size", "0"),
        ("nginx.org/client-max-body-size", "10m"),
        ("nginx.ingress.kubernetes.io/proxy-read-timeout", "120s"),
        ("nginx.ingress.kubernetes.io/proxy-connect-timeout", "120s"),
        ("nginx.ingress.kubernetes.io/proxy-send-timeout", "120s"),
    ] {
        annotations.insert(key.to_string(), value.to_string());
    }
    annotations
}

/// nginx rewrite directive for a descriptor with a rewrite rule
pub fn rewrite_directive(descriptor: &RouteDescriptor) -> String {
    format!(
        "rewrite ^{}* {};",
        descriptor.path.trim_end_matches('/'),
        descriptor.rewrite
    )
}

/// Assemble the Ingress named after the Pulp.
///
/// Descriptors with a rewrite become nginx directives instead of path
/// rules. Only one directive is kept: a later rewrite replaces an earlier
/// one unless the annotation already contains it.
pub fn build_ingress(pulp: &Pulp, descriptors: &[RouteDescriptor]) -> Ingress {
    let mut annotations = ingress_annotations(pulp);
    let mut paths = Vec::new();

    for descriptor in descriptors {
        if !descriptor.rewrite.is_empty() {
            let directive = rewrite_directive(descriptor);
            let present = annotations
                .get(CONFIGURATION_SNIPPET)
                .is_some_and(|snippet| snippet.contains(&directive));
            if !present {
                annotations.insert(CONFIGURATION_SNIPPET.to_string(), directive);
            }
            continue;
        }

        paths.push(HTTPIngressPath {
            path: Some(descriptor.path.clone()),
            path_type: "Prefix".to_string(),
            backend: IngressBackend {
                service: Some(IngressServiceBackend {
                    name: descriptor.service_name.clone(),
                    port: Some(ServiceBackendPort {
                        name: Some(descriptor.target_port.clone()),
                        number: None,
                    }),
                }),
                ..Default::default()
            },
        });
    }

    Ingress {
        metadata: ObjectMeta {
            name: Some(pulp.name_any()),
            namespace: pulp.namespace(),
            labels: Some(component_labels(pulp, "ingress")),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            ingress_class_name: pulp.spec.ingress_class_name.clone(),
            rules: Some(vec![IngressRule {
                host: pulp.spec.ingress_host.clone(),
                http: Some(HTTPIngressRuleValue { paths }),
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

// ============================================================================
// OpenShift Routes
// ============================================================================

fn build_route(pulp: &Pulp, descriptor: &RouteDescriptor) -> Route {
    let mut annotations = route_annotations(&pulp.spec.haproxy_timeout);
    if !descriptor.rewrite.is_empty() {
        annotations.insert(
            annotations::REWRITE_TARGET.to_string(),
            descriptor.rewrite.clone(),
        );
    }

    let mut route = Route::new(
        &descriptor.name,
        RouteSpec {
            host: pulp.spec.route_host.clone(),
            path: Some(descriptor.path.clone()),
            port: (!descriptor.target_port.is_empty()).then(|| RoutePort {
                target_port: descriptor.target_port.clone(),
            }),
            to: RouteTargetReference {
                kind: "Service".to_string(),
                name: descriptor.service_name.clone(),
                weight: Some(100),
            },
            tls: Some(TlsConfig {
                termination: "edge".to_string(),
                insecure_edge_termination_policy: Some("Redirect".to_string()),
            }),
            wildcard_policy: Some("None".to_string()),
        },
    );
    route.metadata.namespace = pulp.namespace();
    route.metadata.labels = Some(component_labels(pulp, "route"));
    route.metadata.annotations = Some(annotations);
    route
}

/// One Route per descriptor, named after it.
///
/// A descriptor without a name, or reusing a name already emitted, is
/// skipped.
pub fn build_routes(pulp: &Pulp, descriptors: &[RouteDescriptor]) -> Vec<Route> {
    let mut seen = BTreeSet::new();
    let mut routes = Vec::new();

    for descriptor in descriptors {
        if descriptor.name.is_empty() {
            warn!("Skipping route for path {}: descriptor has no name", descriptor.path);
            continue;
        }
        if !seen.insert(descriptor.name.as_str()) {
            warn!(
                "Skipping route {} for path {}: name already in use",
                descriptor.name, descriptor.path
            );
            continue;
        }
        routes.push(build_route(pulp, descriptor));
    }

    routes
}
