//! OpenShift Route (`route.openshift.io/v1`)
//!
//! Only the fields the operator writes are modelled; the Route CRD itself is
//! installed by OpenShift, never by this operator.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(group = "route.openshift.io", version = "v1", kind = "Route", namespaced)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<RoutePort>,

    pub to: RouteTargetReference,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub wildcard_policy: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoutePort {
    /// Service port name
    pub target_port: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteTargetReference {
    pub kind: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    pub termination: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insecure_edge_termination_policy: Option<String>,
}

/// Annotation keys understood by the OpenShift router
pub mod annotations {
    pub const TIMEOUT: &str = "haproxy.router.openshift.io/timeout";
    pub const REWRITE_TARGET: &str = "haproxy.router.openshift.io/rewrite-target";
}

/// Build route annotations with the router timeout set
pub fn route_annotations(timeout: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(annotations::TIMEOUT.to_string(), timeout.to_string())])
}
