//! Kinds the operator owns and the fields it keeps in sync on each of them

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use serde_json::{json, Value};

use super::cluster::NamespacedKind;
use super::routes::CONFIGURATION_SNIPPET;
use crate::crd::Route;

/// A child object kind managed through the drift corrector.
///
/// `tracked` projects the fields the operator owns; drift is detected by
/// derivative comparison of the desired projection against the live one.
/// `adopt` copies exactly those fields from the desired object onto the
/// live object before it is written back, so fields set by other actors
/// (server defaults, admission webhooks, autoscalers on untracked fields)
/// are preserved.
pub trait ManagedChild: NamespacedKind {
    fn tracked(&self) -> Value;

    fn adopt(&mut self, desired: &Self);
}

fn merge_map(live: &mut Option<BTreeMap<String, String>>, desired: &Option<BTreeMap<String, String>>) {
    if let Some(desired) = desired {
        live.get_or_insert_with(BTreeMap::new)
            .extend(desired.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

impl ManagedChild for StatefulSet {
    fn tracked(&self) -> Value {
        let spec = self.spec.as_ref();
        json!({
            "replicas": spec.and_then(|s| s.replicas),
            "template": spec.map(|s| &s.template),
        })
    }

    fn adopt(&mut self, desired: &Self) {
        if let (Some(live), Some(desired)) = (self.spec.as_mut(), desired.spec.as_ref()) {
            live.replicas = desired.replicas;
            live.template = desired.template.clone();
        }
    }
}

impl ManagedChild for Deployment {
    fn tracked(&self) -> Value {
        let spec = self.spec.as_ref();
        json!({
            "replicas": spec.and_then(|s| s.replicas),
            "template": spec.map(|s| &s.template),
        })
    }

    fn adopt(&mut self, desired: &Self) {
        match (self.spec.as_mut(), desired.spec.as_ref()) {
            (Some(live), Some(desired)) => {
                live.replicas = desired.replicas;
                live.template = desired.template.clone();
            }
            (None, Some(desired)) => self.spec = Some(desired.clone()),
            _ => {}
        }
    }
}

impl ManagedChild for Service {
    fn tracked(&self) -> Value {
        let spec = self.spec.as_ref();
        json!({
            "type": spec.and_then(|s| s.type_.as_ref()),
            "ports": spec.and_then(|s| s.ports.as_ref()),
            "selector": spec.and_then(|s| s.selector.as_ref()),
        })
    }

    fn adopt(&mut self, desired: &Self) {
        if let (Some(live), Some(desired)) = (self.spec.as_mut(), desired.spec.as_ref()) {
            live.type_ = desired.type_.clone();
            live.ports = desired.ports.clone();
            live.selector = desired.selector.clone();
        }
    }
}

fn has_snippet(ingress: &Ingress) -> bool {
    ingress
        .metadata
        .annotations
        .as_ref()
        .is_some_and(|a| a.contains_key(CONFIGURATION_SNIPPET))
}

fn path_counts(ingress: &Ingress) -> Vec<usize> {
    ingress
        .spec
        .iter()
        .flat_map(|s| s.rules.iter().flatten())
        .map(|r| r.http.as_ref().map_or(0, |h| h.paths.len()))
        .collect()
}

// Rewrites and paths are recomputed from discovery on every pass, so a
// snippet or path that disappeared from the desired object is drift too.
impl ManagedChild for Ingress {
    fn tracked(&self) -> Value {
        json!({
            "annotations": self.metadata.annotations,
            "configurationSnippet": has_snippet(self),
            "pathCounts": path_counts(self),
            "spec": self.spec,
        })
    }

    fn adopt(&mut self, desired: &Self) {
        merge_map(&mut self.metadata.annotations, &desired.metadata.annotations);
        if !has_snippet(desired) {
            if let Some(annotations) = self.metadata.annotations.as_mut() {
                annotations.remove(CONFIGURATION_SNIPPET);
            }
        }
        self.spec = desired.spec.clone();
    }
}

impl ManagedChild for Route {
    fn tracked(&self) -> Value {
        json!({
            "annotations": self.metadata.annotations,
            "spec": self.spec,
        })
    }

    fn adopt(&mut self, desired: &Self) {
        merge_map(&mut self.metadata.annotations, &desired.metadata.annotations);
        self.spec = desired.spec.clone();
    }
}

// Created once, never rewritten: claims are immutable after binding and
// the generated database credentials must survive every later pass.
impl ManagedChild for PersistentVolumeClaim {
    fn tracked(&self) -> Value {
        Value::Null
    }

    fn adopt(&mut self, _desired: &Self) {}
}

impl ManagedChild for Secret {
    fn tracked(&self) -> Value {
        Value::Null
    }

    fn adopt(&mut self, _desired: &Self) {}
}
