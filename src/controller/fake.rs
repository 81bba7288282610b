//! In-memory [`Cluster`] used by the controller tests
//!
//! Objects are stored in serialized form keyed by kind, namespace and name.
//! Creates apply a few of the defaults a real API server would add, so tests
//! exercise the tolerance of the drift comparison rather than an idealized
//! store.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, PodStatus};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::ErrorResponse;
use kube::ResourceExt;
use serde_json::{json, Value};

use super::cluster::{Cluster, EventType, NamespacedKind};
use crate::crd::{Pulp, PulpSpec, PulpStatus};
use crate::error::{Error, Result};

type Key = (String, String, String);

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedEvent {
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedExec {
    pub pod: String,
    pub container: String,
    pub command: Vec<String>,
}

#[derive(Default)]
pub struct FakeCluster {
    objects: Mutex<BTreeMap<Key, Value>>,
    storage_classes: Mutex<Vec<StorageClass>>,
    statuses: Mutex<BTreeMap<(String, String), PulpStatus>>,
    events: Mutex<Vec<RecordedEvent>>,
    execs: Mutex<Vec<RecordedExec>>,
    exec_result: Mutex<Option<std::result::Result<String, String>>>,
    failing_creates: Mutex<BTreeSet<String>>,
    failing_lists: Mutex<BTreeSet<String>>,
    writes: Mutex<usize>,
    status_writes: Mutex<usize>,
    next_version: Mutex<u64>,
}

fn api_error(code: u16, reason: &str, message: String) -> Error {
    Error::KubeError(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: reason.to_string(),
        code,
    }))
}

fn key<K: NamespacedKind>(namespace: &str, name: &str) -> Key {
    (K::kind(&()).to_string(), namespace.to_string(), name.to_string())
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Seeding and inspection
    // ------------------------------------------------------------------

    /// Store an object as-is, without owner references or defaults
    pub fn insert<K: NamespacedKind>(&self, namespace: &str, obj: &K) {
        let value = serde_json::to_value(obj).unwrap();
        self.objects
            .lock()
            .unwrap()
            .insert(key::<K>(namespace, &obj.name_any()), value);
    }

    pub fn stored<K: NamespacedKind>(&self, namespace: &str, name: &str) -> Option<K> {
        self.objects
            .lock()
            .unwrap()
            .get(&key::<K>(namespace, name))
            .map(|v| serde_json::from_value(v.clone()).unwrap())
    }

    pub fn remove_stored<K: NamespacedKind>(&self, namespace: &str, name: &str) {
        self.objects.lock().unwrap().remove(&key::<K>(namespace, name));
    }

    /// Simulate another actor editing a live object
    pub fn mutate<K: NamespacedKind>(&self, namespace: &str, name: &str, f: impl FnOnce(&mut K)) {
        let mut obj: K = self.stored(namespace, name).expect("object to mutate must exist");
        f(&mut obj);
        self.insert(namespace, &obj);
    }

    pub fn count<K: NamespacedKind>(&self) -> usize {
        let kind = K::kind(&()).to_string();
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(k, _, _)| *k == kind)
            .count()
    }

    pub fn add_storage_class(&self, name: &str, default: bool) {
        let mut annotations = BTreeMap::new();
        if default {
            annotations.insert(
                "storageclass.kubernetes.io/is-default-class".to_string(),
                "true".to_string(),
            );
        }
        self.storage_classes.lock().unwrap().push(StorageClass {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                annotations: Some(annotations),
                ..Default::default()
            },
            provisioner: "kubernetes.io/no-provisioner".to_string(),
            ..Default::default()
        });
    }

    /// Add a pod carrying `labels` in the given phase
    pub fn add_pod(&self, namespace: &str, name: &str, labels: BTreeMap<String, String>, phase: &str) {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        self.insert(namespace, &pod);
    }

    pub fn set_exec_output(&self, output: &str) {
        *self.exec_result.lock().unwrap() = Some(Ok(output.to_string()));
    }

    pub fn set_exec_failure(&self, message: &str) {
        *self.exec_result.lock().unwrap() = Some(Err(message.to_string()));
    }

    pub fn fail_creates_of(&self, kind: &str) {
        self.failing_creates.lock().unwrap().insert(kind.to_string());
    }

    pub fn fail_lists_of(&self, kind: &str) {
        self.failing_lists.lock().unwrap().insert(kind.to_string());
    }

    /// Creates, replaces and deletes performed so far
    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap()
    }

    pub fn status_write_count(&self) -> usize {
        *self.status_writes.lock().unwrap()
    }

    pub fn status(&self, pulp: &Pulp) -> Option<PulpStatus> {
        self.statuses
            .lock()
            .unwrap()
            .get(&(pulp.namespace().unwrap_or_default(), pulp.name_any()))
            .cloned()
    }

    /// Copy the stored status onto `pulp`, as a watch event would
    pub fn refresh(&self, pulp: &mut Pulp) {
        pulp.status = self.status(pulp);
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn execs(&self) -> Vec<RecordedExec> {
        self.execs.lock().unwrap().clone()
    }

    fn bump_version(&self) -> String {
        let mut version = self.next_version.lock().unwrap();
        *version += 1;
        version.to_string()
    }

    fn count_write(&self) {
        *self.writes.lock().unwrap() += 1;
    }
}

/// Defaults the API server fills in on create
fn apply_server_defaults(kind: &str, value: &mut Value) {
    match kind {
        "Deployment" | "StatefulSet" => {
            if let Some(spec) = value.get_mut("spec").and_then(Value::as_object_mut) {
                spec.entry("revisionHistoryLimit").or_insert(json!(10));
                if let Some(pod) = spec
                    .get_mut("template")
                    .and_then(|t| t.get_mut("spec"))
                    .and_then(Value::as_object_mut)
                {
                    pod.entry("dnsPolicy").or_insert(json!("ClusterFirst"));
                    pod.entry("schedulerName").or_insert(json!("default-scheduler"));
                    if let Some(containers) = pod.get_mut("containers").and_then(Value::as_array_mut)
                    {
                        for container in containers.iter_mut().filter_map(Value::as_object_mut) {
                            container
                                .entry("terminationMessagePath")
                                .or_insert(json!("/dev/termination-log"));
                            container
                                .entry("imagePullPolicy")
                                .or_insert(json!("IfNotPresent"));
                        }
                    }
                }
            }
        }
        "Service" => {
            if let Some(spec) = value.get_mut("spec").and_then(Value::as_object_mut) {
                spec.entry("clusterIP").or_insert(json!("10.96.0.10"));
                let node_port = spec.get("type") == Some(&json!("NodePort"));
                if let Some(ports) = spec.get_mut("ports").and_then(Value::as_array_mut) {
                    for (i, port) in ports.iter_mut().filter_map(Value::as_object_mut).enumerate() {
                        port.entry("protocol").or_insert(json!("TCP"));
                        if node_port {
                            port.entry("nodePort").or_insert(json!(30000 + i));
                        }
                    }
                }
            }
        }
        _ => {}
    }
}

fn labels_match(value: &Value, selector: &BTreeMap<String, String>) -> bool {
    let labels = value.pointer("/metadata/labels");
    selector
        .iter()
        .all(|(k, v)| labels.and_then(|l| l.get(k)).and_then(Value::as_str) == Some(v.as_str()))
}

#[async_trait]
impl Cluster for FakeCluster {
    async fn get<K: NamespacedKind>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        let value = self.objects.lock().unwrap().get(&key::<K>(namespace, name)).cloned();
        value.map(serde_json::from_value).transpose().map_err(Error::from)
    }

    async fn create<K: NamespacedKind>(&self, namespace: &str, obj: &K) -> Result<K> {
        let kind = K::kind(&()).to_string();
        let name = obj.name_any();
        if self.failing_creates.lock().unwrap().contains(&kind) {
            return Err(api_error(403, "Forbidden", format!("cannot create {kind} {name}")));
        }

        let k = key::<K>(namespace, &name);
        if self.objects.lock().unwrap().contains_key(&k) {
            return Err(api_error(409, "AlreadyExists", format!("{kind} {name} already exists")));
        }

        let mut value = serde_json::to_value(obj)?;
        apply_server_defaults(&kind, &mut value);
        value["metadata"]["namespace"] = json!(namespace);
        value["metadata"]["resourceVersion"] = json!(self.bump_version());
        value["metadata"]["uid"] = json!(format!("uid-{kind}-{name}").to_lowercase());

        self.objects.lock().unwrap().insert(k, value.clone());
        self.count_write();
        Ok(serde_json::from_value(value)?)
    }

    async fn replace<K: NamespacedKind>(
        &self,
        namespace: &str,
        name: &str,
        obj: &K,
    ) -> Result<K> {
        let k = key::<K>(namespace, name);
        if !self.objects.lock().unwrap().contains_key(&k) {
            return Err(api_error(404, "NotFound", format!("{name} not found")));
        }

        let mut value = serde_json::to_value(obj)?;
        value["metadata"]["resourceVersion"] = json!(self.bump_version());
        self.objects.lock().unwrap().insert(k, value.clone());
        self.count_write();
        Ok(serde_json::from_value(value)?)
    }

    async fn delete<K: NamespacedKind>(&self, namespace: &str, name: &str) -> Result<bool> {
        let removed = self.objects.lock().unwrap().remove(&key::<K>(namespace, name));
        if removed.is_some() {
            self.count_write();
        }
        Ok(removed.is_some())
    }

    async fn list<K: NamespacedKind>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>> {
        let kind = K::kind(&()).to_string();
        if self.failing_lists.lock().unwrap().contains(&kind) {
            return Err(api_error(500, "InternalError", format!("cannot list {kind}")));
        }

        let matching: Vec<Value> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((k, ns, _), v)| *k == kind && ns == namespace && labels_match(v, labels))
            .map(|(_, v)| v.clone())
            .collect();
        matching
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(Error::from))
            .collect()
    }

    async fn storage_classes(&self) -> Result<Vec<StorageClass>> {
        Ok(self.storage_classes.lock().unwrap().clone())
    }

    async fn exec(
        &self,
        _namespace: &str,
        pod: &str,
        container: &str,
        command: Vec<String>,
    ) -> Result<String> {
        self.execs.lock().unwrap().push(RecordedExec {
            pod: pod.to_string(),
            container: container.to_string(),
            command,
        });
        match self.exec_result.lock().unwrap().clone() {
            Some(Ok(output)) => Ok(output),
            Some(Err(message)) => Err(Error::ExecError {
                pod: pod.to_string(),
                message,
            }),
            None => Ok("[]".to_string()),
        }
    }

    async fn patch_status(&self, pulp: &Pulp, status: &PulpStatus) -> Result<()> {
        self.statuses.lock().unwrap().insert(
            (pulp.namespace().unwrap_or_default(), pulp.name_any()),
            status.clone(),
        );
        *self.status_writes.lock().unwrap() += 1;
        Ok(())
    }

    async fn publish_event(
        &self,
        _pulp: &Pulp,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<()> {
        self.events.lock().unwrap().push(RecordedEvent {
            event_type,
            reason: reason.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }
}

/// A Pulp named `name` in the default namespace with `spec` applied over
/// the defaults
pub fn test_pulp_with(name: &str, spec: Value) -> Pulp {
    let spec: PulpSpec = serde_json::from_value(spec).unwrap();
    let mut pulp = Pulp::new(name, spec);
    pulp.metadata.namespace = Some("default".to_string());
    pulp.metadata.uid = Some(format!("uid-{name}"));
    pulp.metadata.generation = Some(1);
    pulp
}

pub fn test_pulp(name: &str) -> Pulp {
    test_pulp_with(name, json!({}))
}
