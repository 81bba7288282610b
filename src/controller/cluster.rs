//! Cluster access used by a reconcile pass
//!
//! Every read and write a pass performs goes through [`Cluster`], passed
//! explicitly through the reconcile context. [`KubeCluster`] is the
//! production implementation on top of a `kube::Client`.

use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, Pod};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, AttachParams, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument};

use crate::crd::{Pulp, PulpStatus};
use crate::error::{Error, Result};

/// Field manager used for status patches
pub const FIELD_MANAGER: &str = "pulp-operator";

/// Any namespaced Kubernetes type the operator reads or writes
pub trait NamespacedKind:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> NamespacedKind for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Kubernetes event severity
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Normal => "Normal",
            EventType::Warning => "Warning",
        }
    }
}

#[async_trait]
pub trait Cluster: Send + Sync {
    /// Fetch an object; a missing object is `Ok(None)`, not an error
    async fn get<K: NamespacedKind>(&self, namespace: &str, name: &str) -> Result<Option<K>>;

    async fn create<K: NamespacedKind>(&self, namespace: &str, obj: &K) -> Result<K>;

    /// Replace an object read earlier in the same pass
    async fn replace<K: NamespacedKind>(&self, namespace: &str, name: &str, obj: &K)
        -> Result<K>;

    /// Delete an object; returns false when it was already gone
    async fn delete<K: NamespacedKind>(&self, namespace: &str, name: &str) -> Result<bool>;

    async fn list<K: NamespacedKind>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>>;

    async fn storage_classes(&self) -> Result<Vec<StorageClass>>;

    /// Run `command` in a container and return its standard output
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: Vec<String>,
    ) -> Result<String>;

    async fn patch_status(&self, pulp: &Pulp, status: &PulpStatus) -> Result<()>;

    async fn publish_event(
        &self,
        pulp: &Pulp,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<()>;
}

/// Render a label map as a label selector string
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// [`Cluster`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Cluster for KubeCluster {
    async fn get<K: NamespacedKind>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name).await.map_err(Error::KubeError)
    }

    async fn create<K: NamespacedKind>(&self, namespace: &str, obj: &K) -> Result<K> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), obj)
            .await
            .map_err(Error::KubeError)
    }

    async fn replace<K: NamespacedKind>(
        &self,
        namespace: &str,
        name: &str,
        obj: &K,
    ) -> Result<K> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.replace(name, &PostParams::default(), obj)
            .await
            .map_err(Error::KubeError)
    }

    async fn delete<K: NamespacedKind>(&self, namespace: &str, name: &str) -> Result<bool> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(false),
            Err(e) => Err(Error::KubeError(e)),
        }
    }

    async fn list<K: NamespacedKind>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&label_selector(labels));
        Ok(api.list(&params).await.map_err(Error::KubeError)?.items)
    }

    async fn storage_classes(&self) -> Result<Vec<StorageClass>> {
        let api: Api<StorageClass> = Api::all(self.client.clone());
        Ok(api
            .list(&ListParams::default())
            .await
            .map_err(Error::KubeError)?
            .items)
    }

    #[instrument(skip(self, command), fields(namespace = %namespace, pod = %pod))]
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: Vec<String>,
    ) -> Result<String> {
        let exec_error = |message: String| Error::ExecError {
            pod: pod.to_string(),
            message,
        };

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = AttachParams::default()
            .container(container)
            .stdin(false)
            .stdout(true)
            .stderr(false);

        let mut attached = pods
            .exec(pod, command, &params)
            .await
            .map_err(|e| exec_error(e.to_string()))?;

        let mut stdout = attached
            .stdout()
            .ok_or_else(|| exec_error("stdout was not attached".to_string()))?;
        let mut output = String::new();
        stdout
            .read_to_string(&mut output)
            .await
            .map_err(|e| exec_error(e.to_string()))?;

        let status = match attached.take_status() {
            Some(status) => status.await,
            None => None,
        };
        attached
            .join()
            .await
            .map_err(|e| exec_error(e.to_string()))?;

        if let Some(status) = status {
            if status.status.as_deref() == Some("Failure") {
                return Err(exec_error(
                    status
                        .message
                        .unwrap_or_else(|| "command exited with failure".to_string()),
                ));
            }
        }

        debug!("Captured {} bytes from {}", output.len(), pod);
        Ok(output)
    }

    async fn patch_status(&self, pulp: &Pulp, status: &PulpStatus) -> Result<()> {
        let namespace = pulp.namespace().unwrap_or_else(|| "default".to_string());
        let api: Api<Pulp> = Api::namespaced(self.client.clone(), &namespace);

        let patch = serde_json::json!({ "status": status });
        api.patch_status(
            &pulp.name_any(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await
        .map_err(Error::KubeError)?;

        Ok(())
    }

    async fn publish_event(
        &self,
        pulp: &Pulp,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<()> {
        let namespace = pulp.namespace().unwrap_or_else(|| "default".to_string());
        let events: Api<Event> = Api::namespaced(self.client.clone(), &namespace);

        let time = chrono::Utc::now();
        let event = Event {
            metadata: kube::api::ObjectMeta {
                generate_name: Some(format!("{}-event-", pulp.name_any())),
                ..Default::default()
            },
            type_: Some(event_type.as_str().to_string()),
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
            involved_object: pulp.object_ref(&()),
            first_timestamp: Some(Time(time)),
            last_timestamp: Some(Time(time)),
            count: Some(1),
            ..Default::default()
        };

        events
            .create(&PostParams::default(), &event)
            .await
            .map_err(Error::KubeError)?;
        Ok(())
    }
}
