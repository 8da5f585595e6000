//! Cluster store abstraction.
//!
//! Controllers only talk to the API server through [`ClusterStore`], so the
//! convergence logic can run against an in-memory fake or a mock in tests.

use crate::error::{OperatorError, OperatorResult};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::api::{ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client};
use std::collections::BTreeMap;

#[cfg(test)]
use mockall::automock;

/// API operations the controllers need.
///
/// Reads return `Ok(None)` for missing objects. Writes classify 404 and 409
/// answers as [`OperatorError::NotFound`] and [`OperatorError::Conflict`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Fetch a node resource of any kind.
    async fn get_object(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> OperatorResult<Option<DynamicObject>>;

    /// Merge `labels` into a node resource's labels.
    async fn patch_labels(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> OperatorResult<()>;

    /// Fetch a claim.
    async fn get_pvc(&self, namespace: &str, name: &str)
        -> OperatorResult<Option<PersistentVolumeClaim>>;

    /// Create a claim.
    async fn create_pvc(
        &self,
        namespace: &str,
        pvc: &PersistentVolumeClaim,
    ) -> OperatorResult<PersistentVolumeClaim>;

    /// Replace a claim. The object's resource version guards the write.
    async fn replace_pvc(
        &self,
        namespace: &str,
        pvc: &PersistentVolumeClaim,
    ) -> OperatorResult<PersistentVolumeClaim>;

    /// Fetch a StatefulSet.
    async fn get_statefulset(&self, namespace: &str, name: &str)
        -> OperatorResult<Option<StatefulSet>>;

    /// Create a StatefulSet.
    async fn create_statefulset(
        &self,
        namespace: &str,
        sts: &StatefulSet,
    ) -> OperatorResult<StatefulSet>;

    /// Replace a StatefulSet. The object's resource version guards the write.
    async fn replace_statefulset(
        &self,
        namespace: &str,
        sts: &StatefulSet,
    ) -> OperatorResult<StatefulSet>;

    /// List StatefulSets matching a label selector.
    async fn list_statefulsets(
        &self,
        namespace: &str,
        selector: &str,
    ) -> OperatorResult<Vec<StatefulSet>>;

    /// Delete a StatefulSet. Deleting a missing object succeeds.
    async fn delete_statefulset(&self, namespace: &str, name: &str) -> OperatorResult<()>;
}

/// [`ClusterStore`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    /// Create a store over `client`.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn object_name(meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) -> &str {
    meta.name.as_deref().unwrap_or_default()
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn get_object(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> OperatorResult<Option<DynamicObject>> {
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, resource);
        api.get_opt(name)
            .await
            .map_err(|e| OperatorError::from_api(e, &resource.kind, name, namespace))
    }

    async fn patch_labels(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> OperatorResult<()> {
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), namespace, resource);
        let patch = serde_json::json!({ "metadata": { "labels": labels } });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| OperatorError::from_api(e, &resource.kind, name, namespace))?;
        Ok(())
    }

    async fn get_pvc(
        &self,
        namespace: &str,
        name: &str,
    ) -> OperatorResult<Option<PersistentVolumeClaim>> {
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| OperatorError::from_api(e, "PersistentVolumeClaim", name, namespace))
    }

    async fn create_pvc(
        &self,
        namespace: &str,
        pvc: &PersistentVolumeClaim,
    ) -> OperatorResult<PersistentVolumeClaim> {
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        let name = object_name(&pvc.metadata);
        api.create(&PostParams::default(), pvc)
            .await
            .map_err(|e| OperatorError::from_api(e, "PersistentVolumeClaim", name, namespace))
    }

    async fn replace_pvc(
        &self,
        namespace: &str,
        pvc: &PersistentVolumeClaim,
    ) -> OperatorResult<PersistentVolumeClaim> {
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        let name = object_name(&pvc.metadata);
        api.replace(name, &PostParams::default(), pvc)
            .await
            .map_err(|e| OperatorError::from_api(e, "PersistentVolumeClaim", name, namespace))
    }

    async fn get_statefulset(
        &self,
        namespace: &str,
        name: &str,
    ) -> OperatorResult<Option<StatefulSet>> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| OperatorError::from_api(e, "StatefulSet", name, namespace))
    }

    async fn create_statefulset(
        &self,
        namespace: &str,
        sts: &StatefulSet,
    ) -> OperatorResult<StatefulSet> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        let name = object_name(&sts.metadata);
        api.create(&PostParams::default(), sts)
            .await
            .map_err(|e| OperatorError::from_api(e, "StatefulSet", name, namespace))
    }

    async fn replace_statefulset(
        &self,
        namespace: &str,
        sts: &StatefulSet,
    ) -> OperatorResult<StatefulSet> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        let name = object_name(&sts.metadata);
        api.replace(name, &PostParams::default(), sts)
            .await
            .map_err(|e| OperatorError::from_api(e, "StatefulSet", name, namespace))
    }

    async fn list_statefulsets(
        &self,
        namespace: &str,
        selector: &str,
    ) -> OperatorResult<Vec<StatefulSet>> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        let list = api.list(&ListParams::default().labels(selector)).await?;
        Ok(list.items)
    }

    async fn delete_statefulset(&self, namespace: &str, name: &str) -> OperatorResult<()> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
