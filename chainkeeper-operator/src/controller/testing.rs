//! In-memory cluster used by controller tests.

use super::store::ClusterStore;
use crate::error::{OperatorError, OperatorResult};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::api::{ApiResource, DynamicObject};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

type Key = (String, String, String);

/// Objects keyed by kind, namespace and name, with optimistic concurrency on
/// `metadata.resourceVersion`.
#[derive(Default)]
pub struct FakeCluster {
    objects: Mutex<HashMap<Key, Value>>,
    version: AtomicU64,
    writes: AtomicUsize,
}

fn key(kind: &str, namespace: &str, name: &str) -> Key {
    (kind.to_string(), namespace.to_string(), name.to_string())
}

fn meta_str<'a>(obj: &'a Value, field: &str) -> &'a str {
    obj["metadata"][field].as_str().unwrap_or_default()
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes made through the store.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Seed an object as if a user had created it. Not counted as a write.
    pub fn insert<K>(&self, obj: &K) -> K
    where
        K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
    {
        let value = serde_json::to_value(obj).unwrap();
        let stored = self.create_value(&K::kind(&()), value).unwrap();
        serde_json::from_value(stored).unwrap()
    }

    /// Overwrite an object as if a user had edited it. Not counted as a write.
    pub fn update<K>(&self, obj: &K)
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let mut value = serde_json::to_value(obj).unwrap();
        value["metadata"]["resourceVersion"] = json!(self.next_version());
        let key = key(&K::kind(&()), meta_str(&value, "namespace"), meta_str(&value, "name"));
        self.objects.lock().unwrap().insert(key, value);
    }

    /// Read back a stored object.
    pub fn get<K>(&self, namespace: &str, name: &str) -> Option<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let objects = self.objects.lock().unwrap();
        objects
            .get(&key(&K::kind(&()), namespace, name))
            .map(|value| serde_json::from_value(value.clone()).unwrap())
    }

    pub fn statefulset(&self, namespace: &str, name: &str) -> Option<StatefulSet> {
        self.get(namespace, name)
    }

    pub fn pvc(&self, namespace: &str, name: &str) -> Option<PersistentVolumeClaim> {
        self.get(namespace, name)
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn create_value(&self, kind: &str, mut value: Value) -> OperatorResult<Value> {
        let key = key(kind, meta_str(&value, "namespace"), meta_str(&value, "name"));
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(OperatorError::Conflict {
                kind: kind.to_string(),
                name: key.2,
            });
        }

        let version = self.next_version();
        let meta = &mut value["metadata"];
        meta["uid"] = json!(format!("uid-{}-{}", kind.to_lowercase(), version));
        meta["resourceVersion"] = json!(version);
        meta["creationTimestamp"] = json!("2024-01-01T00:00:00Z");
        objects.insert(key, value.clone());
        Ok(value)
    }

    fn replace_value(&self, kind: &str, mut value: Value) -> OperatorResult<Value> {
        let key = key(kind, meta_str(&value, "namespace"), meta_str(&value, "name"));
        let mut objects = self.objects.lock().unwrap();
        let Some(live) = objects.get(&key) else {
            return Err(OperatorError::NotFound {
                kind: kind.to_string(),
                name: key.2,
                namespace: key.1,
            });
        };
        if meta_str(live, "resourceVersion") != meta_str(&value, "resourceVersion") {
            return Err(OperatorError::Conflict {
                kind: kind.to_string(),
                name: key.2,
            });
        }

        value["metadata"]["resourceVersion"] = json!(self.next_version());
        objects.insert(key, value.clone());
        Ok(value)
    }

    fn write<T: Serialize + DeserializeOwned>(
        &self,
        kind: &str,
        namespace: &str,
        obj: &T,
        replace: bool,
    ) -> OperatorResult<T> {
        let mut value = serde_json::to_value(obj)?;
        value["metadata"]["namespace"] = json!(namespace);
        let stored = if replace {
            self.replace_value(kind, value)?
        } else {
            self.create_value(kind, value)?
        };
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(serde_json::from_value(stored)?)
    }

    fn read<T: DeserializeOwned>(&self, kind: &str, namespace: &str, name: &str) -> OperatorResult<Option<T>> {
        let objects = self.objects.lock().unwrap();
        objects
            .get(&key(kind, namespace, name))
            .map(|value| serde_json::from_value(value.clone()).map_err(OperatorError::from))
            .transpose()
    }
}

fn matches_selector(obj: &Value, selector: &str) -> bool {
    selector.split(',').filter(|s| !s.is_empty()).all(|term| {
        let (key, value) = term.split_once('=').unwrap_or((term, ""));
        obj["metadata"]["labels"][key].as_str() == Some(value)
    })
}

#[async_trait]
impl ClusterStore for FakeCluster {
    async fn get_object(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> OperatorResult<Option<DynamicObject>> {
        self.read(&resource.kind, namespace, name)
    }

    async fn patch_labels(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> OperatorResult<()> {
        let mut objects = self.objects.lock().unwrap();
        let Some(obj) = objects.get_mut(&key(&resource.kind, namespace, name)) else {
            return Err(OperatorError::NotFound {
                kind: resource.kind.clone(),
                name: name.to_string(),
                namespace: namespace.to_string(),
            });
        };

        let meta = &mut obj["metadata"];
        if !meta["labels"].is_object() {
            meta["labels"] = json!({});
        }
        for (key, value) in labels {
            meta["labels"][key] = json!(value);
        }
        meta["resourceVersion"] = json!(self.next_version());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_pvc(&self, namespace: &str, name: &str) -> OperatorResult<Option<PersistentVolumeClaim>> {
        self.read("PersistentVolumeClaim", namespace, name)
    }

    async fn create_pvc(&self, namespace: &str, pvc: &PersistentVolumeClaim) -> OperatorResult<PersistentVolumeClaim> {
        self.write("PersistentVolumeClaim", namespace, pvc, false)
    }

    async fn replace_pvc(&self, namespace: &str, pvc: &PersistentVolumeClaim) -> OperatorResult<PersistentVolumeClaim> {
        self.write("PersistentVolumeClaim", namespace, pvc, true)
    }

    async fn get_statefulset(&self, namespace: &str, name: &str) -> OperatorResult<Option<StatefulSet>> {
        self.read("StatefulSet", namespace, name)
    }

    async fn create_statefulset(&self, namespace: &str, sts: &StatefulSet) -> OperatorResult<StatefulSet> {
        self.write("StatefulSet", namespace, sts, false)
    }

    async fn replace_statefulset(&self, namespace: &str, sts: &StatefulSet) -> OperatorResult<StatefulSet> {
        self.write("StatefulSet", namespace, sts, true)
    }

    async fn list_statefulsets(&self, namespace: &str, selector: &str) -> OperatorResult<Vec<StatefulSet>> {
        let objects = self.objects.lock().unwrap();
        objects
            .iter()
            .filter(|((kind, ns, _), obj)| kind == "StatefulSet" && ns == namespace && matches_selector(obj, selector))
            .map(|(_, obj)| serde_json::from_value(obj.clone()).map_err(OperatorError::from))
            .collect()
    }

    async fn delete_statefulset(&self, namespace: &str, name: &str) -> OperatorResult<()> {
        let removed = self
            .objects
            .lock()
            .unwrap()
            .remove(&key("StatefulSet", namespace, name));
        if removed.is_some() {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sts(name: &str) -> StatefulSet {
        let mut sts = StatefulSet::default();
        sts.metadata.name = Some(name.into());
        sts.metadata.namespace = Some("chains".into());
        sts
    }

    #[tokio::test]
    async fn stale_replace_conflicts() {
        let cluster = FakeCluster::new();
        let created = cluster.create_statefulset("chains", &sts("a")).await.unwrap();
        cluster.replace_statefulset("chains", &created).await.unwrap();

        let err = cluster.replace_statefulset("chains", &created).await.unwrap_err();
        assert!(err.is_stale_write());
    }

    #[tokio::test]
    async fn selector_filters_by_every_label() {
        let cluster = FakeCluster::new();
        let mut labelled = sts("a");
        labelled.metadata.labels = Some(BTreeMap::from([
            ("x".to_string(), "1".to_string()),
            ("y".to_string(), "2".to_string()),
        ]));
        cluster.insert(&labelled);
        cluster.insert(&sts("b"));

        let found = cluster.list_statefulsets("chains", "x=1,y=2").await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(cluster.list_statefulsets("chains", "x=1,y=3").await.unwrap().is_empty());
    }
}
