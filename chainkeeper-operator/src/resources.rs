//! Child object builders.
//!
//! Every node owns one PersistentVolumeClaim and one StatefulSet sharing the
//! node's workload name. The `apply_*` functions write the operator's fields
//! onto an object in place: a default object for creation, or a copy of the
//! live object for an update. Fields the operator does not own are left as
//! they are, so applying twice is a no-op.

use crate::clients::{ClientFamily, ProcessSpec};
use crate::crd::Resources;
use crate::error::{OperatorError, OperatorResult};
use crate::quantity::ParsedQuantity;
use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Container, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, ResourceRequirements, Volume,
    VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use kube::Resource;
use std::collections::BTreeMap;

/// Name of the node container.
pub const CONTAINER_NAME: &str = "node";

/// Name of the data volume and its mount.
pub const DATA_VOLUME: &str = "data";

/// Value of the `managed-by` label.
pub const MANAGER: &str = "chainkeeper-operator";

/// Label naming the client family.
pub const LABEL_NAME: &str = "app.kubernetes.io/name";
/// Label naming the workload.
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
/// Label naming the component.
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
/// Label naming the managing controller.
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
/// Label naming the kind of the owning resource.
pub const LABEL_CREATED_BY: &str = "app.kubernetes.io/created-by";
/// Label naming the network a workload belongs to.
pub const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";

/// Labels carried by a node resource and its children.
pub fn workload_labels(
    family: ClientFamily,
    owner_kind: &str,
    instance: &str,
) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_NAME.to_string(), family.identifier().to_string()),
        (LABEL_INSTANCE.to_string(), instance.to_string()),
        (LABEL_COMPONENT.to_string(), "node".to_string()),
        (LABEL_MANAGED_BY.to_string(), MANAGER.to_string()),
        (LABEL_CREATED_BY.to_string(), owner_kind.to_lowercase()),
    ])
}

/// Selector matching every workload of a network.
pub fn network_selector(network: &str) -> String {
    format!("{}={},{}={}", LABEL_MANAGED_BY, MANAGER, LABEL_PART_OF, network)
}

/// Controller owner reference to `owner`.
///
/// Fails on objects the API server has not assigned a uid yet.
pub fn owner_reference<K: Resource<DynamicType = ()>>(owner: &K) -> OperatorResult<OwnerReference> {
    owner.controller_owner_ref(&()).ok_or_else(|| {
        OperatorError::InvalidConfig(format!(
            "{} {} has no uid",
            K::kind(&()),
            owner.meta().name.as_deref().unwrap_or_default()
        ))
    })
}

/// Everything needed to render the children of one node.
#[derive(Debug, Clone)]
pub struct Workload<'a> {
    /// Name shared by the claim and the StatefulSet.
    pub name: String,
    /// Namespace of the node.
    pub namespace: String,
    /// Labels put on both children.
    pub labels: BTreeMap<String, String>,
    /// Owner reference put on both children.
    pub owner: OwnerReference,
    /// Declared resources.
    pub resources: &'a Resources,
    /// Process the node container runs.
    pub process: ProcessSpec,
}

impl Workload<'_> {
    /// Label selector of the workload's pods.
    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(LABEL_INSTANCE.to_string(), self.name.clone())])
    }

    fn apply_meta(&self, meta: &mut ObjectMeta) {
        meta.name = Some(self.name.clone());
        meta.namespace = Some(self.namespace.clone());
        merge_labels(&mut meta.labels, &self.labels);

        let refs = meta.owner_references.get_or_insert_with(Vec::new);
        match refs.iter_mut().find(|r| r.uid == self.owner.uid) {
            Some(existing) => *existing = self.owner.clone(),
            None => refs.push(self.owner.clone()),
        }
    }
}

fn merge_labels(target: &mut Option<BTreeMap<String, String>>, labels: &BTreeMap<String, String>) {
    let target = target.get_or_insert_with(BTreeMap::new);
    for (key, value) in labels {
        target.insert(key.clone(), value.clone());
    }
}

/// Parse a declared quantity, naming the field on failure.
fn quantity(field: &str, value: &str) -> OperatorResult<Quantity> {
    ParsedQuantity::parse(value)
        .map_err(|e| OperatorError::InvalidConfig(format!("{}: {}", field, e)))?;
    Ok(Quantity(value.to_string()))
}

fn quantities(pairs: &[(&str, &str, &str)]) -> OperatorResult<Option<BTreeMap<String, Quantity>>> {
    let mut map = BTreeMap::new();
    for (key, field, value) in pairs {
        if !value.is_empty() {
            map.insert(key.to_string(), quantity(field, value)?);
        }
    }
    Ok(if map.is_empty() { None } else { Some(map) })
}

/// The API server stores quantities in canonical form (`0.5` as `500m`).
/// Keep the live spelling when it has the same value as the desired one.
fn keep_live(desired: Quantity, live: Option<&Quantity>) -> Quantity {
    match live {
        Some(live) if same_value(&desired, live) => live.clone(),
        _ => desired,
    }
}

fn same_value(a: &Quantity, b: &Quantity) -> bool {
    match (ParsedQuantity::parse(&a.0), ParsedQuantity::parse(&b.0)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn keep_live_map(
    desired: Option<BTreeMap<String, Quantity>>,
    live: Option<&BTreeMap<String, Quantity>>,
) -> Option<BTreeMap<String, Quantity>> {
    desired.map(|map| {
        map.into_iter()
            .map(|(key, value)| {
                let value = keep_live(value, live.and_then(|l| l.get(&key)));
                (key, value)
            })
            .collect()
    })
}

/// Write the operator's fields onto a claim.
///
/// A claim that already exists only gets its storage request updated; the
/// rest of its spec is immutable. Its storage request can only grow.
pub fn apply_pvc(pvc: &mut PersistentVolumeClaim, workload: &Workload<'_>) -> OperatorResult<()> {
    workload.apply_meta(&mut pvc.metadata);

    let storage = quantity("storage", &workload.resources.storage)?;
    let created = pvc.metadata.creation_timestamp.is_some();
    let spec = pvc.spec.get_or_insert_with(PersistentVolumeClaimSpec::default);

    if !created {
        spec.access_modes = Some(vec!["ReadWriteOnce".to_string()]);
        spec.storage_class_name = workload.resources.storage_class.clone();
    }

    let requests = spec
        .resources
        .get_or_insert_with(VolumeResourceRequirements::default)
        .requests
        .get_or_insert_with(BTreeMap::new);
    let live = requests.get("storage");

    if created {
        if let Some(live) = live {
            if let (Ok(current), Ok(wanted)) = (
                ParsedQuantity::parse(&live.0),
                ParsedQuantity::parse(&storage.0),
            ) {
                if wanted < current {
                    return Err(OperatorError::InvalidConfig(format!(
                        "storage: claim {} cannot shrink from {} to {}",
                        workload.name, live.0, storage.0
                    )));
                }
            }
        }
    }

    let storage = keep_live(storage, live);
    requests.insert("storage".to_string(), storage);

    Ok(())
}

/// Write the operator's fields onto a StatefulSet.
///
/// Selector and service name are immutable and only set on creation.
pub fn apply_statefulset(sts: &mut StatefulSet, workload: &Workload<'_>) -> OperatorResult<()> {
    workload.apply_meta(&mut sts.metadata);

    let resources = workload.resources;
    let requests = quantities(&[
        ("cpu", "cpu", resources.cpu.as_str()),
        ("memory", "memory", resources.memory.as_str()),
    ])?;
    let limits = quantities(&[
        ("cpu", "cpuLimit", resources.cpu_limit.as_str()),
        ("memory", "memoryLimit", resources.memory_limit.as_str()),
    ])?;

    let created = sts.metadata.creation_timestamp.is_some();
    let spec = sts.spec.get_or_insert_with(StatefulSetSpec::default);

    if !created {
        spec.selector = LabelSelector {
            match_labels: Some(workload.selector_labels()),
            ..Default::default()
        };
        spec.service_name = workload.name.clone();
    }
    spec.replicas = Some(1);

    apply_pod_template(&mut spec.template, workload, requests, limits);
    Ok(())
}

fn apply_pod_template(
    template: &mut PodTemplateSpec,
    workload: &Workload<'_>,
    requests: Option<BTreeMap<String, Quantity>>,
    limits: Option<BTreeMap<String, Quantity>>,
) {
    let meta = template.metadata.get_or_insert_with(ObjectMeta::default);
    merge_labels(&mut meta.labels, &workload.labels);
    merge_labels(&mut meta.labels, &workload.selector_labels());

    let pod = template.spec.get_or_insert_with(PodSpec::default);

    let index = match pod.containers.iter().position(|c| c.name == CONTAINER_NAME) {
        Some(index) => index,
        None => {
            pod.containers.push(Container {
                name: CONTAINER_NAME.to_string(),
                ..Default::default()
            });
            pod.containers.len() - 1
        }
    };
    let container = &mut pod.containers[index];

    let live = container.resources.as_ref();
    let requests = keep_live_map(requests, live.and_then(|r| r.requests.as_ref()));
    let limits = keep_live_map(limits, live.and_then(|r| r.limits.as_ref()));

    let process = &workload.process;
    container.image = Some(process.image.clone());
    container.command = non_empty(process.command.clone());
    container.args = non_empty(process.args.clone());
    container.env = non_empty(process.env.clone());
    container.resources = Some(ResourceRequirements {
        requests,
        limits,
        ..Default::default()
    });

    let mount = VolumeMount {
        name: DATA_VOLUME.to_string(),
        mount_path: process.data_dir(),
        ..Default::default()
    };
    let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
    match mounts.iter_mut().find(|m| m.name == DATA_VOLUME) {
        Some(existing) => *existing = mount,
        None => mounts.push(mount),
    }

    let volume = Volume {
        name: DATA_VOLUME.to_string(),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name: workload.name.clone(),
            read_only: None,
        }),
        ..Default::default()
    };
    let volumes = pod.volumes.get_or_insert_with(Vec::new);
    match volumes.iter_mut().find(|v| v.name == DATA_VOLUME) {
        Some(existing) => *existing = volume,
        None => volumes.push(volume),
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}
