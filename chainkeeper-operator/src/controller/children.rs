//! Steps shared by every controller: bounded store calls, fresh reads,
//! inline admission, label merging and child upserts.

use super::store::ClusterStore;
use super::ControllerContext;
use crate::admission::{Defaulter, Validator};
use crate::config::OperatorConfig;
use crate::crd::ChainResource;
use crate::error::{OperatorError, OperatorResult};
use crate::resources::{self, Workload};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::api::ApiResource;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

/// Upper bound on get-then-write rounds for one child.
pub const MAX_WRITE_ATTEMPTS: usize = 3;

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The object did not exist and was created.
    Created,
    /// The live object differed and was replaced.
    Updated,
    /// The live object already matched; nothing was written.
    Unchanged,
}

/// Await a store call, failing with [`OperatorError::Timeout`] after `limit`.
pub(crate) async fn bounded<T, F>(limit: Duration, what: &str, call: F) -> OperatorResult<T>
where
    F: Future<Output = OperatorResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(OperatorError::Timeout(format!("{} after {:?}", what, limit))),
    }
}

/// Read the latest version of a resource. `None` means it was deleted.
pub(crate) async fn fetch<K: ChainResource>(
    ctx: &ControllerContext,
    namespace: &str,
    name: &str,
) -> OperatorResult<Option<K>> {
    let resource = ApiResource::erase::<K>(&());
    let found = bounded(
        ctx.config.store_timeout(),
        "get",
        ctx.store.get_object(&resource, namespace, name),
    )
    .await?;

    found
        .map(|obj| {
            obj.try_parse::<K>()
                .map_err(|e| OperatorError::SerializationError(e.to_string()))
        })
        .transpose()
}

/// Default and validate in place when no admission webhook does it.
pub(crate) fn admit<K: Defaulter + Validator>(
    config: &OperatorConfig,
    obj: &mut K,
) -> OperatorResult<()> {
    if config.enable_webhooks {
        return Ok(());
    }

    obj.default_spec();
    obj.validate_create()
        .into_result()
        .map_err(OperatorError::ValidationError)
}

/// Merge `labels` onto a resource, writing only when one is missing or differs.
pub(crate) async fn ensure_labels<K: ChainResource>(
    ctx: &ControllerContext,
    obj: &K,
    labels: &BTreeMap<String, String>,
) -> OperatorResult<bool> {
    let current = obj.meta().labels.as_ref();
    let missing = labels
        .iter()
        .any(|(key, value)| current.and_then(|l| l.get(key)) != Some(value));
    if !missing {
        return Ok(false);
    }

    let meta = obj.meta();
    let namespace = meta.namespace.as_deref().unwrap_or_default();
    let name = meta.name.as_deref().unwrap_or_default();
    tracing::debug!(name = %name, "Merging labels");

    bounded(
        ctx.config.store_timeout(),
        "patch labels",
        ctx.store
            .patch_labels(&ApiResource::erase::<K>(&()), namespace, name, labels),
    )
    .await?;
    Ok(true)
}

/// A child object kind the operator upserts.
#[async_trait]
trait Child: Clone + Default + PartialEq + Send + Sync {
    const KIND: &'static str;

    fn apply(&mut self, workload: &Workload<'_>) -> OperatorResult<()>;

    async fn get(store: &dyn ClusterStore, namespace: &str, name: &str) -> OperatorResult<Option<Self>>;

    async fn create(store: &dyn ClusterStore, namespace: &str, obj: &Self) -> OperatorResult<Self>;

    async fn replace(store: &dyn ClusterStore, namespace: &str, obj: &Self) -> OperatorResult<Self>;
}

#[async_trait]
impl Child for PersistentVolumeClaim {
    const KIND: &'static str = "PersistentVolumeClaim";

    fn apply(&mut self, workload: &Workload<'_>) -> OperatorResult<()> {
        resources::apply_pvc(self, workload)
    }

    async fn get(store: &dyn ClusterStore, namespace: &str, name: &str) -> OperatorResult<Option<Self>> {
        store.get_pvc(namespace, name).await
    }

    async fn create(store: &dyn ClusterStore, namespace: &str, obj: &Self) -> OperatorResult<Self> {
        store.create_pvc(namespace, obj).await
    }

    async fn replace(store: &dyn ClusterStore, namespace: &str, obj: &Self) -> OperatorResult<Self> {
        store.replace_pvc(namespace, obj).await
    }
}

#[async_trait]
impl Child for StatefulSet {
    const KIND: &'static str = "StatefulSet";

    fn apply(&mut self, workload: &Workload<'_>) -> OperatorResult<()> {
        resources::apply_statefulset(self, workload)
    }

    async fn get(store: &dyn ClusterStore, namespace: &str, name: &str) -> OperatorResult<Option<Self>> {
        store.get_statefulset(namespace, name).await
    }

    async fn create(store: &dyn ClusterStore, namespace: &str, obj: &Self) -> OperatorResult<Self> {
        store.create_statefulset(namespace, obj).await
    }

    async fn replace(store: &dyn ClusterStore, namespace: &str, obj: &Self) -> OperatorResult<Self> {
        store.replace_statefulset(namespace, obj).await
    }
}

/// Create the child, or bring the live one in line with `workload`.
///
/// Every attempt starts from a fresh read. Conflicts and objects vanishing
/// between read and write are retried up to [`MAX_WRITE_ATTEMPTS`] times.
async fn upsert<C: Child>(ctx: &ControllerContext, workload: &Workload<'_>) -> OperatorResult<WriteOutcome> {
    let store = ctx.store.as_ref();
    let limit = ctx.config.store_timeout();
    let namespace = workload.namespace.as_str();
    let name = workload.name.as_str();

    let mut attempt = 0;
    loop {
        attempt += 1;

        let live = bounded(limit, "get", C::get(store, namespace, name)).await?;
        let result = match live {
            None => {
                let mut obj = C::default();
                obj.apply(workload)?;
                tracing::info!(kind = C::KIND, name = %name, "Creating");
                bounded(limit, "create", C::create(store, namespace, &obj))
                    .await
                    .map(|_| WriteOutcome::Created)
            }
            Some(existing) => {
                let mut desired = existing.clone();
                desired.apply(workload)?;
                if desired == existing {
                    tracing::debug!(kind = C::KIND, name = %name, "Up to date");
                    return Ok(WriteOutcome::Unchanged);
                }
                tracing::info!(kind = C::KIND, name = %name, "Updating");
                bounded(limit, "replace", C::replace(store, namespace, &desired))
                    .await
                    .map(|_| WriteOutcome::Updated)
            }
        };

        match result {
            Err(err) if err.is_stale_write() && attempt < MAX_WRITE_ATTEMPTS => {
                tracing::debug!(kind = C::KIND, name = %name, attempt, error = %err, "Retrying with a fresh read");
            }
            other => return other,
        }
    }
}

/// Ensure the data claim of `workload`.
pub(crate) async fn ensure_pvc(ctx: &ControllerContext, workload: &Workload<'_>) -> OperatorResult<WriteOutcome> {
    upsert::<PersistentVolumeClaim>(ctx, workload).await
}

/// Ensure the StatefulSet of `workload`.
pub(crate) async fn ensure_statefulset(
    ctx: &ControllerContext,
    workload: &Workload<'_>,
) -> OperatorResult<WriteOutcome> {
    upsert::<StatefulSet>(ctx, workload).await
}
