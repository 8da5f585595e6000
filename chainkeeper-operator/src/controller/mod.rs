//! Kubernetes controllers for chainkeeper resources.
//!
//! - [`NodeController`]: reconciles single-node kinds ([`PolkadotNode`], [`NearNode`])
//! - [`NetworkController`]: reconciles [`BesuNetwork`] and its per-node workloads
//!
//! # Usage with kube-runtime
//!
//! ```ignore
//! use chainkeeper_operator::controller::{error_policy, ControllerContext, NodeController};
//!
//! let controller = NodeController::<PolkadotNode>::new(ctx.clone());
//! Controller::new(nodes, watcher_config)
//!     .run(move |node, _ctx| {
//!         let controller = controller.clone();
//!         async move { controller.reconcile(node).await.map(ReconcileAction::into_action) }
//!     }, error_policy, ctx)
//!     .for_each(|_| futures::future::ready(()))
//!     .await;
//! ```
//!
//! [`PolkadotNode`]: crate::crd::PolkadotNode
//! [`NearNode`]: crate::crd::NearNode
//! [`BesuNetwork`]: crate::crd::BesuNetwork

mod children;
mod network;
mod node;
mod store;

#[cfg(test)]
mod testing;

pub use children::{WriteOutcome, MAX_WRITE_ATTEMPTS};
pub use network::NetworkController;
pub use node::NodeController;
pub use store::{ClusterStore, KubeStore};

use crate::clients::ClientRegistry;
use crate::config::OperatorConfig;
use crate::error::OperatorError;
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use std::time::Duration;

/// Shared context for controllers.
pub struct ControllerContext {
    /// API access.
    pub store: Arc<dyn ClusterStore>,
    /// Client images and adapters.
    pub clients: ClientRegistry,
    /// Runtime settings.
    pub config: OperatorConfig,
}

impl ControllerContext {
    /// Create a context talking to the cluster through `client`.
    pub fn new(client: kube::Client, clients: ClientRegistry, config: OperatorConfig) -> Self {
        Self::with_store(Arc::new(KubeStore::new(client)), clients, config)
    }

    /// Create a context over any store.
    pub fn with_store(
        store: Arc<dyn ClusterStore>,
        clients: ClientRegistry,
        config: OperatorConfig,
    ) -> Self {
        Self {
            store,
            clients,
            config,
        }
    }
}

/// Result type for reconciliation actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Requeue after the specified duration.
    Requeue(Duration),
    /// Don't requeue; the next change to the resource or its children triggers
    /// another pass.
    Done,
}

impl ReconcileAction {
    /// Convert into the runtime's action.
    pub fn into_action(self) -> Action {
        match self {
            ReconcileAction::Requeue(duration) => Action::requeue(duration),
            ReconcileAction::Done => Action::await_change(),
        }
    }
}

/// Error policy shared by every controller.
///
/// Terminal errors wait for the user to change the resource; anything else
/// is retried after the configured delay.
pub fn error_policy<K>(obj: Arc<K>, error: &OperatorError, ctx: Arc<ControllerContext>) -> Action
where
    K: Resource<DynamicType = ()>,
{
    let terminal = error.is_terminal();
    tracing::error!(
        kind = %K::kind(&()),
        name = %obj.name_any(),
        namespace = %obj.namespace().unwrap_or_default(),
        error = %error,
        terminal,
        "Reconciliation error"
    );

    if terminal {
        Action::await_change()
    } else {
        Action::requeue(ctx.config.error_requeue())
    }
}
