//! Chainkeeper Kubernetes Operator binary.
//!
//! This binary runs the chainkeeper operator, which manages PolkadotNode,
//! NearNode and BesuNetwork custom resources in a Kubernetes cluster.

use chainkeeper_operator::clients::ClientRegistry;
use chainkeeper_operator::config::OperatorConfig;
use chainkeeper_operator::controller::{
    error_policy, ControllerContext, NetworkController, NodeController, ReconcileAction,
};
use chainkeeper_operator::crd::{BesuNetwork, ChainNode, NearNode, PolkadotNode};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::runtime::controller::{self, Controller};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client, CustomResourceExt};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "operator", about = "Runs blockchain nodes on Kubernetes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the CustomResourceDefinitions as YAML.
    Crds,
    /// Run the controllers.
    Run {
        #[command(flatten)]
        config: OperatorConfig,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match cli.command {
        Command::Crds => return generate_crds(),
        Command::Run { config } => config,
    };

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chainkeeper_operator=info".parse()?)
                .add_directive("kube=info".parse()?),
        )
        .init();

    let _ = rustls::crypto::ring::default_provider().install_default();

    tracing::info!(
        webhooks = config.enable_webhooks,
        concurrency = config.concurrency,
        "Starting chainkeeper operator"
    );

    // Connect to Kubernetes
    let client = Client::try_default().await?;
    tracing::info!("Connected to Kubernetes cluster");

    let ctx = Arc::new(ControllerContext::new(
        client.clone(),
        ClientRegistry::from_env(),
        config,
    ));

    let polkadot = run_node_controller::<PolkadotNode>(client.clone(), ctx.clone());
    let near = run_node_controller::<NearNode>(client.clone(), ctx.clone());
    let besu = run_network_controller(client.clone(), ctx.clone());

    // Controllers run until a shutdown signal
    tokio::select! {
        _ = polkadot => tracing::info!("PolkadotNode controller exited"),
        _ = near => tracing::info!("NearNode controller exited"),
        _ = besu => tracing::info!("BesuNetwork controller exited"),
    }

    Ok(())
}

fn controller_config(ctx: &ControllerContext) -> controller::Config {
    controller::Config::default().concurrency(ctx.config.concurrency)
}

/// Run the controller of one node kind.
async fn run_node_controller<K: ChainNode>(client: Client, ctx: Arc<ControllerContext>) {
    let kind = K::kind(&()).to_string();
    tracing::info!(kind = %kind, "Starting controller");

    let nodes: Api<K> = Api::all(client.clone());
    let controller = NodeController::<K>::new(ctx.clone());

    Controller::new(nodes, WatcherConfig::default())
        .with_config(controller_config(&ctx))
        .owns(Api::<StatefulSet>::all(client.clone()), WatcherConfig::default())
        .owns(Api::<PersistentVolumeClaim>::all(client), WatcherConfig::default())
        .shutdown_on_signal()
        .run(
            move |node, _ctx| {
                let controller = controller.clone();
                async move { controller.reconcile(node).await.map(ReconcileAction::into_action) }
            },
            error_policy::<K>,
            ctx,
        )
        .for_each(|result| {
            match result {
                Ok((obj, action)) => {
                    tracing::debug!(kind = %kind, name = %obj.name, ?action, "Reconciled");
                }
                Err(e) => {
                    tracing::warn!(kind = %kind, error = %e, "Controller stream error");
                }
            }
            futures::future::ready(())
        })
        .await;
}

/// Run the BesuNetwork controller.
async fn run_network_controller(client: Client, ctx: Arc<ControllerContext>) {
    tracing::info!(kind = "BesuNetwork", "Starting controller");

    let networks: Api<BesuNetwork> = Api::all(client.clone());
    let controller = NetworkController::new(ctx.clone());

    Controller::new(networks, WatcherConfig::default())
        .with_config(controller_config(&ctx))
        .owns(Api::<StatefulSet>::all(client.clone()), WatcherConfig::default())
        .owns(Api::<PersistentVolumeClaim>::all(client), WatcherConfig::default())
        .shutdown_on_signal()
        .run(
            move |network, _ctx| {
                let controller = controller.clone();
                async move { controller.reconcile(network).await.map(ReconcileAction::into_action) }
            },
            error_policy::<BesuNetwork>,
            ctx,
        )
        .for_each(|result| {
            match result {
                Ok((obj, action)) => {
                    tracing::debug!(network = %obj.name, ?action, "Reconciled network");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "BesuNetwork controller stream error");
                }
            }
            futures::future::ready(())
        })
        .await;
}

/// Print CRD YAML.
fn generate_crds() -> anyhow::Result<()> {
    println!("---");
    println!("{}", serde_yaml::to_string(&PolkadotNode::crd())?);
    println!("---");
    println!("{}", serde_yaml::to_string(&NearNode::crd())?);
    println!("---");
    println!("{}", serde_yaml::to_string(&BesuNetwork::crd())?);
    Ok(())
}
