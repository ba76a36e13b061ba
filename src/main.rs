//! # Operator Demo
//!
//! Example operator built on the runtime: keeps one Deployment per `Test`
//! custom resource (`tests.example.com/v1`).
//!
//! Each Deployment runs a single pod that prints the `spec.text` of its `Test`
//! in a loop. Deployments carry a controller owner reference, so deleting the
//! `Test` garbage-collects its Deployment.
//!
//! ## Usage
//!
//! ```text
//! operator-demo --print-crd | kubectl apply -f -
//! operator-demo --namespace default --resync-secs 300
//! ```
//!
//! Metrics and probes are served on `METRICS_PORT` (5000 by default).

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::{CustomResource, CustomResourceExt, Resource as _};
use operator_runtime::config::{OperatorConfig, ServerConfig};
use operator_runtime::observability::{init_logging, register_metrics};
use operator_runtime::prelude::*;
use operator_runtime::reconcile::kinds;
use operator_runtime::server::{start_server, ServerState};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const CONTAINER_IMAGE: &str = "alpine:3.20";

/// Desired state of a `Test` resource
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(group = "example.com", version = "v1", kind = "Test", namespaced)]
pub struct TestSpec {
    /// Text the managed pod prints every second
    pub text: String,
}

#[derive(Parser, Debug)]
#[command(name = "operator-demo", version, about = "Keeps a Deployment for every Test resource")]
struct Args {
    /// Namespace to watch; defaults to the namespace of the kubeconfig context.
    /// An empty value watches all namespaces.
    #[arg(long)]
    namespace: Option<String>,

    /// Reconcile every cached resource at this interval (seconds, 0 disables)
    #[arg(long, default_value_t = 0)]
    resync_secs: u64,

    /// Print the Test CRD as JSON and exit
    #[arg(long)]
    print_crd: bool,
}

/// Applies the Deployment derived from each `Test`
#[derive(Debug)]
struct TestReconciler {
    deployments: KubeClient<Deployment>,
}

#[async_trait]
impl Reconciler<Test> for TestReconciler {
    async fn reconcile(
        &self,
        ctx: ReconcileContext,
        _op: Operator<Test>,
        test: Arc<Test>,
    ) -> anyhow::Result<()> {
        info!(resource.key = ctx.key(), attempt = ctx.attempt(), "Reconciling test");
        let deployment = desired_deployment(&test)?;
        kinds::deployment(&self.deployments, &deployment)
            .await
            .with_context(|| format!("failed to apply deployment for {}", ctx.key()))?;
        Ok(())
    }
}

fn desired_deployment(test: &Test) -> Result<Deployment> {
    let name = test
        .metadata
        .name
        .clone()
        .context("test resource has no name")?;
    let owner = test
        .controller_owner_ref(&())
        .context("test resource has no uid yet")?;
    let labels = BTreeMap::from([("deployment".to_string(), name.clone())]);

    Ok(Deployment {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: test.metadata.namespace.clone(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "test".to_string(),
                        image: Some(CONTAINER_IMAGE.to_string()),
                        command: Some(vec!["sh".to_string(), "-c".to_string()]),
                        args: Some(vec![
                            "while true; do echo \"$TEXT\"; sleep 1; done".to_string()
                        ]),
                        env: Some(vec![k8s_openapi::api::core::v1::EnvVar {
                            name: "TEXT".to_string(),
                            value: Some(test.spec.text.clone()),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_crd {
        println!("{}", serde_json::to_string_pretty(&Test::crd())?);
        return Ok(());
    }

    // Configure rustls crypto provider before any TLS connection is made
    rustls::crypto::ring::default_provider()
        .install_default()
        .unwrap_or_else(|_| panic!("Failed to install rustls crypto provider"));

    init_logging(Some("operator_runtime=info,operator_demo=info"))?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("BUILD_GIT_HASH"),
        built_at = env!("BUILD_DATETIME"),
        "Starting operator demo"
    );

    register_metrics()?;
    let server_config = ServerConfig::from_env();
    let server_state = Arc::new(ServerState::default());
    let server_shutdown = CancellationToken::new();
    let server = tokio::spawn(start_server(
        server_config.metrics_port,
        Arc::clone(&server_state),
        server_shutdown.clone(),
    ));

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let namespace = args
        .namespace
        .unwrap_or_else(|| client.default_namespace().to_string());

    let operator = Operator::<Test>::builder()
        .resource(ResourceType::of::<Test>())
        .client(KubeClient::<Test>::namespaced(client.clone(), namespace.clone()))
        .reconciler(TestReconciler {
            deployments: KubeClient::namespaced(client, namespace.clone()),
        })
        .namespace(namespace)
        .config(OperatorConfig::from_env())
        .build()?;

    let mut running = tokio::spawn({
        let operator = operator.clone();
        async move { operator.run().await }
    });
    server_state.set_ready(true);

    if args.resync_secs > 0 {
        let operator = operator.clone();
        let period = Duration::from_secs(args.resync_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            while !operator.is_stopped() {
                interval.tick().await;
                operator.reconcile();
            }
        });
    }

    tokio::select! {
        () = shutdown_signal() => {}
        finished = &mut running => {
            server_shutdown.cancel();
            return finished
                .context("operator task failed")?
                .context("operator failed to start");
        }
    }

    server_state.set_ready(false);
    operator.stop();
    // Let an in-flight reconciliation finish
    running
        .await
        .context("operator task failed")?
        .context("operator failed")?;
    server_shutdown.cancel();
    if let Err(e) = server.await.context("HTTP server task failed")? {
        error!(error = %e, "HTTP server error");
    }
    info!("Operator demo stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
