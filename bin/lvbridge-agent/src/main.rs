//! LVBridge Agent - per-node capacity sync
//!
//! This binary connects to the node-local volume daemon, mirrors its
//! capacity onto the cluster Node object and serves metrics and health.

mod http;

use anyhow::{Context, Result};
use clap::Parser;
use lvbridge_client::{DaemonClient, VolumeGroupApi};
use lvbridge_common::AgentConfig;
use lvbridge_csi::ReadinessChecker;
use lvbridge_node::{CapacityMetrics, CapacityReconciler, KubeNodeApi, ReconcilerState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "lvbridge-agent")]
#[command(about = "LVBridge per-node capacity agent")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/lvbridge/agent.toml")]
    config: PathBuf,

    /// Name of the cluster Node this agent serves
    #[arg(long, env = "NODE_NAME")]
    node_name: Option<String>,

    /// Volume daemon socket
    #[arg(long)]
    lvmd_socket: Option<PathBuf>,

    /// Listen address for metrics and health
    #[arg(long)]
    metrics_listen: Option<SocketAddr>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    /// Load the config file and apply flag overrides
    fn into_config(self) -> Result<AgentConfig> {
        let mut config = AgentConfig::load(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))?;

        if let Some(name) = self.node_name {
            config.node.name = name;
        }
        if let Some(socket) = self.lvmd_socket {
            config.lvmd.socket = socket;
        }
        if let Some(listen) = self.metrics_listen {
            config.metrics.listen = listen;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_path = args.config.clone();
    let config = args.into_config()?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting LVBridge agent");
    info!("Config file: {}", config_path.display());
    info!("Node: {}", config.node.name);
    info!("lvmd socket: {}", config.lvmd.socket.display());

    let daemon = Arc::new(
        DaemonClient::connect(&config.lvmd.socket, config.lvmd.connect_timeout())
            .await
            .context("connecting to lvmd")?,
    );
    let kube = kube::Client::try_default()
        .await
        .context("building cluster client")?;

    let metrics = Arc::new(CapacityMetrics::new(config.node.name.clone()));
    let reconciler = Arc::new(CapacityReconciler::new(
        config.node.name.clone(),
        daemon.clone(),
        Arc::new(KubeNodeApi::new(kube)),
        metrics.clone(),
    ));

    let check_client = daemon.clone();
    let check_class = config.provisioner.device_class.clone();
    let readiness = Arc::new(ReadinessChecker::new(
        config.readiness.interval(),
        move || {
            let client = check_client.clone();
            let class = check_class.clone();
            async move { client.free_bytes(&class).await.map(|_| ()) }
        },
    ));

    // Fail startup rather than run without health endpoints
    let listener = http::bind(config.metrics.listen).await?;

    let cancel = CancellationToken::new();

    let readiness_task = tokio::spawn({
        let readiness = readiness.clone();
        let cancel = cancel.clone();
        async move { readiness.run(cancel).await }
    });

    let mut http_task = tokio::spawn(http::serve(
        listener,
        http::AppState {
            metrics,
            readiness,
        },
        cancel.clone(),
    ));

    let mut reconciler_task = tokio::spawn({
        let reconciler = reconciler.clone();
        let cancel = cancel.clone();
        async move { reconciler.start(cancel).await }
    });

    let mut http_finished = false;
    let exit = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            cancel.cancel();
            reconciler_task
                .await
                .context("reconciler task panicked")?
                .map_err(anyhow::Error::from)
        }
        result = &mut http_task => {
            http_finished = true;
            cancel.cancel();
            if let Err(e) = reconciler_task.await {
                warn!("Reconciler task error: {}", e);
            }
            Err(http_failure(result))
        }
        result = &mut reconciler_task => {
            match result.context("reconciler task panicked")? {
                Ok(()) if reconciler.state() == ReconcilerState::Draining => {
                    info!("Node is being deleted, waiting for shutdown");
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => Ok(()),
                        result = &mut http_task => {
                            http_finished = true;
                            Err(http_failure(result))
                        }
                    }
                }
                Ok(()) => {
                    warn!("Capacity watch ended unexpectedly");
                    Err(anyhow::anyhow!("capacity watch for node {} ended", config.node.name))
                }
                Err(e) => {
                    error!("Capacity reconciler failed: {}", e);
                    Err(e.into())
                }
            }
        }
    };

    cancel.cancel();
    if let Err(e) = readiness_task.await {
        warn!("Readiness task error: {}", e);
    }
    if !http_finished {
        match http_task.await {
            Ok(Err(e)) => error!("Metrics server error: {:#}", e),
            Err(e) => warn!("Metrics server task error: {}", e),
            Ok(Ok(())) => {}
        }
    }

    if exit.is_ok() {
        info!("Agent shut down gracefully");
    }
    exit
}

/// Turn an early end of the metrics server into the agent's exit error
fn http_failure(result: Result<Result<()>, tokio::task::JoinError>) -> anyhow::Error {
    let err = match result {
        Ok(Ok(())) => anyhow::anyhow!("metrics server stopped unexpectedly"),
        Ok(Err(e)) => e,
        Err(e) => anyhow::Error::from(e).context("metrics server task panicked"),
    };
    error!("Metrics server failed: {:#}", err);
    err
}
