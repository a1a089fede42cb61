//! hoplink node binary
//!
//! `hoplink listen` runs the relay server until Ctrl+C.
//! `hoplink send <file> <destination>` originates one transfer.

use anyhow::Context;
use clap::Parser;
use hoplink::config::{Cli, Command, NodeConfig};
use hoplink::metrics::{init_metrics, start_metrics_server};
use hoplink::relay::RelayServer;
use hoplink::{FileSender, HttpRouteClient, HttpStatusClient};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type HttpSender = FileSender<HttpRouteClient, HttpStatusClient>;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.node.log_level);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(level))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = Arc::new(NodeConfig::from_args(cli.node).context("invalid configuration")?);
    let sender = Arc::new(build_sender(config.clone())?);

    match cli.command {
        Command::Listen => {
            listen(config, sender).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Send {
            filename,
            destination,
            algo,
        } => {
            init_metrics();
            let algorithm = algo.unwrap_or(config.algorithm);
            match sender
                .send_to_destination(&filename, &destination, algorithm)
                .await
            {
                Ok(transfer) => {
                    tracing::info!(
                        transfer_id = %transfer.transfer_id,
                        route = %transfer.route,
                        "transfer handed to first hop"
                    );
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    tracing::error!(error = %e, kind = e.kind(), "transfer failed");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

fn build_sender(config: Arc<NodeConfig>) -> anyhow::Result<HttpSender> {
    let router = HttpRouteClient::new(&config.routing_url, config.transfer_timeout)
        .context("building routing client")?;
    let reporter = HttpStatusClient::new(&config.status_url, config.transfer_timeout)
        .context("building timeline client")?;

    tracing::debug!(
        routing = router.base_url(),
        timeline = reporter.url(),
        "service clients ready"
    );
    Ok(FileSender::new(config, router, reporter))
}

async fn listen(config: Arc<NodeConfig>, sender: Arc<HttpSender>) -> anyhow::Result<()> {
    match config.metrics_addr {
        Some(addr) => start_metrics_server(addr).context("starting metrics exporter")?,
        None => init_metrics(),
    }

    let server = Arc::new(RelayServer::bind(sender).await?);
    tracing::info!(
        node = %config.node_id,
        addr = %server.local_addr(),
        receive_dir = %config.receive_dir.display(),
        relay_dir = %config.relay_dir.display(),
        "node started"
    );

    let mut runner = {
        let server = server.clone();
        tokio::spawn(async move { server.run().await })
    };

    tokio::select! {
        result = &mut runner => {
            result.context("relay server task panicked")??;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
            server.stop();
            runner.await.context("relay server task panicked")??;
        }
    }

    tracing::info!(stats = %server.stats(), "node stopped");
    Ok(())
}
