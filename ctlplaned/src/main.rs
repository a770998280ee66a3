// SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
// SPDX-License-Identifier: Apache-2.0

//! The config control plane binary: wires the lifecycle supervisor,
//! transaction pipeline, configuration sources and saga orchestrator
//! together, and drives them until an operator signal stops the process.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing::info;

use ctlplane_common::Context;
use ctlplane_core::lifecycle::Runnable;
use ctlplane_core::orchestrator::SagaOrchestrator;
use ctlplane_core::siphon;
use ctlplane_core::storage::TransactionStorage;
use ctlplane_core::transaction::Transaction;
use ctlplane_proto::configctl::config_control_server::ConfigControlServer;
use ctlplane_sources::file::FileSource;
use ctlplane_sources::listen_addr::{self, ListenAddr};
use ctlplane_sources::rpc::RpcService;

/// Command line arguments for the config control plane daemon.
#[derive(Parser, Debug)]
#[command(name = "ctlplaned")]
#[command(about = "Config control plane: validated transactions from file and RPC sources, saga-orchestrated across registered participants")]
struct Args {
    /// Path to the configuration file the file source watches.
    #[arg(short, long, env = "CTLPLANE_CONFIG", default_value = "/etc/ctlplane/config")]
    config: PathBuf,

    /// Listen address for the RPC service: empty (TCP, unspecified port),
    /// `tcp://host:port`, `unix:///abs/path`, or bare `host:port`.
    #[arg(short, long, env = "CTLPLANE_LISTEN", default_value = "0.0.0.0:7732")]
    listen: String,

    /// Log level passed to the tracing env filter.
    #[arg(long, env = "CTLPLANE_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

/// Drives the saga orchestrator: takes each transaction the siphon
/// delivers and processes it to completion.
async fn run_orchestrator_loop(
    orchestrator: Arc<SagaOrchestrator>,
    mut receiver: siphon::SiphonReceiver<Arc<Transaction>>,
    ctx: Context,
) {
    while let Some(tx) = receiver.recv(&ctx).await {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            if let Err(e) = orchestrator.process(tx).await {
                tracing::error!(error = %e, "saga processing failed");
            }
        });
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    ctlplane_common::logging::init_logging(&args.log_level)?;

    info!("starting config control plane");
    info!(config = %args.config.display(), listen = %args.listen, "configuration");

    let storage = Arc::new(TransactionStorage::default());
    let orchestrator = Arc::new(SagaOrchestrator::new(storage.clone()));
    let (siphon_tx, siphon_rx) = siphon::channel::<Arc<Transaction>>();

    let file_source = Arc::new(FileSource::new(args.config.clone(), storage.clone(), siphon_tx.clone()));
    let rpc_service = Arc::new(RpcService::new(storage.clone(), orchestrator.clone(), siphon_tx));

    let root_ctx = Context::new();

    let orchestrator_ctx = root_ctx.child();
    let orchestrator_handle = tokio::spawn(run_orchestrator_loop(orchestrator.clone(), siphon_rx, orchestrator_ctx));

    let file_ctx = root_ctx.child();
    let file_source_handle = {
        let file_source = file_source.clone();
        tokio::spawn(async move { file_source.run(file_ctx).await })
    };

    let rpc_ctx = root_ctx.child();
    let rpc_handle = {
        let rpc_service = rpc_service.clone();
        let listen = args.listen.clone();
        tokio::spawn(async move { serve_rpc(rpc_service, listen, rpc_ctx).await })
    };

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutdown signal received");
    root_ctx.cancel();

    file_source.stop();
    rpc_service.stop();

    let _ = file_source_handle.await;
    let _ = rpc_handle.await;
    orchestrator_handle.abort();

    info!("config control plane stopped");
    Ok(())
}

async fn serve_rpc(service: Arc<RpcService>, listen: String, ctx: Context) -> Result<()> {
    let addr = listen_addr::parse(&listen)?;
    let server = tonic::transport::Server::builder().add_service(ConfigControlServer::from_arc(service.clone()));

    let run_handle = {
        let service = service.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move { service.run(ctx).await })
    };

    let serve_result = match addr {
        ListenAddr::TcpUnspecified => {
            let tcp_addr: std::net::SocketAddr = "0.0.0.0:0".parse().unwrap();
            server.serve_with_shutdown(tcp_addr, ctx.cancelled()).await
        }
        ListenAddr::Tcp(host_port) => {
            let tcp_addr: std::net::SocketAddr = host_port
                .parse()
                .with_context(|| format!("invalid tcp listen address {host_port:?}"))?;
            server.serve_with_shutdown(tcp_addr, ctx.cancelled()).await
        }
        ListenAddr::Unix(path) => {
            listen_addr::remove_stale_unix_socket(&path)?;
            let listener = tokio::net::UnixListener::bind(&path)
                .with_context(|| format!("failed to bind unix socket {path:?}"))?;
            let incoming = tokio_stream::wrappers::UnixListenerStream::new(listener);
            server
                .serve_with_incoming_shutdown(incoming, ctx.cancelled())
                .await
        }
    };

    serve_result.context("rpc server exited with an error")?;
    let _ = run_handle.await;
    Ok(())
}
