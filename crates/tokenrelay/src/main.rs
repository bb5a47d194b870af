use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args as ClapArgs, Parser, Subcommand};
use tokenrelay::config::{self, ServiceKind, Settings};
use tokenrelay::observability::init_observability;
use tokenrelay::services::{self, edge, idp, orchestrator, resource};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "tokenrelay")]
#[command(about = "Token relay services: identity provider emulator, resource API, orchestrator and edge", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable JSON logging output
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Identity provider emulator
    Idp(ListenArgs),
    /// Resource API verifying bearer tokens
    Resource(ListenArgs),
    /// Orchestrator running tasks for the edge
    Orchestrator(ListenArgs),
    /// Edge service with browser sessions
    Edge(ListenArgs),
}

#[derive(ClapArgs, Debug)]
struct ListenArgs {
    /// Bind host (overrides the configured host)
    #[arg(long)]
    host: Option<IpAddr>,

    /// Bind port (overrides the configured port)
    #[arg(short, long)]
    port: Option<u16>,
}

impl Command {
    const fn kind(&self) -> ServiceKind {
        match self {
            Self::Idp(_) => ServiceKind::Idp,
            Self::Resource(_) => ServiceKind::Resource,
            Self::Orchestrator(_) => ServiceKind::Orchestrator,
            Self::Edge(_) => ServiceKind::Edge,
        }
    }

    const fn listen(&self) -> &ListenArgs {
        match self {
            Self::Idp(l) | Self::Resource(l) | Self::Orchestrator(l) | Self::Edge(l) => l,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let kind = args.command.kind();

    // Precedence: defaults < file < env < CLI
    let mut settings = config::load_settings(args.config.as_deref())?;
    let listen = args.command.listen();
    settings.set_listen(kind, listen.host, listen.port);
    if args.verbose {
        settings.telemetry.log_level = "debug".to_string();
    }
    if args.json_logs {
        settings.telemetry.json_logs = true;
    }

    init_observability(&settings.telemetry, kind.name())?;
    settings.validate(kind)?;

    let background = CancellationToken::new();
    let (router, tasks) = build_service(kind, &settings, &background).await?;

    let addr = settings.listen_addr(kind);
    tracing::info!(service = %kind, %addr, version = env!("CARGO_PKG_VERSION"), "Starting service");

    let shutdown_token = background.clone();
    let shutdown = async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
        shutdown_token.cancel();
    };

    let result = services::serve(router, addr, shutdown).await;

    background.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Background task ended abnormally");
        }
    }

    result.map_err(Into::into)
}

async fn build_service(
    kind: ServiceKind,
    settings: &Settings,
    background: &CancellationToken,
) -> anyhow::Result<(axum::Router, Vec<JoinHandle<()>>)> {
    let mut tasks = Vec::new();

    let router = match kind {
        ServiceKind::Idp => {
            let provider = idp::build(&settings.idp)?;
            tasks.extend(idp::spawn_background(
                &provider,
                &settings.idp,
                background.clone(),
            ));
            tracing::info!(issuer = %settings.idp.issuer, "Identity provider emulator ready");
            idp::router(provider)
        }
        ServiceKind::Resource => {
            let (verifier, cache) = resource::build(&settings.resource)?;
            tracing::info!(jwks_uri = %cache.jwks_uri(), "Token verification configured");
            tasks.extend(resource::spawn_background(
                cache,
                &settings.resource,
                background.clone(),
            ));
            resource::router(verifier)
        }
        ServiceKind::Orchestrator => {
            let state = orchestrator::OrchestratorState::from_settings(&settings.orchestrator)?;
            orchestrator::router(Arc::new(state))
        }
        ServiceKind::Edge => {
            let state = edge::build(&settings.edge).await?;
            edge::router(state)
        }
    };

    Ok((router, tasks))
}
