//! voicereader daemon entry point.

use std::io::Read;
use std::net::SocketAddr;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voicereader_config::{resolve_config, BootstrapPayload, CliArgs};
use voicereader_jobs::{Runtime, WarmupController};
use voicereader_server::{create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_tracing();

    if !args.server {
        eprintln!("voicereader: pass --server to run the engine daemon");
        std::process::exit(1);
    }

    let bootstrap = if args.bootstrap_stdin {
        let mut raw = String::new();
        std::io::stdin().read_to_string(&mut raw)?;
        BootstrapPayload::parse(&raw)?
    } else {
        BootstrapPayload::default()
    };

    let config = resolve_config(&args, &bootstrap)?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        data_dir = %config.data_dir.display(),
        backend = %config.synth_backend,
        "resolved engine configuration"
    );

    let runtime = Runtime::bootstrap(config.clone()).await?;
    let warmup = WarmupController::new();

    if config.warmup_on_startup {
        let synth = runtime.synthesizer.clone();
        let warmup_for_task = warmup.clone();
        let reason = Some("startup".to_string());
        let warmup_text = config.warmup_text.clone();
        let warmup_language = if config.warmup_language == "auto" {
            None
        } else {
            Some(config.warmup_language.clone())
        };
        tokio::spawn(async move {
            let outcome = warmup_for_task
                .trigger(synth, warmup_text, warmup_language, false, false, reason)
                .await;
            if outcome.accepted {
                tracing::info!("startup warmup triggered");
            }
        });
    }

    let state = AppState::new(runtime, warmup);
    let shutdown = state.shutdown.clone();
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!(%addr, "binding listener");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal(shutdown: std::sync::Arc<tokio::sync::Notify>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
        _ = shutdown.notified() => tracing::info!("shutdown requested via /v1/quit"),
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "voicereader=info,tower_http=info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
