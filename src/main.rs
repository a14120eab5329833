use anyhow::{Context, Result};
use clap::Parser;
use safetyd::{cli, config, db, intervention, registry, routes, state, station};
use std::sync::Arc;
use tokio::net::TcpListener;

async fn bind_listener(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr).await.map_err(|err| {
        if err.kind() == std::io::ErrorKind::AddrInUse {
            anyhow::anyhow!(
                "{addr} is already in use; free the port or choose another via [server].port or --port"
            )
        } else {
            anyhow::Error::new(err).context(format!("failed to bind listener on {addr}"))
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = cli::Args::parse();
    let config = Arc::new(config::Config::load(&args.config)?);
    let db = config
        .database
        .as_ref()
        .map(db::Db::connect_lazy)
        .transpose()?;

    let registry = Arc::new(registry::Registry::build(&config)?);

    // Probe free serial ports before any acquisition loop starts.
    {
        let registry = Arc::clone(&registry);
        tokio::task::spawn_blocking(move || station::detect::assign_serial_ports(&registry))
            .await
            .context("serial detection task failed")?;
    }

    registry.start_all(db);

    let state = state::AppState {
        config: Arc::clone(&config),
        registry: Arc::clone(&registry),
        intervention: intervention::HumanIntervention::new(config.intervention_file.clone()),
    };
    let app = routes::router(state);

    let host = args.host.unwrap_or_else(|| config.server.host.clone());
    let port = args.port.unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");
    let listener = bind_listener(&addr).await?;
    tracing::info!(addr = %addr, "weather-safety daemon listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    registry.stop_all();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for the shutdown signal");
    }
}
