use quiet_spots::api::{self, ApiContext};
use quiet_spots::config;
use quiet_spots::simulation::random::RngSource;
use quiet_spots::simulation::spawn_simulation_task;
use quiet_spots::state::AppState;
use quiet_spots::sync::{run_feed_sync, spawn_sync_task};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock};
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::sync::watch;

fn init_tracing(level: tracing::Level) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_default()?;
    init_tracing(config.log_level());
    tracing::info!(
        config_path = config::DEFAULT_CONFIG_PATH,
        app = %config.app.name,
        "quiet-spots starting"
    );
    let state = Arc::new(RwLock::new(AppState::new()));
    let utc_offset = config.utc_offset()?;

    let rng = Arc::new(Mutex::new(match config.simulation_seed() {
        Some(seed) => {
            tracing::info!(seed, "Using seeded simulation rng");
            RngSource::seeded(seed)
        }
        None => RngSource::from_entropy(),
    }));

    let http = reqwest::Client::new();
    let feed_source = config.feed_source();

    // Import locations before serving
    match &feed_source {
        Some(source) => {
            if let Err(err) =
                run_feed_sync(&state, source, &http, &*rng, OffsetDateTime::now_utc()).await
            {
                tracing::warn!(error = %err, "Startup location sync failed, continuing with current store");
            }
        }
        None => tracing::info!("No location feed configured, starting with empty store"),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks: Vec<(&str, JoinHandle<()>)> = Vec::new();
    if config.simulation_enabled() {
        tasks.push((
            "simulation",
            spawn_simulation_task(
                Arc::clone(&state),
                Arc::clone(&rng),
                config.simulation_interval(),
                utc_offset,
                shutdown_rx.clone(),
            ),
        ));
    } else {
        tracing::warn!("Sensor simulation disabled in [simulation].enabled");
    }
    if let Some(source) = &feed_source {
        tasks.push((
            "location sync",
            spawn_sync_task(
                Arc::clone(&state),
                source.clone(),
                http.clone(),
                Arc::clone(&rng),
                config.sync_interval(),
                shutdown_rx,
            ),
        ));
    }

    let context = ApiContext {
        state: Arc::clone(&state),
        rng,
        utc_offset,
        feed_source,
        http,
    };
    let app = api::router(context);
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Signal the background tasks to stop
    let _ = shutdown_tx.send(true);
    for (name, handle) in tasks {
        if let Err(err) = handle.await {
            tracing::warn!(task = name, error = %err, "Background task ended abnormally");
        }
    }
    tracing::info!("quiet-spots stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
