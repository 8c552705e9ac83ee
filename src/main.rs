use std::sync::Arc;

use storefront_api::{config, db, events, AppState};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_config = config::load_config()?;
    config::init_tracing(app_config.log_level(), app_config.log_json);
    info!(
        environment = %app_config.environment,
        "Starting storefront API"
    );

    let pool = Arc::new(db::establish_connection_from_app_config(&app_config).await?);
    if app_config.auto_migrate {
        info!("Running database migrations");
        db::run_migrations(&pool).await?;
    }
    db::check_connection(&pool).await?;

    let (event_sender, receiver) = events::channel(1024);
    tokio::spawn(events::process_events(receiver));

    let addr = format!("{}:{}", app_config.host, app_config.port);
    let state = AppState::build(pool, app_config, event_sender)?;
    let app = storefront_api::app_router(state);

    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "Listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
