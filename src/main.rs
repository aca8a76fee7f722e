use std::error::Error;
use std::sync::Arc;

use quarry::config::Config;
use quarry::http::{router, AppState};
use quarry::import::{formats::builtin_registry, ImportEngine, NoHooks};
use quarry::schema::Schema;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();
    dotenv::dotenv().ok();

    let config = Config::from_env()?;

    let upload_dir = config.upload_dir();
    // ensure upload dir exists
    std::fs::create_dir_all(&upload_dir).map_err(|e| {
        format!(
            "Failed to create upload directory '{}': {}. \
            If using host mounts, ensure the directory exists and has correct permissions.",
            upload_dir.display(),
            e,
        )
    })?;

    let pool = quarry::db::connect(&config.database_url).await?;

    let engine = ImportEngine::new(
        pool,
        builtin_registry(),
        Schema::pieces(),
        Arc::new(NoHooks),
        config.engine.clone(),
    );

    let app = router(AppState { engine, upload_dir });

    let listener = TcpListener::bind(config.bind_addr()).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
