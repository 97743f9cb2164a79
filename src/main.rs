//! ACARS recorder service

use std::sync::Arc;

use acars_recorder::{
    api::{self, AppState},
    config::AppConfig,
    database::Database,
    dataset::{Dataset, DatasetLookup},
    errors::AcarsRecorderError,
    export::ExportOptions,
    listener::Listener,
};
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), AcarsRecorderError> {
    #[cfg(feature = "dotenvy")]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = AppConfig::load()?;
    config.validate()?;

    let db = Database::connect(&config.database).await?;

    let dataset: Box<dyn DatasetLookup> = match &config.dataset.dir {
        Some(dir) => Box::new(Dataset::load(dir)?),
        None => {
            info!("No dataset directory configured, descriptions disabled");
            Box::new(Dataset::empty())
        }
    };

    // Bind failure is fatal
    let listener = Listener::bind(&config.listener, db.clone()).await?;
    let shutdown = CancellationToken::new();
    let listener_task = tokio::spawn(listener.run(shutdown.clone()));

    let state = Arc::new(AppState {
        db: db.clone(),
        dataset,
        export: ExportOptions::from_config(&config.export)?,
    });
    let http = TcpListener::bind(config.http.bind).await?;
    info!("HTTP server listening on {}", http.local_addr()?);

    let served = axum::serve(http, api::router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Received shutdown signal");
        })
        .await;
    if let Err(e) = &served {
        error!("HTTP server error: {}", e);
    }

    shutdown.cancel();
    if let Err(e) = listener_task.await {
        error!("Listener task failed: {}", e);
    }
    db.close().await;
    info!("ACARS recorder stopped");

    served?;
    Ok(())
}
