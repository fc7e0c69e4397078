//! Outreach API server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use outreach_api::config::ApiConfig;
use outreach_api::error::AppError;
use outreach_api::state::AppState;
use outreach_api::telemetry;
use outreach_core::clock::{Clock, SystemClock};
use outreach_core::repository::EventRepository;
use outreach_core::rng::SystemRng;
use outreach_dispatch::{
    DispatchEngine, InMemoryContactRegistry, SchedulingTrigger, WebhookChannelDriver,
};
use outreach_event_store::memory_event_repository::InMemoryEventRepository;
use outreach_event_store::pg_event_repository::PgEventRepository;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

async fn event_repository(config: &ApiConfig) -> Result<Arc<dyn EventRepository>, AppError> {
    let Some(database_url) = &config.database_url else {
        warn!("DATABASE_URL not set; events are kept in memory and lost on exit");
        return Ok(Arc::new(InMemoryEventRepository::new()));
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(database_url)
        .await?;
    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .map_err(sqlx::Error::from)?;
    info!("database migrations applied");

    Ok(Arc::new(PgEventRepository::new(pool)))
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "could not listen for ctrl-c");
            }
            info!("shutdown requested");
        }
        () = shutdown.cancelled() => {}
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = ApiConfig::from_env()?;
    let _telemetry = telemetry::init(config.otlp_endpoint.as_deref())?;

    info!("Starting Outreach API server");

    let event_repository = event_repository(&config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let driver = WebhookChannelDriver::new(config.channel_driver_url.as_str())
        .map_err(|e| AppError::Config(format!("CHANNEL_DRIVER_URL client: {e}")))?;

    let engine = Arc::new(DispatchEngine::new(
        event_repository.clone(),
        clock.clone(),
        Box::new(SystemRng::from_entropy()),
        Arc::new(driver),
        config.dispatch.clone(),
    ));
    let report = engine.recover().await?;
    info!(
        channels = report.channels,
        resumed = report.resumed.len(),
        scheduled = report.scheduled.len(),
        "dispatch state recovered"
    );

    let shutdown = CancellationToken::new();
    let trigger =
        tokio::spawn(SchedulingTrigger::from_engine(engine.clone()).run(shutdown.clone()));

    let app_state = AppState::new(
        clock,
        event_repository,
        engine.clone(),
        Arc::new(InMemoryContactRegistry::new()),
    );

    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app = outreach_api::app(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))?;
    info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Err(e) = trigger.await {
        warn!(error = %e, "scheduling trigger did not stop cleanly");
    }
    engine.shutdown().await;
    info!("Outreach API server stopped");

    Ok(())
}
