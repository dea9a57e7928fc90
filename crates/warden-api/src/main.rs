//! Warden API server entry point.

use sqlx::postgres::PgPoolOptions;
use warden_api::config::Config;
use warden_api::error::AppError;
use warden_api::telemetry;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;
    let telemetry = telemetry::init(config.log_format)?;

    tracing::info!(
        otlp = telemetry.exports_spans(),
        "Starting Warden API server"
    );

    // Create database connection pool.
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("../../migrations").run(&pool).await?;

    let addr = config.listen_addr()?;
    let app = warden_api::app_with_pool(pool, &config);

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let served = axum::serve(listener, app).await;

    telemetry.shutdown();
    served?;

    Ok(())
}
