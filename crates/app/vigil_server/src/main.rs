//! Vigil auth service binary.
//!
//! Reads configuration from the environment (and `.env`), runs
//! migrations, and serves the API.

use std::net::SocketAddr;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

/// CLI arguments for the auth service.
#[derive(Parser, Debug)]
#[command(name = "vigil_server", about = "Vigil authentication service")]
struct Args {
    /// Address to bind the HTTP listener.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3400")]
    bind_addr: String,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/vigil"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,
}

/// How often rolled-over rate-limit windows and expired blocks are purged.
const PURGE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,vigil_api=debug,vigil_core=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    let mut config = vigil_api::config::ApiConfig::from_env()?;
    config.bind_addr = args.bind_addr;
    config.database_url = args.database_url.clone();

    info!(bind_addr = %config.bind_addr, "starting vigil_server");

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&args.database_url)
        .await?;

    info!("running database migrations");
    vigil_api::migrate(&pool).await?;

    let state = vigil_api::AppState::new(pool, config.clone());

    // Old windows are dead weight once they roll over; sweep them out.
    let limiter = state.limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let cutoff = chrono::Utc::now() - chrono::Duration::hours(1);
            if let Err(e) = limiter.purge(cutoff).await {
                warn!(error = %e, "rate limit purge failed");
            }
        }
    });

    let app = vigil_api::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "auth service listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
