//! Habit-tracker HTTP ingress.
//!
//! Wires the session core and streak engine to PostgreSQL, the Redis
//! session cache, and the event bus, then serves the `/api/v1` surface
//! with the background deadline sweeper running alongside.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Error;
use pico_args::Arguments;

use habit_tracker::auth::{AuthManager, TokenConfig, TokenManager};
use habit_tracker::cache::RedisCache;
use habit_tracker::db::{
    Database, PgConfirmationRepository, PgHabitRepository, PgSessionAuditRepository,
    PgUserRepository,
};
use habit_tracker::events::{BusConfig, BusPublisher};
use habit_tracker::habits::{DeadlineSweeper, HabitManager};

use ht_server::api::rate_limiter::IpRateLimiter;
use ht_server::config::ServerConfig;
use ht_server::{api, logging, metrics};

const HELP: &str = "\
Run the habit-tracker backend server

USAGE:
  ht_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     HTTP bind address           [default: env HTTP_BIND or 0.0.0.0:8080]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  HTTP_BIND                HTTP bind address (e.g., 0.0.0.0:8080)
  METRICS_BIND             Prometheus exporter bind address
  DATABASE_URL             PostgreSQL connection string
  REDIS_ADDR               Session cache address (host:port)
  BUS_BROKERS              Comma-separated event bus broker addresses
  JWT_SECRET               JWT signing secret (at least 32 characters)
  SCHEDULER_ENABLED        Run the deadline sweeper (default: true)
  (See .env.example for all configuration options)
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env if present; existing environment variables win
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let bind_override: Option<SocketAddr> = pargs.opt_value_from_str("--bind")?;
    let db_url_override: Option<String> = pargs.opt_value_from_str("--db-url")?;

    logging::init();

    let config = ServerConfig::from_env(bind_override, db_url_override)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;

    tracing::info!(
        service = %config.service.name,
        environment = %config.service.environment,
        version = %config.service.version,
        "configuration loaded"
    );

    if let Err(e) = metrics::init_metrics(config.metrics_bind) {
        tracing::warn!("Failed to initialize metrics: {}. Metrics will not be available.", e);
    } else {
        tracing::info!("Metrics endpoint available at http://{}/metrics", config.metrics_bind);
    }

    // Database: build the pool lazily, then gate startup on readiness so
    // the sweeper's first tick never races a database still coming up
    let db = Database::connect(&config.database)
        .map_err(|e| anyhow::anyhow!("Invalid database configuration: {}", e))?;
    db.wait_until_ready(10)
        .await
        .map_err(|e| anyhow::anyhow!("Database is not reachable: {}", e))?;
    tracing::info!("database ready");

    if let Err(e) = sqlx::migrate!("./migrations").run(db.pool()).await {
        tracing::warn!(error = %e, "migrations failed or not found; continuing");
    }

    // Session cache
    let cache = RedisCache::connect(&config.cache.url())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to cache: {}", e))?;
    tracing::info!(addr = %config.cache.addr, "session cache connected");

    // Event bus producer (best-effort side channel)
    let bus = BusPublisher::start(BusConfig {
        brokers: config.bus.brokers.clone(),
        topic: config.bus.topic.clone(),
        buffer: 256,
    });

    // Managers
    let pool = db.pool().clone();
    let token_manager = TokenManager::new(TokenConfig {
        secret: config.jwt.secret.clone(),
        access_ttl: chrono::Duration::from_std(config.jwt.access_ttl)?,
        refresh_ttl: chrono::Duration::from_std(config.jwt.refresh_ttl)?,
        issuer: config.jwt.issuer.clone(),
    });

    let auth_manager = Arc::new(AuthManager::new(
        Arc::new(PgUserRepository::new(pool.clone())),
        Arc::new(PgSessionAuditRepository::new(pool.clone())),
        Arc::new(cache),
        token_manager,
        Arc::new(bus),
    ));

    let habit_manager = Arc::new(HabitManager::new(
        Arc::new(PgHabitRepository::new(pool.clone())),
        Arc::new(PgConfirmationRepository::new(pool)),
    ));

    // Background deadline sweeper
    let sweeper_handle = if config.scheduler.enabled {
        let sweeper = DeadlineSweeper::new(
            habit_manager.as_ref().clone(),
            config.scheduler.check_interval,
        );
        Some(sweeper.start())
    } else {
        tracing::warn!("deadline sweeper disabled by configuration");
        None
    };

    // Rate limiter with idle-bucket evictor
    let rate_limiter = Arc::new(IpRateLimiter::new(config.rate_limit.requests_per_minute));
    IpRateLimiter::spawn_evictor(rate_limiter.clone());

    let state = api::AppState {
        auth_manager,
        habit_manager,
        rate_limiter,
    };
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", config.bind, e))?;

    tracing::info!("Server is running at http://{}. Press Ctrl+C to stop.", config.bind);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    if let Some(handle) = sweeper_handle {
        handle.stop().await;
    }
    tracing::info!("Shutting down server...");

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
}
