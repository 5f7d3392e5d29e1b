use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_web::{middleware::Logger, web, App, HttpServer};
use env_logger::Env;
use log::{debug, info, warn};

use crate::{
    config::{Config, Environment, StoreBackend},
    db::Database,
    errors::AppError,
    listener::bind_listener,
    middleware::RequestLogger,
    repositories::{InMemoryUrlRecordRepository, UrlRecordRepository, UrlRecordRepositoryTrait},
    routes, services,
    services::UrlService,
    supervisor::Role,
    types::AppState,
};

// Custom result type for the application
pub type AppResult<T> = Result<T, AppError>;

/// Upper bound on waiting for background click increments at shutdown
const CLICK_SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Seconds actix waits for open connections once a worker is told to stop
const HTTP_SHUTDOWN_TIMEOUT_SECS: u64 = 5;

// Setup logging with custom format and configuration
pub fn setup_logging(config: &Config, role: Role) -> AppResult<()> {
    // Configure log level based on environment and config
    let log_level = match config.app.environment {
        Environment::Development => config.app.log_level.clone(),
        Environment::Testing => "debug,actix_web=info,sqlx=warn".to_string(),
        Environment::Production => "info,actix_web=warn,sqlx=warn".to_string(),
    };

    let env = Env::default()
        .filter_or("RUST_LOG", log_level)
        .write_style_or("RUST_LOG_STYLE", "auto");

    // Every line carries the process role so interleaved worker output stays readable
    env_logger::Builder::from_env(env)
        .format(move |buf, record| {
            writeln!(
                buf,
                "[{} {} {:<5} {}] {}",
                buf.timestamp(),
                role,
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init()
        .map_err(|e| AppError::Logger(format!("Failed to initialize logger: {}", e)))
}

/// Runs one HTTP-serving process (a worker, or the whole service in standalone
/// mode) until it is told to stop.
pub async fn server(config: Config, role: Role) -> AppResult<()> {
    // Capture start time for uptime calculation
    let start_time = Instant::now();

    // Log startup information
    info!("Starting {} v{}", config.app.name, config.app.version);
    info!("Environment: {:?}", config.app.environment);
    info!(
        "Binding to {}:{} with {} threads",
        config.server.host, config.server.port, config.server.threads
    );

    if config.app.environment == Environment::Development {
        debug!("Debug logging enabled");
        debug!("Full configuration: {:?}", config);
    }

    let (repository, db): (Arc<dyn UrlRecordRepositoryTrait>, Option<Database>) =
        match config.app.store_backend {
            StoreBackend::Postgres => {
                let db = Database::connect(&config.db).await?;
                (Arc::new(UrlRecordRepository::new(&db)), Some(db))
            }
            StoreBackend::Memory => {
                warn!("Using the in-memory store, records are lost on exit");
                (Arc::new(InMemoryUrlRecordRepository::new()), None)
            }
        };

    // One cache, generator and click accumulator per process, shared by its threads
    let service = web::Data::new(UrlService::from_config(repository, &config));
    let state = web::Data::new(AppState {
        start_time,
        version: config.app.version.clone(),
        worker: role.worker_id(),
        db: db.clone(),
    });

    // Determine if we should enable more verbose logging
    let enable_debug_logging = config.app.environment != Environment::Production;

    // Determine log format based on environment
    let log_format = if enable_debug_logging {
        "%a \"%r\" %s %b %T \"%{Referer}i\" \"%{User-Agent}i\" %{X-Request-ID}i"
    } else {
        "%a \"%r\" %s %b %T %{X-Request-ID}i"
    };

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let listener = bind_listener(addr, matches!(role, Role::Worker(_)))?;

    let app_service = service.clone();
    HttpServer::new(move || {
        let service = app_service.clone();
        App::new()
            .app_data(state.clone())
            .configure(|cfg| services::register(service, cfg))
            .wrap(Logger::new(log_format))
            // Outermost, so the access log above already sees the request id
            .wrap(RequestLogger::new(enable_debug_logging))
            .configure(routes::configure_routes)
    })
    .workers(config.server.threads)
    .shutdown_timeout(HTTP_SHUTDOWN_TIMEOUT_SECS)
    .listen(listener)?
    .run()
    .await?;

    info!("HTTP server stopped, settling pending clicks");
    if !service.clicks().settle(CLICK_SETTLE_TIMEOUT).await {
        warn!("Exiting with {} click increments unfinished", service.clicks().in_flight());
    }

    if let Some(db) = db {
        db.shutdown().await;
    }

    Ok(())
}
