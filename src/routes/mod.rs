use actix_web::{web, HttpResponse, Responder};

mod url;

use crate::types::{AppState, HealthStatus};

// Handler function for the health check endpoint
async fn health_check(data: web::Data<AppState>) -> impl Responder {
    // Calculate uptime in seconds
    let uptime = data.start_time.elapsed().as_secs();

    let db_health = match &data.db {
        Some(db) => Some(db.health_check().await),
        None => None,
    };

    let status = HealthStatus {
        status: String::from("OK"),
        version: data.version.clone(),
        worker: data.worker,
        db_health,
        uptime_seconds: uptime,
    };

    // Return the status as JSON
    HttpResponse::Ok().json(status)
}

// Configure all routes function
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check));
    url::configure_routes(cfg);
}
