use actix_web::web;

use crate::handlers::{redirect_handler, shorten_handler, stats_handler};

// Configure all routes function
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/shorten", web::post().to(shorten_handler))
            .route("/stats/{short_code}", web::get().to(stats_handler)),
    );
    // Catch-all for codes, must stay after every fixed path
    cfg.route("/{short_code}", web::get().to(redirect_handler));
}
