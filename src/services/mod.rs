use actix_web::{error::InternalError, web, HttpResponse, ResponseError};

mod click_accumulator;
mod url_service;

pub use click_accumulator::ClickAccumulator;
pub use url_service::{ShortenerOptions, UrlService, UrlServiceTrait};

use crate::errors::AppError;

/// Service Register
pub fn register(service: web::Data<UrlService>, cfg: &mut web::ServiceConfig) {
    // Malformed or oversized JSON bodies are client errors with the same body
    // shape as every other error.
    let json_config = web::JsonConfig::default()
        .limit(16 * 1024)
        .error_handler(|err, _req| {
            let app_error = AppError::Validation(err.to_string());
            let response: HttpResponse = app_error.error_response();
            InternalError::from_response(err, response).into()
        });

    cfg.app_data(service).app_data(json_config);
}
