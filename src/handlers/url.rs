use actix_web::{http::header::LOCATION, web, HttpResponse, Responder};
use log::{debug, info};

use crate::{
    models::ShortenRequestDto,
    services::{UrlService, UrlServiceTrait},
    types::Result,
};

/// Shorten URL route handler
pub async fn shorten_handler(
    dto: web::Json<ShortenRequestDto>,
    service: web::Data<UrlService>,
) -> Result<impl Responder> {
    let shortened = service.shorten(dto.into_inner()).await?;
    info!(
        "Shortened '{}' to '{}'",
        shortened.original_url, shortened.short_code
    );
    Ok(HttpResponse::Created().json(shortened))
}

/// Redirect route handler
pub async fn redirect_handler(
    path: web::Path<String>,
    service: web::Data<UrlService>,
) -> Result<impl Responder> {
    let short_code = path.into_inner();
    debug!("Redirect requested for code: {}", short_code);

    // Fails with 404 for unknown codes, the click is counted in the background
    let original_url = service.redirect(&short_code).await?;

    debug!("Redirecting '{}' to '{}'", short_code, original_url);

    Ok(HttpResponse::Found()
        .insert_header((LOCATION, original_url))
        .finish())
}

/// Stats route handler
pub async fn stats_handler(
    path: web::Path<String>,
    service: web::Data<UrlService>,
) -> Result<impl Responder> {
    let stats = service.stats(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(stats))
}
