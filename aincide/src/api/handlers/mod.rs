//! HTTP request handlers.
//!
//! - [`proxy`]: usage, bot status, bot usage, auth-file download and service health proxies
//! - [`history`]: usage history queries over recorded snapshots
//! - [`cron`]: the externally triggered usage collector
//!
//! Handlers return [`crate::errors::Error`], which converts to a status code and a JSON
//! `{"error": ...}` body.

pub mod cron;
pub mod history;
pub mod proxy;

use axum::{
    http::{HeaderValue, header},
    response::Response,
};

/// Mark a response as uncacheable. Applied to every proxy and cron route, error responses included.
pub async fn no_store(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
