//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures
//!
//! # API Structure
//!
//! - **Proxy** (`/api/proxy/*`): usage, bot status, bot usage, auth-file download, service
//!   health and usage history
//! - **Cron** (`/api/cron/collect-usage`): usage snapshot collection
//!
//! All endpoints are documented with `utoipa`; the document is served at `/api/docs`.

pub mod handlers;
pub mod models;
