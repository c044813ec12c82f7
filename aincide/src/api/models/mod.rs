//! API request and response data models.
//!
//! These types define the public JSON contract of the proxy endpoints. Upstream shapes that are
//! passed through unchanged (bot status, service health) live next to their clients in
//! [`crate::upstream`] and are re-exported here.
//!
//! - [`usage`]: per-provider account usage served by `/api/proxy/usage`
//! - [`proxy`]: query parameters of the proxy endpoints
//! - [`history`]: usage history points

pub mod history;
pub mod proxy;
pub mod usage;

pub use crate::upstream::bot_server::{BotInfo, BotState, BotStatus, BotUsage};
pub use crate::upstream::services::{ServiceHealth, ServiceStatus};
pub use crate::usage::collector::CollectionSummary;
