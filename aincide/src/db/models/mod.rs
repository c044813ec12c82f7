//! Database record models matching table schemas.
//!
//! Each model has a raw row type deriving `sqlx::FromRow` plus a domain type with parsed
//! enums and timestamps. Conversions live next to the types.
//!
//! - [`snapshots`]: usage snapshots recorded by the collector

pub mod snapshots;
