//! Repositories for database access.
//!
//! A repository borrows a connection (usually a transaction) for its lifetime, so callers
//! decide the transactional scope:
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! UsageSnapshots::new(&mut tx).insert_batch(&snapshots).await?;
//! tx.commit().await?;
//! ```

pub mod snapshots;

pub use snapshots::UsageSnapshots;
