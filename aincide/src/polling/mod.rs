//! Client side of the status API: pollers that refresh each dashboard panel on an interval.
//!
//! Each panel is a [`poller::Poller`] fetching through a [`source::SourceChain`]: the server's
//! proxy endpoint first, then the upstream directly (see [`direct`]). The chain tells "nothing
//! is configured" apart from "everything failed", and the poller turns that into the
//! loading / unavailable / not-configured states a dashboard renders.

pub mod dashboard;
pub mod direct;
pub mod monitor;
pub mod poller;
pub mod source;

pub use dashboard::Dashboard;
pub use poller::{FallbackPolicy, PollError, PollState, PollStatus, Poller};
pub use source::{ChainError, DataSource, HttpSource, SourceChain, SourceError, SourceFailure};
