//! A periodically refreshed value with loading, unavailable and not-configured states.

use super::source::{ChainError, SourceChain};
use chrono::{DateTime, Utc};
use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// What a poller does when every source fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Publish `T::default()` as if it had been fetched
    Default,
    /// Keep the last value and publish a [`PollError`]
    Distinguish,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PollError {
    #[error("not configured")]
    NotConfigured,

    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl From<ChainError> for PollError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::NotConfigured => PollError::NotConfigured,
            exhausted @ ChainError::Exhausted(_) => PollError::Unavailable(exhausted.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    Loading,
    Ready,
    Unavailable,
    NotConfigured,
}

/// Published state of one poller.
#[derive(Debug, Clone, PartialEq)]
pub struct PollState<T> {
    pub data: Option<T>,
    pub error: Option<PollError>,
    pub is_loading: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T> Default for PollState<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            is_loading: true,
            updated_at: None,
        }
    }
}

impl<T> PollState<T> {
    pub fn status(&self) -> PollStatus {
        match (&self.error, &self.data) {
            (Some(PollError::NotConfigured), _) => PollStatus::NotConfigured,
            (Some(PollError::Unavailable(_)), _) => PollStatus::Unavailable,
            (None, Some(_)) => PollStatus::Ready,
            (None, None) => PollStatus::Loading,
        }
    }
}

/// Token of the refresh currently allowed to publish.
struct InFlight {
    generation: u64,
    token: CancellationToken,
}

/// Refreshes a value through a [`SourceChain`] and publishes it on a watch channel.
///
/// Every refresh takes a new generation and cancels the request of the previous one. A result
/// is only published while its generation is still current, so a slow older response never
/// overwrites a newer one.
pub struct Poller<T> {
    key: String,
    chain: SourceChain<T>,
    interval: Duration,
    policy: FallbackPolicy,
    state: watch::Sender<PollState<T>>,
    in_flight: Mutex<InFlight>,
}

impl<T> Poller<T>
where
    T: Default + Clone + Send + Sync + 'static,
{
    pub fn new(key: impl Into<String>, chain: SourceChain<T>, interval: Duration, policy: FallbackPolicy) -> Self {
        let (state, _) = watch::channel(PollState::default());
        Self {
            key: key.into(),
            chain,
            interval,
            policy,
            state,
            in_flight: Mutex::new(InFlight {
                generation: 0,
                token: CancellationToken::new(),
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn policy(&self) -> FallbackPolicy {
        self.policy
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState<T>> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PollState<T> {
        self.state.borrow().clone()
    }

    /// Fetch once and publish the outcome, unless a newer refresh started meanwhile.
    #[instrument(skip_all, fields(key = %self.key))]
    pub async fn refresh(&self) {
        let (generation, token) = self.begin();

        let result = tokio::select! {
            _ = token.cancelled() => {
                debug!(generation, "Refresh superseded before completion");
                return;
            }
            result = self.chain.fetch() => result,
        };

        self.complete(generation, result);
    }

    /// Poll immediately, then every `interval`, until `shutdown` fires.
    ///
    /// Refreshes run as their own tasks so a slow source cannot delay the next tick; the next
    /// tick supersedes it instead.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(key = %self.key, "Stopping poller");
                    self.cancel_in_flight();
                    break;
                }
                _ = ticker.tick() => {
                    let poller = self.clone();
                    tokio::spawn(async move { poller.refresh().await });
                }
            }
        }
    }

    fn begin(&self) -> (u64, CancellationToken) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.token.cancel();
        in_flight.generation += 1;
        in_flight.token = CancellationToken::new();
        // Published under the lock so that it cannot land after a newer generation completes.
        self.state.send_modify(|state| state.is_loading = true);
        (in_flight.generation, in_flight.token.clone())
    }

    fn cancel_in_flight(&self) {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).token.cancel();
    }

    /// Publish `result` if `generation` is still current. Returns whether it was published.
    fn complete(&self, generation: u64, result: Result<T, ChainError>) -> bool {
        // Held while publishing so that a refresh starting now orders after this one.
        let in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if in_flight.generation != generation {
            debug!(key = %self.key, generation, current = in_flight.generation, "Discarding stale result");
            return false;
        }

        let now = Utc::now();
        let previous = self.state.borrow().status();
        self.state.send_modify(|state| {
            state.is_loading = false;
            match result {
                Ok(data) => {
                    state.data = Some(data);
                    state.error = None;
                    state.updated_at = Some(now);
                }
                Err(err) => match self.policy {
                    FallbackPolicy::Default => {
                        debug!(key = %self.key, error = %err, "All sources failed, publishing default");
                        state.data = Some(T::default());
                        state.error = None;
                        state.updated_at = Some(now);
                    }
                    FallbackPolicy::Distinguish => {
                        let err = PollError::from(err);
                        if previous != PollStatus::Unavailable && matches!(err, PollError::Unavailable(_)) {
                            warn!(key = %self.key, error = %err, "Poll failed");
                        }
                        state.error = Some(err);
                    }
                },
            }
        });
        drop(in_flight);
        true
    }
}
