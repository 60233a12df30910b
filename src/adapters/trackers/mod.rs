//! Outbound tracker clients.
//!
//! One sub-module per provider, each wrapping the provider's REST API
//! behind the [`RemoteTracker`] port with a shared token-bucket rate
//! limiter.

pub mod asana;
pub mod trello;

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ExternalBinding, TrackerKind};
use crate::domain::ports::RemoteTracker;

pub use asana::AsanaTracker;
pub use trello::TrelloTracker;

/// Token-bucket rate limiter.
///
/// Allows up to `capacity` requests per `window`. When the bucket is
/// exhausted, [`acquire`](RateLimiter::acquire) sleeps until a token
/// becomes available.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: u32,
    tokens: u32,
    window: Duration,
    window_start: Instant,
}

impl RateLimiter {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity,
            tokens: capacity,
            window,
            window_start: Instant::now(),
        }
    }

    /// Acquire a single token, sleeping until the window resets if the
    /// bucket is empty.
    pub async fn acquire(&mut self) {
        let elapsed = self.window_start.elapsed();
        if elapsed >= self.window {
            self.tokens = self.capacity;
            self.window_start = Instant::now();
        }

        if self.tokens > 0 {
            self.tokens -= 1;
        } else {
            let remaining = self.window.saturating_sub(elapsed);
            tracing::warn!(
                sleep_ms = remaining.as_millis() as u64,
                "Tracker rate limit reached, sleeping"
            );
            tokio::time::sleep(remaining).await;
            self.tokens = self.capacity.saturating_sub(1);
            self.window_start = Instant::now();
        }
    }
}

/// Build a tracker for a configured binding.
pub fn create_tracker(binding: &ExternalBinding) -> DomainResult<Arc<dyn RemoteTracker>> {
    if binding.api_token.trim().is_empty() {
        return Err(DomainError::ExternalSystem {
            binding: binding.name.clone(),
            reason: "binding has no api token".to_string(),
        });
    }

    Ok(match binding.kind {
        TrackerKind::Trello => Arc::new(TrelloTracker::new(binding.clone())),
        TrackerKind::Asana => Arc::new(AsanaTracker::new(binding.clone())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = RateLimiter::new(100, Duration::from_secs(60));
        assert_eq!(limiter.capacity, 100);
        assert_eq!(limiter.tokens, 100);
    }

    #[tokio::test]
    async fn test_rate_limiter_acquire_decrements_tokens() {
        let mut limiter = RateLimiter::new(5, Duration::from_secs(60));
        limiter.acquire().await;
        assert_eq!(limiter.tokens, 4);
        limiter.acquire().await;
        assert_eq!(limiter.tokens, 3);
    }

    #[test]
    fn test_factory_rejects_missing_token() {
        let binding = ExternalBinding::new("trello", TrackerKind::Trello, "", "board-1");
        assert!(create_tracker(&binding).is_err());
    }

    #[test]
    fn test_factory_builds_each_kind() {
        let trello = ExternalBinding::new("trello", TrackerKind::Trello, "k:t", "board-1");
        assert_eq!(create_tracker(&trello).unwrap().provider(), "trello");

        let asana = ExternalBinding::new("asana", TrackerKind::Asana, "token", "project-1");
        assert_eq!(create_tracker(&asana).unwrap().provider(), "asana");
    }
}
