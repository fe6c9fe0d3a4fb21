//! Listener supervision: bind with exponential backoff and report failures.
//!
//! A listener that cannot bind (port in use, missing permission, interface
//! not up yet) publishes `TCP listen error: ...` / `UDP listen error: ...`
//! on every failed attempt and retries after a growing delay.  After
//! `max_attempts` failures the supervisor gives up and publishes a final
//! status without the "(retrying)" suffix.

use std::future::Future;
use std::time::Duration;

use lanchat_core::{ListenerKind, TransferStatus};
use tokio::time;
use tracing::{error, info, warn};

use crate::application::event_bus::EventBus;
use crate::infrastructure::storage::config::SupervisorConfig;

/// Retry policy for one listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Attempts before giving up; `0` means retry forever.
    pub max_attempts: u32,
}

impl Default for SupervisorPolicy {
    fn default() -> Self {
        Self::from(&SupervisorConfig::default())
    }
}

impl From<&SupervisorConfig> for SupervisorPolicy {
    fn from(cfg: &SupervisorConfig) -> Self {
        Self {
            initial_backoff: Duration::from_millis(cfg.initial_backoff_ms),
            max_backoff: Duration::from_millis(cfg.max_backoff_ms),
            max_attempts: cfg.max_attempts,
        }
    }
}

impl SupervisorPolicy {
    /// Delay after failed attempt number `attempt` (1-based): the initial
    /// backoff doubled per previous failure, capped at `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }

    fn gives_up_after(&self, attempt: u32) -> bool {
        self.max_attempts != 0 && attempt >= self.max_attempts
    }
}

/// Calls `bind` until it succeeds or the policy gives up.
///
/// Returns `None` when the policy gave up; every failure has then already
/// been published on `events`.
pub async fn bind_with_retry<T, F, Fut>(
    kind: ListenerKind,
    policy: SupervisorPolicy,
    events: &EventBus,
    mut bind: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match bind().await {
            Ok(listener) => {
                if attempt > 1 {
                    info!("{kind} listener bound after {attempt} attempts");
                }
                return Some(listener);
            }
            Err(e) => {
                let will_retry = !policy.gives_up_after(attempt);
                events.publish(TransferStatus::ListenerFailed {
                    listener: kind,
                    reason: e.to_string(),
                    will_retry,
                });
                if !will_retry {
                    error!("{kind} listener giving up after {attempt} attempts: {e}");
                    return None;
                }
                let delay = policy.backoff(attempt);
                warn!("{kind} listener bind failed: {e}; retrying in {delay:?}");
                time::sleep(delay).await;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
