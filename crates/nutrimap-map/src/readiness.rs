//! Bounded wait for the hosting container to be laid out.

use crate::surface::{Container, ContainerSize};
use nutrimap_core::config::ReadinessConfig;
use nutrimap_core::MapError;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// How often and how long to check the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            max_attempts: 20,
        }
    }
}

impl From<&ReadinessConfig> for ReadinessPolicy {
    fn from(config: &ReadinessConfig) -> Self {
        Self {
            interval: config.interval(),
            max_attempts: config.max_attempts.max(1),
        }
    }
}

impl ReadinessPolicy {
    /// Longest time a wait can take.
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

/// Outcome of waiting for a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Present with a nonzero size
    Ready { size: ContainerSize, attempts: u32 },
    /// Present, but still zero-sized when the budget ran out
    Unsized { last: ContainerSize, attempts: u32 },
    /// Never present
    Missing { attempts: u32 },
    /// Disposal arrived first
    Cancelled,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready { .. })
    }

    /// The error describing an unsuccessful wait.
    pub fn error(&self) -> Option<MapError> {
        match *self {
            Readiness::Ready { .. } | Readiness::Cancelled => None,
            Readiness::Unsized { last, attempts } => Some(MapError::InitializationTimeout {
                attempts,
                width: last.width,
                height: last.height,
            }),
            Readiness::Missing { attempts } => Some(MapError::ContainerMissing { attempts }),
        }
    }
}

/// Checks the container up to `policy.max_attempts` times, `policy.interval`
/// apart, returning as soon as it reports a usable size.
///
/// The first check happens immediately. Cancellation is observed before
/// every check and during every sleep.
pub async fn wait_for_container(
    container: &dyn Container,
    policy: &ReadinessPolicy,
    cancel: &CancellationToken,
) -> Readiness {
    let mut last = None;

    for attempt in 1..=policy.max_attempts {
        if cancel.is_cancelled() {
            return Readiness::Cancelled;
        }

        match container.size() {
            Some(size) if size.is_usable() => {
                return Readiness::Ready {
                    size,
                    attempts: attempt,
                };
            }
            size => {
                trace!(attempt, size = ?size, "Container not ready");
                if size.is_some() {
                    last = size;
                }
            }
        }

        if attempt < policy.max_attempts {
            tokio::select! {
                _ = cancel.cancelled() => return Readiness::Cancelled,
                _ = tokio::time::sleep(policy.interval) => {}
            }
        }
    }

    match last {
        Some(last) => Readiness::Unsized {
            last,
            attempts: policy.max_attempts,
        },
        None => Readiness::Missing {
            attempts: policy.max_attempts,
        },
    }
}
