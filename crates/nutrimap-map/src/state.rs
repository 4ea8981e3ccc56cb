//! Controller lifecycle state, status and metrics.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

/// Lifecycle state of a map controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerState {
    /// Not mounted yet
    Pending,
    /// Waiting for the container to be laid out
    Polling,
    /// Surface created in a sized container
    Ready,
    /// Surface created although the container never reported a size
    Degraded,
    /// No surface could be created
    Failed,
    /// Torn down; terminal
    Disposed,
}

impl ControllerState {
    /// A surface exists in this state.
    pub fn has_surface(self) -> bool {
        matches!(self, ControllerState::Ready | ControllerState::Degraded)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ControllerState::Disposed)
    }
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerState::Pending => write!(f, "Pending"),
            ControllerState::Polling => write!(f, "Polling"),
            ControllerState::Ready => write!(f, "Ready"),
            ControllerState::Degraded => write!(f, "Degraded"),
            ControllerState::Failed => write!(f, "Failed"),
            ControllerState::Disposed => write!(f, "Disposed"),
        }
    }
}

/// Counters describing what a controller has done
#[derive(Debug, Clone, Default)]
pub struct ControllerMetrics {
    readiness_checks: Arc<AtomicU32>,
    revalidations: Arc<AtomicU64>,
    rebuilds: Arc<AtomicU64>,
    navigations: Arc<AtomicU64>,
}

impl ControllerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_readiness_checks(&self, checks: u32) {
        self.readiness_checks.fetch_add(checks, Ordering::Relaxed);
    }

    pub fn record_revalidation(&self) {
        self.revalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rebuild(&self) {
        self.rebuilds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_navigation(&self) {
        self.navigations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn readiness_checks(&self) -> u32 {
        self.readiness_checks.load(Ordering::Relaxed)
    }

    /// Scheduled and resize-triggered size re-validations performed
    pub fn revalidations(&self) -> u64 {
        self.revalidations.load(Ordering::Relaxed)
    }

    pub fn rebuilds(&self) -> u64 {
        self.rebuilds.load(Ordering::Relaxed)
    }

    pub fn navigations(&self) -> u64 {
        self.navigations.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            readiness_checks: self.readiness_checks(),
            revalidations: self.revalidations(),
            rebuilds: self.rebuilds(),
            navigations: self.navigations(),
        }
    }
}

/// Snapshot of controller metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub readiness_checks: u32,
    pub revalidations: u64,
    pub rebuilds: u64,
    pub navigations: u64,
}

/// Combined controller state, last error and metrics
#[derive(Debug, Clone)]
pub struct ControllerStatus {
    state: Arc<parking_lot::RwLock<ControllerState>>,
    metrics: ControllerMetrics,
    error_message: Arc<parking_lot::RwLock<Option<String>>>,
    surface_created_at: Arc<parking_lot::RwLock<Option<SystemTime>>>,
}

impl Default for ControllerStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerStatus {
    pub fn new() -> Self {
        Self {
            state: Arc::new(parking_lot::RwLock::new(ControllerState::Pending)),
            metrics: ControllerMetrics::new(),
            error_message: Arc::new(parking_lot::RwLock::new(None)),
            surface_created_at: Arc::new(parking_lot::RwLock::new(None)),
        }
    }

    pub fn state(&self) -> ControllerState {
        *self.state.read()
    }

    /// Sets the state unless the controller is already disposed.
    ///
    /// Returns whether the state changed.
    pub fn set_state(&self, state: ControllerState) -> bool {
        let mut current = self.state.write();
        if current.is_terminal() || *current == state {
            return false;
        }
        *current = state;
        if state.has_surface() {
            *self.surface_created_at.write() = Some(SystemTime::now());
        }
        true
    }

    /// Records the error and moves to Failed.
    pub fn set_error(&self, error: String) {
        *self.error_message.write() = Some(error);
        self.set_state(ControllerState::Failed);
    }

    /// Records a non-fatal problem without changing the state.
    pub fn set_warning(&self, warning: String) {
        *self.error_message.write() = Some(warning);
    }

    pub fn error_message(&self) -> Option<String> {
        self.error_message.read().clone()
    }

    pub fn metrics(&self) -> &ControllerMetrics {
        &self.metrics
    }

    pub fn surface_created_at(&self) -> Option<SystemTime> {
        *self.surface_created_at.read()
    }

    pub fn is_disposed(&self) -> bool {
        self.state().is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ControllerState::Degraded.to_string(), "Degraded");
        assert_eq!(ControllerState::Disposed.to_string(), "Disposed");
    }

    #[test]
    fn test_disposed_is_terminal() {
        let status = ControllerStatus::new();
        assert_eq!(status.state(), ControllerState::Pending);

        assert!(status.set_state(ControllerState::Polling));
        assert!(status.set_state(ControllerState::Ready));
        assert!(status.surface_created_at().is_some());
        assert!(status.set_state(ControllerState::Disposed));

        assert!(!status.set_state(ControllerState::Ready));
        status.set_error("late".to_string());
        assert_eq!(status.state(), ControllerState::Disposed);
    }

    #[test]
    fn test_error_moves_to_failed() {
        let status = ControllerStatus::new();
        status.set_state(ControllerState::Polling);
        status.set_error("no container".to_string());

        assert_eq!(status.state(), ControllerState::Failed);
        assert_eq!(status.error_message(), Some("no container".to_string()));
        assert!(!status.state().has_surface());
    }

    #[test]
    fn test_metrics() {
        let metrics = ControllerMetrics::new();
        metrics.record_readiness_checks(4);
        metrics.record_revalidation();
        metrics.record_revalidation();
        metrics.record_rebuild();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.readiness_checks, 4);
        assert_eq!(snapshot.revalidations, 2);
        assert_eq!(snapshot.rebuilds, 1);
        assert_eq!(snapshot.navigations, 0);
    }
}
