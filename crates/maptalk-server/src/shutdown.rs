//! Relay shutdown in two phases.
//!
//! Phase one closes every client session. Each session finishes by handing
//! its `Disconnected` notice to the coordinator, so once all sessions are
//! gone the coordinator's queue holds the complete tail of events. Phase two
//! stops the coordinator, which processes that tail before it exits. Stores
//! are therefore empty and every peer notification has been dispatched when
//! the relay stops.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TrackedFuture;
use tracing::{info, warn};

/// Default time allowed for each shutdown phase.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Shutdown signal and session tracking for one relay.
#[derive(Clone, Debug, Default)]
pub struct RelayShutdown {
    sessions: CancellationToken,
    coordinator: CancellationToken,
    tracker: TaskTracker,
}

impl RelayShutdown {
    /// Fresh, un-signalled shutdown state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop accepting upgrades and close every session. Idempotent.
    pub fn signal(&self) {
        self.sessions.cancel();
        self.tracker.close();
    }

    /// Whether [`signal`](Self::signal) has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.sessions.is_cancelled()
    }

    /// Token observed by sessions and the HTTP accept loop.
    pub(crate) fn session_token(&self) -> CancellationToken {
        self.sessions.clone()
    }

    /// Token observed by the coordinator. Fires only after sessions drain.
    pub(crate) fn coordinator_token(&self) -> CancellationToken {
        self.coordinator.clone()
    }

    /// Wrap a session future so [`drain`](Self::drain) waits for it.
    pub(crate) fn track_session<F: Future>(&self, session: F) -> TrackedFuture<F> {
        self.tracker.track_future(session)
    }

    /// Sessions still running.
    pub fn active_sessions(&self) -> usize {
        self.tracker.len()
    }

    /// Signal shutdown and stop the relay in order: sessions first, then the
    /// coordinator, then `tasks` (the server and coordinator handles).
    ///
    /// Each phase waits at most `timeout`. Anything still running afterwards
    /// is left to be dropped with the runtime.
    pub async fn drain(&self, tasks: Vec<JoinHandle<()>>, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);

        self.signal();
        info!(sessions = self.tracker.len(), "closing client sessions");
        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            warn!(
                remaining = self.tracker.len(),
                ?timeout,
                "sessions did not close in time"
            );
        }

        self.coordinator.cancel();
        let stopped = futures::future::join_all(tasks);
        if tokio::time::timeout(timeout, stopped).await.is_err() {
            warn!(?timeout, "relay tasks did not stop in time");
        } else {
            info!("relay stopped");
        }
    }
}
