//! Scenario state for session behavioural tests.

use std::sync::Arc;

use camino::Utf8PathBuf;
use podwire::error::TransportError;
use podwire::transport::{Session, SessionOptions};
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;
use tokio::runtime::Runtime;

use crate::unix_daemon::UnixDaemon;

/// Result of one request: the response body or the transport error.
pub(crate) type Outcome = Result<String, TransportError>;

#[derive(Default, ScenarioState)]
pub(crate) struct SessionState {
    /// Runtime owning the daemon and every connection the session opens.
    pub(crate) runtime: Slot<Arc<Runtime>>,
    pub(crate) daemon: Slot<Arc<UnixDaemon>>,
    pub(crate) socket: Slot<Utf8PathBuf>,
    pub(crate) options: Slot<SessionOptions>,
    pub(crate) session: Slot<Session>,
    pub(crate) outcomes: Slot<Vec<Outcome>>,
}

#[fixture]
pub(crate) fn session_state() -> SessionState {
    let state = SessionState::default();
    state.options.set(SessionOptions::default());
    state
}
