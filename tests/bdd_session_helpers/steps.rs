//! Given/When steps for session scenarios.

use std::sync::Arc;
use std::time::Duration;

use podwire::transport::{Request, Session, SessionOptions};
use rstest_bdd_macros::{given, when};
use tokio::runtime::Runtime;

use super::state::{Outcome, SessionState};
use crate::unix_daemon::{Action, Seen, UnixDaemon, text};

pub type StepResult<T> = Result<T, String>;

fn runtime(state: &SessionState) -> StepResult<Arc<Runtime>> {
    if let Some(existing) = state.runtime.get() {
        return Ok(existing);
    }
    let created = Arc::new(Runtime::new().map_err(|e| format!("failed to build runtime: {e}"))?);
    state.runtime.set(Arc::clone(&created));
    Ok(created)
}

/// Start a daemon on the scenario runtime and point the session at it.
fn start_daemon(
    state: &SessionState,
    handler: impl Fn(&Seen) -> Action + Send + Sync + 'static,
) -> StepResult<Arc<UnixDaemon>> {
    let rt = runtime(state)?;
    let _entered = rt.enter();
    let daemon =
        Arc::new(UnixDaemon::start(handler).map_err(|e| format!("failed to bind daemon: {e}"))?);
    state.socket.set(daemon.path().to_owned());
    state.daemon.set(Arc::clone(&daemon));
    Ok(daemon)
}

fn ok_reply() -> Action {
    Action::Respond(text("200 OK", "OK"))
}

fn session(state: &SessionState) -> StepResult<Session> {
    state
        .session
        .get()
        .ok_or_else(|| String::from("session should be created"))
}

#[given("a daemon that answers every request")]
fn daemon_answers_every_request(session_state: &SessionState) -> StepResult<()> {
    start_daemon(session_state, |_| ok_reply())?;
    Ok(())
}

#[given("a daemon that hangs up on its first connection")]
fn daemon_hangs_up_first(session_state: &SessionState) -> StepResult<()> {
    start_daemon(session_state, |seen| {
        if seen.connection == 0 {
            Action::Hangup
        } else {
            ok_reply()
        }
    })?;
    Ok(())
}

#[given("a daemon that never answers its first connection")]
fn daemon_silent_first(session_state: &SessionState) -> StepResult<()> {
    start_daemon(session_state, |seen| {
        if seen.connection == 0 {
            Action::Silence
        } else {
            ok_reply()
        }
    })?;
    Ok(())
}

#[given("no daemon is listening")]
fn no_daemon_listening(session_state: &SessionState) -> StepResult<()> {
    let daemon = start_daemon(session_state, |_| Action::Hangup)?;
    session_state.socket.set(daemon.missing_socket());
    Ok(())
}

#[given("a session for the daemon socket")]
fn session_for_daemon_socket(session_state: &SessionState) -> StepResult<()> {
    let socket = session_state
        .socket
        .get()
        .ok_or_else(|| String::from("daemon socket should be known"))?;
    let options = session_state.options.get().unwrap_or_default();
    session_state.session.set(Session::unix(socket, options));
    Ok(())
}

#[given("a session with a {millis} millisecond request timeout")]
fn session_with_request_timeout(session_state: &SessionState, millis: u64) -> StepResult<()> {
    session_state.options.set(SessionOptions {
        request_timeout: Duration::from_millis(millis),
        ..SessionOptions::default()
    });
    session_for_daemon_socket(session_state)
}

#[given("the session is closed")]
fn session_is_closed(session_state: &SessionState) -> StepResult<()> {
    let rt = runtime(session_state)?;
    let current = session(session_state)?;
    rt.block_on(current.close());
    Ok(())
}

fn send_requests(state: &SessionState, count: usize) -> StepResult<()> {
    let rt = runtime(state)?;
    let current = session(state)?;
    let outcomes: Vec<Outcome> = rt.block_on(async {
        let mut outcomes = Vec::with_capacity(count);
        for _ in 0..count {
            let outcome = match Request::get("/_ping") {
                Ok(request) => current.execute(request).await.map(|reply| reply.text()),
                Err(error) => Err(error),
            };
            outcomes.push(outcome);
        }
        outcomes
    });
    state.outcomes.set(outcomes);
    Ok(())
}

#[when("{count} requests are sent")]
fn requests_are_sent(session_state: &SessionState, count: usize) -> StepResult<()> {
    send_requests(session_state, count)
}

#[when("a request is sent")]
fn a_request_is_sent(session_state: &SessionState) -> StepResult<()> {
    send_requests(session_state, 1)
}
