//! Then-step assertions for session scenarios.

use podwire::error::{Phase, TransportError};
use rstest_bdd_macros::then;

use super::state::{Outcome, SessionState};
use super::steps::StepResult;

fn recorded_outcomes(state: &SessionState) -> StepResult<Vec<Outcome>> {
    state
        .outcomes
        .get()
        .ok_or_else(|| String::from("request outcomes should be recorded"))
}

fn first_error(state: &SessionState) -> StepResult<TransportError> {
    match recorded_outcomes(state)?.into_iter().next() {
        Some(Err(error)) => Ok(error),
        Some(Ok(body)) => Err(format!("expected the first request to fail, got body {body:?}")),
        None => Err(String::from("no request was sent")),
    }
}

#[then("every request succeeds")]
fn every_request_succeeds(session_state: &SessionState) -> StepResult<()> {
    for outcome in recorded_outcomes(session_state)? {
        match outcome {
            Ok(body) if body == "OK" => {}
            Ok(body) => return Err(format!("unexpected body {body:?}")),
            Err(error) => return Err(format!("expected success, got {error}")),
        }
    }
    Ok(())
}

#[then("the last request succeeds")]
fn last_request_succeeds(session_state: &SessionState) -> StepResult<()> {
    match recorded_outcomes(session_state)?.pop() {
        Some(Ok(_)) => Ok(()),
        Some(Err(error)) => Err(format!("expected the last request to succeed, got {error}")),
        None => Err(String::from("no request was sent")),
    }
}

#[then("the first request fails with a truncated response")]
fn first_fails_truncated(session_state: &SessionState) -> StepResult<()> {
    match first_error(session_state)? {
        TransportError::TruncatedResponse {
            phase: Phase::ReadHeaders,
            ..
        } => Ok(()),
        other => Err(format!("expected a truncated response, got {other}")),
    }
}

#[then("the first request fails with a timeout")]
fn first_fails_timeout(session_state: &SessionState) -> StepResult<()> {
    match first_error(session_state)? {
        TransportError::Timeout { .. } => Ok(()),
        other => Err(format!("expected a timeout, got {other}")),
    }
}

#[then("the first request fails with socket not found")]
fn first_fails_socket_not_found(session_state: &SessionState) -> StepResult<()> {
    match first_error(session_state)? {
        TransportError::SocketNotFound { .. } => Ok(()),
        other => Err(format!("expected socket not found, got {other}")),
    }
}

#[then("the first request fails because the session is closed")]
fn first_fails_session_closed(session_state: &SessionState) -> StepResult<()> {
    match first_error(session_state)? {
        TransportError::SessionClosed => Ok(()),
        other => Err(format!("expected a closed session, got {other}")),
    }
}

#[then("the connection count is {count}")]
fn connection_count_is(session_state: &SessionState, count: usize) -> StepResult<()> {
    let daemon = session_state
        .daemon
        .get()
        .ok_or_else(|| String::from("daemon should be running"))?;
    let accepted = daemon.accepted();
    if accepted == count {
        Ok(())
    } else {
        Err(format!("expected {count} connections, got {accepted}"))
    }
}
