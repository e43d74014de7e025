//! Step definitions and state for socket resolution scenarios.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use mockable::MockEnv;
use podwire::error::ConfigError;
use podwire::transport::SocketResolver;
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::{ScenarioState, given, then, when};

/// Step result type for BDD tests, using a static string for errors.
pub type StepResult<T> = Result<T, &'static str>;

/// Thread-safe environment variable storage for BDD tests.
type EnvVars = Arc<Mutex<HashMap<String, String>>>;

/// State shared across socket resolution scenarios.
#[derive(Default, ScenarioState)]
pub struct ResolutionState {
    /// The environment variables to mock.
    env_vars: Slot<EnvVars>,
    /// The socket from configuration (CLI, file or `PODWIRE_ENGINE_SOCKET`).
    config_socket: Slot<Option<String>>,
    /// The resolved socket path.
    resolved_socket: Slot<String>,
    /// The field named by a rejected endpoint.
    rejected_field: Slot<String>,
}

/// Fixture providing a fresh resolution state.
#[fixture]
pub fn resolution_state() -> ResolutionState {
    let state = ResolutionState::default();
    state.env_vars.set(Arc::new(Mutex::new(HashMap::new())));
    state
}

fn set_env_var(state: &ResolutionState, key: &str, value: &str) -> StepResult<()> {
    let env_vars = state
        .env_vars
        .get()
        .ok_or("env_vars should be initialised")?;
    let mut vars = env_vars.lock().map_err(|_| "mutex poisoned")?;
    vars.insert(String::from(key), String::from(value));
    Ok(())
}

/// Creates a `MockEnv` answering from a snapshot of the scenario variables.
///
/// Every "Given" step has run by the time the "When" step takes the snapshot.
fn create_mock_env(state: &ResolutionState) -> StepResult<MockEnv> {
    let env_vars = state
        .env_vars
        .get()
        .ok_or("env_vars should be initialised")?;
    let vars = env_vars.lock().map_err(|_| "mutex poisoned")?.clone();

    let mut mock = MockEnv::new();
    mock.expect_string()
        .returning(move |key| vars.get(key).cloned());
    Ok(mock)
}

// Given step definitions

#[given("no engine socket is configured")]
fn no_engine_socket_configured(resolution_state: &ResolutionState) {
    resolution_state.config_socket.set(None);
}

#[given("engine socket is configured as {socket}")]
fn engine_socket_configured_as(resolution_state: &ResolutionState, socket: String) {
    resolution_state.config_socket.set(Some(socket));
}

#[given("{name} is set to {value}")]
fn env_var_is_set_to(
    resolution_state: &ResolutionState,
    name: String,
    value: String,
) -> StepResult<()> {
    set_env_var(resolution_state, &name, &value)
}

#[given("{name} is empty")]
fn env_var_is_empty(resolution_state: &ResolutionState, name: String) -> StepResult<()> {
    set_env_var(resolution_state, &name, "")
}

// When step definitions

#[when("the socket is resolved")]
fn the_socket_is_resolved(resolution_state: &ResolutionState) -> StepResult<()> {
    let env = create_mock_env(resolution_state)?;
    let resolver = SocketResolver::new(&env);
    let config_socket = resolution_state.config_socket.get().flatten();
    match resolver.resolve(config_socket.as_deref()) {
        Ok(path) => resolution_state.resolved_socket.set(path.into_string()),
        Err(ConfigError::InvalidValue { field, .. }) => {
            resolution_state.rejected_field.set(field);
        }
        Err(_) => return Err("unexpected resolution error"),
    }
    Ok(())
}

// Then step definitions

#[then("the resolved socket is {expected}")]
fn the_resolved_socket_is(
    resolution_state: &ResolutionState,
    expected: String,
) -> StepResult<()> {
    let resolved = resolution_state
        .resolved_socket
        .get()
        .ok_or("resolved socket should be set")?;
    assert_eq!(
        resolved, expected,
        "Expected resolved socket to be '{expected}', but got '{resolved}'"
    );
    Ok(())
}

#[then("resolution fails naming {field}")]
fn resolution_fails_naming(resolution_state: &ResolutionState, field: String) -> StepResult<()> {
    let rejected = resolution_state
        .rejected_field
        .get()
        .ok_or("resolution should have failed")?;
    assert_eq!(rejected, field);
    Ok(())
}
