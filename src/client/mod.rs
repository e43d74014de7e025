//! Typed client for the libpod REST API.
//!
//! [`PodmanClient`] sits on top of a [`Session`] and prefixes every path with
//! the versioned libpod base (`/v5.0.0/libpod` unless configured otherwise).
//! JSON goes through `serde_json`; any status outside 2xx becomes
//! [`ApiError::Status`], carrying the daemon's own error message when the
//! body has one.
//!
//! # Example
//!
//! ```ignore
//! use podwire::client::PodmanClient;
//! use podwire::config::AppConfig;
//!
//! # async fn demo() -> podwire::error::Result<()> {
//! let env = mockable::DefaultEnv::new();
//! let client = PodmanClient::from_config(&AppConfig::default(), &env)?;
//! for container in client.list_containers(true).await? {
//!     println!("{} {}", container.id, container.state);
//! }
//! # Ok(())
//! # }
//! ```

mod containers;
mod images;
mod pods;
mod system;


use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::config::AppConfig;
use crate::error::{ApiError, PodwireError, Result};
use crate::transport::{Request, Response, Session, SocketResolver, StreamingResponse};

pub use self::containers::{ContainerSummary, LogStream};
pub use self::images::{DEFAULT_REGISTRY, ImageReference, PullReport, PullStream};
pub use self::pods::{
    HostPort, InfraConfig, PlayKubeOptions, PlayKubePod, PlayKubeReport, PlayKubeVolume,
    PodInspect, PodReport,
};
pub use self::system::{EngineVersion, HostInfo, SystemInfo, VersionInfo};

/// libpod API version used when none is configured.
pub const DEFAULT_API_VERSION: &str = "v5.0.0";

/// Client for the daemon's libpod endpoints.
///
/// Clones share the underlying session.
#[derive(Debug, Clone)]
pub struct PodmanClient {
    session: Session,
    base: String,
}

impl PodmanClient {
    /// Wrap `session`, addressing the libpod API at `api_version`.
    #[must_use]
    pub fn new(session: Session, api_version: &str) -> Self {
        let version = api_version.trim_matches('/');
        Self {
            session,
            base: format!("/{version}/libpod"),
        }
    }

    /// Build a client from loaded configuration.
    ///
    /// The socket is resolved with [`SocketResolver`]; nothing is dialled
    /// until the first request.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when the resolved socket is not a
    /// Unix socket path.
    pub fn from_config<E: mockable::Env>(config: &AppConfig, env: &E) -> Result<Self> {
        let socket = SocketResolver::new(env).resolve(config.engine_socket.as_deref())?;
        let session = Session::unix(socket, config.transport.session_options());
        let version = config
            .api_version
            .as_deref()
            .unwrap_or(DEFAULT_API_VERSION);
        Ok(Self::new(session, version))
    }

    /// Returns the underlying session.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Returns the versioned path prefix, such as `/v5.0.0/libpod`.
    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.base
    }

    /// Close the session; later calls fail with `SessionClosed`.
    pub async fn close(&self) {
        self.session.close().await;
    }

    /// Send `request` unchanged and return the response whatever its status.
    ///
    /// # Errors
    ///
    /// Returns the transport error when the exchange fails.
    pub async fn send(&self, request: Request) -> Result<Response> {
        Ok(self.session.execute(request).await?)
    }

    /// `GET` a libpod path and decode the JSON body.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` for non-2xx replies, `ApiError::Decode`
    /// when the body is not the expected JSON, or the transport error.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = Request::get(self.url(path))?;
        let response = self.session.execute(request).await?;
        decode(&success(response)?)
    }

    /// `POST` `body` as JSON to a libpod path and decode the JSON reply.
    ///
    /// # Errors
    ///
    /// As [`Self::get_json`], plus `ApiError::Encode` when `body` cannot
    /// be serialised.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = json_request(Request::post(self.url(path))?, body)?;
        let response = self.session.execute(request).await?;
        decode(&success(response)?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Start a streaming exchange, turning error statuses into `ApiError`.
    async fn stream(&self, request: Request) -> Result<StreamingResponse> {
        let streaming = self.session.execute_streaming(request).await?;
        if streaming.status().is_success() {
            return Ok(streaming);
        }
        let status = streaming.status();
        let body = streaming.read_to_end().await?;
        Err(status_error(status, &body).into())
    }
}

/// Attach `body` as JSON with the matching content type.
fn json_request<B: Serialize + ?Sized>(request: Request, body: &B) -> Result<Request> {
    let encoded = serde_json::to_vec(body).map_err(|e| ApiError::Encode {
        message: e.to_string(),
    })?;
    Ok(request
        .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .with_body(encoded))
}

/// Percent-encode one path segment, refusing empty identifiers.
fn segment(value: &str) -> Result<String> {
    if value.is_empty() {
        return Err(ApiError::Encode {
            message: String::from("resource identifier must not be empty"),
        }
        .into());
    }
    Ok(urlencoding::encode(value).into_owned())
}

/// Returns the body of a 2xx response.
fn success(response: Response) -> std::result::Result<Bytes, ApiError> {
    if response.status().is_success() {
        Ok(response.into_body())
    } else {
        Err(status_error(response.status(), response.body()))
    }
}

/// Accept 2xx and `304 Not Modified` for state-changing calls.
fn completed(response: &Response) -> std::result::Result<(), ApiError> {
    let status = response.status();
    if status.is_success() || status == StatusCode::NOT_MODIFIED {
        Ok(())
    } else {
        Err(status_error(status, response.body()))
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| {
        PodwireError::from(ApiError::Decode {
            message: e.to_string(),
        })
    })
}

/// The error document libpod returns with failing statuses.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    message: String,
    cause: String,
}

/// Build `ApiError::Status`, preferring the daemon's `message` then `cause`.
fn status_error(status: StatusCode, body: &[u8]) -> ApiError {
    ApiError::Status {
        status: status.as_u16(),
        message: error_message(status, body),
    }
}

fn error_message(status: StatusCode, body: &[u8]) -> String {
    if let Ok(parsed) = serde_json::from_slice::<ErrorBody>(body)
        && let Some(text) = [parsed.message, parsed.cause]
            .into_iter()
            .find(|text| !text.is_empty())
    {
        return text;
    }
    let raw = String::from_utf8_lossy(body);
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        String::from(status.canonical_reason().unwrap_or("unknown error"))
    } else {
        String::from(trimmed)
    }
}
