//! Daemon liveness and version endpoints.

use serde::Deserialize;

use super::{PodmanClient, success};
use crate::error::Result;
use crate::transport::Request;

/// Version details reported by the daemon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct VersionInfo {
    /// Daemon release, such as `5.0.0`.
    pub version: String,
    /// Docker-compatible API version.
    pub api_version: String,
    /// Oldest Docker-compatible API version accepted.
    #[serde(rename = "MinAPIVersion")]
    pub min_api_version: String,
    /// Go toolchain the daemon was built with.
    pub go_version: String,
    /// Host operating system.
    pub os: String,
    /// Host architecture.
    pub arch: String,
    /// Host kernel release.
    pub kernel_version: String,
}

/// Host and engine details from the libpod `info` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SystemInfo {
    /// The machine the daemon runs on.
    pub host: HostInfo,
    /// Engine release details.
    pub version: EngineVersion,
}

/// The host section of [`SystemInfo`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HostInfo {
    /// Host name, used to reach published ports.
    pub hostname: String,
    /// Host architecture.
    pub arch: String,
    /// Host operating system.
    pub os: String,
    /// Host kernel release.
    pub kernel: String,
    /// Number of CPUs.
    pub cpus: u64,
}

/// The version section of [`SystemInfo`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineVersion {
    /// libpod API version.
    #[serde(rename = "APIVersion")]
    pub api_version: String,
    /// Engine release.
    #[serde(rename = "Version")]
    pub version: String,
}

impl PodmanClient {
    /// Check that the daemon answers, returning its reply (normally `OK`).
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` for non-2xx replies, or the transport
    /// error when the daemon cannot be reached.
    pub async fn ping(&self) -> Result<String> {
        let response = self.session.execute(Request::get("/_ping")?).await?;
        let body = success(response)?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Fetch the daemon version.
    ///
    /// # Errors
    ///
    /// See [`Self::get_json`].
    pub async fn version(&self) -> Result<VersionInfo> {
        self.get_json("/version").await
    }

    /// Fetch host and engine details.
    ///
    /// # Errors
    ///
    /// See [`Self::get_json`].
    pub async fn info(&self) -> Result<SystemInfo> {
        self.get_json("/info").await
    }
}
