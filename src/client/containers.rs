//! Container endpoints.

use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;
use serde::Deserialize;

use super::{PodmanClient, completed, segment};
use crate::error::{Result, TransportError};
use crate::transport::{Deadline, Request, StreamingResponse};

/// One entry of a container listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    /// Full container ID.
    pub id: String,
    /// Container names.
    #[serde(default)]
    pub names: Vec<String>,
    /// Image the container was created from.
    #[serde(default)]
    pub image: String,
    /// Lifecycle state, such as `running` or `exited`.
    #[serde(default)]
    pub state: String,
    /// Human-readable status line.
    #[serde(default)]
    pub status: String,
}

impl PodmanClient {
    /// List containers; stopped ones are included when `all` is set.
    ///
    /// # Errors
    ///
    /// See [`Self::get_json`].
    pub async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>> {
        self.get_json(&format!("/containers/json?all={all}")).await
    }

    /// Fetch the full inspect document for a container.
    ///
    /// # Errors
    ///
    /// See [`Self::get_json`]; an empty `id` is an `ApiError::Encode`.
    pub async fn inspect_container(&self, id: &str) -> Result<serde_json::Value> {
        self.get_json(&format!("/containers/{}/json", segment(id)?))
            .await
    }

    /// Start a container. Starting a running container succeeds.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` when the daemon refuses, or the transport
    /// error.
    pub async fn start_container(&self, id: &str) -> Result<()> {
        let path = self.url(&format!("/containers/{}/start", segment(id)?));
        let response = self.session.execute(Request::post(path)?).await?;
        Ok(completed(&response)?)
    }

    /// Stop a container, letting the daemon wait up to `timeout` seconds
    /// before it kills the process.
    ///
    /// The request deadline is widened by the same amount.
    ///
    /// # Errors
    ///
    /// See [`Self::start_container`].
    pub async fn stop_container(&self, id: &str, timeout: Option<u32>) -> Result<()> {
        let mut path = self.url(&format!("/containers/{}/stop", segment(id)?));
        let mut allowance = self.session.options().request_timeout;
        if let Some(seconds) = timeout {
            path.push_str(&format!("?timeout={seconds}"));
            allowance = allowance.saturating_add(Duration::from_secs(u64::from(seconds)));
        }
        let response = self
            .session
            .execute_with_deadline(Request::post(path)?, Deadline::after(allowance))
            .await?;
        Ok(completed(&response)?)
    }

    /// Remove a container; `force` stops it first if it is running.
    ///
    /// # Errors
    ///
    /// See [`Self::start_container`].
    pub async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        let path = self.url(&format!("/containers/{}?force={force}", segment(id)?));
        let response = self.session.execute(Request::delete(path)?).await?;
        Ok(completed(&response)?)
    }

    /// Stream a container's stdout and stderr.
    ///
    /// With `follow` set the stream stays open until the container exits or
    /// the stream is dropped.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` when the daemon refuses, or the transport
    /// error.
    pub async fn container_logs(&self, id: &str, follow: bool) -> Result<LogStream> {
        let path = self.url(&format!(
            "/containers/{}/logs?follow={follow}&stdout=true&stderr=true",
            segment(id)?
        ));
        let inner = self.stream(Request::get(path)?).await?;
        Ok(LogStream { inner })
    }
}

/// Raw log output as the daemon sends it.
///
/// The session's connection is held until the stream ends or is dropped.
#[derive(Debug)]
pub struct LogStream {
    inner: StreamingResponse,
}

impl LogStream {
    /// Read the next chunk of output; `None` once the log ends.
    ///
    /// # Errors
    ///
    /// Returns the transport error; the connection is then discarded.
    pub async fn next_chunk(&mut self) -> std::result::Result<Option<Bytes>, TransportError> {
        self.inner.next_chunk().await
    }

    /// Stop reading and discard the connection.
    pub fn abandon(self) {
        self.inner.abandon();
    }

    /// Turn the log into a [`Stream`] of chunks.
    pub fn into_stream(
        self,
    ) -> impl Stream<Item = std::result::Result<Bytes, TransportError>> + Send {
        self.inner.into_stream()
    }
}
