//! Image endpoints.

use std::fmt;

use bytes::BytesMut;
use http::StatusCode;
use serde::Deserialize;

use super::{PodmanClient, decode, segment, status_error};
use crate::error::{ApiError, Result};
use crate::transport::{Request, StreamingResponse};

/// Registry assumed for references built without one.
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// An image reference assembled from registry, name and tag.
///
/// Displays as `registry/name:tag`, leaving out the parts that are unset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    registry: Option<String>,
    name: String,
    tag: Option<String>,
}

impl ImageReference {
    /// Reference `name` on [`DEFAULT_REGISTRY`] with no tag.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            registry: Some(String::from(DEFAULT_REGISTRY)),
            name: name.into(),
            tag: None,
        }
    }

    /// Use `registry` instead of the default.
    #[must_use]
    pub fn with_registry(mut self, registry: impl Into<String>) -> Self {
        self.registry = Some(registry.into());
        self
    }

    /// Leave the registry to the daemon's search configuration.
    #[must_use]
    pub fn without_registry(mut self) -> Self {
        self.registry = None;
        self
    }

    /// Pin `tag`.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Returns the registry, if any.
    #[must_use]
    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    /// Returns the image name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the tag, if any.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{registry}/")?;
        }
        f.write_str(&self.name)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        Ok(())
    }
}

/// One progress document from an image pull.
///
/// libpod writes these as newline-delimited JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PullReport {
    /// Progress text, usually ending in a newline.
    pub stream: String,
    /// Failure text; non-empty reports end the pull.
    pub error: String,
    /// IDs of the pulled images, sent in the final report.
    pub images: Vec<String>,
    /// ID of the pulled image, sent in the final report.
    pub id: String,
}

impl PodmanClient {
    /// Returns whether an image exists locally.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` for statuses other than 204 and 404, or
    /// the transport error.
    pub async fn image_exists(&self, name: &str) -> Result<bool> {
        let path = self.url(&format!("/images/{}/exists", segment(name)?));
        let response = self.session.execute(Request::get(path)?).await?;
        match response.status() {
            StatusCode::NO_CONTENT => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(status_error(status, response.body()).into()),
        }
    }

    /// Start pulling `reference` and return its progress reports.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` when the daemon refuses the pull, or the
    /// transport error.
    pub async fn pull_image(&self, reference: &str) -> Result<PullStream> {
        let path = self.url(&format!(
            "/images/pull?reference={}",
            urlencoding::encode(reference)
        ));
        let inner = self.stream(Request::post(path)?).await?;
        Ok(PullStream {
            inner,
            pending: BytesMut::new(),
            finished: false,
        })
    }
}

/// Progress of an image pull, one [`PullReport`] at a time.
#[derive(Debug)]
pub struct PullStream {
    inner: StreamingResponse,
    pending: BytesMut,
    finished: bool,
}

impl PullStream {
    /// Read the next report; `None` once the pull has finished.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Stream` when the daemon reports a failure,
    /// `ApiError::Decode` for malformed reports, or the transport error.
    pub async fn next_report(&mut self) -> Result<Option<PullReport>> {
        loop {
            if let Some(line) = self.next_line() {
                if line.trim_ascii().is_empty() {
                    continue;
                }
                let report: PullReport = decode(&line)?;
                if !report.error.is_empty() {
                    return Err(ApiError::Stream {
                        message: report.error,
                    }
                    .into());
                }
                return Ok(Some(report));
            }
            if self.finished {
                return Ok(None);
            }
            match self.inner.next_chunk().await? {
                Some(chunk) => self.pending.extend_from_slice(&chunk),
                None => self.finished = true,
            }
        }
    }

    /// Drain the pull and return the IDs of the pulled images.
    ///
    /// # Errors
    ///
    /// See [`Self::next_report`].
    pub async fn wait(mut self) -> Result<Vec<String>> {
        let mut images = Vec::new();
        while let Some(report) = self.next_report().await? {
            if !report.images.is_empty() {
                images = report.images;
            }
        }
        Ok(images)
    }

    fn next_line(&mut self) -> Option<BytesMut> {
        if let Some(end) = self.pending.iter().position(|byte| *byte == b'\n') {
            return Some(self.pending.split_to(end + 1));
        }
        (self.finished && !self.pending.is_empty()).then(|| self.pending.split())
    }
}
