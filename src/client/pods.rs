//! Kubernetes YAML play/down and pod inspection.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use bytes::Bytes;
use http::HeaderValue;
use http::header::CONTENT_TYPE;
use serde::{Deserialize, Deserializer};

use super::{PodmanClient, decode, segment, success};
use crate::error::Result;
use crate::transport::{Deadline, Request};

/// Host address whose port bindings are reachable from outside the host.
const ALL_INTERFACES: &str = "0.0.0.0";

/// Options for [`PodmanClient::play_kube`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayKubeOptions {
    /// Ports to publish, as `containerPort` or `hostPort:containerPort`.
    pub publish_ports: Vec<String>,
    /// Keep the request open until the pods exit, then clean up.
    pub wait: bool,
    /// Start the pods once they are created.
    pub start: bool,
    /// Deadline for the call; the session's request timeout when unset.
    pub timeout: Option<Duration>,
}

impl PlayKubeOptions {
    /// Options that start the pods and return as soon as they run.
    #[must_use]
    pub const fn started() -> Self {
        Self {
            publish_ports: Vec::new(),
            wait: false,
            start: true,
            timeout: None,
        }
    }

    /// Publish one more port.
    #[must_use]
    pub fn publish(mut self, port: impl Into<String>) -> Self {
        self.publish_ports.push(port.into());
        self
    }
}

/// The daemon's account of a play or down call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct PlayKubeReport {
    /// Pods created by a play call.
    #[serde(deserialize_with = "null_as_default")]
    pub pods: Vec<PlayKubePod>,
    /// Volumes created by a play call.
    #[serde(deserialize_with = "null_as_default")]
    pub volumes: Vec<PlayKubeVolume>,
    /// Pods stopped by a down call.
    #[serde(deserialize_with = "null_as_default")]
    pub stop_report: Vec<PodReport>,
    /// Pods removed by a down call.
    #[serde(deserialize_with = "null_as_default")]
    pub rm_report: Vec<PodReport>,
}

impl PlayKubeReport {
    /// IDs of every pod the call created.
    #[must_use]
    pub fn pod_ids(&self) -> Vec<&str> {
        self.pods.iter().map(|pod| pod.id.as_str()).collect()
    }
}

/// One pod created from the YAML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct PlayKubePod {
    /// Pod ID.
    #[serde(rename = "ID")]
    pub id: String,
    /// IDs of the pod's containers.
    #[serde(deserialize_with = "null_as_default")]
    pub containers: Vec<String>,
    /// Errors reported while starting containers.
    #[serde(deserialize_with = "null_as_default")]
    pub container_errors: Vec<String>,
}

/// One volume created from the YAML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct PlayKubeVolume {
    /// Volume name.
    pub name: String,
}

/// Outcome for one pod in a down call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct PodReport {
    /// Pod ID.
    pub id: String,
    /// Failure text, empty on success.
    #[serde(rename = "Err", deserialize_with = "null_as_default")]
    pub error: String,
}

/// The parts of a pod inspect document this crate reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct PodInspect {
    /// Pod ID.
    pub id: String,
    /// Pod name.
    pub name: String,
    /// Lifecycle state, such as `Running`.
    pub state: String,
    /// Settings of the infra container, which owns the pod's ports.
    pub infra_config: Option<InfraConfig>,
}

/// Infra container settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct InfraConfig {
    /// Bindings keyed by `port/protocol`, such as `80/tcp`.
    #[serde(deserialize_with = "null_as_default")]
    pub port_bindings: HashMap<String, Vec<HostPort>>,
}

/// One host-side binding of a container port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct HostPort {
    /// Host address the port is bound on.
    pub host_ip: String,
    /// Host port, as the daemon reports it.
    pub host_port: String,
}

impl PodInspect {
    /// Container port to host port, for bindings on `0.0.0.0`.
    ///
    /// Entries whose ports are not numbers are skipped.
    #[must_use]
    pub fn published_ports(&self) -> BTreeMap<u16, u16> {
        let Some(infra) = &self.infra_config else {
            return BTreeMap::new();
        };
        infra
            .port_bindings
            .iter()
            .filter_map(|(key, bindings)| {
                let container = key.split('/').next()?.parse::<u16>().ok()?;
                let host = bindings
                    .iter()
                    .find(|binding| binding.host_ip == ALL_INTERFACES)?
                    .host_port
                    .parse::<u16>()
                    .ok()?;
                Some((container, host))
            })
            .collect()
    }

    /// Host port published for `container_port` on `0.0.0.0`.
    #[must_use]
    pub fn host_port(&self, container_port: u16) -> Option<u16> {
        self.published_ports().get(&container_port).copied()
    }
}

impl PodmanClient {
    /// Create, and optionally start, the pods described by Kubernetes
    /// `yaml`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Status` when the daemon rejects the YAML,
    /// `ApiError::Decode` for an unreadable report, or the transport error.
    pub async fn play_kube(
        &self,
        yaml: impl Into<Bytes>,
        options: &PlayKubeOptions,
    ) -> Result<PlayKubeReport> {
        let mut query = vec![
            format!("wait={}", options.wait),
            format!("start={}", options.start),
        ];
        query.extend(
            options
                .publish_ports
                .iter()
                .map(|port| format!("publishPorts={}", urlencoding::encode(port))),
        );
        let path = self.url(&format!("/play/kube?{}", query.join("&")));
        let request = yaml_request(Request::post(path)?, yaml);
        let allowance = options
            .timeout
            .unwrap_or(self.session.options().request_timeout);
        let response = self
            .session
            .execute_with_deadline(request, Deadline::after(allowance))
            .await?;
        decode(&success(response)?)
    }

    /// Stop and remove the pods described by `yaml`; `force` also removes
    /// their volumes.
    ///
    /// # Errors
    ///
    /// See [`Self::play_kube`].
    pub async fn kube_down(&self, yaml: impl Into<Bytes>, force: bool) -> Result<PlayKubeReport> {
        let path = self.url(&format!("/play/kube?force={force}"));
        let request = yaml_request(Request::delete(path)?, yaml);
        let response = self.session.execute(request).await?;
        decode(&success(response)?)
    }

    /// Fetch a pod's inspect document.
    ///
    /// # Errors
    ///
    /// See [`Self::get_json`]; an empty `id` is an `ApiError::Encode`.
    pub async fn inspect_pod(&self, id: &str) -> Result<PodInspect> {
        self.get_json(&format!("/pods/{}/json", segment(id)?)).await
    }
}

/// libpod writes empty lists as `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

fn yaml_request(request: Request, yaml: impl Into<Bytes>) -> Request {
    request
        .with_header(CONTENT_TYPE, HeaderValue::from_static("application/yaml"))
        .with_body(yaml)
}
