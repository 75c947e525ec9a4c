//! Boundary to the container runtime API.
//!
//! The rest of the crate only talks to the runtime through [`Factory`] and
//! [`Connection`], using the runtime-neutral types defined here. The Docker
//! implementation lives in [`docker`]; tests use an in-memory fake.
use std::collections::HashMap;
use std::future::Future;

use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;

pub mod docker;
mod error;
#[cfg(test)]
pub(crate) mod fake;

pub use docker::{DockerConnection, DockerFactory};
pub use error::{Error, Result};

/// Creates fresh connections to the runtime API.
pub trait Factory: Send + Sync + 'static {
    type Conn: Connection;

    fn create_conn(&self) -> impl Future<Output = Result<Self::Conn>> + Send;
}

/// A handle to the runtime API. Closing the handle is dropping it.
pub trait Connection: Send + Sync + 'static {
    /// Lists all containers, including stopped ones.
    fn list_containers(&self) -> impl Future<Output = Result<Vec<ContainerSummary>>> + Send;

    /// Fetches the full detail of one container.
    ///
    /// Returns an error for which [`Error::is_not_found`] holds if the container is gone.
    fn inspect_container(&self, id: &str) -> impl Future<Output = Result<ContainerDetail>> + Send;

    fn inspect_network(&self, id: &str) -> impl Future<Output = Result<NetworkDetail>> + Send;

    fn inspect_volume(&self, name: &str) -> impl Future<Output = Result<VolumeDetail>> + Send;

    /// Opens the live event stream, replaying events from `since` when given.
    ///
    /// The stream ends or yields an error when the connection is lost.
    fn events(&self, since: Option<DateTime<Utc>>) -> BoxStream<'static, Result<RawEvent>>;
}

/// The kind of object a [`RawEvent`] is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Container,
    Network,
    Other(String),
}

/// An event as read from the runtime's event stream, before any interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub kind: EventKind,
    pub action: String,
    pub actor_id: String,
    pub attributes: HashMap<String, String>,
    pub time: DateTime<Utc>,
}

impl RawEvent {
    /// Builds the `create` event used to replay an already existing container.
    pub fn synthetic_create(id: impl Into<String>, created: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::Container,
            action: "create".to_owned(),
            actor_id: id.into(),
            attributes: HashMap::default(),
            time: created,
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// One entry of the container listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub created: DateTime<Utc>,
}

/// Full container detail, as returned by an inspect call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerDetail {
    pub id: String,
    pub created: Option<DateTime<Utc>>,
    /// Raw name; the runtime usually prefixes it with `/`.
    pub name: String,
    pub image: String,
    pub status: String,
    pub health: Option<String>,
    pub labels: HashMap<String, String>,
    /// Attachment name to network id.
    pub networks: HashMap<String, String>,
    pub mounts: Vec<MountPoint>,
    /// Exposed port (e.g. `80/tcp`) to its host bindings.
    pub ports: HashMap<String, Vec<PortBinding>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountPoint {
    pub kind: String,
    pub name: String,
    pub source: String,
    pub destination: String,
    pub read_write: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortBinding {
    pub host_ip: String,
    pub host_port: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkDetail {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub driver: String,
    pub scope: String,
    pub internal: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeDetail {
    pub name: String,
    pub driver: String,
    pub mountpoint: String,
}
