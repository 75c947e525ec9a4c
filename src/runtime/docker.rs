use std::collections::HashMap;

use bollard::Docker;
use bollard::container::{InspectContainerOptions, ListContainersOptions};
use bollard::models::{ContainerInspectResponse, EventMessage, EventMessageTypeEnum};
use bollard::network::InspectNetworkOptions;
use bollard::system::EventsOptions;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;

use super::{
    ContainerDetail, ContainerSummary, Error, EventKind, MountPoint, NetworkDetail, PortBinding,
    RawEvent, Result, VolumeDetail,
};

/// Opens connections to the Docker daemon named by `DOCKER_HOST`, or the local
/// socket when unset.
#[derive(Debug, Clone, Default)]
pub struct DockerFactory;

impl super::Factory for DockerFactory {
    type Conn = DockerConnection;

    async fn create_conn(&self) -> Result<DockerConnection> {
        let docker = Docker::connect_with_local_defaults().map_err(Error::Connect)?;
        let version = docker.version().await.map_err(Error::Connect)?;
        log::info!(
            target: "docker_graph::runtime",
            "opened connection: api_version={}, version={}, os={}",
            version.api_version.as_deref().unwrap_or("?"),
            version.version.as_deref().unwrap_or("?"),
            version.os.as_deref().unwrap_or("?"),
        );

        Ok(DockerConnection { docker })
    }
}

#[derive(Debug, Clone)]
pub struct DockerConnection {
    docker: Docker,
}

impl super::Connection for DockerConnection {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                ..Default::default()
            }))
            .await
            .map_err(Error::Api)?;

        Ok(containers
            .into_iter()
            .filter_map(|container| {
                let id = container.id?;
                let created = container
                    .created
                    .and_then(|secs| DateTime::from_timestamp(secs, 0))
                    .unwrap_or_default();
                Some(ContainerSummary { id, created })
            })
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetail> {
        self.docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map(convert_container)
            .map_err(|err| not_found_or_api(err, "container", id))
    }

    async fn inspect_network(&self, id: &str) -> Result<NetworkDetail> {
        let network = self
            .docker
            .inspect_network(id, None::<InspectNetworkOptions<String>>)
            .await
            .map_err(|err| not_found_or_api(err, "network", id))?;

        Ok(NetworkDetail {
            id: network.id.unwrap_or_else(|| id.to_owned()),
            name: network.name.unwrap_or_default(),
            driver: network.driver.unwrap_or_default(),
            scope: network.scope.unwrap_or_default(),
            internal: network.internal.unwrap_or_default(),
        })
    }

    async fn inspect_volume(&self, name: &str) -> Result<VolumeDetail> {
        let volume = self
            .docker
            .inspect_volume(name)
            .await
            .map_err(|err| not_found_or_api(err, "volume", name))?;

        Ok(VolumeDetail {
            name: volume.name,
            driver: volume.driver,
            mountpoint: volume.mountpoint,
        })
    }

    fn events(&self, since: Option<DateTime<Utc>>) -> BoxStream<'static, Result<RawEvent>> {
        let options = EventsOptions::<String> {
            since: since.map(format_since),
            until: None,
            filters: HashMap::default(),
        };
        self.docker
            .events(Some(options))
            .map(|msg| msg.map(convert_event).map_err(Error::Api))
            .boxed()
    }
}

fn not_found_or_api(err: bollard::errors::Error, kind: &'static str, id: &str) -> Error {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => Error::NotFound {
            kind,
            id: id.to_owned(),
        },
        other => Error::Api(other),
    }
}

// The daemon takes `<seconds>.<nanoseconds>` for sub-second precision.
fn format_since(since: DateTime<Utc>) -> String {
    format!("{}.{:09}", since.timestamp(), since.timestamp_subsec_nanos())
}

fn convert_event(msg: EventMessage) -> RawEvent {
    let kind = match msg.typ {
        Some(EventMessageTypeEnum::CONTAINER) => EventKind::Container,
        Some(EventMessageTypeEnum::NETWORK) => EventKind::Network,
        Some(other) => EventKind::Other(other.to_string()),
        None => EventKind::Other(String::new()),
    };
    let time = msg
        .time_nano
        .map(DateTime::from_timestamp_nanos)
        .or_else(|| msg.time.and_then(|secs| DateTime::from_timestamp(secs, 0)))
        .unwrap_or_else(Utc::now);
    let (actor_id, attributes) = msg
        .actor
        .map(|actor| {
            (
                actor.id.unwrap_or_default(),
                actor.attributes.unwrap_or_default(),
            )
        })
        .unwrap_or_default();

    RawEvent {
        kind,
        action: msg.action.unwrap_or_default(),
        actor_id,
        attributes,
        time,
    }
}

fn convert_container(inspect: ContainerInspectResponse) -> ContainerDetail {
    let created = inspect
        .created
        .as_deref()
        .and_then(|created| DateTime::parse_from_rfc3339(created).ok())
        .map(|created| created.with_timezone(&Utc));

    let (status, health) = inspect
        .state
        .map(|state| {
            (
                state.status.map(|s| s.to_string()).unwrap_or_default(),
                state
                    .health
                    .and_then(|health| health.status)
                    .map(|s| s.to_string())
                    .filter(|s| !s.is_empty()),
            )
        })
        .unwrap_or_default();

    let (image, labels) = inspect
        .config
        .map(|config| {
            (
                config.image.unwrap_or_default(),
                config.labels.unwrap_or_default(),
            )
        })
        .unwrap_or_default();

    let (networks, ports) = inspect
        .network_settings
        .map(|settings| {
            let networks: HashMap<String, String> = settings
                .networks
                .unwrap_or_default()
                .into_iter()
                .map(|(name, endpoint)| (name, endpoint.network_id.unwrap_or_default()))
                .collect();
            let ports: HashMap<String, Vec<PortBinding>> = settings
                .ports
                .unwrap_or_default()
                .into_iter()
                .map(|(exposed, bindings)| {
                    let bindings = bindings
                        .unwrap_or_default()
                        .into_iter()
                        .map(|binding| PortBinding {
                            host_ip: binding.host_ip.unwrap_or_default(),
                            host_port: binding.host_port.unwrap_or_default(),
                        })
                        .collect();
                    (exposed, bindings)
                })
                .collect();
            (networks, ports)
        })
        .unwrap_or_default();

    let mounts = inspect
        .mounts
        .unwrap_or_default()
        .into_iter()
        .map(|mount| MountPoint {
            kind: mount.typ.map(|t| t.to_string()).unwrap_or_default(),
            name: mount.name.unwrap_or_default(),
            source: mount.source.unwrap_or_default(),
            destination: mount.destination.unwrap_or_default(),
            read_write: mount.rw.unwrap_or_default(),
        })
        .collect();

    ContainerDetail {
        id: inspect.id.unwrap_or_default(),
        created,
        name: inspect.name.unwrap_or_default(),
        image,
        status,
        health,
        labels,
        networks,
        mounts,
        ports,
    }
}
