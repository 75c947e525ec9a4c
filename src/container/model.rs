use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use super::{ContainerId, ContainerStatus};
use crate::runtime::{ContainerDetail, MountPoint, PortBinding};

const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";
const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";
const COMPOSE_WORKING_DIR_LABEL: &str = "com.docker.compose.project.working_dir";

/// The cached, normalized state of one container.
///
/// Serialized with the field names the web frontend expects.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Container {
    #[serde(rename = "ID")]
    pub id: ContainerId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_at: Option<DateTime<Utc>>,
    pub name: String,
    pub image: String,
    pub status: ContainerStatus,
    #[serde(rename = "Healthy", skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub networks: BTreeMap<String, Network>,
    pub mounts: Vec<Mount>,
    pub ports: BTreeMap<String, Port>,
}

/// A network attachment, keyed by attachment name in [`Container::networks`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Network {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Mount {
    pub name: String,
    #[serde(rename = "Type")]
    pub kind: String,
    pub source: String,
    pub destination: String,
    pub read_write: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Port {
    pub host_ip: String,
    pub host_port: u16,
}

impl Container {
    /// Builds the first snapshot of a container from its inspect detail.
    pub fn from_detail(id: ContainerId, detail: &ContainerDetail, when: DateTime<Utc>) -> Self {
        let created_at = detail.created.unwrap_or_else(|| {
            log::warn!("container `{id}` has no valid creation timestamp");
            when
        });
        let label = |key: &str| detail.labels.get(key).filter(|v| !v.is_empty()).cloned();
        let mut container = Self {
            name: detail
                .name
                .strip_prefix('/')
                .unwrap_or(&detail.name)
                .to_owned(),
            image: detail.image.clone(),
            project: label(COMPOSE_PROJECT_LABEL),
            service: label(COMPOSE_SERVICE_LABEL),
            id,
            created_at,
            updated_at: when,
            removed_at: None,
            status: ContainerStatus::Unknown,
            health: None,
            networks: BTreeMap::default(),
            mounts: Vec::default(),
            ports: BTreeMap::default(),
        };
        container.update(detail, when);
        container.updated_at = when;
        container
    }

    /// Applies a fresh inspect detail and reports whether any observable field
    /// changed. `updated_at` only moves when something did.
    pub fn update(&mut self, detail: &ContainerDetail, when: DateTime<Utc>) -> bool {
        let mut changed = false;

        let status = ContainerStatus::from(detail.status.as_str());
        if self.status != status {
            log::debug!("container `{}` status {} -> {}", self.id.short(), self.status, status);
            self.status = status;
            changed = true;
            if status.is_removed() {
                self.removed_at = Some(when);
            }
        }

        let health = detail
            .health
            .clone()
            .filter(|_| self.status.is_running());
        if self.health != health {
            self.health = health;
            changed = true;
        }

        let networks = read_networks(&detail.networks);
        if self.networks != networks {
            self.networks = networks;
            changed = true;
        }

        let working_dir = detail
            .labels
            .get(COMPOSE_WORKING_DIR_LABEL)
            .map(String::as_str)
            .unwrap_or_default();
        let mounts = read_mounts(working_dir, &detail.mounts);
        if self.mounts != mounts {
            self.mounts = mounts;
            changed = true;
        }

        let ports = read_ports(&detail.ports);
        if self.ports != ports {
            self.ports = ports;
            changed = true;
        }

        if changed {
            self.updated_at = when;
        }
        changed
    }

    pub fn is_removed(&self) -> bool {
        self.removed_at.is_some() || self.status.is_removed()
    }

    pub fn last_update_time(&self) -> DateTime<Utc> {
        self.removed_at.unwrap_or(self.updated_at)
    }
}

fn read_networks(networks: &HashMap<String, String>) -> BTreeMap<String, Network> {
    networks
        .iter()
        .map(|(name, id)| {
            (
                name.clone(),
                Network {
                    id: id.clone(),
                    name: name.clone(),
                },
            )
        })
        .collect()
}

// Bind sources inside the compose project directory are kept relative to it.
fn read_mounts(working_dir: &str, mounts: &[MountPoint]) -> Vec<Mount> {
    let base = if working_dir.is_empty() {
        String::new()
    } else {
        format!("{}/", working_dir.trim_end_matches('/'))
    };
    mounts
        .iter()
        .map(|mount| {
            let source = match mount.source.strip_prefix(base.as_str()) {
                Some(relative) if mount.kind == "bind" && !base.is_empty() => relative,
                _ => mount.source.as_str(),
            };
            Mount {
                name: mount.name.clone(),
                kind: mount.kind.clone(),
                source: source.to_owned(),
                destination: mount.destination.clone(),
                read_write: mount.read_write,
            }
        })
        .collect()
}

fn read_ports(ports: &HashMap<String, Vec<PortBinding>>) -> BTreeMap<String, Port> {
    let mut out = BTreeMap::default();
    for (exposed, bindings) in ports {
        let Some(binding) = bindings.first() else {
            continue;
        };
        match binding.host_port.parse::<u16>() {
            Ok(host_port) => {
                out.insert(
                    exposed.clone(),
                    Port {
                        host_ip: binding.host_ip.clone(),
                        host_port,
                    },
                );
            }
            Err(err) => log::warn!("invalid port number `{}`: {}", binding.host_port, err),
        }
    }
    out
}
