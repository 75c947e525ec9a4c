//! In-memory runtime used by the tests.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio::sync::mpsc;

use super::{
    ContainerDetail, ContainerSummary, Error, NetworkDetail, RawEvent, Result, VolumeDetail,
};

#[derive(Default)]
struct State {
    containers: HashMap<String, ContainerDetail>,
    networks: HashMap<String, NetworkDetail>,
    volumes: HashMap<String, VolumeDetail>,
    inspected: Vec<String>,
    created: usize,
    fail_connect: bool,
    events: Option<mpsc::UnboundedReceiver<Result<RawEvent>>>,
    since: Vec<Option<DateTime<Utc>>>,
}

/// Shared fake runtime; clones observe the same state.
#[derive(Clone, Default)]
pub struct FakeRuntime {
    state: Arc<Mutex<State>>,
}

impl FakeRuntime {
    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().expect("fake runtime lock poisoned");
        f(&mut state)
    }

    pub fn put_container(&self, detail: ContainerDetail) {
        self.with(|s| s.containers.insert(detail.id.clone(), detail));
    }

    pub fn remove_container(&self, id: &str) {
        self.with(|s| s.containers.remove(id));
    }

    pub fn put_network(&self, network: NetworkDetail) {
        self.with(|s| s.networks.insert(network.id.clone(), network));
    }

    pub fn put_volume(&self, volume: VolumeDetail) {
        self.with(|s| s.volumes.insert(volume.name.clone(), volume));
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.with(|s| s.fail_connect = fail);
    }

    /// Installs a fresh event feed; the next `events()` call consumes it.
    pub fn event_feed(&self) -> mpsc::UnboundedSender<Result<RawEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.with(|s| s.events = Some(rx));
        tx
    }

    /// Ids passed to `inspect_container`, in call order.
    pub fn inspected(&self) -> Vec<String> {
        self.with(|s| s.inspected.clone())
    }

    pub fn connections_created(&self) -> usize {
        self.with(|s| s.created)
    }

    /// `since` arguments of every `events()` call.
    pub fn event_requests(&self) -> Vec<Option<DateTime<Utc>>> {
        self.with(|s| s.since.clone())
    }
}

impl super::Factory for FakeRuntime {
    type Conn = FakeConnection;

    async fn create_conn(&self) -> Result<FakeConnection> {
        self.with(|s| {
            if s.fail_connect {
                return Err(Error::StreamClosed);
            }
            s.created += 1;
            Ok(FakeConnection {
                runtime: self.clone(),
                serial: s.created,
            })
        })
    }
}

pub struct FakeConnection {
    runtime: FakeRuntime,
    pub serial: usize,
}

impl super::Connection for FakeConnection {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        Ok(self.runtime.with(|s| {
            let mut list: Vec<_> = s
                .containers
                .values()
                .map(|c| ContainerSummary {
                    id: c.id.clone(),
                    created: c.created.unwrap_or_default(),
                })
                .collect();
            list.sort_by(|a, b| a.id.cmp(&b.id));
            list
        }))
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetail> {
        self.runtime.with(|s| {
            s.inspected.push(id.to_owned());
            s.containers.get(id).cloned().ok_or_else(|| Error::NotFound {
                kind: "container",
                id: id.to_owned(),
            })
        })
    }

    async fn inspect_network(&self, id: &str) -> Result<NetworkDetail> {
        self.runtime.with(|s| {
            s.networks.get(id).cloned().ok_or_else(|| Error::NotFound {
                kind: "network",
                id: id.to_owned(),
            })
        })
    }

    async fn inspect_volume(&self, name: &str) -> Result<VolumeDetail> {
        self.runtime.with(|s| {
            s.volumes.get(name).cloned().ok_or_else(|| Error::NotFound {
                kind: "volume",
                id: name.to_owned(),
            })
        })
    }

    fn events(&self, since: Option<DateTime<Utc>>) -> BoxStream<'static, Result<RawEvent>> {
        let feed = self.runtime.with(|s| {
            s.since.push(since);
            s.events.take()
        });
        match feed {
            Some(rx) => futures_util::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|event| (event, rx))
            })
            .boxed(),
            None => futures_util::stream::empty().boxed(),
        }
    }
}

/// A running container detail with sensible defaults.
pub fn container(id: &str, created: DateTime<Utc>) -> ContainerDetail {
    ContainerDetail {
        id: id.to_owned(),
        created: Some(created),
        name: format!("/{id}"),
        image: "nginx:latest".to_owned(),
        status: "running".to_owned(),
        ..Default::default()
    }
}

pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).expect("valid timestamp")
}
