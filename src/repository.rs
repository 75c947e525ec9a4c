//! The reconciliation engine.
//!
//! [`Repository`] is the cheap handle the listener feeds raw events into.
//! [`RepositoryService`] owns the container cache and drains a single command
//! queue; every cache mutation and every publish happens on that loop, so the
//! cache needs no lock and per-container ordering follows the queue.
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::actor::{Dispatcher, Subscriber, SubscriberHook};
use crate::config::RepositoryConfig;
use crate::container::{Container, ContainerId};
use crate::debouncer::Debouncer;
use crate::events::Event;
use crate::pool::Pool;
use crate::runtime::{self, Connection as _, ContainerDetail, EventKind, Factory, RawEvent};
use crate::supervisor::Service;

mod error;

pub use error::{Error, Result};

const LOG_TARGET: &str = "docker_graph::repository";

/// Actor attribute naming the container in network events.
const NETWORK_CONTAINER_ATTRIBUTE: &str = "container";

enum Command {
    Process(RawEvent),
    Reconcile { id: ContainerId, epoch: u64 },
    Prime(Subscriber<Event>),
}

/// What a raw event means for the cache.
#[derive(Debug, PartialEq, Eq)]
enum Disposition {
    Reconcile(ContainerId),
    Remove(ContainerId),
    Ignore,
    Discard(String),
}

fn classify(event: &RawEvent) -> Disposition {
    let reconcile = |raw: &str| match ContainerId::new(raw) {
        Ok(id) => Disposition::Reconcile(id),
        Err(err) => Disposition::Discard(format!("{} event: {err}", event.action)),
    };

    match &event.kind {
        EventKind::Container => match event.action.as_str() {
            "attach" | "detach" => Disposition::Ignore,
            action if action.starts_with("exec_") => Disposition::Ignore,
            "destroy" => match reconcile(&event.actor_id) {
                Disposition::Reconcile(id) => Disposition::Remove(id),
                other => other,
            },
            _ => reconcile(&event.actor_id),
        },
        EventKind::Network => match event.action.as_str() {
            "connect" | "disconnect" => match event.attribute(NETWORK_CONTAINER_ATTRIBUTE) {
                Some(raw) => reconcile(raw),
                None => Disposition::Discard(format!(
                    "network {} event without container attribute",
                    event.action
                )),
            },
            _ => Disposition::Ignore,
        },
        EventKind::Other(_) => Disposition::Ignore,
    }
}

struct Tracker {
    /// Last published snapshot; `None` until the first successful inspect.
    container: Option<Arc<Container>>,
    debouncer: Debouncer,
    epoch: u64,
    last_event: DateTime<Utc>,
}

/// Handle for feeding raw runtime events into the repository. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Repository {
    commands: mpsc::Sender<Command>,
}

impl Repository {
    pub fn new<F: Factory>(
        pool: Pool<F>,
        dispatcher: Dispatcher<Event>,
        config: RepositoryConfig,
    ) -> (Self, RepositoryService<F>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let service = RepositoryService {
            pool,
            dispatcher,
            loopback: tx.downgrade(),
            commands: rx,
            trackers: HashMap::default(),
            next_epoch: 0,
            config,
        };
        (Self { commands: tx }, service)
    }

    /// Queues a raw runtime event, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the repository service is gone.
    pub async fn process(&self, event: RawEvent) -> Result<()> {
        self.commands
            .send(Command::Process(event))
            .await
            .map_err(|_| Error::Closed)
    }
}

/// The loop owning the container cache. Run it with [`RepositoryService::serve`].
pub struct RepositoryService<F: Factory> {
    pool: Pool<F>,
    dispatcher: Dispatcher<Event>,
    config: RepositoryConfig,
    // Weak, so the queue closes once every `Repository` handle is gone.
    loopback: mpsc::WeakSender<Command>,
    commands: mpsc::Receiver<Command>,
    trackers: HashMap<ContainerId, Tracker>,
    next_epoch: u64,
}

impl<F: Factory> RepositoryService<F> {
    /// Drains the command queue until `cancel` fires or every handle is dropped.
    ///
    /// The cache survives a return, so calling `serve` again resumes with the
    /// same state.
    ///
    /// # Errors
    ///
    /// Only fails if the dispatcher is gone; reconciliation errors are logged
    /// and never end the loop.
    pub async fn serve(&mut self, cancel: CancellationToken) -> Result<()> {
        self.dispatcher
            .on_new_subscriber(self.prime_hook())
            .await?;
        log::info!(target: LOG_TARGET, "repository started ({} tracked)", self.trackers.len());

        loop {
            let command = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                res = self.handle(command, &cancel) => res?,
            }
        }

        log::info!(target: LOG_TARGET, "repository stopped");
        Ok(())
    }

    /// Queues a `Prime` for every new subscriber. The subscriber stays pending
    /// until the loop has sent it the cache, so no published event can reach
    /// it before or in between its snapshots.
    fn prime_hook(&self) -> SubscriberHook<Event> {
        let loopback = self.loopback.clone();
        let dispatcher = self.dispatcher.clone();
        Arc::new(move |subscriber| {
            let loopback = loopback.clone();
            let dispatcher = dispatcher.clone();
            Box::pin(async move {
                let subscriber = match loopback.upgrade() {
                    Some(tx) => match tx.send(Command::Prime(subscriber)).await {
                        Ok(()) => return,
                        Err(mpsc::error::SendError(Command::Prime(subscriber))) => subscriber,
                        Err(_) => return,
                    },
                    None => subscriber,
                };
                log::debug!(
                    target: LOG_TARGET,
                    "repository gone, subscriber #{} goes live unprimed",
                    subscriber.id()
                );
                if dispatcher.activate(subscriber).await.is_err() {
                    log::debug!(target: LOG_TARGET, "dispatcher gone before activation");
                }
            })
        })
    }

    async fn handle(&mut self, command: Command, cancel: &CancellationToken) -> Result<()> {
        match command {
            Command::Process(event) => self.process(event, cancel).await,
            Command::Reconcile { id, epoch } => self.reconcile(id, epoch, cancel).await,
            Command::Prime(subscriber) => self.prime(subscriber, cancel).await,
        }
    }

    async fn process(&mut self, event: RawEvent, cancel: &CancellationToken) -> Result<()> {
        log::debug!(
            target: LOG_TARGET,
            "event {:?} {} {} at {}",
            event.kind,
            event.action,
            event.actor_id,
            event.time
        );
        match classify(&event) {
            Disposition::Reconcile(id) => {
                self.schedule(id, event.time);
                Ok(())
            }
            Disposition::Remove(id) => self.remove(&id, event.time, cancel).await,
            Disposition::Ignore => Ok(()),
            Disposition::Discard(reason) => {
                log::warn!(target: LOG_TARGET, "discarding event: {reason}");
                Ok(())
            }
        }
    }

    /// Records the event time and (re-)arms the container's debouncer,
    /// starting to track the container if needed.
    fn schedule(&mut self, id: ContainerId, time: DateTime<Utc>) {
        let tracker = match self.trackers.entry(id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let epoch = self.next_epoch;
                self.next_epoch += 1;
                let debouncer = Debouncer::new(
                    self.config.debounce_delay,
                    reconcile_action(self.loopback.clone(), entry.key().clone(), epoch),
                );
                log::debug!(target: LOG_TARGET, "tracking container `{}`", entry.key().short());
                entry.insert(Tracker {
                    container: None,
                    debouncer,
                    epoch,
                    last_event: time,
                })
            }
        };
        tracker.last_event = tracker.last_event.max(time);
        tracker.debouncer.trigger();
    }

    async fn reconcile(
        &mut self,
        id: ContainerId,
        epoch: u64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let Some(tracker) = self.trackers.get(&id) else {
            return Ok(());
        };
        if tracker.epoch != epoch {
            log::trace!(target: LOG_TARGET, "stale reconcile for `{}`", id.short());
            return Ok(());
        }
        let when = tracker.last_event;

        let detail = match self.inspect(&id).await {
            Ok(detail) => detail,
            Err(err) if err.is_not_found() => {
                log::debug!(target: LOG_TARGET, "container `{}` gone before inspect", id.short());
                let unpublished = self
                    .trackers
                    .get(&id)
                    .is_some_and(|tracker| tracker.container.is_none());
                if unpublished {
                    if let Some(tracker) = self.trackers.remove(&id) {
                        tracker.debouncer.stop().await;
                    }
                }
                return Ok(());
            }
            Err(err) => {
                log::warn!(target: LOG_TARGET, "failed to inspect container `{}`: {err}", id.short());
                return Ok(());
            }
        };

        let Some(tracker) = self.trackers.get_mut(&id) else {
            return Ok(());
        };
        let (container, changed) = match tracker.container.take() {
            Some(mut container) => {
                let changed = Arc::make_mut(&mut container).update(&detail, when);
                (container, changed)
            }
            None => (
                Arc::new(Container::from_detail(id.clone(), &detail, when)),
                true,
            ),
        };
        tracker.container = Some(Arc::clone(&container));
        if !changed {
            log::trace!(target: LOG_TARGET, "container `{}` unchanged", id.short());
            return Ok(());
        }

        if container.is_removed() {
            return self.remove(&id, when, cancel).await;
        }
        self.dispatcher
            .dispatch(Event::updated(container, when), cancel)
            .await?;
        Ok(())
    }

    async fn inspect(&self, id: &ContainerId) -> Result<ContainerDetail> {
        let mut conn = self.pool.get().await?;
        let timeout = self.config.inspect_timeout;
        let result = tokio::time::timeout(timeout, conn.inspect_container(id.as_ref()))
            .await
            .unwrap_or(Err(runtime::Error::Timeout(timeout)));
        Ok(conn.check(result)?)
    }

    /// Drops the container from the cache and publishes its removal.
    async fn remove(
        &mut self,
        id: &ContainerId,
        time: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let Some(tracker) = self.trackers.remove(id) else {
            log::debug!(target: LOG_TARGET, "removal of untracked container `{}`", id.short());
            return Ok(());
        };
        tracker.debouncer.stop().await;
        log::debug!(target: LOG_TARGET, "container `{}` removed", id.short());

        self.dispatcher
            .dispatch(Event::removed(id.clone(), time), cancel)
            .await?;
        Ok(())
    }

    /// Sends the current snapshot of every cached container to a pending
    /// subscriber, then makes it live.
    async fn prime(&self, subscriber: Subscriber<Event>, cancel: &CancellationToken) -> Result<()> {
        let mut snapshots: Vec<_> = self
            .trackers
            .values()
            .filter_map(|tracker| tracker.container.clone())
            .collect();
        snapshots.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        log::debug!(
            target: LOG_TARGET,
            "priming subscriber #{} with {} container(s)",
            subscriber.id(),
            snapshots.len()
        );

        for container in snapshots {
            let time = container.last_update_time();
            if !subscriber.deliver(Event::updated(container, time), cancel).await {
                log::debug!(target: LOG_TARGET, "subscriber #{} left during priming", subscriber.id());
                return Ok(());
            }
        }
        self.dispatcher.activate(subscriber).await?;
        Ok(())
    }
}

impl<F: Factory> Service for RepositoryService<F> {
    type Error = Error;

    fn serve(&mut self, cancel: CancellationToken) -> impl Future<Output = Result<()>> + Send {
        Self::serve(self, cancel)
    }
}

#[cfg(test)]
impl<F: Factory> RepositoryService<F> {
    /// Pops the next queued raw event without running the loop.
    pub(crate) fn try_next_event(&mut self) -> Option<RawEvent> {
        loop {
            if let Command::Process(event) = self.commands.try_recv().ok()? {
                return Some(event);
            }
        }
    }
}

/// The debounced action: re-enter the command queue instead of touching the cache.
fn reconcile_action(
    loopback: mpsc::WeakSender<Command>,
    id: ContainerId,
    epoch: u64,
) -> impl Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + 'static {
    move || {
        let loopback = loopback.clone();
        let id = id.clone();
        Box::pin(async move {
            let Some(tx) = loopback.upgrade() else {
                return;
            };
            if tx.send(Command::Reconcile { id, epoch }).await.is_err() {
                log::trace!(target: LOG_TARGET, "repository gone before reconcile");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use super::*;
    use crate::actor::Subscription;
    use crate::config::PoolConfig;
    use crate::runtime::fake::{at, container, FakeRuntime};

    struct Harness {
        runtime: FakeRuntime,
        repository: Repository,
        dispatcher: Dispatcher<Event>,
        cancel: CancellationToken,
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            self.cancel.cancel();
        }
    }

    async fn start() -> Harness {
        start_with_buffer(16).await
    }

    async fn start_with_buffer(buffer: usize) -> Harness {
        let runtime = FakeRuntime::default();
        let cancel = CancellationToken::new();
        let pool = Pool::new(runtime.clone(), PoolConfig::default());
        let (dispatcher, dispatcher_service) = Dispatcher::new(buffer);
        tokio::spawn(dispatcher_service.serve(cancel.clone()));

        let config = RepositoryConfig {
            debounce_delay: Duration::from_millis(200),
            ..RepositoryConfig::default()
        };
        let (repository, mut service) = Repository::new(pool, dispatcher.clone(), config);
        tokio::spawn({
            let cancel = cancel.clone();
            async move { service.serve(cancel).await }
        });
        // Let the service register its priming hook.
        tokio::time::sleep(Duration::from_millis(1)).await;

        Harness {
            runtime,
            repository,
            dispatcher,
            cancel,
        }
    }

    fn container_event(action: &str, id: &str, secs: i64) -> RawEvent {
        RawEvent {
            kind: EventKind::Container,
            action: action.to_owned(),
            actor_id: id.to_owned(),
            attributes: HashMap::default(),
            time: at(secs),
        }
    }

    fn network_event(action: &str, container: &str, secs: i64) -> RawEvent {
        RawEvent {
            kind: EventKind::Network,
            action: action.to_owned(),
            actor_id: "net1".to_owned(),
            attributes: HashMap::from([("container".to_owned(), container.to_owned())]),
            time: at(secs),
        }
    }

    async fn next(sub: &mut Subscription<Event>) -> Event {
        tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .expect("no event published")
            .expect("subscription closed")
    }

    async fn assert_quiet(sub: &mut Subscription<Event>) {
        let got = tokio::time::timeout(Duration::from_secs(2), sub.recv()).await;
        assert!(got.is_err(), "unexpected event: {got:?}");
    }

    impl Harness {
        async fn process(&self, event: RawEvent) {
            self.repository.process(event).await.unwrap();
        }

        async fn cache(&self, sub: &mut Subscription<Event>, id: &str, secs: i64) {
            self.runtime.put_container(container(id, at(secs)));
            self.process(RawEvent::synthetic_create(id, at(secs))).await;
            let event = next(sub).await;
            assert_eq!(event.kind(), "updated");
            assert_eq!(event.target_id().as_ref(), id);
        }
    }

    #[test]
    fn test_classify() {
        let id = |raw: &str| ContainerId::new(raw).unwrap();
        assert_eq!(
            classify(&container_event("start", "a", 1)),
            Disposition::Reconcile(id("a"))
        );
        assert_eq!(
            classify(&container_event("health_status: healthy", "a", 1)),
            Disposition::Reconcile(id("a"))
        );
        assert_eq!(
            classify(&container_event("destroy", "a", 1)),
            Disposition::Remove(id("a"))
        );
        assert_eq!(classify(&container_event("attach", "a", 1)), Disposition::Ignore);
        assert_eq!(
            classify(&container_event("exec_start: sh", "a", 1)),
            Disposition::Ignore
        );
        assert_eq!(
            classify(&network_event("disconnect", "b", 1)),
            Disposition::Reconcile(id("b"))
        );
        assert_eq!(classify(&network_event("create", "b", 1)), Disposition::Ignore);
        assert!(matches!(
            classify(&container_event("start", "", 1)),
            Disposition::Discard(_)
        ));

        let mut orphan = network_event("connect", "b", 1);
        orphan.attributes.clear();
        assert!(matches!(classify(&orphan), Disposition::Discard(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_reconciled_once_with_latest_time() {
        let h = start().await;
        let mut sub = h.dispatcher.subscribe().await.unwrap();
        h.runtime.put_container(container("a", at(0)));

        h.process(RawEvent::synthetic_create("a", at(0))).await;
        h.process(container_event("start", "a", 1)).await;
        h.process(container_event("start", "a", 2)).await;

        let event = next(&mut sub).await;
        assert_eq!(event.kind(), "updated");
        assert_eq!(event.time(), at(2));
        assert_eq!(h.runtime.inspected(), vec!["a".to_owned()]);
        assert_quiet(&mut sub).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_wins_over_pending_reconcile() {
        let h = start().await;
        let mut sub = h.dispatcher.subscribe().await.unwrap();
        h.cache(&mut sub, "a", 0).await;

        h.process(container_event("die", "a", 5)).await;
        h.runtime.remove_container("a");
        h.process(container_event("destroy", "a", 6)).await;

        let event = next(&mut sub).await;
        assert_eq!(event, Event::removed(ContainerId::new("a").unwrap(), at(6)));
        assert_quiet(&mut sub).await;
        assert_eq!(h.runtime.inspected().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_disconnect_then_destroy() {
        let h = start().await;
        let mut sub = h.dispatcher.subscribe().await.unwrap();
        h.runtime.put_container(container("b", at(0)));

        h.process(network_event("disconnect", "b", 3)).await;
        h.process(container_event("destroy", "b", 4)).await;

        let event = next(&mut sub).await;
        assert_eq!(event, Event::removed(ContainerId::new("b").unwrap(), at(4)));
        assert_quiet(&mut sub).await;
        assert!(h.runtime.inspected().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_subscriber_is_primed() {
        let h = start().await;
        let mut first = h.dispatcher.subscribe().await.unwrap();
        h.cache(&mut first, "a", 1).await;
        h.cache(&mut first, "b", 2).await;

        let mut late = h.dispatcher.subscribe().await.unwrap();
        let mut seen = HashSet::new();
        for _ in 0..2 {
            let event = next(&mut late).await;
            assert_eq!(event.kind(), "updated");
            assert!(seen.insert(event.target_id().clone()));
        }
        assert_quiet(&mut late).await;
        assert_quiet(&mut first).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_priming_races_queued_reconcile() {
        let h = start_with_buffer(1).await;
        let mut first = h.dispatcher.subscribe().await.unwrap();
        h.cache(&mut first, "a", 1).await;
        h.cache(&mut first, "b", 2).await;

        // Fill `first`'s buffer with an update of b.
        let mut b = container("b", at(2));
        b.status = "exited".to_owned();
        h.runtime.put_container(b);
        h.process(container_event("die", "b", 3)).await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        // c settles first and the loop blocks publishing it to `first`; the
        // reconcile of a fires meanwhile and waits in the queue.
        h.runtime.put_container(container("c", at(4)));
        h.process(RawEvent::synthetic_create("c", at(4))).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut a = container("a", at(1));
        a.status = "exited".to_owned();
        h.runtime.put_container(a);
        h.process(container_event("die", "a", 5)).await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        let mut late = h.dispatcher.subscribe().await.unwrap();

        let mut published = Vec::new();
        for _ in 0..3 {
            let event = next(&mut first).await;
            published.push((event.target_id().to_string(), event.time()));
        }
        assert_eq!(
            published,
            vec![
                ("b".to_owned(), at(3)),
                ("c".to_owned(), at(4)),
                ("a".to_owned(), at(5)),
            ]
        );

        // Every cached container exactly once, in creation order, already
        // reflecting the reconcile that was queued ahead of the subscriber.
        let mut primed = Vec::new();
        for _ in 0..3 {
            let Event::Updated { time, container } = next(&mut late).await else {
                panic!("expected a snapshot");
            };
            primed.push((container.id.to_string(), time));
        }
        assert_eq!(
            primed,
            vec![
                ("a".to_owned(), at(5)),
                ("b".to_owned(), at(3)),
                ("c".to_owned(), at(4)),
            ]
        );
        assert_quiet(&mut late).await;

        // Later changes follow the snapshots.
        h.runtime.put_container(container("a", at(1)));
        h.process(container_event("start", "a", 6)).await;
        let event = next(&mut late).await;
        assert_eq!(event.target_id().as_ref(), "a");
        assert_eq!(event.time(), at(6));
        assert_eq!(next(&mut first).await.time(), at(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_update_after_removal() {
        let h = start().await;
        let mut sub = h.dispatcher.subscribe().await.unwrap();
        h.cache(&mut sub, "a", 0).await;

        h.runtime.remove_container("a");
        h.process(container_event("destroy", "a", 5)).await;
        assert_eq!(next(&mut sub).await.kind(), "removed");

        // A straggler for the destroyed container only finds it gone.
        h.process(container_event("die", "a", 4)).await;
        assert_quiet(&mut sub).await;
        assert_eq!(h.runtime.inspected().len(), 2);

        // It can come back through a fresh create.
        h.cache(&mut sub, "a", 10).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_snapshot_is_not_republished() {
        let h = start().await;
        let mut sub = h.dispatcher.subscribe().await.unwrap();
        h.cache(&mut sub, "a", 0).await;

        h.process(container_event("update", "a", 5)).await;
        assert_quiet(&mut sub).await;
        assert_eq!(h.runtime.inspected().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changed_snapshot_is_published() {
        let h = start().await;
        let mut sub = h.dispatcher.subscribe().await.unwrap();
        h.cache(&mut sub, "a", 0).await;

        let mut detail = container("a", at(0));
        detail.status = "exited".to_owned();
        h.runtime.put_container(detail);
        h.process(container_event("die", "a", 5)).await;

        let Event::Updated { time, container } = next(&mut sub).await else {
            panic!("expected an update");
        };
        assert_eq!(time, at(5));
        assert_eq!(container.status.as_str(), "exited");
        assert_eq!(container.updated_at, at(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_removing_status_publishes_removal() {
        let h = start().await;
        let mut sub = h.dispatcher.subscribe().await.unwrap();
        h.cache(&mut sub, "a", 0).await;

        let mut detail = container("a", at(0));
        detail.status = "removing".to_owned();
        h.runtime.put_container(detail);
        h.process(container_event("kill", "a", 5)).await;

        assert_eq!(
            next(&mut sub).await,
            Event::removed(ContainerId::new("a").unwrap(), at(5))
        );
        assert_quiet(&mut sub).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_actions_are_ignored() {
        let h = start().await;
        let mut sub = h.dispatcher.subscribe().await.unwrap();
        h.runtime.put_container(container("a", at(0)));

        h.process(container_event("attach", "a", 1)).await;
        h.process(container_event("exec_create: sh", "a", 1)).await;
        h.process(RawEvent {
            kind: EventKind::Other("image".to_owned()),
            action: "pull".to_owned(),
            actor_id: "nginx".to_owned(),
            attributes: HashMap::default(),
            time: at(1),
        })
        .await;

        assert_quiet(&mut sub).await;
        assert!(h.runtime.inspected().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_failure_does_not_stop_the_loop() {
        let h = start().await;
        let mut sub = h.dispatcher.subscribe().await.unwrap();
        h.runtime.put_container(container("a", at(0)));

        h.runtime.set_fail_connect(true);
        h.process(container_event("start", "a", 1)).await;
        assert_quiet(&mut sub).await;

        h.runtime.set_fail_connect(false);
        h.process(container_event("start", "a", 2)).await;
        let event = next(&mut sub).await;
        assert_eq!(event.time(), at(2));
    }
}
