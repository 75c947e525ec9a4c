use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::agent::{Agent, AgentService};
use super::Result;

const LOG_TARGET: &str = "docker_graph::dispatcher";

/// Callback run for every new subscriber.
///
/// A subscriber handed to the hook gets no dispatched values until the hook's
/// owner passes it to [`Dispatcher::activate`].
pub type SubscriberHook<T> =
    Arc<dyn Fn(Subscriber<T>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// The sending half of one subscription, as seen by publishers.
pub struct Subscriber<T> {
    id: u64,
    tx: mpsc::Sender<T>,
    cancel: CancellationToken,
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            tx: self.tx.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<T: Send> Subscriber<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Delivers one value, waiting for room in the subscriber's buffer.
    ///
    /// Returns `false` if the subscriber went away or cancelled first, or if
    /// `shutdown` fired.
    pub async fn deliver(&self, value: T, shutdown: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = shutdown.cancelled() => false,
            sent = self.tx.send(value) => sent.is_ok(),
        }
    }
}

struct Registry<T> {
    next_id: u64,
    subscribers: HashMap<u64, Subscriber<T>>,
    hook: Option<SubscriberHook<T>>,
}

impl<T> Registry<T> {
    fn insert(&mut self, subscriber: Subscriber<T>) {
        let id = subscriber.id;
        self.subscribers.insert(id, subscriber);
        log::debug!(
            target: LOG_TARGET,
            "added subscriber #{id} ({} total)",
            self.subscribers.len()
        );
    }
}

/// Fans published values out to every current subscriber.
///
/// The subscriber set lives inside an [`Agent`], so subscribing, cancelling
/// and dispatching never race each other. Cheap to clone.
pub struct Dispatcher<T> {
    agent: Agent<Registry<T>>,
    buffer: usize,
}

impl<T> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            agent: self.agent.clone(),
            buffer: self.buffer,
        }
    }
}

/// The loop owning a dispatcher's subscriber set.
pub struct DispatcherService<T>(AgentService<Registry<T>>);

impl<T> DispatcherService<T> {
    pub async fn serve(self, cancel: CancellationToken) {
        log::debug!(target: LOG_TARGET, "dispatcher started");
        self.0.serve(cancel).await;
        log::debug!(target: LOG_TARGET, "dispatcher stopped");
    }
}

impl<T: Clone + Send + 'static> Dispatcher<T> {
    /// Creates a dispatcher whose subscribers buffer up to `buffer` values each.
    pub fn new(buffer: usize) -> (Self, DispatcherService<T>) {
        let (agent, service) = Agent::new(Registry {
            next_id: 0,
            subscribers: HashMap::default(),
            hook: None,
        });
        (
            Self {
                agent,
                buffer: buffer.max(1),
            },
            DispatcherService(service),
        )
    }

    /// Registers the hook run for every subsequent subscriber.
    pub async fn on_new_subscriber(&self, hook: SubscriberHook<T>) -> Result<()> {
        self.agent.update(move |registry| registry.hook = Some(hook)).await
    }

    /// Adds a subscriber.
    ///
    /// Without a hook the subscriber is live at once. With one, it is handed to
    /// the hook and stays pending until [`activate`](Dispatcher::activate)d, so
    /// the hook's owner decides what it sees before the first dispatched value.
    /// The hook runs outside the agent loop, so it is free to use this
    /// dispatcher.
    pub async fn subscribe(&self) -> Result<Subscription<T>> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let cancel = CancellationToken::new();
        let (subscriber, hook) = self
            .agent
            .update(move |registry| {
                let id = registry.next_id;
                registry.next_id += 1;
                let subscriber = Subscriber { id, tx, cancel };
                if registry.hook.is_none() {
                    registry.insert(subscriber.clone());
                }
                (subscriber, registry.hook.clone())
            })
            .await?;

        // Built first so that abandoning this future cancels the subscriber.
        let subscription = Subscription {
            id: subscriber.id,
            rx,
            cancel: subscriber.cancel.clone(),
            agent: self.agent.clone(),
        };
        if let Some(hook) = hook {
            log::debug!(target: LOG_TARGET, "subscriber #{} pending", subscriber.id);
            hook(subscriber).await;
        }
        Ok(subscription)
    }

    /// Makes a pending subscriber live: every later dispatch reaches it.
    ///
    /// A subscriber that cancelled in the meantime is left out.
    pub async fn activate(&self, subscriber: Subscriber<T>) -> Result<()> {
        self.agent
            .update(move |registry| {
                if subscriber.is_cancelled() {
                    log::debug!(
                        target: LOG_TARGET,
                        "subscriber #{} cancelled before activation",
                        subscriber.id
                    );
                    return;
                }
                registry.insert(subscriber);
            })
            .await
    }

    /// Delivers `value` to every current subscriber concurrently and waits for
    /// all deliveries to complete or be cancelled.
    ///
    /// Returns the number of subscribers that received the value.
    pub async fn dispatch(&self, value: T, shutdown: &CancellationToken) -> Result<usize> {
        let subscribers = self
            .agent
            .update(|registry| registry.subscribers.values().cloned().collect::<Vec<_>>())
            .await?;
        log::debug!(
            target: LOG_TARGET,
            "dispatching to {} subscriber(s)",
            subscribers.len()
        );
        if subscribers.is_empty() {
            return Ok(0);
        }

        let deliveries = subscribers
            .iter()
            .map(|subscriber| subscriber.deliver(value.clone(), shutdown));
        let delivered = futures_util::future::join_all(deliveries)
            .await
            .into_iter()
            .filter(|ok| *ok)
            .count();
        Ok(delivered)
    }

    /// Number of live subscribers; pending ones are not counted.
    pub async fn subscriber_count(&self) -> Result<usize> {
        self.agent.update(|registry| registry.subscribers.len()).await
    }
}

/// The receiving half of a subscription.
///
/// Dropping it, or calling [`cancel`](Subscription::cancel), immediately
/// releases any in-flight delivery to it and removes it from the dispatcher.
pub struct Subscription<T: Send + 'static> {
    id: u64,
    rx: mpsc::Receiver<T>,
    cancel: CancellationToken,
    agent: Agent<Registry<T>>,
}

impl<T: Send + 'static> Subscription<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next value; `None` once the subscription is closed.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Same as dropping the subscription.
    pub fn cancel(self) {
        drop(self);
    }

    pub fn into_stream(self) -> impl Stream<Item = T> + Send {
        futures_util::stream::unfold(self, |mut subscription| async move {
            subscription.recv().await.map(|value| (value, subscription))
        })
    }
}

impl<T: Send + 'static> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
        let id = self.id;
        let removed = self.agent.post(move |registry| {
            if registry.subscribers.remove(&id).is_some() {
                log::debug!(
                    target: LOG_TARGET,
                    "removed subscriber #{id} ({} left)",
                    registry.subscribers.len()
                );
            }
        });
        if removed.is_err() {
            log::trace!(target: LOG_TARGET, "dispatcher gone before subscriber #{id} was removed");
        }
    }
}
