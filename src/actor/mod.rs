//! Single-owner state and publish/subscribe fan-out.
mod agent;
mod dispatcher;

pub use agent::{Agent, AgentService};
pub use dispatcher::{Dispatcher, DispatcherService, Subscriber, SubscriberHook, Subscription};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("agent loop is no longer running")]
    Closed,
}

pub type Result<T> = std::result::Result<T, Error>;
