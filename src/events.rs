//! State-change notifications published to subscribers.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;

use crate::container::{Container, ContainerId};

const TARGET_CONTAINER: &str = "container";

/// A change to the tracked state of one container.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The container changed; carries the full current snapshot.
    Updated {
        time: DateTime<Utc>,
        container: Arc<Container>,
    },
    /// The container is gone. Terminal for its id.
    Removed { id: ContainerId, time: DateTime<Utc> },
}

impl Event {
    pub fn updated(container: Arc<Container>, time: DateTime<Utc>) -> Self {
        Self::Updated { time, container }
    }

    pub fn removed(id: ContainerId, time: DateTime<Utc>) -> Self {
        Self::Removed { id, time }
    }

    pub fn target_id(&self) -> &ContainerId {
        match self {
            Self::Updated { container, .. } => &container.id,
            Self::Removed { id, .. } => id,
        }
    }

    pub fn time(&self) -> DateTime<Utc> {
        match self {
            Self::Updated { time, .. } | Self::Removed { time, .. } => *time,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Updated { .. } => "updated",
            Self::Removed { .. } => "removed",
        }
    }

    /// Stream id of the event: its time in nanoseconds since the epoch.
    ///
    /// Times outside the representable range fall back to microsecond precision.
    pub fn id(&self) -> i64 {
        let time = self.time();
        time.timestamp_nanos_opt()
            .unwrap_or_else(|| time.timestamp_micros().saturating_mul(1_000))
    }
}

impl serde::Serialize for Event {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let len = match self {
            Self::Updated { .. } => 5,
            Self::Removed { .. } => 4,
        };
        let mut state = serializer.serialize_struct("Event", len)?;
        state.serialize_field("TargetType", TARGET_CONTAINER)?;
        state.serialize_field("TargetID", self.target_id())?;
        state.serialize_field("Type", self.kind())?;
        state.serialize_field("Time", &self.time())?;
        if let Self::Updated { container, .. } = self {
            state.serialize_field("Details", container.as_ref())?;
        }
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fake::{at, container};

    fn snapshot(id: &str) -> Container {
        Container::from_detail(ContainerId::new(id).unwrap(), &container(id, at(1)), at(2))
    }

    #[test]
    fn test_updated_shape() {
        let event = Event::updated(Arc::new(snapshot("abc")), at(5));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["TargetType"], "container");
        assert_eq!(value["TargetID"], "abc");
        assert_eq!(value["Type"], "updated");
        assert_eq!(value["Time"], "1970-01-01T00:00:05Z");
        assert_eq!(value["Details"]["ID"], "abc");
    }

    #[test]
    fn test_removed_has_no_details() {
        let event = Event::removed(ContainerId::new("abc").unwrap(), at(5));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["Type"], "removed");
        assert!(value.get("Details").is_none());
    }

    #[test]
    fn test_id_is_nanoseconds() {
        let event = Event::removed(ContainerId::new("abc").unwrap(), at(5));
        assert_eq!(event.id(), 5_000_000_000);
        assert_eq!(event.target_id().as_ref(), "abc");
    }
}
