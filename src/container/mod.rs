use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

mod error;
mod model;
mod status;

pub use error::{Error, Result};
pub use model::{Container, Mount, Network, Port};
pub use status::ContainerStatus;

/// The maximum allowed length for a [`ContainerId`].
const CONTAINER_ID_MAX_LEN: usize = 255;

/// A validated container identifier, as reported by the runtime.
///
/// Cheap to clone: the underlying string is shared.
///
/// # Examples
///
/// ```
/// # use docker_graph::container::ContainerId;
/// let id = ContainerId::new("4f1c9d2e7a").unwrap();
/// assert_eq!(id.as_ref(), "4f1c9d2e7a");
/// assert!(ContainerId::new("").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(Arc<str>);

impl ContainerId {
    /// Creates a new `ContainerId` from the given raw id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContainerId`] if the input is empty or longer than
    /// [`CONTAINER_ID_MAX_LEN`].
    pub fn new(src: impl AsRef<str>) -> Result<Self> {
        let src = src.as_ref();
        if src.is_empty() || src.len() > CONTAINER_ID_MAX_LEN {
            return Err(Error::InvalidContainerId(src.to_owned()));
        }

        Ok(Self(src.into()))
    }

    /// Returns the first twelve characters, the way the runtime CLI shortens ids.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&*self.0)
    }
}

impl AsRef<str> for ContainerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ContainerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl serde::Serialize for ContainerId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}
