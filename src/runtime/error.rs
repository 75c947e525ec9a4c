#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{kind} `{id}` not found")]
    NotFound { kind: &'static str, id: String },
    #[error("failed to connect to the runtime: {0}")]
    Connect(#[source] bollard::errors::Error),
    #[error("runtime request failed: {0}")]
    Api(#[source] bollard::errors::Error),
    #[error("runtime request timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("runtime event stream closed")]
    StreamClosed,
}

impl Error {
    /// True if the object asked for does not exist (any more).
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Api(bollard::errors::Error::DockerResponseServerError {
                status_code, ..
            }) => *status_code == 404,
            _ => false,
        }
    }

    /// True if the error says nothing about the health of the connection.
    ///
    /// Connections that produced any other error are discarded instead of being
    /// handed back to the pool.
    pub fn is_benign(&self) -> bool {
        match self {
            Self::Api(bollard::errors::Error::DockerResponseServerError {
                status_code, ..
            }) => *status_code < 500,
            other => other.is_not_found(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
