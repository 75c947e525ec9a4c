use crate::{actor, pool, runtime};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("repository is not running")]
    Closed,
    #[error("failed to publish event: {0}")]
    Dispatch(#[from] actor::Error),
    #[error(transparent)]
    Pool(#[from] pool::Error),
    #[error(transparent)]
    Runtime(#[from] runtime::Error),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Runtime(err) if err.is_not_found())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
