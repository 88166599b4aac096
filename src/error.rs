use thiserror::Error;

/// Error taxonomy shared by the store, the embedding client and the search surface.
#[derive(Debug, Error)]
pub enum Error {
    /// The embedding provider could not be reached at all.
    #[error("Embedding provider unavailable at {endpoint}: {reason}")]
    ProviderUnavailable { endpoint: String, reason: String },

    /// The provider answered, but not with a usable embedding.
    #[error("Embedding provider error ({status}): {body}")]
    ProviderError { status: u16, body: String },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store unavailable at {path}: {reason}")]
    StoreUnavailable { path: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Errors that only affect the semantic channel; callers fall back to keyword search.
    pub fn is_provider(&self) -> bool {
        matches!(
            self,
            Error::ProviderUnavailable { .. } | Error::ProviderError { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
