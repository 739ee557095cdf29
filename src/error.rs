use thiserror::Error;

pub type Result<T, E = RegistryError> = std::result::Result<T, E>;

/// Error taxonomy for registry operations.
///
/// Every variant carries a human-readable message; `kind` is the stable
/// machine-readable label surfaced over the wire.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Conflict(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl RegistryError {
    /// Stable machine-readable label for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::InvalidInput(_) => "invalid_input",
            Self::Conflict(_) => "conflict",
            Self::Storage(_) => "storage",
        }
    }
}
