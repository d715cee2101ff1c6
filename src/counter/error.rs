use thiserror::Error;

use crate::storage::StorageError;

/// Errors surfaced by hit and stats operations
#[derive(Debug, Error)]
pub enum CounterError {
    #[error("domain must match [a-z0-9.-] and be 1-253 characters")]
    InvalidDomain,
    #[error("domain is not in the allow-list")]
    DomainNotAllowed,
    #[error("project must start with [a-z0-9] followed by up to 79 of [a-z0-9._-]")]
    InvalidProject,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CounterError {
    /// Stable machine-readable code reported to clients
    pub fn code(&self) -> &'static str {
        match self {
            CounterError::InvalidDomain => "invalid_domain",
            CounterError::DomainNotAllowed => "domain_not_allowed",
            CounterError::InvalidProject => "invalid_project",
            CounterError::Storage(_) => "storage_error",
        }
    }

    /// True for malformed or disallowed input, as opposed to server faults
    pub fn is_client_error(&self) -> bool {
        !matches!(self, CounterError::Storage(_))
    }
}
