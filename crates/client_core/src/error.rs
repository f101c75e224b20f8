use shared::{domain::ItemId, error::ApiError};
use thiserror::Error;

/// Authentication failures. The `Display` text is shown to the user as is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Please enter your email and password")]
    MissingCredentials,
    #[error("Invalid login credentials")]
    InvalidCredentials,
    #[error("Email not confirmed")]
    EmailNotConfirmed,
    #[error("{0}")]
    WeakPassword(String),
    #[error("{0}")]
    InvalidEmail(String),
    #[error("Authentication service unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Rejected(String),
}

/// Failures reported by an [`crate::ItemStore`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("remote store unavailable: {0}")]
    Unavailable(String),
    #[error("session is no longer authorized")]
    Unauthorized,
    #[error("item {0} not found")]
    NotFound(ItemId),
    #[error("remote store rejected the request: {0}")]
    Rejected(#[from] ApiError),
    #[error("malformed remote response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("item {0} is not in the current list")]
    UnknownItem(ItemId),
    #[error("could not load the shopping list: {0}")]
    RemoteUnavailable(#[source] RemoteError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}
