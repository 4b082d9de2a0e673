pub mod api;

pub mod events;

pub mod session;

pub mod snapshot;

pub mod store;

pub mod summary;

pub mod sync;

pub mod transport;

pub mod test_helpers;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Shown when a failing response carries no usable `detail` field.
pub const GENERIC_REQUEST_FAILED: &str = "Request failed";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Network failure or non-success HTTP status. The reason is display-ready
    /// and best-effort extracted from the response body.
    #[error("{reason}")]
    RequestFailed { reason: String },
    /// Client-side precondition failure. Never sent to the server.
    #[error("{0}")]
    ValidationFailed(String),
}

impl Error {
    pub fn request_failed(reason: impl Into<String>) -> Self {
        Error::RequestFailed {
            reason: reason.into(),
        }
    }
}
