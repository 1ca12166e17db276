use std::sync::Arc;

/// Result type used by the refresh side of the engine.
///
/// Evaluation never fails, so this type only shows up around fetching, installing and polling
/// toggle definitions.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by the refresh path.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The fetcher failed to produce a new definition set. The last installed snapshot stays
    /// active.
    #[error("failed to fetch toggle definitions")]
    Fetch(#[source] Arc<dyn std::error::Error + Send + Sync>),

    /// The backend rejected our credentials. This is not recoverable by retrying.
    #[error("unauthorized, check the API token used by the fetcher")]
    Unauthorized,

    /// Indicates that the poller thread panicked. This should normally never happen.
    #[error("poller thread panicked")]
    PollerThreadPanicked,

    /// The poller thread was stopped before any refresh succeeded.
    #[error("poller thread stopped before toggle definitions were fetched")]
    PollerStopped,

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),

    /// Definition set could not be decoded.
    #[error(transparent)]
    Json(Arc<serde_json::Error>),
}

impl Error {
    /// Wrap an arbitrary fetcher error.
    pub fn fetch(err: impl std::error::Error + Send + Sync + 'static) -> Error {
        Error::Fetch(Arc::new(err))
    }

    /// Returns `true` if retrying the refresh cannot succeed.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Error::Unauthorized)
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(Arc::new(value))
    }
}
