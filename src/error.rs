use thiserror::Error;

/// A `Result` typedef to use with the [`CacheError`] type
pub type Result<T> = std::result::Result<T, CacheError>;

/// A boxed error type carried by storage and transport failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A generic “error” for HTTP caches
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CacheError {
    /// Error from http
    #[error(transparent)]
    Http(#[from] http::Error),
    /// There was an error converting the header to a string
    #[error(transparent)]
    HeaderToStr(#[from] http::header::ToStrError),
    /// There was an error parsing an HTTP header value
    #[error(transparent)]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
    /// There was an error parsing an HTTP header name
    #[error(transparent)]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),
    /// There was an error parsing the HTTP method
    #[error(transparent)]
    InvalidMethod(#[from] http::method::InvalidMethod),
    /// There was an error parsing the HTTP status code
    #[error(transparent)]
    InvalidStatusCode(#[from] http::status::InvalidStatusCode),
    /// There was an error parsing the URI
    #[error(transparent)]
    InvalidUri(#[from] http::uri::InvalidUri),
    /// There was an error parsing the URL
    #[error(transparent)]
    InvalidUrl(#[from] url::ParseError),
    /// The request target does not yield a usable cache key (e.g. no host)
    #[error("request target does not yield a usable cache key")]
    InvalidRequestUri,
    /// The storage backend failed; the cache degrades to a passthrough for
    /// the affected request
    #[error("storage backend failure")]
    Storage(#[source] BoxError),
    /// A compare-and-swap update lost every attempted race
    #[error("update of cache key {key:?} exhausted {attempts} compare-and-swap attempts")]
    UpdateExhausted {
        /// The key whose update was abandoned
        key: String,
        /// How many conditional writes were attempted
        attempts: u32,
    },
    /// The transport failed to produce a response
    #[error("transport failure")]
    Transport(#[source] BoxError),
    /// A serialized cache entry could not be decoded
    #[error("malformed cache entry: {0}")]
    MalformedEntry(&'static str),
}

impl CacheError {
    /// Wraps a backend error as a [`CacheError::Storage`]
    pub fn storage<E: Into<BoxError>>(err: E) -> Self {
        Self::Storage(err.into())
    }

    /// Wraps a transport error as a [`CacheError::Transport`]
    pub fn transport<E: Into<BoxError>>(err: E) -> Self {
        Self::Transport(err.into())
    }
}
