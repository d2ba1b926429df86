use thiserror::Error;

/// Errors surfaced by connectors, sessions and the vehicles built on them.
///
/// Transient refresh failures never show up here: the poller absorbs them and
/// only reports them through its `connected` flag and event channel.
#[derive(Debug, Error)]
pub enum Error {
    /// The session or handshake with the backend could not be established.
    #[error("unable to connect to {url}, are you connected to the on-board Wi-Fi? ({reason})")]
    InitialConnection { url: String, reason: String },

    /// The vehicle (or the API running on it) does not offer this feature.
    #[error("the requested feature ({0}) is not supported by this API")]
    FeatureMissing(String),

    /// Nothing has been stored under this key.
    #[error("no data stored under `{0}`")]
    NotFound(String),

    /// The backend delivered data that could not be used.
    #[error("invalid data for `{key}`: {reason}")]
    InvalidData { key: String, reason: String },

    /// Vehicle state was read before `init()`.
    #[error("vehicle has not been initialized, call init() first")]
    NotInitialized,

    /// Vehicle state was read after `shutdown()`.
    #[error("vehicle has been shut down")]
    ShutDown,

    /// A distance was requested to something without a usable location.
    #[error("cannot calculate a distance to {0}")]
    NoLocation(String),

    /// A synchronous vendor call (login, logout, ...) failed.
    #[error("API connection error: {0}")]
    Connection(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn invalid_data(key: impl Into<String>, reason: impl ToString) -> Self {
        Error::InvalidData {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    pub fn initial_connection(url: impl Into<String>, reason: impl ToString) -> Self {
        Error::InitialConnection {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
