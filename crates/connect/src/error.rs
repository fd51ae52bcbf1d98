use charger_monitor_domain::model::Transaction;
use thiserror::Error;

/// The remote API moved outside the range this client understands.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("response is missing the X-Application-Version header")]
    MissingHeader,
    #[error("failed to parse X-Application-Version header: {0}")]
    MalformedHeader(String),
    #[error("invalid API version `{0}`")]
    InvalidVersion(String),
    #[error("API version {emulated} is not supported, minimal version is {minimal}")]
    Unsupported { emulated: String, minimal: String },
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("error logging in: {message}")]
    InvalidCredentials { message: String },
    #[error("login request failed: {0}")]
    Transport(String),
    #[error("login returned an unreadable token: {0}")]
    MalformedToken(String),
    #[error(transparent)]
    Version(#[from] VersionError),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("api version check failed: {0}")]
    Version(#[from] VersionError),
    #[error("failed to build http client: {0}")]
    Client(String),
    #[error("request to {path} failed: {message}")]
    Transport { path: String, message: String },
    #[error("request to {path} returned HTTP {status}")]
    Status { path: String, status: u16 },
    #[error("failed to decode response from {path}: {message}")]
    Decode { path: String, message: String },
}

/// A transaction listing that stopped part-way. `fetched` holds every page that
/// arrived before `source` occurred.
#[derive(Debug, Error)]
#[error("pagination stopped after {} transactions: {source}", .fetched.len())]
pub struct PaginationError {
    pub fetched: Vec<Transaction>,
    #[source]
    pub source: FetchError,
}

impl PaginationError {
    pub fn into_parts(self) -> (Vec<Transaction>, FetchError) {
        (self.fetched, self.source)
    }
}
