//! Client for the Connect cloud API used by Grizzl-E chargers.

pub mod error;
pub mod session;
pub mod source;
pub mod types;
pub mod version;

#[cfg(test)]
mod test_support;

pub use error::{AuthError, FetchError, PaginationError, VersionError};
pub use session::{is_expired, Credential, SessionClient, TokenClaims, EXPIRY_SKEW_SECS};
pub use source::{ConnectClient, StationSource};
pub use version::{check_api_version, ApiVersionInfo, EMULATED_APP_VERSION};
