//! Version gate for Connect API responses.
//!
//! Every response carries an `X-Application-Version` header holding a JSON
//! object with the latest and minimal versions of the iOS and Android apps.
//! Requests are issued as the iOS app at [`EMULATED_APP_VERSION`], so a server
//! whose iOS minimal version is newer than that has changed in ways this client
//! may not understand.

use std::{fmt, str::FromStr};

use semver::{BuildMetadata, Version};
use serde::Deserialize;
use tracing::debug;

use crate::error::VersionError;

/// App version whose traffic the client reproduces.
pub const EMULATED_APP_VERSION: &str = "v0.9.2";

pub const APP_VERSION_HEADER: &str = "x-application-version";

/// Contents of the `X-Application-Version` header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApiVersionInfo {
    #[serde(rename = "_id")]
    pub id: String,
    pub application_name: String,
    pub ios_latest_version: String,
    pub ios_minimal_version: String,
    pub android_latest_version: String,
    pub android_minimal_version: String,
}

impl ApiVersionInfo {
    pub fn parse(header: &str) -> Result<Self, VersionError> {
        serde_json::from_str(header)
            .map_err(|err| VersionError::MalformedHeader(err.to_string()))
    }
}

/// A semantic version as advertised by the app stores. The leading `v` and
/// missing minor or patch components are optional; build metadata is ignored.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AppVersion(Version);

impl FromStr for AppVersion {
    type Err = VersionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let bare = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let (core, suffix) = bare.split_at(bare.find(['-', '+']).unwrap_or(bare.len()));
        let missing = 2usize.saturating_sub(core.matches('.').count());
        let padded = format!("{core}{}{suffix}", ".0".repeat(missing));

        let mut version =
            Version::parse(&padded).map_err(|_| VersionError::InvalidVersion(raw.to_string()))?;
        version.build = BuildMetadata::EMPTY;
        Ok(Self(version))
    }
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Whether `emulated` is at least the server's `minimal` version.
pub fn api_version_supported(emulated: &str, minimal: &str) -> Result<bool, VersionError> {
    let emulated: AppVersion = emulated.parse()?;
    let minimal: AppVersion = minimal.parse()?;
    Ok(emulated >= minimal)
}

/// Checks a raw `X-Application-Version` header against [`EMULATED_APP_VERSION`].
pub fn check_api_version(header: &str) -> Result<(), VersionError> {
    check_api_version_as(EMULATED_APP_VERSION, header).map(|_| ())
}

pub(crate) fn check_api_version_as(
    emulated: &str,
    header: &str,
) -> Result<ApiVersionInfo, VersionError> {
    let info = ApiVersionInfo::parse(header)?;

    // Traffic was captured from the iOS app, so its minimal version is the gate.
    if !api_version_supported(emulated, &info.ios_minimal_version)? {
        let minimal: AppVersion = info.ios_minimal_version.parse()?;
        return Err(VersionError::Unsupported {
            emulated: emulated.to_string(),
            minimal: minimal.to_string(),
        });
    }

    if !info.ios_latest_version.is_empty()
        && !api_version_supported(emulated, &info.ios_latest_version).unwrap_or(true)
    {
        debug!(
            emulated,
            latest = %info.ios_latest_version,
            "server advertises a newer app version"
        );
    }

    Ok(info)
}

/// Reads and checks the version header of a response.
pub(crate) fn check_response_headers(
    headers: &reqwest::header::HeaderMap,
) -> Result<(), VersionError> {
    let value = headers
        .get(APP_VERSION_HEADER)
        .ok_or(VersionError::MissingHeader)?;
    let header = value
        .to_str()
        .map_err(|err| VersionError::MalformedHeader(err.to_string()))?;
    if header.trim().is_empty() {
        return Err(VersionError::MissingHeader);
    }
    check_api_version(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(minimal: &str) -> String {
        format!(
            r#"{{"_id":"66a","applicationName":"Grizzl-E Connect","iosLatestVersion":"1.2.0","iosMinimalVersion":"{minimal}","androidLatestVersion":"1.2.0","androidMinimalVersion":"{minimal}"}}"#
        )
    }

    #[test]
    fn rejects_server_minimum_above_emulated() {
        let err = check_api_version_as("v0.9.2", &header("1.0.0")).unwrap_err();
        assert_eq!(
            err,
            VersionError::Unsupported {
                emulated: "v0.9.2".to_string(),
                minimal: "v1.0.0".to_string(),
            }
        );
    }

    #[test]
    fn accepts_server_minimum_below_emulated() {
        let info = check_api_version_as("v0.9.2", &header("0.5.0")).expect("supported");
        assert_eq!(info.ios_minimal_version, "0.5.0");
        assert!(check_api_version(&header("v0.5.0")).is_ok());
    }

    #[test]
    fn accepts_equal_versions() {
        assert!(check_api_version(&header("0.9.2")).is_ok());
    }

    #[test]
    fn rejects_malformed_header() {
        assert!(matches!(
            check_api_version("not json"),
            Err(VersionError::MalformedHeader(_))
        ));
    }

    #[test]
    fn rejects_invalid_minimal_version() {
        assert_eq!(
            check_api_version(&header("one.two")),
            Err(VersionError::InvalidVersion("one.two".to_string()))
        );
        assert!(check_api_version(&header("")).is_err());
    }

    #[test]
    fn parses_short_and_prerelease_versions() {
        let short: AppVersion = "v1".parse().expect("short version parses");
        let full: AppVersion = "1.0.0".parse().expect("full version parses");
        assert_eq!(short, full);

        let beta: AppVersion = "1.0.0-beta".parse().expect("prerelease parses");
        assert!(beta < full);
        assert_eq!(beta.to_string(), "v1.0.0-beta");

        assert!("1.2.3.4".parse::<AppVersion>().is_err());
        assert!("1.-2".parse::<AppVersion>().is_err());
        assert!("1.0.0-".parse::<AppVersion>().is_err());
    }

    #[test]
    fn prerelease_identifiers_compare_numerically() {
        let rc9: AppVersion = "1.0.0-rc.9".parse().expect("rc.9 parses");
        let rc10: AppVersion = "v1.0.0-rc.10".parse().expect("rc.10 parses");
        assert!(rc9 < rc10);
        assert!(rc10 < "1.0.0".parse::<AppVersion>().expect("release parses"));
    }

    #[test]
    fn build_metadata_is_ignored() {
        let built: AppVersion = "1.2+115".parse().expect("build metadata parses");
        assert_eq!(built, "1.2.0".parse::<AppVersion>().expect("plain parses"));
        assert_eq!(built.to_string(), "v1.2.0");
        assert_eq!(api_version_supported("v1.2.0", "1.2.0+7"), Ok(true));
    }
}
