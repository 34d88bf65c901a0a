//! CLI Version Resolution
//!
//! Maps a requested version (`dev`, `latest`, or a semver range such as
//! `^3`) onto a published release and its download URLs.

use std::collections::BTreeMap;

use chrono::Utc;
use log::debug;
use reqwest::blocking::Client;
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Published list of releases.
pub const VERSIONS_URL: &str =
    "https://raw.githubusercontent.com/pulumi/docs/master/data/versions.json";

/// Latest development build number.
pub const DEV_VERSION_URL: &str = "https://www.pulumi.com/latest-dev-version";

const RELEASES_URL: &str = "https://get.pulumi.com/releases/sdk";

/// Platforms a release is published for.
pub const PLATFORMS: &[&str] = &[
    "linux-x64",
    "linux-arm64",
    "darwin-x64",
    "darwin-arm64",
    "windows-x64",
    "windows-arm64",
];

/// Version lookup errors.
#[derive(Debug, Error)]
pub enum VersionError {
    #[error("Failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Expected a release flagged as latest, found none")]
    NoLatest,

    #[error("Invalid version range '{range}': {source}")]
    InvalidRange {
        range: String,
        #[source]
        source: semver::Error,
    },

    #[error("Could not find a version that satisfied the version range '{0}'")]
    NoMatch(String),
}

/// One published release.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub version: String,
    pub date: String,
    pub downloads: BTreeMap<String, String>,
    pub checksums: String,
    #[serde(default)]
    pub latest: Option<bool>,
}

impl VersionInfo {
    /// Download URL for a platform.
    pub fn download_for(&self, platform: &str) -> Option<&str> {
        self.downloads.get(platform).map(String::as_str)
    }

    /// Release metadata for a development build.
    pub fn dev(version: &str) -> Self {
        let version = format!("v{}", version.trim().trim_start_matches('v'));
        let downloads = PLATFORMS
            .iter()
            .map(|platform| {
                let ext = if platform.starts_with("windows") { "zip" } else { "tar.gz" };
                (
                    platform.to_string(),
                    format!("{}/pulumi-{}-{}.{}", RELEASES_URL, version, platform, ext),
                )
            })
            .collect();
        Self {
            checksums: format!("{}/pulumi-{}-checksums.txt", RELEASES_URL, version),
            version,
            date: Utc::now().to_rfc3339(),
            downloads,
            latest: Some(false),
        }
    }
}

/// Where release metadata comes from.
pub trait VersionSource {
    fn versions(&self) -> Result<Vec<VersionInfo>, VersionError>;
    fn latest_dev(&self) -> Result<String, VersionError>;
}

/// Fetches release metadata over HTTP.
pub struct HttpVersionSource {
    client: Client,
}

impl HttpVersionSource {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response, VersionError> {
        let fetch_err = |source| VersionError::Fetch {
            url: url.to_string(),
            source,
        };
        self.client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(fetch_err)
    }
}

impl Default for HttpVersionSource {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionSource for HttpVersionSource {
    fn versions(&self) -> Result<Vec<VersionInfo>, VersionError> {
        self.get(VERSIONS_URL)?
            .json()
            .map_err(|source| VersionError::Fetch {
                url: VERSIONS_URL.to_string(),
                source,
            })
    }

    fn latest_dev(&self) -> Result<String, VersionError> {
        self.get(DEV_VERSION_URL)?
            .text()
            .map(|t| t.trim().to_string())
            .map_err(|source| VersionError::Fetch {
                url: DEV_VERSION_URL.to_string(),
                source,
            })
    }
}

/// Parses a version, tolerating a leading `v`.
pub fn parse_version(version: &str) -> Option<Version> {
    Version::parse(version.trim().trim_start_matches('v')).ok()
}

/// A version range in npm syntax: `||` separated alternatives, each a
/// set of space separated comparators or a hyphen range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    alternatives: Vec<VersionReq>,
}

impl VersionRange {
    /// Whether any alternative matches `version`.
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }
}

/// Parses a range. A bare version means an exact match.
pub fn parse_range(range: &str) -> Result<VersionRange, VersionError> {
    let alternatives = range
        .split("||")
        .map(|alt| {
            let normalized = normalize_alternative(alt);
            VersionReq::parse(&normalized).map_err(|source| VersionError::InvalidRange {
                range: range.to_string(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(VersionRange { alternatives })
}

/// Rewrites one npm alternative into comma separated comparators.
fn normalize_alternative(alt: &str) -> String {
    let alt = alt.trim();
    if let Some((low, high)) = alt.split_once(" - ") {
        return format!(
            ">={}, <={}",
            low.trim().trim_start_matches('v'),
            high.trim().trim_start_matches('v')
        );
    }

    let mut comparators: Vec<String> = Vec::new();
    let mut pending_op = String::new();
    for token in alt.split(|c: char| c.is_whitespace() || c == ',') {
        if token.is_empty() {
            continue;
        }
        let op_len = token
            .find(|c: char| !matches!(c, '<' | '>' | '=' | '~' | '^'))
            .unwrap_or(token.len());
        let (op, version) = token.split_at(op_len);
        pending_op.push_str(op);
        if version.is_empty() {
            continue;
        }

        let version = version.trim_start_matches('v');
        let op = std::mem::take(&mut pending_op);
        if op.is_empty() && Version::parse(version).is_ok() {
            comparators.push(format!("={}", version));
        } else {
            comparators.push(format!("{}{}", op, version));
        }
    }

    if comparators.is_empty() {
        "*".to_string()
    } else {
        comparators.join(", ")
    }
}

/// Whether `version` falls inside `range`.
pub fn satisfies(version: &str, range: &str) -> bool {
    match (parse_version(version), parse_range(range)) {
        (Some(v), Ok(req)) => req.matches(&v),
        _ => false,
    }
}

/// Picks the release matching `range`.
pub fn resolve(range: &str, source: &dyn VersionSource) -> Result<VersionInfo, VersionError> {
    match range.trim() {
        "dev" => {
            let dev = source.latest_dev()?;
            debug!("Latest dev version: {}", dev);
            Ok(VersionInfo::dev(&dev))
        }
        "latest" => source
            .versions()?
            .into_iter()
            .find(|v| v.latest == Some(true))
            .ok_or(VersionError::NoLatest),
        _ => {
            let req = parse_range(range)?;
            let versions = source.versions()?;
            let best = versions
                .into_iter()
                .filter_map(|info| parse_version(&info.version).map(|v| (v, info)))
                .filter(|(v, _)| req.matches(v))
                .max_by(|(a, _), (b, _)| a.cmp(b))
                .map(|(_, info)| info);

            best.ok_or_else(|| {
                debug!("No published version satisfies {}", range);
                VersionError::NoMatch(range.to_string())
            })
        }
    }
}
