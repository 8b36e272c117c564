//! Version resolution
//!
//! Precedence, first match wins:
//! 1. `apiVersion` in the request body; present but blank is an error
//! 2. `api-version` parameter of the `Accept` header
//! 3. the group's preferred version
//!
//! An unserved version is rejected; there is no fallback to a nearby one.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{HubError, Result};
use crate::registry::{split_api_version, RegisteredGroup};

/// Where the resolved version came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSource {
    Body,
    Accept,
    Preferred,
}

/// Outcome of version resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    pub version: String,
    pub source: VersionSource,
}

fn api_version_param() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"(?i);\s*api-version\s*=\s*"?([^;,"\s]+)"?"#).ok())
        .as_ref()
}

/// The `api-version` parameter of the first media range that carries one
pub fn accept_api_version(accept: &str) -> Option<&str> {
    api_version_param()?
        .captures(accept)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// `Content-Type` for a response in `api_version`
pub fn content_type(api_version: &str) -> String {
    format!("application/json; api-version={}", api_version)
}

/// Resolve the version a request intends for `group`
pub fn resolve_version(
    group: &RegisteredGroup,
    body_api_version: Option<&str>,
    accept: Option<&str>,
) -> Result<ResolvedVersion> {
    let body = body_api_version.map(str::trim);
    if body == Some("") {
        return Err(HubError::RequestVersion {
            group: group.name().to_string(),
            requested: String::new(),
        });
    }
    let (requested, source) = match (body, accept.and_then(accept_api_version)) {
        (Some(v), _) => (v, VersionSource::Body),
        (None, Some(v)) => (v, VersionSource::Accept),
        (None, None) => (group.preferred_version(), VersionSource::Preferred),
    };

    let reject = || HubError::RequestVersion {
        group: group.name().to_string(),
        requested: requested.to_string(),
    };

    let (requested_group, version) = split_api_version(requested);
    if !requested_group.is_empty() && requested_group != group.name() {
        return Err(reject());
    }
    if !group.is_served(version) {
        return Err(reject());
    }
    Ok(ResolvedVersion {
        version: version.to_string(),
        source,
    })
}
