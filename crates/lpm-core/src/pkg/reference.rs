//! Package reference parsing.
//!
//! Parses references like:
//! - `ui`
//! - `ui@1.2.0`
//! - `ui@~1.2.0`
//! - `@acme/ui@!1.2.0`
//!
//! A reference without a version asks for `latest`.

use super::resolve::VersionRequest;
use crate::error::{LpmError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Sentinel version meaning "highest published".
pub const LATEST: &str = "latest";

/// How a recorded version is matched against newer publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VersionSymbol {
    /// Compatible with the recorded version (`^`).
    #[default]
    #[serde(rename = "^")]
    Caret,
    /// Patch-level changes only (`~`).
    #[serde(rename = "~")]
    Tilde,
    /// Pinned to the literal version (`!`).
    #[serde(rename = "!")]
    Exact,
}

impl VersionSymbol {
    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            Self::Caret => '^',
            Self::Tilde => '~',
            Self::Exact => '!',
        }
    }

    #[must_use]
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '^' => Some(Self::Caret),
            '~' => Some(Self::Tilde),
            '!' => Some(Self::Exact),
            _ => None,
        }
    }
}

impl fmt::Display for VersionSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// A parsed, validated package reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageReference {
    /// Organization segment as written (e.g. `@acme`), if any.
    pub organization: Option<String>,
    pub name: String,
    /// Version without its symbol; `latest` when none was given.
    pub version: String,
    pub version_symbol: VersionSymbol,
}

impl PackageReference {
    /// Parse a reference string.
    pub fn parse(input: &str) -> Result<Self> {
        Self::parse_with(input, None, None)
    }

    /// Parse a reference string.
    ///
    /// `append_version` is used when the input carries no version.
    /// `force_symbol` overrides whatever symbol the input carries.
    pub fn parse_with(
        input: &str,
        append_version: Option<&str>,
        force_symbol: Option<VersionSymbol>,
    ) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(LpmError::invalid_reference(input, "empty reference"));
        }

        let (organization, rest) = match trimmed.find('/') {
            Some(slash) => {
                let org = &trimmed[..slash];
                if org.is_empty() || org == "@" {
                    return Err(LpmError::invalid_reference(input, "empty organization"));
                }
                validate_segment(input, org.strip_prefix('@').unwrap_or(org), "organization")?;
                (Some(org.to_string()), &trimmed[slash + 1..])
            }
            None if trimmed.starts_with('@') => {
                return Err(LpmError::invalid_reference(
                    input,
                    "scoped reference is missing '/'",
                ));
            }
            None => (None, trimmed),
        };

        let (name, raw_version) = match rest.find('@') {
            Some(at) => {
                let version = &rest[at + 1..];
                if version.is_empty() {
                    return Err(LpmError::invalid_reference(input, "empty version"));
                }
                (&rest[..at], Some(version))
            }
            None => (rest, None),
        };
        validate_segment(input, name, "name")?;

        let raw_version = raw_version.or(append_version).unwrap_or(LATEST);
        let (parsed_symbol, version) = match raw_version.chars().next().and_then(VersionSymbol::from_char) {
            Some(symbol) => (Some(symbol), &raw_version[1..]),
            None => (None, raw_version),
        };
        if version.is_empty() {
            return Err(LpmError::invalid_reference(input, "empty version"));
        }

        Ok(Self {
            organization,
            name: name.to_string(),
            version: version.to_string(),
            version_symbol: force_symbol.or(parsed_symbol).unwrap_or_default(),
        })
    }

    /// `organization/name`, or just `name` when unscoped.
    #[must_use]
    pub fn full_name(&self) -> String {
        match &self.organization {
            Some(org) => format!("{org}/{}", self.name),
            None => self.name.clone(),
        }
    }

    /// `fullName@version`, the registry key of this reference.
    #[must_use]
    pub fn resolved_id(&self) -> String {
        format!("{}@{}", self.full_name(), self.version)
    }

    /// Whether the reference asks for the highest published version.
    #[must_use]
    pub fn is_latest(&self) -> bool {
        self.version == LATEST
    }

    /// The typed version request this reference expresses.
    #[must_use]
    pub fn request(&self) -> VersionRequest {
        VersionRequest::from_parts(self.version_symbol, &self.version)
    }
}

impl fmt::Display for PackageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_latest() {
            write!(f, "{}", self.full_name())
        } else {
            write!(f, "{}@{}{}", self.full_name(), self.version_symbol, self.version)
        }
    }
}

fn validate_segment(input: &str, segment: &str, what: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(LpmError::invalid_reference(input, format!("empty {what}")));
    }
    if !segment
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(LpmError::invalid_reference(
            input,
            format!("invalid characters in {what} '{segment}'"),
        ));
    }
    Ok(())
}

type CacheKey = (String, Option<String>, Option<VersionSymbol>);

/// Memoizes [`PackageReference::parse_with`] by its full argument list.
///
/// Purely a performance aid; cloning shares the underlying table.
#[derive(Debug, Clone, Default)]
pub struct ReferenceCache {
    entries: Arc<Mutex<HashMap<CacheKey, PackageReference>>>,
}

impl ReferenceCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&self, input: &str) -> Result<PackageReference> {
        self.parse_with(input, None, None)
    }

    pub fn parse_with(
        &self,
        input: &str,
        append_version: Option<&str>,
        force_symbol: Option<VersionSymbol>,
    ) -> Result<PackageReference> {
        let key = (
            input.to_string(),
            append_version.map(str::to_string),
            force_symbol,
        );
        if let Ok(entries) = self.entries.lock() {
            if let Some(hit) = entries.get(&key) {
                return Ok(hit.clone());
            }
        }

        let parsed = PackageReference::parse_with(input, append_version, force_symbol)?;
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, parsed.clone());
        }
        Ok(parsed)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |e| e.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_name() {
        let r = PackageReference::parse("ui").unwrap();
        assert_eq!(r.organization, None);
        assert_eq!(r.name, "ui");
        assert_eq!(r.version, "latest");
        assert_eq!(r.version_symbol, VersionSymbol::Caret);
        assert!(r.is_latest());
    }

    #[test]
    fn test_parse_scoped_with_symbol() {
        let r = PackageReference::parse("@acme/ui@~1.2.3").unwrap();
        assert_eq!(r.organization.as_deref(), Some("@acme"));
        assert_eq!(r.name, "ui");
        assert_eq!(r.version, "1.2.3");
        assert_eq!(r.version_symbol, VersionSymbol::Tilde);
        assert_eq!(r.full_name(), "@acme/ui");
        assert_eq!(r.resolved_id(), "@acme/ui@1.2.3");
    }

    #[test]
    fn test_parse_exact_pin() {
        let r = PackageReference::parse("ui@!9.9.9").unwrap();
        assert_eq!(r.version, "9.9.9");
        assert_eq!(r.version_symbol, VersionSymbol::Exact);
    }

    #[test]
    fn test_append_version_only_when_missing() {
        let r = PackageReference::parse_with("ui", Some("2.0.0"), None).unwrap();
        assert_eq!(r.version, "2.0.0");

        let r = PackageReference::parse_with("ui@1.0.0", Some("2.0.0"), None).unwrap();
        assert_eq!(r.version, "1.0.0");
    }

    #[test]
    fn test_forced_symbol_wins() {
        let r =
            PackageReference::parse_with("ui@~1.0.0", None, Some(VersionSymbol::Exact)).unwrap();
        assert_eq!(r.version_symbol, VersionSymbol::Exact);
        assert_eq!(r.version, "1.0.0");
    }

    #[test]
    fn test_unscoped_organization() {
        let r = PackageReference::parse("acme/ui@1.0.0").unwrap();
        assert_eq!(r.organization.as_deref(), Some("acme"));
        assert_eq!(r.full_name(), "acme/ui");
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in ["", "@acme", "@/ui", "ui@", "@acme/", "ui@^", "u i", "@acme/ui@"] {
            let err = PackageReference::parse(bad).unwrap_err();
            assert!(
                matches!(err, LpmError::InvalidReference { .. }),
                "expected rejection for {bad:?}"
            );
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(PackageReference::parse("ui").unwrap().to_string(), "ui");
        assert_eq!(
            PackageReference::parse("@a/ui@1.0.0").unwrap().to_string(),
            "@a/ui@^1.0.0"
        );
    }

    #[test]
    fn test_cache_memoizes_by_arguments() {
        let cache = ReferenceCache::new();
        let a = cache.parse("ui@1.0.0").unwrap();
        let b = cache.parse("ui@1.0.0").unwrap();
        assert_eq!(a, b);
        assert_eq!(cache.len(), 1);

        let forced = cache
            .parse_with("ui@1.0.0", None, Some(VersionSymbol::Exact))
            .unwrap();
        assert_eq!(forced.version_symbol, VersionSymbol::Exact);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_cache_does_not_store_errors() {
        let cache = ReferenceCache::new();
        assert!(cache.parse("@bad").is_err());
        assert!(cache.is_empty());
    }
}
