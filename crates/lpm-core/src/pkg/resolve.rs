//! Version resolution against the locally published version set.

use super::reference::{VersionSymbol, LATEST};
use semver::{Version, VersionReq};
use std::fmt;

/// What a consumer asks for when resolving a package version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRequest {
    /// Highest published version (`*`).
    Latest,
    /// An npm-style range matched against published versions.
    Range(String),
    /// A literal version, returned without consulting published versions.
    ExactPin(String),
}

impl VersionRequest {
    /// Interpret a raw range string.
    ///
    /// `!x` pins `x`; `latest` under any symbol means [`Self::Latest`].
    #[must_use]
    pub fn parse(range: &str) -> Self {
        let range = range.trim();
        let unsymboled = range.strip_prefix(['^', '~', '!']).unwrap_or(range);
        if unsymboled == LATEST || unsymboled.is_empty() {
            return Self::Latest;
        }
        if let Some(pinned) = range.strip_prefix('!') {
            return Self::ExactPin(pinned.to_string());
        }
        Self::Range(range.to_string())
    }

    /// Build a request from a symbol and a symbol-less version.
    ///
    /// The symbol only prefixes plain versions; explicit ranges such as
    /// `>=1.0.0 <2.0.0` are taken as written.
    #[must_use]
    pub fn from_parts(symbol: VersionSymbol, version: &str) -> Self {
        if version == LATEST {
            return Self::Latest;
        }
        if symbol == VersionSymbol::Exact {
            return Self::ExactPin(version.to_string());
        }
        if version.starts_with(|c: char| c.is_ascii_digit()) {
            Self::Range(format!("{symbol}{version}"))
        } else {
            Self::Range(version.to_string())
        }
    }

    /// Pick the version to use from `known`.
    ///
    /// Returns the string exactly as it appears in `known`, except for
    /// [`Self::ExactPin`] which returns the pinned literal unconditionally.
    #[must_use]
    pub fn highest(&self, known: &[String]) -> Option<String> {
        match self {
            Self::ExactPin(version) => Some(version.clone()),
            Self::Latest => highest_latest(known),
            Self::Range(range) => highest_in_range(known, range),
        }
    }
}

impl fmt::Display for VersionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str(LATEST),
            Self::Range(range) => f.write_str(range),
            Self::ExactPin(version) => write!(f, "!{version}"),
        }
    }
}

/// Highest version in `known` satisfying `range`, or `None`.
///
/// `!x` returns `x` regardless of `known`; `latest` behaves like `*`.
#[must_use]
pub fn highest_satisfying(known: &[String], range: &str) -> Option<String> {
    VersionRequest::parse(range).highest(known)
}

/// Parse `known` into semver versions, highest first, remembering the original text.
fn sorted_desc(known: &[String]) -> Vec<(Version, &str)> {
    let mut parsed: Vec<(Version, &str)> = known
        .iter()
        .filter_map(|v| Version::parse(v.trim()).ok().map(|p| (p, v.as_str())))
        .collect();
    parsed.sort_by(|a, b| b.0.cmp(&a.0));
    parsed
}

fn highest_latest(known: &[String]) -> Option<String> {
    let parsed = sorted_desc(known);
    parsed
        .iter()
        .find(|(v, _)| v.pre.is_empty())
        .or_else(|| parsed.first())
        .map(|(_, original)| (*original).to_string())
}

fn highest_in_range(known: &[String], range: &str) -> Option<String> {
    let reqs: Vec<VersionReq> = range
        .split("||")
        .map(str::trim)
        .filter(|alt| !alt.is_empty())
        .filter_map(parse_range)
        .collect();
    if reqs.is_empty() {
        return None;
    }

    sorted_desc(known)
        .into_iter()
        .find(|(version, _)| reqs.iter().any(|req| req.matches(version)))
        .map(|(_, original)| original.to_string())
}

/// Parse a single npm-style range into a semver requirement.
///
/// Handles:
/// - caret, tilde and comparator ranges: `^1.0.0`, `~1.0.0`, `>=1.0.0`
/// - space-separated comparators: `>= 2.1.2 < 3.0.0`
/// - hyphen ranges: `1.0.0 - 2.0.0`
/// - x-ranges: `1.x`, `1.0.x`, `*`
/// - bare versions, which match exactly
fn parse_range(range: &str) -> Option<VersionReq> {
    let range = range.trim();

    if let Some((start, end)) = parse_hyphen_range(range) {
        return VersionReq::parse(&format!(">={start}, <={end}")).ok();
    }

    if is_x_range(range) {
        return VersionReq::parse(&convert_x_range(range)).ok();
    }

    if Version::parse(range).is_ok() {
        return VersionReq::parse(&format!("={range}")).ok();
    }

    // "1.2" is 1.2.x in npm
    if is_major_minor(range) {
        return VersionReq::parse(&format!("~{range}")).ok();
    }

    VersionReq::parse(&convert_space_separated_comparators(range)).ok()
}

/// Whether a numeric part of the version core is a wildcard.
///
/// Prerelease and build tags (`1.0.0-next.1`) are ignored.
fn is_x_range(range: &str) -> bool {
    let core = range
        .trim_start_matches(|c: char| matches!(c, '^' | '~' | '=' | '<' | '>' | 'v'))
        .split(['-', '+'])
        .next()
        .unwrap_or_default();
    core.split('.')
        .any(|part| matches!(part, "x" | "X" | "*"))
}

fn is_major_minor(range: &str) -> bool {
    let mut parts = range.split('.');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(major), Some(minor), None)
            if !major.is_empty()
                && !minor.is_empty()
                && major.chars().all(|c| c.is_ascii_digit())
                && minor.chars().all(|c| c.is_ascii_digit())
    )
}

fn parse_hyphen_range(range: &str) -> Option<(&str, &str)> {
    let (start, end) = range.split_once(" - ")?;
    let (start, end) = (start.trim(), end.trim());
    (!start.is_empty() && !end.is_empty()).then_some((start, end))
}

/// Join space-separated comparators with commas.
///
/// An operator standing alone (`>= 2.1.2`) is glued to the version after it.
fn convert_space_separated_comparators(range: &str) -> String {
    let mut comparators: Vec<String> = Vec::new();
    let mut pending_op = String::new();

    for token in range.split_whitespace() {
        if token.chars().any(|c| c.is_ascii_digit()) {
            comparators.push(format!("{pending_op}{token}"));
            pending_op.clear();
        } else {
            pending_op.push_str(token);
        }
    }
    if !pending_op.is_empty() {
        comparators.push(pending_op);
    }

    comparators.join(", ")
}

fn convert_x_range(range: &str) -> String {
    let range = range.trim();

    if range == "*" || range == "x" || range == "X" {
        return ">=0.0.0".to_string();
    }

    let parts: Vec<&str> = range.split('.').collect();
    match parts.as_slice() {
        [major, "x" | "X" | "*"] | [major, "x" | "X" | "*", "x" | "X" | "*"] => {
            if let Ok(m) = major.parse::<u64>() {
                return format!(">={m}.0.0, <{}.0.0", m + 1);
            }
        }
        [major, minor, "x" | "X" | "*"] => {
            if let (Ok(m), Ok(n)) = (major.parse::<u64>(), minor.parse::<u64>()) {
                return format!(">={m}.{n}.0, <{m}.{}.0", n + 1);
            }
        }
        _ => {}
    }

    range.replace(['x', 'X'], "0")
}
