//! Version types based on [Semantic Versioning 2.0.0](https://semver.org/spec/v2.0.0.html), with
//! range matching that follows the shorthand rules popularized by
//! [node-semver](https://github.com/npm/node-semver#ranges).
//!
//! ```text
//! version        := [ws] ["v" | "="]* major "." minor "." patch ["-" pre-release] ["+" build] [ws]
//! major          := numeric
//! minor          := numeric
//! patch          := numeric
//! numeric        := /0|[1-9][0-9]*/
//! pre-release    := pre-identifier ["." pre-identifier]*
//! pre-identifier := numeric | /[0-9]*[a-zA-Z-][a-zA-Z0-9-]*/
//! build          := /[0-9A-Za-z-]+/ ["." /[0-9A-Za-z-]+/]*
//!
//! short-hash     := /[0-9a-f]{7}/
//! ```
//!
//! Development builds of buildx report a short commit hash instead of a version. Those are
//! represented by [`ToolVersion::ShortHash`], which satisfies every range.

mod range;

use std::{cmp::Ordering, fmt, str::FromStr, sync::LazyLock};

use regex::Regex;

pub use range::*;

#[derive(Debug, PartialEq, Eq)]
pub struct InvalidVersion(String);

impl InvalidVersion {
    pub fn input(&self) -> &str {
        &self.0
    }
}

impl std::error::Error for InvalidVersion {}

impl fmt::Display for InvalidVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid version: {:?}", self.0)
    }
}

pub(crate) const NUMERIC: &str = r"0|[1-9][0-9]*";
pub(crate) const PRE_RELEASE: &str = r"(?:0|[1-9][0-9]*|[0-9]*[a-zA-Z-][a-zA-Z0-9-]*)(?:\.(?:0|[1-9][0-9]*|[0-9]*[a-zA-Z-][a-zA-Z0-9-]*))*";
pub(crate) const BUILD: &str = r"[0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*";

static VERSION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^({NUMERIC})\.({NUMERIC})\.({NUMERIC})(?:-({PRE_RELEASE}))?(?:\+({BUILD}))?$"
    ))
    .unwrap()
});

static SHORT_HASH_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9a-f]{7}$").unwrap());

/// Returns true if `value` is exactly 7 lowercase hexadecimal characters.
pub fn is_short_hash(value: &str) -> bool {
    SHORT_HASH_REGEX.is_match(value)
}

/// Strips surrounding whitespace and any leading `v` or `=` characters.
pub(crate) fn clean(raw: &str) -> &str {
    raw.trim().trim_start_matches(['v', '=']).trim_start()
}

pub(crate) fn parse_numeric(value: &str, raw: &str) -> Result<u64, InvalidVersion> {
    value.parse().map_err(|_| InvalidVersion(raw.to_owned()))
}

/// A single dot-separated pre-release identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    Numeric(u64),
    AlphaNumeric(String),
}

impl Identifier {
    fn parse(value: &str, raw: &str) -> Result<Self, InvalidVersion> {
        if value.bytes().all(|b| b.is_ascii_digit()) {
            parse_numeric(value, raw).map(Identifier::Numeric)
        } else {
            Ok(Identifier::AlphaNumeric(value.to_owned()))
        }
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Identifier::Numeric(a), Identifier::Numeric(b)) => a.cmp(b),
            (Identifier::Numeric(_), Identifier::AlphaNumeric(_)) => Ordering::Less,
            (Identifier::AlphaNumeric(_), Identifier::Numeric(_)) => Ordering::Greater,
            (Identifier::AlphaNumeric(a), Identifier::AlphaNumeric(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Numeric(value) => value.fmt(f),
            Identifier::AlphaNumeric(value) => f.write_str(value),
        }
    }
}

pub(crate) fn parse_pre_release(value: &str, raw: &str) -> Result<Vec<Identifier>, InvalidVersion> {
    value
        .split('.')
        .map(|identifier| Identifier::parse(identifier, raw))
        .collect()
}

pub(crate) fn parse_build(value: &str) -> Vec<String> {
    value.split('.').map(str::to_owned).collect()
}

/// A semantic version. Build metadata is preserved for display but ignored when comparing.
#[derive(Debug, Clone)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Vec<Identifier>,
    pub build: Vec<String>,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: Vec::new(),
            build: Vec::new(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, InvalidVersion> {
        let captures = VERSION_REGEX
            .captures(clean(raw))
            .ok_or_else(|| InvalidVersion(raw.to_owned()))?;

        // NOTE: Groups 1 to 3 always participate in a match.
        Ok(Self {
            major: parse_numeric(&captures[1], raw)?,
            minor: parse_numeric(&captures[2], raw)?,
            patch: parse_numeric(&captures[3], raw)?,
            pre: captures
                .get(4)
                .map(|m| parse_pre_release(m.as_str(), raw))
                .transpose()?
                .unwrap_or_default(),
            build: captures
                .get(5)
                .map(|m| parse_build(m.as_str()))
                .unwrap_or_default(),
        })
    }

    pub fn is_pre_release(&self) -> bool {
        !self.pre.is_empty()
    }

    /// Returns true if both versions share the same `major.minor.patch` triple.
    pub fn same_core(&self, other: &Version) -> bool {
        (self.major, self.minor, self.patch) == (other.major, other.minor, other.patch)
    }

    pub fn satisfies(&self, range: &Range) -> bool {
        range.is_satisfied_by(self)
    }

    fn cmp_pre(&self, other: &Self) -> Ordering {
        match (self.pre.is_empty(), other.pre.is_empty()) {
            (true, true) => Ordering::Equal,
            // A version without pre-release identifiers has a higher precedence.
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self.pre.cmp(&other.pre),
        }
    }
}

/// Compares two versions by precedence, returning -1, 0 or 1.
pub fn compare(a: &Version, b: &Version) -> i8 {
    match a.cmp(b) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| self.cmp_pre(other))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl FromStr for Version {
    type Err = InvalidVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        for (index, identifier) in self.pre.iter().enumerate() {
            f.write_str(if index == 0 { "-" } else { "." })?;
            identifier.fmt(f)?;
        }
        for (index, identifier) in self.build.iter().enumerate() {
            f.write_str(if index == 0 { "+" } else { "." })?;
            f.write_str(identifier)?;
        }
        Ok(())
    }
}

/// The version reported by a tool, which is either a semantic version or, for development builds,
/// a short commit hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolVersion {
    Semantic(Version),
    ShortHash(String),
}

impl ToolVersion {
    pub fn parse(raw: &str) -> Result<Self, InvalidVersion> {
        match Version::parse(raw) {
            Ok(version) => Ok(ToolVersion::Semantic(version)),
            Err(error) => {
                let trimmed = raw.trim();
                if is_short_hash(trimmed) {
                    Ok(ToolVersion::ShortHash(trimmed.to_owned()))
                } else {
                    Err(error)
                }
            }
        }
    }

    /// Short hashes satisfy every range.
    pub fn satisfies(&self, range: &Range) -> bool {
        match self {
            ToolVersion::Semantic(version) => version.satisfies(range),
            ToolVersion::ShortHash(_) => true,
        }
    }
}

impl PartialOrd for ToolVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (ToolVersion::Semantic(a), ToolVersion::Semantic(b)) => Some(a.cmp(b)),
            (ToolVersion::ShortHash(a), ToolVersion::ShortHash(b)) if a == b => {
                Some(Ordering::Equal)
            }
            _ => None,
        }
    }
}

impl FromStr for ToolVersion {
    type Err = InvalidVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolVersion::Semantic(version) => version.fmt(f),
            ToolVersion::ShortHash(hash) => f.write_str(hash),
        }
    }
}

/// Checks a raw version against a raw range. A version that can not be parsed does not satisfy any
/// range, while a malformed range is an error.
pub fn satisfies(version: &str, range: &str) -> Result<bool, InvalidRange> {
    let range = Range::parse(range)?;
    Ok(ToolVersion::parse(version)
        .map(|version| version.satisfies(&range))
        .unwrap_or(false))
}
