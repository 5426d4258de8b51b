//! Versions, update modes and version constraints.
//!
//! Package versions are handled as [`semver::Version`] values, but the feeds
//! we talk to publish NuGet-style version strings that may have one, two or
//! four numeric components. [`parse_version`] smooths those over.
//!
//! A [`VersionConstraint`] describes how far a resolved version may drift
//! from a reference version. It is written as one or two tokens, e.g.
//! `Current` (anything at or above the reference) or `Current,NextMajor`
//! (anything from the reference up to, but excluding, the next major
//! version).

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error as ThisError;

pub use semver::Version;

/// How a dependency is allowed to move when it is restored or updated.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// Track newer compatible versions.
    Float,

    /// Stay pinned to the declared version.
    #[default]
    Fixed,
}

impl UpdateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Fixed => "fixed",
        }
    }
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error returned when an update mode string is not recognized.
#[derive(Debug, ThisError)]
#[error("unrecognized update mode `{0}` (expected `float` or `fixed`)")]
pub struct UpdateModeParseError(pub String);

impl FromStr for UpdateMode {
    type Err = UpdateModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "float" => Ok(Self::Float),
            "fixed" => Ok(Self::Fixed),
            _ => Err(UpdateModeParseError(s.to_owned())),
        }
    }
}

/// Parse a package version string leniently.
///
/// `1` and `1.2` are padded to three components, a leading `v` is ignored,
/// and a fourth numeric component (`1.2.3.4`) is kept as build metadata so
/// that it still participates in ordering. A zero fourth component is
/// dropped, since `1.2.3.0` and `1.2.3` name the same package.
pub fn parse_version(text: &str) -> Result<Version, semver::Error> {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    let split_at = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, rest) = trimmed.split_at(split_at);
    let parts: Vec<&str> = core.split('.').collect();

    let normalized = match parts.len() {
        1 => format!("{}.0.0{}", core, rest),
        2 => format!("{}.0{}", core, rest),
        4 => {
            let head = parts[..3].join(".");
            let revision = parts[3];

            if revision.trim_start_matches('0').is_empty() || rest.contains('+') {
                format!("{}{}", head, rest)
            } else {
                format!("{}{}+{}", head, rest, revision)
            }
        }
        _ => trimmed.to_owned(),
    };

    Version::parse(&normalized)
}

/// One end of a version constraint, computed relative to a reference version.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum VersionToken {
    Current,
    NextPatch,
    NextMinor,
    NextMajor,
}

impl VersionToken {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "Current",
            Self::NextPatch => "NextPatch",
            Self::NextMinor => "NextMinor",
            Self::NextMajor => "NextMajor",
        }
    }

    fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "current" => Some(Self::Current),
            "nextpatch" => Some(Self::NextPatch),
            "nextminor" => Some(Self::NextMinor),
            "nextmajor" => Some(Self::NextMajor),
            _ => None,
        }
    }

    /// Compute the boundary version this token denotes for `reference`.
    pub fn apply(&self, reference: &Version) -> Version {
        match self {
            Self::Current => reference.clone(),
            Self::NextPatch => Version::new(reference.major, reference.minor, reference.patch + 1),
            Self::NextMinor => Version::new(reference.major, reference.minor + 1, 0),
            Self::NextMajor => Version::new(reference.major + 1, 0, 0),
        }
    }
}

/// An error returned when a version constraint string does not match the
/// `<token>[,<token>]` grammar.
#[derive(Debug, ThisError)]
#[error("invalid version constraint `{0}`: expected `<token>` or `<token>,<token>` where a token is one of Current, NextPatch, NextMinor, NextMajor")]
pub struct ConstraintFormatError(pub String);

/// A rule bounding how far a resolved version may drift from a reference
/// version. The minimum is inclusive and the optional maximum is exclusive.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionConstraint {
    pub min: VersionToken,
    pub max: Option<VersionToken>,
}

impl VersionConstraint {
    /// The default constraint for [`UpdateMode::Float`] dependencies.
    pub const DEFAULT_FLOAT: VersionConstraint = VersionConstraint {
        min: VersionToken::Current,
        max: None,
    };

    /// The default constraint for [`UpdateMode::Fixed`] dependencies.
    pub const DEFAULT_FIXED: VersionConstraint = VersionConstraint {
        min: VersionToken::Current,
        max: Some(VersionToken::NextMajor),
    };

    pub fn new(min: VersionToken, max: Option<VersionToken>) -> Self {
        VersionConstraint { min, max }
    }

    /// Parse a constraint such as `Current` or `Current,NextMajor`.
    pub fn parse(text: &str) -> Result<Self, ConstraintFormatError> {
        let mut tokens = text.split(',');
        let bad = || ConstraintFormatError(text.to_owned());

        let min = tokens.next().and_then(VersionToken::parse).ok_or_else(bad)?;

        let max = match tokens.next() {
            Some(t) => Some(VersionToken::parse(t).ok_or_else(bad)?),
            None => None,
        };

        if tokens.next().is_some() {
            return Err(bad());
        }

        Ok(VersionConstraint { min, max })
    }

    /// The acceptable range of versions for the given reference version.
    pub fn spec_for(&self, reference: &Version) -> VersionRange {
        VersionRange {
            min: Some(self.min.apply(reference)),
            max: self.max.map(|t| t.apply(reference)),
        }
    }
}

impl FromStr for VersionConstraint {
    type Err = ConstraintFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VersionConstraint {
    type Error = ConstraintFormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VersionConstraint> for String {
    fn from(value: VersionConstraint) -> Self {
        value.to_string()
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "{},{}", self.min.as_str(), max.as_str()),
            None => f.write_str(self.min.as_str()),
        }
    }
}

/// A concrete range of versions: inclusive minimum, exclusive maximum.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VersionRange {
    pub min: Option<Version>,
    pub max: Option<Version>,
}

impl VersionRange {
    /// A range that accepts every version.
    pub fn any() -> Self {
        VersionRange::default()
    }

    pub fn contains(&self, version: &Version) -> bool {
        if let Some(ref min) = self.min {
            if version < min {
                return false;
            }
        }

        if let Some(ref max) = self.max {
            if version >= max {
                return false;
            }
        }

        true
    }

    /// Pick the highest (or lowest) version in `candidates` that lies inside
    /// the range. Prereleases are skipped unless `allow_prerelease` is set.
    pub fn best<'a, I>(&self, candidates: I, highest: bool, allow_prerelease: bool) -> Option<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        let eligible = candidates
            .into_iter()
            .filter(|v| allow_prerelease || v.pre.is_empty())
            .filter(|v| self.contains(v));

        if highest {
            eligible.max()
        } else {
            eligible.min()
        }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.min, &self.max) {
            (Some(min), Some(max)) => write!(f, "[{}, {})", min, max),
            (Some(min), None) => write!(f, "{}", min),
            (None, Some(max)) => write!(f, "(, {})", max),
            (None, None) => f.write_str("*"),
        }
    }
}
