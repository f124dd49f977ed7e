//! Module versions and version constraints
//!
//! Versions are dotted tuples of up to four numeric components plus an
//! optional pre-release qualifier (`1.2.0-beta`). Constraints are either an
//! exact version, a bracketed range (`[1.0, 2.0)`), or an open lower bound
//! (`1.0+`). This grammar is the module-archive one, not semver, so it is
//! implemented here rather than delegated to the `semver` crate.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Version parse errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Empty version string")]
    Empty,

    #[error("Invalid version component in '{0}'")]
    InvalidComponent(String),

    #[error("Too many version components in '{0}' (at most 4)")]
    TooManyComponents(String),

    #[error("Invalid version constraint '{0}'")]
    InvalidConstraint(String),

    #[error("Reversed version range '{0}'")]
    ReversedRange(String),
}

/// A module version: `major.minor.micro[.update][-qualifier]`
///
/// Missing components default to zero, so `1.2` equals `1.2.0`. A release
/// outranks its own pre-releases: `1.2.0` > `1.2.0-rc1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    major: u64,
    minor: u64,
    micro: u64,
    update: u64,
    qualifier: Option<String>,
}

impl Version {
    /// Create a release version with no update component or qualifier
    pub fn new(major: u64, minor: u64, micro: u64) -> Self {
        Self {
            major,
            minor,
            micro,
            update: 0,
            qualifier: None,
        }
    }

    /// Set the fourth (update) component
    pub fn with_update(mut self, update: u64) -> Self {
        self.update = update;
        self
    }

    /// Set the pre-release qualifier
    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn micro(&self) -> u64 {
        self.micro
    }

    pub fn update(&self) -> u64 {
        self.update
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    fn numeric(&self) -> (u64, u64, u64, u64) {
        (self.major, self.minor, self.micro, self.update)
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::new(0, 0, 0)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.numeric().cmp(&other.numeric()).then_with(|| {
            match (&self.qualifier, &other.qualifier) {
                (None, None) => Ordering::Equal,
                // A release sorts above any of its pre-releases
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            }
        })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(VersionError::Empty);
        }

        // The qualifier starts at the first '-' and may itself contain dots
        let (numeric, qualifier) = match s.find('-') {
            Some(pos) => {
                let q = &s[pos + 1..];
                if q.is_empty() {
                    return Err(VersionError::InvalidComponent(s.to_string()));
                }
                (&s[..pos], Some(q.to_string()))
            }
            None => (s, None),
        };

        if numeric.is_empty() {
            return Err(VersionError::InvalidComponent(s.to_string()));
        }

        let parts: Vec<&str> = numeric.split('.').collect();
        if parts.len() > 4 {
            return Err(VersionError::TooManyComponents(s.to_string()));
        }

        let mut components = [0u64; 4];
        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(VersionError::InvalidComponent(s.to_string()));
            }
            components[i] = part
                .parse::<u64>()
                .map_err(|_| VersionError::InvalidComponent(s.to_string()))?;
        }

        Ok(Version {
            major: components[0],
            minor: components[1],
            micro: components[2],
            update: components[3],
            qualifier,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if self.update > 0 {
            write!(f, ".{}", self.update)?;
        }
        if let Some(q) = &self.qualifier {
            write!(f, "-{}", q)?;
        }
        Ok(())
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// A constraint over module versions
///
/// Grammar:
/// - `1.2.0` is an exact version
/// - `[1.0, 2.0)` is a range; either bound may be inclusive (`[`/`]`) or
///   exclusive (`(`/`)`)
/// - `1.0+` is an open lower bound with no upper limit
/// - `*` accepts any version and behaves as `0+`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionConstraint {
    Exact(Version),
    AtLeast(Version),
    Range {
        lower: Version,
        lower_inclusive: bool,
        upper: Version,
        upper_inclusive: bool,
    },
}

impl VersionConstraint {
    /// The constraint matched by every version (`*`)
    pub fn any() -> Self {
        VersionConstraint::AtLeast(Version::default())
    }

    /// Closed-open range `[lower, upper)`, the common import shape
    pub fn range(lower: Version, upper: Version) -> Result<Self, VersionError> {
        if lower > upper {
            return Err(VersionError::ReversedRange(format!(
                "[{}, {})",
                lower, upper
            )));
        }
        Ok(VersionConstraint::Range {
            lower,
            lower_inclusive: true,
            upper,
            upper_inclusive: false,
        })
    }

    /// Test whether `version` satisfies this constraint
    pub fn contains(&self, version: &Version) -> bool {
        match self {
            VersionConstraint::Exact(v) => version == v,
            VersionConstraint::AtLeast(v) => version >= v,
            VersionConstraint::Range {
                lower,
                lower_inclusive,
                upper,
                upper_inclusive,
            } => {
                let above = if *lower_inclusive {
                    version >= lower
                } else {
                    version > lower
                };
                let below = if *upper_inclusive {
                    version <= upper
                } else {
                    version < upper
                };
                above && below
            }
        }
    }

    /// Intersect two constraints; `None` when they are disjoint
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        use VersionConstraint::*;
        match (self, other) {
            (Exact(v), c) | (c, Exact(v)) => {
                if c.contains(v) {
                    Some(Exact(v.clone()))
                } else {
                    None
                }
            }
            (AtLeast(a), AtLeast(b)) => Some(AtLeast(a.max(b).clone())),
            (
                AtLeast(a),
                Range {
                    lower,
                    lower_inclusive,
                    upper,
                    upper_inclusive,
                },
            )
            | (
                Range {
                    lower,
                    lower_inclusive,
                    upper,
                    upper_inclusive,
                },
                AtLeast(a),
            ) => {
                let (lo, lo_inc) = if a > lower {
                    (a.clone(), true)
                } else {
                    (lower.clone(), *lower_inclusive)
                };
                Self::normalized_range(lo, lo_inc, upper.clone(), *upper_inclusive)
            }
            (
                Range {
                    lower: l1,
                    lower_inclusive: li1,
                    upper: u1,
                    upper_inclusive: ui1,
                },
                Range {
                    lower: l2,
                    lower_inclusive: li2,
                    upper: u2,
                    upper_inclusive: ui2,
                },
            ) => {
                let (lo, lo_inc) = match l1.cmp(l2) {
                    Ordering::Greater => (l1.clone(), *li1),
                    Ordering::Less => (l2.clone(), *li2),
                    Ordering::Equal => (l1.clone(), *li1 && *li2),
                };
                let (hi, hi_inc) = match u1.cmp(u2) {
                    Ordering::Less => (u1.clone(), *ui1),
                    Ordering::Greater => (u2.clone(), *ui2),
                    Ordering::Equal => (u1.clone(), *ui1 && *ui2),
                };
                Self::normalized_range(lo, lo_inc, hi, hi_inc)
            }
        }
    }

    /// Build a range, collapsing a single-point range to `Exact` and
    /// rejecting an empty one
    fn normalized_range(
        lower: Version,
        lower_inclusive: bool,
        upper: Version,
        upper_inclusive: bool,
    ) -> Option<Self> {
        match lower.cmp(&upper) {
            Ordering::Greater => None,
            Ordering::Equal => {
                if lower_inclusive && upper_inclusive {
                    Some(VersionConstraint::Exact(lower))
                } else {
                    None
                }
            }
            Ordering::Less => Some(VersionConstraint::Range {
                lower,
                lower_inclusive,
                upper,
                upper_inclusive,
            }),
        }
    }
}

impl Default for VersionConstraint {
    fn default() -> Self {
        VersionConstraint::any()
    }
}

impl FromStr for VersionConstraint {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(VersionError::Empty);
        }

        if s == "*" {
            return Ok(VersionConstraint::any());
        }

        if let Some(prefix) = s.strip_suffix('+') {
            return Ok(VersionConstraint::AtLeast(prefix.parse()?));
        }

        let first = s.chars().next().unwrap_or_default();
        if first == '[' || first == '(' {
            let last = s.chars().last().unwrap_or_default();
            if last != ']' && last != ')' {
                return Err(VersionError::InvalidConstraint(s.to_string()));
            }
            let interior = &s[1..s.len() - 1];
            let mut parts = interior.splitn(2, ',');
            let (lo, hi) = match (parts.next(), parts.next()) {
                (Some(lo), Some(hi)) => (lo, hi),
                _ => return Err(VersionError::InvalidConstraint(s.to_string())),
            };
            let lower: Version = lo.parse()?;
            let upper: Version = hi.parse()?;
            if lower > upper {
                return Err(VersionError::ReversedRange(s.to_string()));
            }
            return Ok(VersionConstraint::Range {
                lower,
                lower_inclusive: first == '[',
                upper,
                upper_inclusive: last == ']',
            });
        }

        Ok(VersionConstraint::Exact(s.parse()?))
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionConstraint::Exact(v) => write!(f, "{}", v),
            VersionConstraint::AtLeast(v) => write!(f, "{}+", v),
            VersionConstraint::Range {
                lower,
                lower_inclusive,
                upper,
                upper_inclusive,
            } => {
                let open = if *lower_inclusive { '[' } else { '(' };
                let close = if *upper_inclusive { ']' } else { ')' };
                write!(f, "{}{}, {}{}", open, lower, upper, close)
            }
        }
    }
}

impl Serialize for VersionConstraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionConstraint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}
