//! Semantic versions, bump classification and range matching.
//!
//! Ordering follows semver precedence: build metadata is ignored and a
//! prerelease sorts below its release (`1.0.0-rc.1 < 1.0.0`).
//!
//! Ranges accept exact versions, `=`, `^`, `~`, `>`, `>=`, `<`, `<=`, the
//! wildcards `*`/`x`, partial versions (`1.2`), hyphen ranges
//! (`1.2.3 - 2.0.0`), space-separated comparator sets (all must hold) and
//! `||` alternatives (any may hold).

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GateError, Result};

#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
    pub build: Option<String>,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: None,
            build: None,
        }
    }

    /// Parse `MAJOR.MINOR.PATCH[-PRERELEASE][+BUILD]`, tolerating a leading
    /// `v` or `=`.
    pub fn parse(input: &str) -> Result<Self> {
        let partial = Partial::parse(input)?;
        match (partial.major, partial.minor, partial.patch) {
            (Some(major), Some(minor), Some(patch)) => Ok(Self {
                major,
                minor,
                patch,
                prerelease: partial.prerelease,
                build: partial.build,
            }),
            _ => Err(invalid(input, "expected MAJOR.MINOR.PATCH")),
        }
    }

    /// Like [`parse`](Self::parse) but fills missing minor/patch with zero
    /// (`"1.2"` -> `1.2.0`). Used for registry tags.
    pub fn parse_lenient(input: &str) -> Result<Self> {
        let partial = Partial::parse(input)?;
        let major = partial
            .major
            .ok_or_else(|| invalid(input, "wildcards are not a version"))?;
        Ok(Self {
            major,
            minor: partial.minor.unwrap_or(0),
            patch: partial.patch.unwrap_or(0),
            prerelease: partial.prerelease,
            build: partial.build,
        })
    }

    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }

    fn same_triple(&self, other: &Version) -> bool {
        self.major == other.major && self.minor == other.minor && self.patch == other.patch
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => compare_prerelease(a, b),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.prerelease {
            write!(f, "-{}", pre)?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{}", build)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        Version::parse(s)
    }
}

/// Numeric identifiers compare numerically and sort below alphanumeric ones;
/// a shorter identifier list sorts first when all shared fields are equal.
fn compare_prerelease(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(n), Ok(m)) => n.cmp(&m),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn invalid(input: &str, why: &str) -> GateError {
    GateError::Validation(format!("invalid version '{}': {}", input, why))
}

/// Major, minor or patch bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    Major,
    Minor,
    Patch,
}

impl UpdateType {
    /// Bump type from `from` to `to`; `None` unless `to` is newer.
    pub fn classify(from: &Version, to: &Version) -> Option<UpdateType> {
        if to <= from {
            return None;
        }
        Some(if to.major != from.major {
            UpdateType::Major
        } else if to.minor != from.minor {
            UpdateType::Minor
        } else {
            UpdateType::Patch
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateType::Major => "major",
            UpdateType::Minor => "minor",
            UpdateType::Patch => "patch",
        }
    }
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compare two version strings.
pub fn compare_versions(a: &str, b: &str) -> Result<Ordering> {
    Ok(Version::parse(a)?.cmp(&Version::parse(b)?))
}

/// Whether `version` satisfies `range`.
pub fn satisfies_range(version: &str, range: &str) -> Result<bool> {
    let version = Version::parse(version)?;
    let range = VersionRange::parse(range)?;
    Ok(range.matches(&version))
}

// ---------------------------------------------------------------------------
// Partial versions
// ---------------------------------------------------------------------------

/// A version whose trailing components may be missing or wildcards.
#[derive(Debug, Clone, Default)]
struct Partial {
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
    prerelease: Option<String>,
    build: Option<String>,
}

impl Partial {
    fn parse(input: &str) -> Result<Self> {
        let s = input.trim();
        let s = s.strip_prefix('=').unwrap_or(s).trim_start();
        let s = s
            .strip_prefix('v')
            .or_else(|| s.strip_prefix('V'))
            .unwrap_or(s);
        if s.is_empty() {
            return Err(invalid(input, "empty"));
        }

        let (rest, build) = match s.split_once('+') {
            Some((r, b)) => (r, Some(b)),
            None => (s, None),
        };
        let (core, prerelease) = match rest.split_once('-') {
            Some((c, p)) => (c, Some(p)),
            None => (rest, None),
        };
        for (label, ids) in [("prerelease", prerelease), ("build", build)] {
            if let Some(ids) = ids {
                let ok = ids.split('.').all(|id| {
                    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
                });
                if !ok {
                    return Err(invalid(input, &format!("malformed {} identifiers", label)));
                }
            }
        }

        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() > 3 {
            return Err(invalid(input, "too many components"));
        }
        let mut nums = [None; 3];
        let mut wildcard_seen = false;
        for (i, part) in parts.iter().enumerate() {
            if matches!(*part, "*" | "x" | "X") {
                wildcard_seen = true;
                continue;
            }
            if wildcard_seen {
                return Err(invalid(input, "number after wildcard"));
            }
            nums[i] = Some(
                part.parse::<u64>()
                    .map_err(|_| invalid(input, &format!("'{}' is not a number", part)))?,
            );
        }
        let complete = nums.iter().all(Option::is_some);
        if prerelease.is_some() && !complete {
            return Err(invalid(input, "prerelease on a partial version"));
        }
        Ok(Self {
            major: nums[0],
            minor: nums[1],
            patch: nums[2],
            prerelease: prerelease.map(str::to_string),
            build: build.map(str::to_string),
        })
    }

    fn is_complete(&self) -> bool {
        self.major.is_some() && self.minor.is_some() && self.patch.is_some()
    }

    /// Missing components filled with zero.
    fn floor(&self) -> Version {
        Version {
            major: self.major.unwrap_or(0),
            minor: self.minor.unwrap_or(0),
            patch: self.patch.unwrap_or(0),
            prerelease: self.prerelease.clone(),
            build: None,
        }
    }

    /// First version past everything this partial covers
    /// (`1` -> `2.0.0`, `1.2` -> `1.3.0`).
    fn ceiling(&self) -> Result<Option<Version>> {
        Ok(match (self.major, self.minor) {
            (Some(m), None) => Some(Version::new(bump(m)?, 0, 0)),
            (Some(m), Some(n)) => Some(Version::new(m, bump(n)?, 0)),
            _ => None,
        })
    }
}

/// Next component value for an exclusive upper bound.
fn bump(n: u64) -> Result<u64> {
    n.checked_add(1)
        .ok_or_else(|| GateError::Validation("range bound out of range".to_string()))
}

// ---------------------------------------------------------------------------
// Ranges
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, PartialEq)]
struct Comparator {
    op: Op,
    version: Version,
}

impl Comparator {
    fn new(op: Op, version: Version) -> Self {
        Self { op, version }
    }

    fn matches(&self, v: &Version) -> bool {
        match self.op {
            Op::Eq => v == &self.version,
            Op::Gt => v > &self.version,
            Op::Gte => v >= &self.version,
            Op::Lt => v < &self.version,
            Op::Lte => v <= &self.version,
        }
    }
}

/// A parsed version range: alternatives of comparator sets.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionRange {
    alternatives: Vec<Vec<Comparator>>,
}

impl VersionRange {
    pub fn parse(input: &str) -> Result<Self> {
        let alternatives = input
            .split("||")
            .map(parse_set)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { alternatives })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|set| set_matches(set, version))
    }
}

impl FromStr for VersionRange {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        VersionRange::parse(s)
    }
}

/// A prerelease only satisfies a set that mentions a prerelease of the same
/// `major.minor.patch`.
fn set_matches(set: &[Comparator], v: &Version) -> bool {
    if !set.iter().all(|c| c.matches(v)) {
        return false;
    }
    if v.is_prerelease() {
        return set
            .iter()
            .any(|c| c.version.is_prerelease() && c.version.same_triple(v));
    }
    true
}

const OPERATORS: &[&str] = &[">=", "<=", ">", "<", "=", "^", "~"];

fn parse_set(input: &str) -> Result<Vec<Comparator>> {
    let raw: Vec<&str> = input.split_whitespace().collect();

    // Hyphen range: "A - B".
    if raw.len() == 3 && raw[1] == "-" {
        let low = Partial::parse(raw[0])?;
        let high = Partial::parse(raw[2])?;
        let mut set = Vec::new();
        if low.major.is_some() {
            set.push(Comparator::new(Op::Gte, low.floor()));
        }
        if high.is_complete() {
            set.push(Comparator::new(Op::Lte, high.floor()));
        } else if let Some(ceiling) = high.ceiling()? {
            set.push(Comparator::new(Op::Lt, ceiling));
        }
        return Ok(set);
    }

    // Re-attach operators separated from their version by whitespace.
    let mut tokens: Vec<String> = Vec::new();
    let mut pending_op: Option<&str> = None;
    for tok in raw {
        if OPERATORS.contains(&tok) {
            if pending_op.is_some() {
                return Err(GateError::Validation(format!(
                    "invalid range '{}': dangling operator",
                    input.trim()
                )));
            }
            pending_op = Some(tok);
            continue;
        }
        tokens.push(match pending_op.take() {
            Some(op) => format!("{}{}", op, tok),
            None => tok.to_string(),
        });
    }
    if pending_op.is_some() {
        return Err(GateError::Validation(format!(
            "invalid range '{}': dangling operator",
            input.trim()
        )));
    }

    let mut set = Vec::new();
    for token in tokens {
        set.extend(expand(&token)?);
    }
    Ok(set)
}

fn expand(token: &str) -> Result<Vec<Comparator>> {
    let (op, rest) = OPERATORS
        .iter()
        .find_map(|op| token.strip_prefix(op).map(|rest| (*op, rest)))
        .unwrap_or(("", token));
    let p = Partial::parse(rest)?;
    let Some(major) = p.major else {
        // Wildcard: matches everything.
        return Ok(Vec::new());
    };
    let low = p.floor();

    let set = match op {
        "" | "=" => match p.ceiling()? {
            None => vec![Comparator::new(Op::Eq, low)],
            Some(_) if p.is_complete() => vec![Comparator::new(Op::Eq, low)],
            Some(high) => vec![Comparator::new(Op::Gte, low), Comparator::new(Op::Lt, high)],
        },
        "^" => {
            let high = match p.minor {
                Some(minor) if major == 0 => Version::new(0, bump(minor)?, 0),
                _ => Version::new(bump(major)?, 0, 0),
            };
            vec![Comparator::new(Op::Gte, low), Comparator::new(Op::Lt, high)]
        }
        "~" => {
            let high = match p.minor {
                Some(minor) => Version::new(major, bump(minor)?, 0),
                None => Version::new(bump(major)?, 0, 0),
            };
            vec![Comparator::new(Op::Gte, low), Comparator::new(Op::Lt, high)]
        }
        ">" => match p.ceiling()? {
            Some(high) if !p.is_complete() => vec![Comparator::new(Op::Gte, high)],
            _ => vec![Comparator::new(Op::Gt, low)],
        },
        ">=" => vec![Comparator::new(Op::Gte, low)],
        "<" => vec![Comparator::new(Op::Lt, low)],
        "<=" => match p.ceiling()? {
            Some(high) if !p.is_complete() => vec![Comparator::new(Op::Lt, high)],
            _ => vec![Comparator::new(Op::Lte, low)],
        },
        _ => unreachable!("operator list is fixed"),
    };
    Ok(set)
}
