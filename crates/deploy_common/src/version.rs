//! Release versions
//!
//! Release directories under `app/` are named `MAJOR.MINOR.PATCH`. Ordering is
//! numeric per component, so `10.0.1` sorts above `2.0.0`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

static VERSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.\d+\.\d+$").expect("version pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    /// Parse a strict `MAJOR.MINOR.PATCH` string
    pub fn parse(s: &str) -> Option<Self> {
        if !VERSION_PATTERN.is_match(s) {
            return None;
        }
        let mut parts = s.split('.').map(|p| p.parse::<u64>());
        let major = parts.next()?.ok()?;
        let minor = parts.next()?.ok()?;
        let patch = parts.next()?.ok()?;
        Some(Self {
            major,
            minor,
            patch,
        })
    }

    pub fn is_valid(s: &str) -> bool {
        Self::parse(s).is_some()
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Pick the highest version among directory names, ignoring anything that
/// is not a strict version. Returns the original name so it can be used as
/// a path segment unchanged.
pub fn select_latest<I, S>(names: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .filter_map(|name| {
            let name = name.as_ref();
            let parsed = Version::parse(name);
            if parsed.is_none() && VERSION_PATTERN.is_match(name) {
                tracing::warn!("skipping {}: version component out of range", name);
            }
            parsed.map(|v| (v, name.to_string()))
        })
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, name)| name)
}
