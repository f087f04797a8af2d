//! Debian package version ordering.
//!
//! Versions have the form `[epoch:]upstream_version[-debian_revision]`. The ordering rules are
//! defined at <https://www.debian.org/doc/debian-policy/ch-controlfields.html#version>.

use crate::{AptRepositoryError, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A parsed and validated Debian package version.
///
/// Equality follows the ordering, so `1.0` and `1.00` are equal even though they are spelled
/// differently. [PackageVersion::to_string] returns the original spelling.
#[derive(Clone, Debug)]
pub struct PackageVersion {
    epoch: Option<u32>,
    upstream_version: String,
    debian_revision: Option<String>,
}

impl PackageVersion {
    /// Construct an instance by parsing a version string.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = |reason: &str| AptRepositoryError::InvalidVersion {
            version: s.to_string(),
            reason: reason.to_string(),
        };

        let (epoch, remainder) = match s.split_once(':') {
            Some((epoch, remainder)) => (Some(epoch), remainder),
            None => (None, s),
        };

        let (upstream, debian) = match remainder.rfind('-') {
            Some(pos) => (&remainder[..pos], Some(&remainder[pos + 1..])),
            None => (remainder, None),
        };

        let epoch = match epoch {
            Some(epoch) => {
                if epoch.is_empty() || !epoch.chars().all(|c| c.is_ascii_digit()) {
                    return Err(invalid("epoch must be numeric"));
                }
                Some(
                    epoch
                        .parse::<u32>()
                        .map_err(|_| invalid("epoch out of range"))?,
                )
            }
            None => None,
        };

        if upstream.is_empty() {
            return Err(invalid("empty upstream version"));
        }
        if !upstream.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(invalid("upstream version must start with a digit"));
        }
        // Colons are allowed in upstream only when an epoch is present.
        if !upstream.chars().all(|c| match c {
            c if c.is_ascii_alphanumeric() => true,
            '.' | '+' | '~' => true,
            '-' => debian.is_some(),
            ':' => epoch.is_some(),
            _ => false,
        }) {
            return Err(invalid("illegal character in upstream version"));
        }

        if let Some(debian) = debian {
            if debian.is_empty() {
                return Err(invalid("empty debian revision"));
            }
            if !debian
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '~'))
            {
                return Err(invalid("illegal character in debian revision"));
            }
        }

        Ok(Self {
            epoch,
            upstream_version: upstream.to_string(),
            debian_revision: debian.map(|d| d.to_string()),
        })
    }

    /// The explicit epoch, if one was given.
    pub fn epoch(&self) -> Option<u32> {
        self.epoch
    }

    /// The epoch, defaulting to `0`.
    pub fn epoch_assumed(&self) -> u32 {
        self.epoch.unwrap_or(0)
    }

    /// The upstream component of the version string.
    pub fn upstream_version(&self) -> &str {
        &self.upstream_version
    }

    /// The Debian revision, if present.
    pub fn debian_revision(&self) -> Option<&str> {
        self.debian_revision.as_deref()
    }
}

impl FromStr for PackageVersion {
    type Err = AptRepositoryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(epoch) = self.epoch {
            write!(f, "{}:", epoch)?;
        }
        write!(f, "{}", self.upstream_version)?;
        if let Some(revision) = &self.debian_revision {
            write!(f, "-{}", revision)?;
        }
        Ok(())
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch_assumed()
            .cmp(&other.epoch_assumed())
            .then_with(|| compare_component(&self.upstream_version, &other.upstream_version))
            .then_with(|| {
                compare_component(
                    self.debian_revision.as_deref().unwrap_or(""),
                    other.debian_revision.as_deref().unwrap_or(""),
                )
            })
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PackageVersion {}

/// Compare two version strings using Debian ordering.
///
/// This never fails: strings that would not pass [PackageVersion::parse] are still split into
/// epoch, upstream and revision on a best-effort basis, so the ordering is total over any
/// input.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (a_epoch, a_upstream, a_revision) = split_version(a);
    let (b_epoch, b_upstream, b_revision) = split_version(b);

    compare_numeric(a_epoch, b_epoch)
        .then_with(|| compare_component(a_upstream, b_upstream))
        .then_with(|| compare_component(a_revision, b_revision))
}

fn split_version(s: &str) -> (&str, &str, &str) {
    let (epoch, remainder) = match s.split_once(':') {
        Some((epoch, remainder)) if epoch.bytes().all(|b| b.is_ascii_digit()) => {
            (epoch, remainder)
        }
        _ => ("", s),
    };

    match remainder.rfind('-') {
        Some(pos) => (epoch, &remainder[..pos], &remainder[pos + 1..]),
        None => (epoch, remainder, ""),
    }
}

/// Weight of a character in the non-digit part of a version.
///
/// `~` sorts before everything including the end of the string, letters sort before all
/// other characters.
fn order(c: Option<u8>) -> i32 {
    match c {
        None => 0,
        Some(b'~') => -1,
        Some(c) if c.is_ascii_digit() => 0,
        Some(c) if c.is_ascii_alphabetic() => c as i32,
        Some(c) => c as i32 + 256,
    }
}

/// Compare two digit runs as arbitrary precision integers.
fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Compare an upstream version or revision using alternating non-digit and digit runs.
fn compare_component(a: &str, b: &str) -> Ordering {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let (mut i, mut j) = (0, 0);

    while i < a.len() || j < b.len() {
        while (i < a.len() && !a[i].is_ascii_digit()) || (j < b.len() && !b[j].is_ascii_digit()) {
            let ac = order(a.get(i).copied());
            let bc = order(b.get(j).copied());
            if ac != bc {
                return ac.cmp(&bc);
            }
            i += 1;
            j += 1;
        }

        let a_start = i;
        while i < a.len() && a[i].is_ascii_digit() {
            i += 1;
        }
        let b_start = j;
        while j < b.len() && b[j].is_ascii_digit() {
            j += 1;
        }

        // Both runs are ASCII digits.
        let a_digits = std::str::from_utf8(&a[a_start..i]).unwrap_or("");
        let b_digits = std::str::from_utf8(&b[b_start..j]).unwrap_or("");
        match compare_numeric(a_digits, b_digits) {
            Ordering::Equal => {}
            res => return res,
        }
    }

    Ordering::Equal
}
