// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian package version string handling. */

use {
    std::{
        cmp::Ordering,
        fmt::{Display, Formatter},
        num::ParseIntError,
        str::FromStr,
    },
    thiserror::Error,
};

#[derive(Clone, Debug, Error)]
pub enum VersionError {
    #[error("error parsing string to integer: {0}")]
    ParseInt(#[from] ParseIntError),

    #[error("the epoch component has non-digit characters: {0}")]
    EpochNonNumeric(String),

    #[error("upstream component has illegal character: {0}")]
    UpstreamIllegalChar(String),

    #[error("revision component has illegal character: {0}")]
    RevisionIllegalChar(String),
}

pub type Result<T> = std::result::Result<T, VersionError>;

/// A Debian package version.
///
/// Versions have the form `[epoch:]upstream[-revision]` and are totally
/// ordered. Epochs compare numerically. The upstream and revision components
/// compare with an algorithm where maximal runs of digits compare numerically
/// and tildes sort before everything, including the end of the string.
///
/// A missing epoch orders as `0`. A missing revision orders as `"0"`.
/// Equality is structural: `1.0` and `0:1.0` order as equal but are not
/// structurally equal.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackageVersion {
    epoch: Option<u32>,
    upstream: String,
    revision: Option<String>,
}

impl PackageVersion {
    /// Construct an instance by parsing a version string.
    pub fn parse(s: &str) -> Result<Self> {
        // Epoch precedes the first colon. Revision follows the last hyphen.
        let (epoch, remainder) = match s.split_once(':') {
            Some((epoch, rest)) => (Some(epoch), rest),
            None => (None, s),
        };

        let (upstream, revision) = match remainder.rsplit_once('-') {
            Some((upstream, revision)) => (upstream, Some(revision)),
            None => (remainder, None),
        };

        let epoch = epoch
            .map(|epoch| {
                if !epoch.chars().all(|c| c.is_ascii_digit()) {
                    return Err(VersionError::EpochNonNumeric(s.to_string()));
                }

                Ok(u32::from_str(epoch)?)
            })
            .transpose()?;

        // The upstream component allows alphanumerics plus . + ~ and, only
        // when a revision is present, the hyphen.
        if !upstream.chars().all(|c| match c {
            c if c.is_ascii_alphanumeric() => true,
            '.' | '+' | '~' => true,
            '-' => revision.is_some(),
            _ => false,
        }) {
            return Err(VersionError::UpstreamIllegalChar(s.to_string()));
        }

        let revision = revision
            .map(|revision| {
                if !revision.chars().all(|c| match c {
                    c if c.is_ascii_alphanumeric() => true,
                    '.' | '+' | '~' => true,
                    _ => false,
                }) {
                    return Err(VersionError::RevisionIllegalChar(s.to_string()));
                }

                Ok(revision.to_string())
            })
            .transpose()?;

        Ok(Self {
            epoch,
            upstream: upstream.to_string(),
            revision,
        })
    }

    /// The explicit `epoch` component, if present.
    pub fn epoch(&self) -> Option<u32> {
        self.epoch
    }

    /// The `epoch` component, defaulting to `0` when absent.
    pub fn epoch_or_zero(&self) -> u32 {
        self.epoch.unwrap_or(0)
    }

    /// The `upstream` component.
    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    /// The `revision` component, if present.
    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }
}

impl Display for PackageVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(epoch) = self.epoch {
            write!(f, "{}:", epoch)?;
        }

        write!(f, "{}", self.upstream)?;

        if let Some(revision) = &self.revision {
            write!(f, "-{}", revision)?;
        }

        Ok(())
    }
}

impl FromStr for PackageVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Sort weight of a character in the modified lexical ordering.
///
/// Tildes sort before everything, including the end of a component, which
/// weighs `0`. Letters sort before all other characters.
fn char_weight(c: Option<char>) -> i32 {
    match c {
        None => 0,
        Some('~') => -1,
        Some(c) if c.is_ascii_alphabetic() => c as i32,
        Some(c) => c as i32 + 256,
    }
}

/// Compare two runs of non-digit characters.
fn compare_nondigits(a: &str, b: &str) -> Ordering {
    let mut a_chars = a.chars();
    let mut b_chars = b.chars();

    loop {
        let (a_char, b_char) = (a_chars.next(), b_chars.next());

        if a_char.is_none() && b_char.is_none() {
            return Ordering::Equal;
        }

        match char_weight(a_char).cmp(&char_weight(b_char)) {
            Ordering::Equal => {}
            res => {
                return res;
            }
        }
    }
}

/// Split off the leading run of characters matched by `pred`.
fn split_leading(s: &str, pred: impl Fn(char) -> bool) -> (&str, &str) {
    let pos = s.chars().position(|c| !pred(c)).unwrap_or(s.len());

    s.split_at(pos)
}

/// Compare a version component string using Debian rules.
///
/// The two inputs are consumed in alternating runs of non-digit and digit
/// characters. Non-digit runs compare with the modified lexical ordering;
/// digit runs compare numerically, with an exhausted input counting as `0`.
fn compare_component(a: &str, b: &str) -> Ordering {
    let mut a = a;
    let mut b = b;

    loop {
        let (a_prefix, a_rest) = split_leading(a, |c| !c.is_ascii_digit());
        let (b_prefix, b_rest) = split_leading(b, |c| !c.is_ascii_digit());

        match compare_nondigits(a_prefix, b_prefix) {
            Ordering::Equal => {}
            res => {
                return res;
            }
        }

        let (a_digits, a_rest) = split_leading(a_rest, |c| c.is_ascii_digit());
        let (b_digits, b_rest) = split_leading(b_rest, |c| c.is_ascii_digit());

        let a_num = u64::from_str(a_digits).unwrap_or(0);
        let b_num = u64::from_str(b_digits).unwrap_or(0);

        match a_num.cmp(&b_num) {
            Ordering::Equal => {}
            res => {
                return res;
            }
        }

        if a_rest.is_empty() && b_rest.is_empty() {
            return Ordering::Equal;
        }

        a = a_rest;
        b = b_rest;
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch_or_zero()
            .cmp(&other.epoch_or_zero())
            .then_with(|| compare_component(&self.upstream, &other.upstream))
            .then_with(|| {
                compare_component(
                    self.revision.as_deref().unwrap_or("0"),
                    other.revision.as_deref().unwrap_or("0"),
                )
            })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn v(s: &str) -> PackageVersion {
        PackageVersion::parse(s).unwrap()
    }

    #[test]
    fn parse() -> Result<()> {
        let version = PackageVersion::parse("1:4.7.0+dfsg1-2")?;
        assert_eq!(version.epoch(), Some(1));
        assert_eq!(version.upstream(), "4.7.0+dfsg1");
        assert_eq!(version.revision(), Some("2"));

        let version = PackageVersion::parse("3.3.2.final~github")?;
        assert_eq!(version.epoch(), None);
        assert_eq!(version.upstream(), "3.3.2.final~github");
        assert_eq!(version.revision(), None);

        let version = PackageVersion::parse("0.18.0+dfsg-2+b1")?;
        assert_eq!(version.upstream(), "0.18.0+dfsg");
        assert_eq!(version.revision(), Some("2+b1"));

        assert!(PackageVersion::parse("a:1.0").is_err());
        assert!(PackageVersion::parse("1.0!").is_err());
        assert!(PackageVersion::parse("1.0-a_b").is_err());

        Ok(())
    }

    #[test]
    fn format_round_trip() {
        for s in [
            "1:4.7.0+dfsg1-2",
            "3.3.2.final~github",
            "0.18.0+dfsg-2+b1",
            "5.2.15-2+b2",
            "0:1.0",
        ] {
            assert_eq!(v(s).to_string(), s);
        }
    }

    #[test]
    fn tilde_ordering() {
        assert_eq!(
            compare_component("1.0~beta1~svn1245", "1.0~beta1"),
            Ordering::Less
        );
        assert_eq!(compare_component("1.0~beta1", "1.0"), Ordering::Less);
        assert!(v("5.7-0.5~deb12u1") < v("5.7-0.5"));
    }

    #[test]
    fn digit_runs_compare_numerically() {
        assert!(v("1.10") > v("1.9"));
        assert!(v("1.3.4.20200120-3.1") > v("1.3.4.2020011-1"));
        assert_eq!(v("1.0").cmp(&v("1.00")), Ordering::Equal);
    }

    #[test]
    fn epoch_dominates() {
        assert!(v("1:1.0") > v("2.0"));
        assert_eq!(v("0:1.0").cmp(&v("1.0")), Ordering::Equal);
        // Ordering equality is not structural equality.
        assert_ne!(v("0:1.0"), v("1.0"));
    }

    #[test]
    fn missing_revision_orders_as_zero() {
        assert_eq!(v("1.0-0").cmp(&v("1.0")), Ordering::Equal);
        assert!(v("1.0-1") > v("1.0"));
        assert!(v("1.0-0~rc1") < v("1.0"));
    }

    #[test]
    fn letters_before_other_characters() {
        assert!(v("1.0a") < v("1.0+"));
        assert!(v("1.0") < v("1.0a"));
    }
}
