use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use super::{Version, VersionError};

/// A version constraint that may leave some components unspecified.
///
/// Unlike [`Version`], which always fully identifies a release, a
/// `PartialVersion` is used to *select* runtimes: "give me any 13.x" is
/// `Post10m(13)`, "give me exactly 9.6.17" is `Mmp(9, 6, 17)`.
#[derive(Copy, Clone, Debug)]
pub enum PartialVersion {
    /// Major, minor, patch – matches a pre-10 version exactly.
    Mmp(u32, u32, u32),
    /// Major, minor – matches a pre-10 version's major/minor, or a post-10
    /// version's major/minor.
    Mm(u32, u32),
    /// Major only – matches on major version number alone, regardless of
    /// whether the runtime in question is pre- or post-10.
    M(u32),
    /// Major only, but restricted to post-10 versioning, e.g. `Post10m(13)`
    /// matches `13.0`, `13.1`, … but never a pre-10 release numbered 13
    /// (which cannot occur, but the distinction matters for constraints
    /// built generically from user input).
    Post10m(u32),
}

impl PartialVersion {
    /// Does the given concrete [`Version`] satisfy this partial version?
    pub fn compatible(&self, version: Version) -> bool {
        use Version::{Post10, Pre10};
        match (*self, version) {
            (Self::Mmp(a, b, c), Pre10(x, y, z)) => (a, b, c) == (x, y, z),
            (Self::Mmp(..), Post10(..)) => false,
            (Self::Mm(a, b), Pre10(x, y, _)) => (a, b) == (x, y),
            (Self::Mm(a, b), Post10(x, y)) => (a, b) == (x, y),
            (Self::M(a), Pre10(x, ..)) => a == x,
            (Self::M(a), Post10(x, _)) => a == x,
            (Self::Post10m(a), Post10(x, _)) => a == x,
            (Self::Post10m(_), Pre10(..)) => false,
        }
    }

    /// Drop the most specific component, e.g. `9.6.17` → `9.6`, `14.3` →
    /// `14`. Already-maximally-widened variants saturate at themselves.
    #[must_use]
    pub fn widened(self) -> Self {
        match self {
            Self::Mmp(a, b, _) => Self::Mm(a, b),
            Self::Mm(a, _) => Self::M(a),
            Self::M(_) | Self::Post10m(_) => self,
        }
    }

    /// Provide a sort key that implements [`Ord`].
    ///
    /// `PartialVersion` does not implement [`Eq`] or [`Ord`] because they
    /// would disagree with its [`PartialEq`] and [`PartialOrd`]
    /// implementations, so this function provides a sort key that
    /// implements [`Ord`] and can be used with sorting functions, e.g.
    /// [`Vec::sort_by_key`].
    #[allow(dead_code)]
    pub fn sort_key(&self) -> (u32, Option<u32>, Option<u32>) {
        match *self {
            Self::Mmp(a, b, c) => (a, Some(b), Some(c)),
            Self::Mm(a, b) => (a, Some(b), None),
            Self::M(a) | Self::Post10m(a) => (a, None, None),
        }
    }
}

impl PartialEq for PartialVersion {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for PartialVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        use PartialVersion::{Mm, Mmp, Post10m, M};
        match (*self, *other) {
            (Mmp(x1, x2, x3), Mmp(y1, y2, y3)) => (x1, x2, x3).partial_cmp(&(y1, y2, y3)),
            (Mmp(x1, x2, x3), Mm(y1, y2)) => (x1, x2, x3).partial_cmp(&(y1, y2, 0)),
            (Mmp(x1, x2, x3), M(y1) | Post10m(y1)) => (x1, x2, x3).partial_cmp(&(y1, 0, 0)),
            (Mm(x1, x2), Mmp(y1, y2, y3)) => (x1, x2, 0).partial_cmp(&(y1, y2, y3)),
            (Mm(x1, x2), Mm(y1, y2)) => (x1, x2).partial_cmp(&(y1, y2)),
            (Mm(x1, x2), M(y1) | Post10m(y1)) => (x1, x2).partial_cmp(&(y1, 0)),
            (M(x1) | Post10m(x1), Mmp(y1, y2, y3)) => (x1, 0, 0).partial_cmp(&(y1, y2, y3)),
            (M(x1) | Post10m(x1), Mm(y1, y2)) => (x1, 0).partial_cmp(&(y1, y2)),
            (M(x1) | Post10m(x1), M(y1) | Post10m(y1)) => x1.partial_cmp(&y1),
        }
    }
}

impl fmt::Display for PartialVersion {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Mmp(a, b, c) => fmt.pad(&format!("{a}.{b}.{c}")),
            Self::Mm(a, b) => fmt.pad(&format!("{a}.{b}")),
            Self::M(a) | Self::Post10m(a) => fmt.pad(&format!("{a}")),
        }
    }
}

impl FromStr for PartialVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        static RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"(?x) \b (\d+) (?: [.] (\d+) (?: [.] (\d+) )? )? \b")
                .expect("invalid regex (for matching partial PostgreSQL versions)")
        });
        let badly_formed = || VersionError::BadlyFormed { text: Some(s.into()) };
        match RE.captures(s) {
            Some(caps) => match (
                caps.get(1).and_then(|n| n.as_str().parse::<u32>().ok()),
                caps.get(2).and_then(|n| n.as_str().parse::<u32>().ok()),
                caps.get(3).and_then(|n| n.as_str().parse::<u32>().ok()),
            ) {
                (Some(a), Some(b), Some(c)) => Ok(Self::Mmp(a, b, c)),
                (Some(a), Some(b), _) => Ok(Self::Mm(a, b)),
                (Some(a), ..) => Ok(Self::M(a)),
                _ => Err(badly_formed()),
            },
            None => Err(VersionError::NotFound { text: Some(s.into()) }),
        }
    }
}

impl From<Version> for PartialVersion {
    /// Widen a concrete [`Version`] to the equivalent fully-specified
    /// `PartialVersion`: a pre-10 version keeps all three components, a
    /// post-10 version keeps its two.
    fn from(version: Version) -> Self {
        match version {
            Version::Pre10(a, b, c) => Self::Mmp(a, b, c),
            Version::Post10(a, b) => Self::Mm(a, b),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::seq::SliceRandom;
    use rand::rng;

    use super::super::VersionError::*;
    use super::{PartialVersion::*, Version};
    use super::PartialVersion;

    #[test]
    fn parses_version_below_10() {
        assert_eq!(Ok(Mmp(9, 6, 17)), "9.6.17".parse());
    }

    #[test]
    fn parses_version_above_10() {
        assert_eq!(Ok(Mm(12, 2)), "12.2".parse());
    }

    #[test]
    fn parses_major_only() {
        assert_eq!(Ok(M(13)), "13".parse());
    }

    #[test]
    fn parse_returns_error_when_version_is_invalid() {
        assert!(matches!(
            "4294967296.0".parse::<PartialVersion>(),
            Err(BadlyFormed { .. })
        ));
    }

    #[test]
    fn parse_returns_error_when_version_not_found() {
        assert!(matches!("foo".parse::<PartialVersion>(), Err(NotFound { .. })));
    }

    #[test]
    fn displays_version_below_10() {
        assert_eq!("9.6.17", format!("{}", Mmp(9, 6, 17)));
    }

    #[test]
    fn displays_version_above_10() {
        assert_eq!("12.2", format!("{}", Mm(12, 2)));
    }

    #[test]
    fn displays_post10_major_only() {
        assert_eq!("13", format!("{}", Post10m(13)));
    }

    #[test]
    fn widens_pre10_version_by_one_step() {
        let pg_version: PartialVersion = Version::Pre10(9, 6, 5).into();
        assert_eq!(Mm(9, 6), pg_version.widened());
    }

    #[test]
    fn widens_post10_version_by_one_step() {
        let pg_version: PartialVersion = Version::Post10(14, 3).into();
        assert_eq!(M(14), pg_version.widened());
    }

    #[test]
    fn post10m_matches_only_post10_of_same_major() {
        assert!(Post10m(13).compatible(Version::Post10(13, 4)));
        assert!(!Post10m(13).compatible(Version::Post10(14, 0)));
        assert!(!Post10m(13).compatible(Version::Pre10(13, 0, 0)));
    }

    #[test]
    fn m_matches_major_regardless_of_era() {
        assert!(M(9).compatible(Version::Pre10(9, 6, 17)));
        assert!(M(14).compatible(Version::Post10(14, 3)));
    }

    #[test]
    fn partial_ord_works_as_expected() {
        let mut versions = vec![
            Mmp(9, 10, 11),
            Mmp(9, 10, 12),
            Mm(8, 11),
            Mm(9, 11),
            Mm(9, 12),
            Mm(10, 11),
            M(8),
            M(9),
            M(11),
        ];
        let mut rng = rng();
        for _ in 0..1000 {
            versions.shuffle(&mut rng);
            versions.sort_by(|a, b| a.partial_cmp(b).unwrap());
            assert_eq!(
                versions,
                vec![
                    M(8),
                    Mm(8, 11),
                    M(9),
                    Mmp(9, 10, 11),
                    Mmp(9, 10, 12),
                    Mm(9, 11),
                    Mm(9, 12),
                    Mm(10, 11),
                    M(11),
                ]
            );
        }
    }

    #[test]
    fn sort_key_works_as_expected() {
        let mut versions = vec![
            Mmp(9, 0, 0),
            Mmp(9, 10, 11),
            Mm(9, 0),
            Mm(8, 11),
            M(8),
            M(9),
        ];
        let mut rng = rng();
        for _ in 0..1000 {
            versions.shuffle(&mut rng);
            versions.sort_by_key(PartialVersion::sort_key);
            assert_eq!(
                versions,
                vec![M(8), Mm(8, 11), M(9), Mm(9, 0), Mmp(9, 0, 0), Mmp(9, 10, 11)]
            );
        }
    }
}
