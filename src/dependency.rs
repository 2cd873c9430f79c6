// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Package dependency syntax handling.

See <https://www.debian.org/doc/debian-policy/ch-relationships.html> for the
specification of the meta-language.
*/

use {
    crate::{
        error::{Result, RootfsError},
        package_version::PackageVersion,
    },
    once_cell::sync::Lazy,
    regex::Regex,
    std::fmt::{Display, Formatter},
};

/// Regular expression to parse a single dependency possibility.
static RE_POSSIBILITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?x)
        # Package name terminates at whitespace, ( or [.
        ^(?P<package>[^\s\[(]+)
        \s*
        # Optional parenthesized version restriction.
        (?:\(
            \s*
            (?P<relop>[<>=]+)
            \s*
            (?P<version>[^\s)]+)
            \s*
        \))?
        \s*
        # Optional architecture restriction, tolerated and discarded.
        (?:\[[^\]]*\])?
        "#,
    )
    .unwrap()
});

/// A version restriction operator in a dependency expression.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VersionOperator {
    StrictlyEarlier,
    EarlierOrEqual,
    ExactlyEqual,
    LaterOrEqual,
    StrictlyLater,
}

impl VersionOperator {
    fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "<<" => Self::StrictlyEarlier,
            "<=" => Self::EarlierOrEqual,
            "=" => Self::ExactlyEqual,
            ">=" => Self::LaterOrEqual,
            ">>" => Self::StrictlyLater,
            other => {
                return Err(RootfsError::UnknownVersionOperator(other.to_string()));
            }
        })
    }
}

impl Display for VersionOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StrictlyEarlier => write!(f, "<<"),
            Self::EarlierOrEqual => write!(f, "<="),
            Self::ExactlyEqual => write!(f, "="),
            Self::LaterOrEqual => write!(f, ">="),
            Self::StrictlyLater => write!(f, ">>"),
        }
    }
}

/// One alternative within a dependency relation.
#[derive(Clone, Debug, PartialEq)]
pub struct Possibility {
    /// Name of the package the expression refers to.
    pub name: String,
    /// Optional version restriction.
    pub constraint: Option<(VersionOperator, PackageVersion)>,
}

impl Possibility {
    /// Parse a single dependency expression like `libc6 (>= 2.4)`.
    pub fn parse(s: &str) -> Result<Self> {
        let caps = RE_POSSIBILITY
            .captures(s)
            .ok_or_else(|| RootfsError::DependencyParse(s.to_string()))?;

        let name = caps["package"].to_string();

        let constraint = match (caps.name("relop"), caps.name("version")) {
            (Some(relop), Some(version)) => Some((
                VersionOperator::parse(relop.as_str())?,
                PackageVersion::parse(version.as_str())?,
            )),
            _ => None,
        };

        Ok(Self { name, constraint })
    }
}

impl Display for Possibility {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;

        if let Some((op, version)) = &self.constraint {
            write!(f, " ({} {})", op, version)?;
        }

        Ok(())
    }
}

/// A dependency relation: a disjunction of [Possibility], any one of which
/// satisfies the relation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Relation {
    pub possibilities: Vec<Possibility>,
}

impl Relation {
    /// Parse a `|`-delimited list of alternatives.
    pub fn parse(s: &str) -> Result<Self> {
        let possibilities = s
            .split('|')
            .map(|alt| Possibility::parse(alt.trim()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { possibilities })
    }
}

impl Display for Relation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            self.possibilities
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(" | ")
        )
    }
}

/// Parse a comma-delimited conjunctive list of relations, as seen in
/// `Depends` and `Pre-Depends` fields.
pub fn parse_relations(s: &str) -> Result<Vec<Relation>> {
    s.split(',')
        .map(str::trim)
        .filter(|el| !el.is_empty())
        .map(Relation::parse)
        .collect()
}

/// A name made available by a concrete package, as seen in `Provides`.
#[derive(Clone, Debug, PartialEq)]
pub struct ProvidedPackage {
    pub name: String,
    /// Exact provided version, when specified (`foo (= 1.2)`).
    pub version: Option<PackageVersion>,
}

/// Parse a `Provides` field value.
///
/// Provided names may carry an exact version; any other operator is
/// rejected.
pub fn parse_provides(s: &str) -> Result<Vec<ProvidedPackage>> {
    parse_relations(s)?
        .into_iter()
        .flat_map(|rel| rel.possibilities)
        .map(|possibility| {
            let version = match possibility.constraint {
                None => None,
                Some((VersionOperator::ExactlyEqual, version)) => Some(version),
                Some((op, _)) => {
                    return Err(RootfsError::UnknownVersionOperator(format!(
                        "{} in Provides for {}",
                        op, possibility.name
                    )));
                }
            };

            Ok(ProvidedPackage {
                name: possibility.name,
                version,
            })
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_depends() -> Result<()> {
        let relations = parse_relations("libc6 (>= 2.4), libx11-6")?;
        assert_eq!(relations.len(), 2);

        assert_eq!(relations[0].possibilities.len(), 1);
        let p = &relations[0].possibilities[0];
        assert_eq!(p.name, "libc6");
        assert_eq!(
            p.constraint,
            Some((
                VersionOperator::LaterOrEqual,
                PackageVersion::parse("2.4").unwrap()
            ))
        );

        assert_eq!(relations[1].possibilities[0].name, "libx11-6");
        assert!(relations[1].possibilities[0].constraint.is_none());

        Ok(())
    }

    #[test]
    fn parse_alternatives() -> Result<()> {
        let relations = parse_relations("mawk | awk, bash")?;
        assert_eq!(relations.len(), 2);
        assert_eq!(relations[0].possibilities.len(), 2);
        assert_eq!(relations[0].possibilities[0].name, "mawk");
        assert_eq!(relations[0].possibilities[1].name, "awk");

        Ok(())
    }

    #[test]
    fn architecture_restriction_discarded() -> Result<()> {
        let relations = parse_relations("libc [!amd64], libfoo (= 1.0) [i386]")?;
        assert_eq!(relations[0].possibilities[0].name, "libc");
        assert!(relations[0].possibilities[0].constraint.is_none());
        assert!(relations[1].possibilities[0].constraint.is_some());

        Ok(())
    }

    #[test]
    fn all_operators() -> Result<()> {
        for (s, op) in [
            ("<<", VersionOperator::StrictlyEarlier),
            ("<=", VersionOperator::EarlierOrEqual),
            ("=", VersionOperator::ExactlyEqual),
            (">=", VersionOperator::LaterOrEqual),
            (">>", VersionOperator::StrictlyLater),
        ] {
            let possibility = Possibility::parse(&format!("foo ({} 1.0)", s))?;
            assert_eq!(possibility.constraint.as_ref().unwrap().0, op);
        }

        assert!(Possibility::parse("foo (<> 1.0)").is_err());

        Ok(())
    }

    #[test]
    fn display_round_trip() -> Result<()> {
        let relation = Relation::parse("mawk (>= 1.3) | awk")?;
        assert_eq!(relation.to_string(), "mawk (>= 1.3) | awk");

        Ok(())
    }

    #[test]
    fn provides() -> Result<()> {
        let provided = parse_provides("awk, libfoo1 (= 1.2.3)")?;
        assert_eq!(provided.len(), 2);
        assert_eq!(provided[0].name, "awk");
        assert!(provided[0].version.is_none());
        assert_eq!(
            provided[1].version,
            Some(PackageVersion::parse("1.2.3").unwrap())
        );

        assert!(parse_provides("libfoo1 (>= 1.0)").is_err());

        Ok(())
    }
}
