//! Package relationship fields (`Depends`, `Breaks`, ...).
//!
//! A relation field is a comma separated list of groups. Each group is a pipe separated list of
//! alternatives, any one of which satisfies the group. See
//! <https://www.debian.org/doc/debian-policy/ch-relationships.html>.

use crate::{AptRepositoryError, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Relationship fields recognized in binary package control data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum RelationField {
    Depends,
    PreDepends,
    Recommends,
    Suggests,
    Breaks,
    Conflicts,
    Provides,
    Replaces,
    Enhances,
}

impl RelationField {
    /// The field name as written in control files.
    pub fn field_name(&self) -> &'static str {
        match self {
            RelationField::Depends => "Depends",
            RelationField::PreDepends => "Pre-Depends",
            RelationField::Recommends => "Recommends",
            RelationField::Suggests => "Suggests",
            RelationField::Breaks => "Breaks",
            RelationField::Conflicts => "Conflicts",
            RelationField::Provides => "Provides",
            RelationField::Replaces => "Replaces",
            RelationField::Enhances => "Enhances",
        }
    }

    /// Normalized key: lower-cased with hyphens replaced by underscores.
    pub fn key(&self) -> &'static str {
        match self {
            RelationField::Depends => "depends",
            RelationField::PreDepends => "pre_depends",
            RelationField::Recommends => "recommends",
            RelationField::Suggests => "suggests",
            RelationField::Breaks => "breaks",
            RelationField::Conflicts => "conflicts",
            RelationField::Provides => "provides",
            RelationField::Replaces => "replaces",
            RelationField::Enhances => "enhances",
        }
    }

    /// Get all recognized relation fields.
    pub fn all() -> &'static [RelationField] {
        &[
            RelationField::Depends,
            RelationField::PreDepends,
            RelationField::Recommends,
            RelationField::Suggests,
            RelationField::Breaks,
            RelationField::Conflicts,
            RelationField::Provides,
            RelationField::Replaces,
            RelationField::Enhances,
        ]
    }

    /// Look up a field by control field name or normalized key, case insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.to_ascii_lowercase().replace('-', "_");
        Self::all()
            .iter()
            .copied()
            .find(|field| field.key() == normalized)
    }
}

impl fmt::Display for RelationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// Version comparison operator in a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum VersionOperator {
    /// `<<`
    StrictlyEarlier,
    /// `<=`
    EarlierOrEqual,
    /// `=`
    Exactly,
    /// `>=`
    LaterOrEqual,
    /// `>>`
    StrictlyLater,
}

impl VersionOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionOperator::StrictlyEarlier => "<<",
            VersionOperator::EarlierOrEqual => "<=",
            VersionOperator::Exactly => "=",
            VersionOperator::LaterOrEqual => ">=",
            VersionOperator::StrictlyLater => ">>",
        }
    }
}

impl FromStr for VersionOperator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "<<" => Ok(VersionOperator::StrictlyEarlier),
            "<=" => Ok(VersionOperator::EarlierOrEqual),
            "=" => Ok(VersionOperator::Exactly),
            ">=" => Ok(VersionOperator::LaterOrEqual),
            ">>" => Ok(VersionOperator::StrictlyLater),
            other => Err(format!("unknown version operator '{}'", other)),
        }
    }
}

impl fmt::Display for VersionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An `(op version)` constraint. The version is kept exactly as written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct VersionConstraint {
    pub operator: VersionOperator,
    pub version: String,
}

/// One entry of a `[...]` architecture restriction list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ArchRestriction {
    /// `false` when the entry was negated with `!`.
    pub enabled: bool,
    pub arch: String,
}

/// One term of a `<...>` build profile restriction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BuildProfile {
    /// `false` when the term was negated with `!`.
    pub enabled: bool,
    pub profile: String,
}

/// A single alternative: one package name plus its optional qualifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Dependency {
    pub name: String,
    /// The `:any` style qualifier after the name.
    pub arch_qualifier: Option<String>,
    pub version: Option<VersionConstraint>,
    pub arch: Option<Vec<ArchRestriction>>,
    /// Build profile formulas. The outer list is a disjunction of `<...>` blocks, each inner
    /// list a conjunction of terms.
    pub restrictions: Option<Vec<Vec<BuildProfile>>>,
}

impl Dependency {
    /// A bare dependency on `name` with no qualifiers.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            arch_qualifier: None,
            version: None,
            arch: None,
            restrictions: None,
        }
    }
}

impl FromStr for Dependency {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        let (_, name, arch_qualifier, operator, version, archs, restrictions) =
            lazy_regex::regex_captures!(
                r"^\s*([a-zA-Z0-9][a-zA-Z0-9+._\-]*)(?::([a-zA-Z0-9][a-zA-Z0-9\-]*))?(?:\s*\(\s*([<>=]+)\s*([0-9a-zA-Z:\-+~.]+)\s*\))?(?:\s*\[([\s!\w\-]+)\])?\s*(<.+>)?\s*$",
                s
            )
            .ok_or_else(|| format!("cannot parse '{}'", s.trim()))?;

        let version = if operator.is_empty() {
            None
        } else {
            Some(VersionConstraint {
                operator: operator.parse()?,
                version: version.to_string(),
            })
        };

        let arch = if archs.is_empty() {
            None
        } else {
            Some(
                archs
                    .split_whitespace()
                    .map(|token| match token.strip_prefix('!') {
                        Some(arch) => ArchRestriction {
                            enabled: false,
                            arch: arch.to_string(),
                        },
                        None => ArchRestriction {
                            enabled: true,
                            arch: token.to_string(),
                        },
                    })
                    .collect(),
            )
        };

        let restrictions = if restrictions.is_empty() {
            None
        } else {
            Some(parse_build_profiles(restrictions)?)
        };

        Ok(Self {
            name: name.to_string(),
            arch_qualifier: (!arch_qualifier.is_empty()).then(|| arch_qualifier.to_string()),
            version,
            arch,
            restrictions,
        })
    }
}

fn parse_build_profiles(s: &str) -> std::result::Result<Vec<Vec<BuildProfile>>, String> {
    let mut formulas = Vec::new();
    let mut rest = s.trim();
    while !rest.is_empty() {
        let inner = rest
            .strip_prefix('<')
            .and_then(|r| r.split_once('>'))
            .ok_or_else(|| format!("malformed build profile restriction '{}'", s))?;
        let terms: Vec<BuildProfile> = inner
            .0
            .split_whitespace()
            .map(|term| match term.strip_prefix('!') {
                Some(profile) => BuildProfile {
                    enabled: false,
                    profile: profile.to_string(),
                },
                None => BuildProfile {
                    enabled: true,
                    profile: term.to_string(),
                },
            })
            .collect();
        if terms.is_empty() {
            return Err(format!("empty build profile restriction in '{}'", s));
        }
        formulas.push(terms);
        rest = inner.1.trim_start();
    }
    Ok(formulas)
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(qualifier) = &self.arch_qualifier {
            write!(f, ":{}", qualifier)?;
        }
        if let Some(constraint) = &self.version {
            write!(f, " ({} {})", constraint.operator, constraint.version)?;
        }
        if let Some(archs) = &self.arch {
            let archs: Vec<String> = archs
                .iter()
                .map(|a| format!("{}{}", if a.enabled { "" } else { "!" }, a.arch))
                .collect();
            write!(f, " [{}]", archs.join(" "))?;
        }
        if let Some(formulas) = &self.restrictions {
            for terms in formulas {
                let terms: Vec<String> = terms
                    .iter()
                    .map(|t| format!("{}{}", if t.enabled { "" } else { "!" }, t.profile))
                    .collect();
                write!(f, " <{}>", terms.join(" "))?;
            }
        }
        Ok(())
    }
}

/// A pipe separated list of alternatives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct AlternativeGroup {
    pub alternatives: Vec<Dependency>,
}

impl fmt::Display for AlternativeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.alternatives.iter().map(|d| d.to_string()).collect();
        f.write_str(&parts.join(" | "))
    }
}

/// A parsed relation field: an ordered list of alternative groups.
///
/// An absent or blank field is represented by an empty relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Relation {
    pub groups: Vec<AlternativeGroup>,
}

impl Relation {
    /// Parse the value of the named relation field.
    ///
    /// `field` is only used for error reporting.
    pub fn parse(field: &str, value: &str) -> Result<Self> {
        let mut groups = Vec::new();

        for group in value.split(',') {
            if group.trim().is_empty() {
                continue;
            }

            let alternatives = group
                .split('|')
                .map(|alternative| {
                    alternative
                        .parse::<Dependency>()
                        .map_err(|reason| AptRepositoryError::InvalidRelation {
                            field: field.to_string(),
                            value: value.to_string(),
                            reason,
                        })
                })
                .collect::<Result<Vec<_>>>()?;

            groups.push(AlternativeGroup { alternatives });
        }

        Ok(Self { groups })
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlternativeGroup> {
        self.groups.iter()
    }

    /// Names of every package mentioned in any alternative.
    pub fn package_names(&self) -> impl Iterator<Item = &str> {
        self.groups
            .iter()
            .flat_map(|g| g.alternatives.iter().map(|d| d.name.as_str()))
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.groups.iter().map(|g| g.to_string()).collect();
        f.write_str(&parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(name: &str) -> Dependency {
        Dependency::new(name)
    }

    fn restricted(name: &str, archs: &[(bool, &str)]) -> Dependency {
        Dependency {
            arch: Some(
                archs
                    .iter()
                    .map(|(enabled, arch)| ArchRestriction {
                        enabled: *enabled,
                        arch: arch.to_string(),
                    })
                    .collect(),
            ),
            ..dep(name)
        }
    }

    fn versioned(name: &str, operator: VersionOperator, version: &str) -> Dependency {
        Dependency {
            version: Some(VersionConstraint {
                operator,
                version: version.to_string(),
            }),
            ..dep(name)
        }
    }

    fn single(deps: Vec<Dependency>) -> Vec<AlternativeGroup> {
        deps.into_iter()
            .map(|d| AlternativeGroup {
                alternatives: vec![d],
            })
            .collect()
    }

    #[test]
    fn test_version_operators() -> Result<()> {
        let relation = Relation::parse(
            "Depends",
            "foo (<<3.0-4), bar (<=1.5-0), baz (=1.2.0), caz (>= 1.0-6), cuz (>>4.0.0-1)",
        )?;
        assert_eq!(
            relation.groups,
            single(vec![
                versioned("foo", VersionOperator::StrictlyEarlier, "3.0-4"),
                versioned("bar", VersionOperator::EarlierOrEqual, "1.5-0"),
                versioned("baz", VersionOperator::Exactly, "1.2.0"),
                versioned("caz", VersionOperator::LaterOrEqual, "1.0-6"),
                versioned("cuz", VersionOperator::StrictlyLater, "4.0.0-1"),
            ])
        );
        Ok(())
    }

    #[test]
    fn test_single_versioned() -> Result<()> {
        let relation = Relation::parse("Depends", "foo (<<3.0-4)")?;
        assert_eq!(relation.len(), 1);
        let group = &relation.groups[0];
        assert_eq!(group.alternatives.len(), 1);
        let d = &group.alternatives[0];
        assert_eq!(d.name, "foo");
        let constraint = d.version.as_ref().unwrap();
        assert_eq!(constraint.operator.as_str(), "<<");
        assert_eq!(constraint.version, "3.0-4");
        assert_eq!(d.arch, None);
        Ok(())
    }

    #[test]
    fn test_arch_wildcards() -> Result<()> {
        let relation = Relation::parse("Breaks", "foo [linux-any], bar [any-i386]")?;
        assert_eq!(
            relation.groups,
            single(vec![
                restricted("foo", &[(true, "linux-any")]),
                restricted("bar", &[(true, "any-i386")]),
            ])
        );

        let relation = Relation::parse("Breaks", "baz [!linux-any]")?;
        assert_eq!(
            relation.groups,
            single(vec![restricted("baz", &[(false, "linux-any")])])
        );
        Ok(())
    }

    #[test]
    fn test_arch_lists_preserve_order() -> Result<()> {
        let relation = Relation::parse("Conflicts", "fuz [!amd64 !i386], caz [i386 amd64 arm64]")?;
        assert_eq!(
            relation.groups,
            single(vec![
                restricted("fuz", &[(false, "amd64"), (false, "i386")]),
                restricted("caz", &[(true, "i386"), (true, "amd64"), (true, "arm64")]),
            ])
        );
        Ok(())
    }

    #[test]
    fn test_alternatives() -> Result<()> {
        let relation = Relation::parse("Suggests", "baz2.7 | baz3.5")?;
        assert_eq!(
            relation.groups,
            vec![AlternativeGroup {
                alternatives: vec![dep("baz2.7"), dep("baz3.5")],
            }]
        );

        let relation = Relation::parse(
            "Suggests",
            "baz2.7 | baz3.5, buz [i386] | fuz [amd64], foo [linux-any] | fuz [linux-i386]",
        )?;
        assert_eq!(relation.len(), 3);
        assert_eq!(
            relation.groups[1].alternatives,
            vec![
                restricted("buz", &[(true, "i386")]),
                restricted("fuz", &[(true, "amd64")]),
            ]
        );
        assert_eq!(
            relation.groups[2].alternatives,
            vec![
                restricted("foo", &[(true, "linux-any")]),
                restricted("fuz", &[(true, "linux-i386")]),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_arch_qualifier_and_profiles() -> Result<()> {
        let relation = Relation::parse(
            "Depends",
            "python3:any (>= 3.9) [amd64] <!nocheck> <stage1 cross>",
        )?;
        let d = &relation.groups[0].alternatives[0];
        assert_eq!(d.name, "python3");
        assert_eq!(d.arch_qualifier.as_deref(), Some("any"));
        assert_eq!(
            d.version,
            Some(VersionConstraint {
                operator: VersionOperator::LaterOrEqual,
                version: "3.9".to_string(),
            })
        );
        assert_eq!(
            d.restrictions,
            Some(vec![
                vec![BuildProfile {
                    enabled: false,
                    profile: "nocheck".to_string(),
                }],
                vec![
                    BuildProfile {
                        enabled: true,
                        profile: "stage1".to_string(),
                    },
                    BuildProfile {
                        enabled: true,
                        profile: "cross".to_string(),
                    },
                ],
            ])
        );
        Ok(())
    }

    #[test]
    fn test_folded_value_and_blank_groups() -> Result<()> {
        let relation = Relation::parse("Depends", "libc6 (>= 2.34),\n libssl3,\n")?;
        assert_eq!(relation.package_names().collect::<Vec<_>>(), vec!["libc6", "libssl3"]);

        assert!(Relation::parse("Depends", "")?.is_empty());
        assert!(Relation::parse("Depends", "  \n ")?.is_empty());
        Ok(())
    }

    #[test]
    fn test_malformed_is_error() {
        for bad in [
            "foo (<3.0)",
            "foo (>= )",
            "foo | ",
            "(>= 1.0)",
            "foo [amd64",
            "foo bar",
            "foo <>",
        ] {
            let err = Relation::parse("Depends", bad).unwrap_err();
            assert!(
                matches!(err, AptRepositoryError::InvalidRelation { .. }),
                "{} gave {:?}",
                bad,
                err
            );
        }
    }

    #[test]
    fn test_display_roundtrip() -> Result<()> {
        let text = "foo:any (>= 1.0) [amd64 !i386] <!nocheck>, bar | baz (<< 2)";
        let relation = Relation::parse("Depends", text)?;
        assert_eq!(relation.to_string(), text);
        assert_eq!(Relation::parse("Depends", &relation.to_string())?, relation);
        Ok(())
    }

    #[test]
    fn test_relation_field_names() {
        assert_eq!(RelationField::PreDepends.key(), "pre_depends");
        assert_eq!(RelationField::from_name("Pre-Depends"), Some(RelationField::PreDepends));
        assert_eq!(RelationField::from_name("enhances"), Some(RelationField::Enhances));
        assert_eq!(RelationField::from_name("Build-Depends"), None);
        assert_eq!(RelationField::all().len(), 9);
    }
}
