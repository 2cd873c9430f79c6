// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Normalized binary package records. */

use {
    crate::{
        control::ControlParagraph,
        dependency::{parse_provides, parse_relations, ProvidedPackage, Relation},
        error::Result,
        package_version::PackageVersion,
    },
    std::fmt::{Display, Formatter},
};

/// Reference to a concrete package providing a virtual name.
#[derive(Clone, Debug, PartialEq)]
pub struct Provider {
    pub name: String,
    pub version: PackageVersion,
}

/// A normalized binary package record.
///
/// Records are usually decoded from `Packages` index paragraphs. The
/// database additionally synthesizes *virtual* records for provided names;
/// those have no dependencies of their own and carry the list of concrete
/// [Provider] packages instead.
///
/// Identity for deduplication and visited-tracking is `(name, version)`.
#[derive(Clone, Debug)]
pub struct Package {
    pub name: String,
    pub version: PackageVersion,
    pub architecture: String,
    pub priority: Option<String>,
    pub pre_depends: Vec<Relation>,
    pub depends: Vec<Relation>,
    pub provides: Vec<ProvidedPackage>,
    /// Path of the `.deb`, relative to the source base URL.
    pub filename: String,
    /// Candidate download URLs, rewritten against the source origin.
    pub urls: Vec<String>,
    pub is_virtual: bool,
    /// Concrete packages providing this name. Only populated on virtual
    /// records.
    pub providers: Vec<Provider>,
}

impl Package {
    /// Construct a record from a control paragraph.
    pub fn from_paragraph(paragraph: &ControlParagraph) -> Result<Self> {
        let name = paragraph.required_field_str("Package")?.to_string();
        let version = PackageVersion::parse(paragraph.required_field_str("Version")?)?;

        let parse_relation_field = |field: &str| -> Result<Vec<Relation>> {
            match paragraph.field_str(field) {
                Some(value) => parse_relations(value),
                None => Ok(vec![]),
            }
        };

        Ok(Self {
            name,
            version,
            architecture: paragraph.field_str("Architecture").unwrap_or("all").to_string(),
            priority: paragraph.field_str("Priority").map(ToString::to_string),
            pre_depends: parse_relation_field("Pre-Depends")?,
            depends: parse_relation_field("Depends")?,
            provides: match paragraph.field_str("Provides") {
                Some(value) => parse_provides(value)?,
                None => vec![],
            },
            filename: paragraph.field_str("Filename").unwrap_or_default().to_string(),
            urls: vec![],
            is_virtual: false,
            providers: vec![],
        })
    }

    /// Synthesize a virtual record for a provided name.
    pub(crate) fn new_virtual(name: String, version: PackageVersion, provider: Provider) -> Self {
        Self {
            name,
            version,
            architecture: "all".to_string(),
            priority: None,
            pre_depends: vec![],
            depends: vec![],
            provides: vec![],
            filename: String::new(),
            urls: vec![],
            is_virtual: true,
            providers: vec![provider],
        }
    }

    /// Identity key used for visited-tracking and deduplication.
    pub fn id(&self) -> String {
        format!("{}={}", self.name, self.version)
    }
}

impl Display for Package {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.name, self.version)
    }
}

#[cfg(test)]
mod test {
    use {super::*, crate::control::ControlParagraphReader, indoc::indoc, std::io::Cursor};

    #[test]
    fn from_paragraph() -> Result<()> {
        let data = indoc! {"
            Package: bash
            Version: 5.2.15-2+b2
            Architecture: amd64
            Essential: yes
            Priority: required
            Pre-Depends: libc6 (>= 2.36), libtinfo6 (>= 6)
            Depends: base-files (>= 2.1.12), debianutils (>= 2.15)
            Filename: pool/main/b/bash/bash_5.2.15-2+b2_amd64.deb
        "};

        let paragraph = ControlParagraphReader::new(Cursor::new(data.as_bytes()))
            .next()
            .unwrap()?;

        let pkg = Package::from_paragraph(&paragraph)?;

        assert_eq!(pkg.name, "bash");
        assert_eq!(pkg.version, PackageVersion::parse("5.2.15-2+b2")?);
        assert_eq!(pkg.architecture, "amd64");
        assert_eq!(pkg.priority.as_deref(), Some("required"));
        assert_eq!(pkg.pre_depends.len(), 2);
        assert_eq!(pkg.depends.len(), 2);
        assert!(pkg.provides.is_empty());
        assert_eq!(pkg.filename, "pool/main/b/bash/bash_5.2.15-2+b2_amd64.deb");
        assert!(!pkg.is_virtual);
        assert_eq!(pkg.id(), "bash=5.2.15-2+b2");

        Ok(())
    }

    #[test]
    fn provides_parsed() -> Result<()> {
        let data = "Package: mawk\nVersion: 1.3.4.20200120-3.1\nProvides: awk\n";

        let paragraph = ControlParagraphReader::new(Cursor::new(data.as_bytes()))
            .next()
            .unwrap()?;

        let pkg = Package::from_paragraph(&paragraph)?;
        assert_eq!(pkg.provides.len(), 1);
        assert_eq!(pkg.provides[0].name, "awk");

        Ok(())
    }
}
