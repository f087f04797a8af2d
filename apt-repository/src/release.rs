//! Release manifests.
//!
//! The same stanza type serves the top-level `dists/<codename>/Release`, which lists the index
//! files with their checksums, and the small per-directory `binary-<arch>/Release`.

use crate::checksum::{Checksum, ChecksumSet, HashAlgorithm};
use crate::control::ControlParagraph;
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Format of the `Date` field.
pub const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Fields with a typed representation, in output order.
const KNOWN_FIELDS: &[&str] = &[
    "Suite",
    "Codename",
    "Version",
    "Component",
    "Components",
    "Origin",
    "Label",
    "Description",
    "Architecture",
    "Architectures",
    "Date",
];

/// A Release stanza.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Release {
    pub suite: Option<String>,
    pub codename: Option<String>,
    pub version: Option<String>,
    /// Set on per-directory stanzas.
    pub component: Option<String>,
    pub components: Vec<String>,
    pub origin: Option<String>,
    pub label: Option<String>,
    pub description: Option<String>,
    /// Set on per-directory stanzas.
    pub architecture: Option<String>,
    pub architectures: Vec<String>,
    pub date: Option<DateTime<Utc>>,
    /// Index files keyed by path relative to the directory holding the Release file.
    pub files: BTreeMap<String, ChecksumSet>,
    /// Fields without a typed representation, including a `Date` that could not be parsed.
    pub extra: ControlParagraph,
}

fn words(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| v.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

impl Release {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the text of a Release file.
    pub fn parse(text: &str) -> Result<Self> {
        Self::from_paragraph(&ControlParagraph::parse(text)?)
    }

    pub fn from_paragraph(paragraph: &ControlParagraph) -> Result<Self> {
        let field = |name: &str| paragraph.get(name).map(str::to_string);

        let mut release = Self {
            suite: field("Suite"),
            codename: field("Codename"),
            version: field("Version"),
            component: field("Component"),
            components: words(paragraph.get("Components")),
            origin: field("Origin"),
            label: field("Label"),
            description: field("Description"),
            architecture: field("Architecture"),
            architectures: words(paragraph.get("Architectures")),
            ..Self::default()
        };

        if let Some(date) = paragraph.get("Date") {
            match DateTime::parse_from_rfc2822(date) {
                Ok(date) => release.date = Some(date.with_timezone(&Utc)),
                Err(e) => {
                    debug!("keeping unparsed Release date '{}': {}", date, e);
                    release.extra.set("Date", date);
                }
            }
        }

        for algorithm in HashAlgorithm::all() {
            if let Some(table) = paragraph.get(algorithm.release_field()) {
                for line in table.lines().filter(|l| !l.trim().is_empty()) {
                    release.add_checksum(*algorithm, Checksum::from_table_line(line)?);
                }
            }
        }

        for (name, value) in paragraph.iter() {
            let known = KNOWN_FIELDS.iter().any(|k| k.eq_ignore_ascii_case(name))
                || HashAlgorithm::all()
                    .iter()
                    .any(|a| a.release_field().eq_ignore_ascii_case(name));
            if !known {
                release.extra.set(name, value);
            }
        }

        Ok(release)
    }

    /// Record one digest of one file, merging with digests already known for that path.
    pub fn add_checksum(&mut self, algorithm: HashAlgorithm, checksum: Checksum) {
        self.files
            .entry(checksum.path.clone())
            .or_default()
            .insert(algorithm, checksum);
    }

    /// Record every digest of a file.
    pub fn add_file(&mut self, checksums: &ChecksumSet) {
        for (algorithm, checksum) in checksums.iter() {
            self.add_checksum(algorithm, checksum.clone());
        }
    }

    /// Lines of one checksum table, in path order.
    pub fn table(&self, algorithm: HashAlgorithm) -> Vec<&Checksum> {
        self.files
            .values()
            .filter_map(|set| set.get(algorithm))
            .collect()
    }

    /// Paths of all listed files.
    pub fn file_paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Render as a control stanza.
    pub fn to_paragraph(&self) -> ControlParagraph {
        fn optional(p: &mut ControlParagraph, name: &str, value: &Option<String>) {
            if let Some(value) = value {
                p.set(name, value.as_str());
            }
        }

        let mut p = ControlParagraph::new();
        optional(&mut p, "Suite", &self.suite);
        optional(&mut p, "Codename", &self.codename);
        optional(&mut p, "Version", &self.version);
        optional(&mut p, "Component", &self.component);
        if !self.components.is_empty() {
            p.set("Components", self.components.join(" "));
        }
        optional(&mut p, "Origin", &self.origin);
        optional(&mut p, "Label", &self.label);
        optional(&mut p, "Description", &self.description);
        optional(&mut p, "Architecture", &self.architecture);
        if !self.architectures.is_empty() {
            p.set("Architectures", self.architectures.join(" "));
        }
        if let Some(date) = self.date {
            p.set("Date", date.format(DATE_FORMAT).to_string());
        }

        for (name, value) in self.extra.iter() {
            p.set(name, value);
        }

        for algorithm in HashAlgorithm::all() {
            let table = self.table(*algorithm);
            if table.is_empty() {
                continue;
            }
            let mut value = String::new();
            for checksum in table {
                value.push('\n');
                value.push_str(&checksum.table_line());
            }
            p.set(algorithm.release_field(), value);
        }

        p
    }

    /// Field names lower-cased, mapped to their values as written.
    pub fn lowercase_fields(&self) -> BTreeMap<String, String> {
        self.to_paragraph()
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
            .collect()
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_paragraph())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const RELEASE: &str = "\
Suite: stable
Codename: stable
Version: 1.0
Components: main contrib
Origin: test
Label: test
Description: test repository
Architectures: amd64 i386
Date: Sat, 01 Jun 2024 12:00:00 +0000
MD5Sum:
 d41d8cd98f00b204e9800998ecf8427e 0 main/binary-amd64/Packages
 7215ee9c7d9dc229d2921a40e899ec5f 20 main/binary-amd64/Packages.gz
SHA1:
 da39a3ee5e6b4b0d3255bfef95601890afd80709 0 main/binary-amd64/Packages
SHA256:
 e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855 0 main/binary-amd64/Packages
";

    #[test]
    fn test_parse() -> Result<()> {
        let release = Release::parse(RELEASE)?;
        assert_eq!(release.codename.as_deref(), Some("stable"));
        assert_eq!(release.components, vec!["main", "contrib"]);
        assert_eq!(release.architectures, vec!["amd64", "i386"]);
        assert_eq!(
            release.date,
            Some(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap())
        );
        assert!(release.extra.is_empty());

        assert_eq!(release.files.len(), 2);
        let packages = &release.files["main/binary-amd64/Packages"];
        assert_eq!(packages.len(), 3);
        assert_eq!(packages.size(), Some(0));
        let gz = &release.files["main/binary-amd64/Packages.gz"];
        assert_eq!(gz.len(), 1);
        assert_eq!(gz.digest(HashAlgorithm::Md5), Some("7215ee9c7d9dc229d2921a40e899ec5f"));
        assert_eq!(release.table(HashAlgorithm::Md5).len(), 2);
        assert_eq!(release.table(HashAlgorithm::Sha256).len(), 1);
        Ok(())
    }

    #[test]
    fn test_render_roundtrip() -> Result<()> {
        let release = Release::parse(RELEASE)?;
        assert_eq!(release.to_string(), RELEASE);
        assert_eq!(Release::parse(&release.to_string())?, release);
        Ok(())
    }

    #[test]
    fn test_unknown_fields_and_dates_kept() -> Result<()> {
        let release = Release::parse(
            "Origin: Debian\nDate: Sat, 08 Jun 2024 09:07:41 UTC-ish\nAcquire-By-Hash: yes\n",
        )?;
        assert_eq!(release.date, None);
        assert_eq!(release.extra.get("Date"), Some("Sat, 08 Jun 2024 09:07:41 UTC-ish"));
        assert_eq!(release.extra.get("acquire-by-hash"), Some("yes"));
        assert!(release.to_string().contains("Acquire-By-Hash: yes\n"));
        Ok(())
    }

    #[test]
    fn test_component_stanza() {
        let release = Release {
            component: Some("main".into()),
            origin: Some("foo".into()),
            label: Some("foo".into()),
            description: Some("foo APT repository".into()),
            architecture: Some("amd64".into()),
            ..Release::default()
        };
        assert_eq!(
            release.to_string(),
            "Component: main\nOrigin: foo\nLabel: foo\nDescription: foo APT repository\nArchitecture: amd64\n"
        );
        assert_eq!(release.lowercase_fields()["architecture"], "amd64");
    }

    #[test]
    fn test_malformed_table() {
        let err = Release::parse("MD5Sum:\n abc notasize Packages\n").unwrap_err();
        assert!(err.is_parse_error());
    }
}
