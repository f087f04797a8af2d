//! Binary package records.

use crate::checksum::{ChecksumSet, HashAlgorithm};
use crate::control::ControlParagraph;
use crate::deb::ArchiveReader;
use crate::manifest::FileManifest;
use crate::relation::{Relation, RelationField};
use crate::version::{compare_versions, PackageVersion};
use crate::Result;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// One binary package: its control fields, file checksums, shipped files and parsed relations.
///
/// The control mapping never holds digest fields; those live in the [`ChecksumSet`] and are
/// appended again when the record is rendered for a Packages index.
#[derive(Debug, Clone)]
pub struct PackageRecord {
    control: ControlParagraph,
    checksums: ChecksumSet,
    files: FileManifest,
    dependencies: BTreeMap<RelationField, Relation>,
}

impl PackageRecord {
    /// Assemble a record from its parts.
    ///
    /// Digest fields found in `control` are moved into the checksum set; entries already in
    /// `checksums` take precedence. `Package`, `Version` and `Architecture` are required, the
    /// version must be well formed and every relation field must parse.
    pub fn new(
        mut control: ControlParagraph,
        checksums: ChecksumSet,
        files: FileManifest,
    ) -> Result<Self> {
        let mut checksums = checksums;
        checksums.merge(&ChecksumSet::take_from_paragraph(&mut control)?);

        control.required("Package")?;
        control.required("Architecture")?;
        control.required("Version")?.parse::<PackageVersion>()?;

        let mut dependencies = BTreeMap::new();
        for field in RelationField::all() {
            let relation = match control.get(field.field_name()) {
                Some(value) => Relation::parse(field.field_name(), value)?,
                None => Relation::default(),
            };
            dependencies.insert(*field, relation);
        }

        Ok(Self {
            control,
            checksums,
            files,
            dependencies,
        })
    }

    /// Read a package archive.
    ///
    /// `filename` is the archive's path relative to the repository root; it is recorded in the
    /// `Filename` field and in the checksum set, alongside the archive's `Size`.
    pub fn from_archive(reader: &dyn ArchiveReader, path: &Path, filename: &str) -> Result<Self> {
        let contents = reader.read_contents(path)?;
        let mut control = contents.control;
        let files = FileManifest::with_md5sums(contents.members, contents.md5sums);
        let checksums = ChecksumSet::from_file(path, filename)?;

        control.set("Filename", filename);
        if let Some(size) = checksums.size() {
            control.set("Size", size.to_string());
        }

        Self::new(control, checksums, files)
    }

    /// A record from one stanza of a Packages index. The file list is not known there.
    pub fn from_index_paragraph(paragraph: ControlParagraph) -> Result<Self> {
        Self::new(paragraph, ChecksumSet::new(), FileManifest::new())
    }

    pub fn name(&self) -> &str {
        self.control.get("Package").unwrap_or_default()
    }

    pub fn version(&self) -> &str {
        self.control.get("Version").unwrap_or_default()
    }

    pub fn architecture(&self) -> &str {
        self.control.get("Architecture").unwrap_or_default()
    }

    /// The parsed version; construction has already checked that it is well formed.
    pub fn package_version(&self) -> Result<PackageVersion> {
        self.version().parse()
    }

    /// `<name>_<version>_<architecture>`.
    pub fn identity(&self) -> String {
        format!("{}_{}_{}", self.name(), self.version(), self.architecture())
    }

    /// The `Filename` field, for records that carry one.
    pub fn filename(&self) -> Option<&str> {
        self.control.get("Filename")
    }

    pub fn control(&self) -> &ControlParagraph {
        &self.control
    }

    pub fn checksums(&self) -> &ChecksumSet {
        &self.checksums
    }

    pub fn files(&self) -> &FileManifest {
        &self.files
    }

    pub fn md5sum(&self) -> Option<&str> {
        self.checksums.digest(HashAlgorithm::Md5)
    }

    pub fn sha1(&self) -> Option<&str> {
        self.checksums.digest(HashAlgorithm::Sha1)
    }

    pub fn sha256(&self) -> Option<&str> {
        self.checksums.digest(HashAlgorithm::Sha256)
    }

    /// Every recognized relation field, keyed by its normalized name.
    ///
    /// Fields absent from the control data map to an empty relation.
    pub fn dependencies(&self) -> BTreeMap<&'static str, &Relation> {
        self.dependencies
            .iter()
            .map(|(field, relation)| (field.key(), relation))
            .collect()
    }

    pub fn relation(&self, field: RelationField) -> &Relation {
        // Every field is inserted at construction.
        &self.dependencies[&field]
    }

    pub fn depends(&self) -> &Relation {
        self.relation(RelationField::Depends)
    }

    /// The stanza written to a Packages index: the control fields, then the digests.
    pub fn to_paragraph(&self) -> ControlParagraph {
        let mut paragraph = self.control.clone();
        for (field, digest) in self.checksums.to_fields() {
            paragraph.set(field, digest);
        }
        paragraph
    }

    /// Only the digest fields, as shown by `inspect`.
    pub fn checksum_paragraph(&self) -> ControlParagraph {
        self.checksums.to_fields().into_iter().collect()
    }
}

impl PartialEq for PackageRecord {
    fn eq(&self, other: &Self) -> bool {
        self.control == other.control
            && self.checksums == other.checksums
            && self.files == other.files
    }
}

impl Eq for PackageRecord {}

impl Ord for PackageRecord {
    /// Version first, then name. The remaining keys only break ties so that the ordering stays
    /// consistent with equality.
    fn cmp(&self, other: &Self) -> Ordering {
        compare_versions(self.version(), other.version())
            .then_with(|| self.name().cmp(other.name()))
            .then_with(|| self.architecture().cmp(other.architecture()))
            .then_with(|| self.control.cmp(&other.control))
            .then_with(|| self.checksums.cmp(&other.checksums))
            .then_with(|| self.files.cmp(&other.files))
    }
}

impl PartialOrd for PackageRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PackageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_paragraph())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deb::{testing, DebArchive};
    use crate::relation::VersionOperator;
    use crate::AptRepositoryError;

    const MD5: &str = "5fc5c0cb24690e78d6c6a2e13753f1aa";
    const SHA1: &str = "5e26ae3ebf9f7176bb7fd01c9e802ac8e223cdcc";
    const SHA256: &str = "d80568c932f54997713bb7832c6da6aa04992919f3d0f47afb6ba600a7586780";

    fn control(name: &str, version: &str) -> ControlParagraph {
        [
            ("Package", name),
            ("Version", version),
            ("Architecture", "amd64"),
            ("Maintainer", "Brett Smith <bc.smith@sas.com>"),
            ("Installed-Size", "25"),
            ("Section", "database"),
            ("Depends", "libc6 (>= 2.34), python3 | python3-minimal"),
        ]
        .into_iter()
        .collect()
    }

    fn record(name: &str, version: &str) -> PackageRecord {
        PackageRecord::new(control(name, version), ChecksumSet::new(), FileManifest::new())
            .unwrap()
    }

    #[test]
    fn test_identity_and_accessors() {
        let pkg = record("foo", "0.0.1-1");
        assert_eq!(pkg.name(), "foo");
        assert_eq!(pkg.version(), "0.0.1-1");
        assert_eq!(pkg.architecture(), "amd64");
        assert_eq!(pkg.identity(), "foo_0.0.1-1_amd64");
        assert_eq!(pkg.package_version().unwrap().debian_revision(), Some("1"));
    }

    #[test]
    fn test_checksums_kept_out_of_control() -> Result<()> {
        let mut c = control("foo", "0.0.1-1");
        c.set("MD5sum", MD5);
        c.set("SHA1", SHA1);
        c.set("SHA256", SHA256);

        let pkg = PackageRecord::new(c, ChecksumSet::new(), FileManifest::new())?;
        for algorithm in HashAlgorithm::all() {
            assert!(!pkg.control().contains(algorithm.control_field()));
        }
        assert_eq!(pkg.md5sum(), Some(MD5));
        assert_eq!(pkg.sha1(), Some(SHA1));
        assert_eq!(pkg.sha256(), Some(SHA256));

        let paragraph = pkg.to_paragraph();
        assert_eq!(paragraph.get("MD5sum"), Some(MD5));
        assert!(!pkg.control().contains("MD5sum"));
        assert_eq!(
            pkg.checksum_paragraph().to_string(),
            format!("MD5sum: {}\nSHA1: {}\nSHA256: {}\n", MD5, SHA1, SHA256)
        );
        Ok(())
    }

    #[test]
    fn test_dependencies() {
        let pkg = record("foo", "1.0");
        let deps = pkg.dependencies();
        assert_eq!(deps.len(), 9);
        assert!(deps["pre_depends"].is_empty());
        assert!(deps["breaks"].is_empty());

        let depends = pkg.depends();
        assert_eq!(depends.len(), 2);
        let libc = &depends.groups[0].alternatives[0];
        assert_eq!(libc.name, "libc6");
        assert_eq!(
            libc.version.as_ref().map(|v| v.operator),
            Some(VersionOperator::LaterOrEqual)
        );
        assert_eq!(depends.groups[1].alternatives.len(), 2);
        assert_eq!(deps["depends"], depends);
    }

    #[test]
    fn test_sort_by_version_then_name() {
        let mut records = vec![
            record("foo", "0.0.1-2"),
            record("bar", "0.0.1-2"),
            record("foo", "0.0.1-1"),
            record("bar", "0.0.1-1"),
        ];
        records.sort();
        let ids: Vec<String> = records
            .iter()
            .map(|r| format!("{}_{}", r.name(), r.version()))
            .collect();
        assert_eq!(
            ids,
            vec!["bar_0.0.1-1", "foo_0.0.1-1", "bar_0.0.1-2", "foo_0.0.1-2"]
        );
    }

    #[test]
    fn test_equality() {
        assert_eq!(record("foo", "1.0"), record("foo", "1.0"));
        assert_ne!(record("foo", "1.0"), record("foo", "1.0-1"));

        let files: FileManifest = ["usr/bin/foo"].into_iter().collect();
        let with_files = PackageRecord::new(control("foo", "1.0"), ChecksumSet::new(), files).unwrap();
        assert_ne!(with_files, record("foo", "1.0"));
    }

    #[test]
    fn test_invalid_records() {
        let mut c = control("foo", "1.0");
        c.remove("Architecture");
        let err = PackageRecord::from_index_paragraph(c).unwrap_err();
        assert!(matches!(err, AptRepositoryError::MissingField(ref f) if f == "Architecture"));

        let err = PackageRecord::from_index_paragraph(control("foo", "not-a-version")).unwrap_err();
        assert!(matches!(err, AptRepositoryError::InvalidVersion { .. }));

        let mut c = control("foo", "1.0");
        c.set("Breaks", "bar (<1.0)");
        let err = PackageRecord::from_index_paragraph(c).unwrap_err();
        assert!(matches!(err, AptRepositoryError::InvalidRelation { .. }));
    }

    #[test]
    fn test_from_archive() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = testing::write_deb(dir.path(), "foo", "0.0.1-1", "amd64");
        let size = std::fs::metadata(&path)?.len();

        let pkg = PackageRecord::from_archive(&DebArchive, &path, "pool/main/foo_0.0.1-1_amd64.deb")?;
        assert_eq!(pkg.identity(), "foo_0.0.1-1_amd64");
        assert_eq!(pkg.filename(), Some("pool/main/foo_0.0.1-1_amd64.deb"));
        assert_eq!(pkg.control().get("Size"), Some(size.to_string().as_str()));
        assert_eq!(pkg.checksums().size(), Some(size));
        assert_eq!(pkg.checksums().len(), 3);
        assert_eq!(pkg.files(), &vec!["usr/share/doc/foo/copyright"]);
        assert_eq!(pkg.files().md5sums().len(), 1);
        assert_eq!(pkg.depends().package_names().collect::<Vec<_>>(), vec!["libc6"]);

        let stanza = pkg.to_paragraph();
        assert_eq!(stanza.get("SHA256"), pkg.sha256());
        let reparsed = PackageRecord::from_index_paragraph(ControlParagraph::parse(&stanza.to_string())?)?;
        assert_eq!(reparsed.identity(), pkg.identity());
        assert_eq!(reparsed.checksums(), pkg.checksums());
        Ok(())
    }
}
