//! Reconstructing a repository model from its Release and Packages files.

use crate::checksum::{hash_string, HashAlgorithm};
use crate::compression::read_decompressed;
use crate::control::parse_paragraphs;
use crate::metadata::{RepositoryMetadata, RunContext};
use crate::package::PackageRecord;
use crate::release::Release;
use crate::{AptRepositoryError, Result, PACKAGE_INDEX_FILENAMES};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// A repository read back from disk.
#[derive(Debug)]
pub struct ParsedRepository {
    pub metadata: RepositoryMetadata,
    /// The repository root, above `dists/`.
    pub root: PathBuf,
    /// `dists/<codename>/Release`, relative to the root.
    pub release_path: String,
    pub release: Release,
    /// Package records keyed by their `Filename`.
    pub packages: BTreeMap<String, PackageRecord>,
    /// Index files whose packages were read.
    pub index_files: Vec<PathBuf>,
}

impl ParsedRepository {
    /// Absolute paths of every archive listed in the indices.
    pub fn archive_paths(&self) -> Vec<PathBuf> {
        self.packages
            .keys()
            .map(|filename| self.root.join(filename))
            .collect()
    }

    /// `<name>_<version>_<architecture>` of every package.
    pub fn identities(&self) -> BTreeSet<String> {
        self.packages.values().map(|p| p.identity()).collect()
    }
}

/// Work out the directory holding the top-level Release file.
///
/// `path` may be the Release file itself, the `dists/<codename>` directory, or the repository
/// root when `codename` is given.
fn release_dir(path: &Path, codename: Option<&str>) -> PathBuf {
    if path.file_name() == Some(OsStr::new("Release")) {
        return path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
    }
    match codename {
        Some(codename) if !path.ends_with(Path::new("dists").join(codename)) => {
            path.join("dists").join(codename)
        }
        _ => path.to_path_buf(),
    }
}

/// Parse the repository at `path`.
///
/// A missing or unreadable top-level Release is fatal. Index files that fail to read are
/// logged and skipped, as are individual stanzas that do not form a valid package record.
///
/// Of several index files in one directory (`Packages`, `Packages.gz`, ...) only the first one
/// that reads successfully is used, in the path order of the Release's `MD5Sum` table.
pub fn parse_repository<P: AsRef<Path>>(path: P, codename: Option<&str>) -> Result<ParsedRepository> {
    let path = path.as_ref();
    debug!("Parsing {}", path.display());

    let dir = release_dir(path, codename);
    let release_file = dir.join("Release");
    let release = std::fs::read_to_string(&release_file)
        .map_err(AptRepositoryError::from)
        .and_then(|text| Release::parse(&text))
        .map_err(|e| {
            error!("Failed to open {}: {}", release_file.display(), e);
            AptRepositoryError::NotFound(format!("{}: {}", release_file.display(), e))
        })?;

    let fallback_codename = codename
        .map(str::to_string)
        .or_else(|| dir.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_default();
    let metadata = RepositoryMetadata::from_release(&release, &fallback_codename);

    let root = match dir.parent() {
        Some(parent) if parent.file_name() == Some(OsStr::new("dists")) => parent
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
        _ => dir.clone(),
    };

    let release_path = format!("dists/{}/Release", metadata.codename);
    let mut context = RunContext::new();

    let candidates: Vec<PathBuf> = release
        .table(HashAlgorithm::Md5)
        .into_iter()
        .filter(|c| {
            let basename = c.path.rsplit('/').next().unwrap_or_default();
            PACKAGE_INDEX_FILENAMES.iter().any(|n| *n == basename)
        })
        .map(|c| dir.join(&c.path))
        .collect();

    let mut seen = HashSet::new();
    let mut index_files = Vec::new();
    for candidate in candidates {
        let parent = candidate.parent().unwrap_or(&dir).to_string_lossy().into_owned();
        let key = hash_string(&parent, &[HashAlgorithm::Sha256]);
        if seen.contains(&key) {
            debug!("Skipping {}, directory already read", candidate.display());
            continue;
        }

        match read_index_file(&candidate, &mut context) {
            Ok(count) => {
                debug!("Read {} packages from {}", count, candidate.display());
                seen.insert(key);
                index_files.push(candidate);
            }
            Err(e) => {
                error!("Failed to open {}: {}", candidate.display(), e);
            }
        }
    }

    let packages: BTreeMap<String, PackageRecord> = context
        .into_archives()
        .into_iter()
        .map(|(filename, record)| (filename.to_string_lossy().into_owned(), record))
        .collect();

    info!(
        "Parsed {} packages from {} index files of {}",
        packages.len(),
        index_files.len(),
        metadata.codename
    );

    Ok(ParsedRepository {
        metadata,
        root,
        release_path,
        release,
        packages,
        index_files,
    })
}

/// Add every package stanza of one index file, returning how many stanzas were read.
fn read_index_file(path: &Path, context: &mut RunContext) -> Result<usize> {
    let data = read_decompressed(path)?;
    let text = String::from_utf8(data).map_err(|e| {
        AptRepositoryError::invalid_control(format!("{}: {}", path.display(), e))
    })?;
    let paragraphs = parse_paragraphs(&text)?;
    let count = paragraphs.len();

    for paragraph in paragraphs {
        let Some(filename) = paragraph.get("Filename").map(str::to_string) else {
            debug!("Skipping entry without Filename in {}", path.display());
            continue;
        };
        match PackageRecord::from_index_paragraph(paragraph) {
            Ok(record) => {
                context.add_archive(PathBuf::from(filename), record);
            }
            Err(e) => warn!("Skipping {} in {}: {}", filename, path.display(), e),
        }
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::Compression;

    const PACKAGES: &str = "\
Package: foo
Version: 1.0
Architecture: amd64
Filename: pool/main/foo_1.0_amd64.deb
Size: 10
MD5sum: 00000000000000000000000000000000

Package: broken
Version: 1.0
Architecture: amd64
Depends: bar (<1.0)
Filename: pool/main/broken_1.0_amd64.deb

Package: nofile
Version: 1.0
Architecture: amd64
";

    fn release_for(dir: &Path, files: &[&str]) -> String {
        let mut text = String::from("Origin: test\nLabel: test\nCodename: stable\nMD5Sum:\n");
        for file in files {
            let data = std::fs::read(dir.join(file)).unwrap_or_default();
            let digest = format!("{:x}", md5::compute(&data));
            text.push_str(&format!(" {} {} {}\n", digest, data.len(), file));
        }
        text
    }

    #[test]
    fn test_release_dir() {
        assert_eq!(
            release_dir(Path::new("/r/dists/stable/Release"), None),
            PathBuf::from("/r/dists/stable")
        );
        assert_eq!(
            release_dir(Path::new("/r"), Some("stable")),
            PathBuf::from("/r/dists/stable")
        );
        assert_eq!(
            release_dir(Path::new("/r/dists/stable"), Some("stable")),
            PathBuf::from("/r/dists/stable")
        );
    }

    #[test]
    fn test_missing_release_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse_repository(dir.path(), Some("stable")).unwrap_err();
        assert!(matches!(err, AptRepositoryError::NotFound(_)));

        let dists = dir.path().join("dists/stable");
        std::fs::create_dir_all(&dists).unwrap();
        std::fs::write(dists.join("Release"), "not a control file\n").unwrap();
        let err = parse_repository(dir.path(), Some("stable")).unwrap_err();
        assert!(matches!(err, AptRepositoryError::NotFound(_)));
    }

    #[test]
    fn test_parse_skips_bad_entries() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let dists = dir.path().join("dists/stable");
        let bindir = dists.join("main/binary-amd64");
        std::fs::create_dir_all(&bindir)?;
        std::fs::write(bindir.join("Packages"), PACKAGES)?;
        std::fs::write(
            bindir.join("Packages.gz"),
            Compression::Gzip.compress(PACKAGES.as_bytes())?,
        )?;
        std::fs::write(
            dists.join("Release"),
            release_for(&dists, &["main/binary-amd64/Packages", "main/binary-amd64/Packages.gz"]),
        )?;

        let parsed = parse_repository(dir.path(), Some("stable"))?;
        assert_eq!(parsed.metadata.codename, "stable");
        assert_eq!(parsed.metadata.label, "test");
        assert_eq!(parsed.release_path, "dists/stable/Release");
        assert_eq!(parsed.root, dir.path());
        assert_eq!(parsed.index_files, vec![bindir.join("Packages")]);
        assert_eq!(
            parsed.packages.keys().collect::<Vec<_>>(),
            vec!["pool/main/foo_1.0_amd64.deb"]
        );
        assert_eq!(
            parsed.archive_paths(),
            vec![dir.path().join("pool/main/foo_1.0_amd64.deb")]
        );
        assert_eq!(
            parsed.packages["pool/main/foo_1.0_amd64.deb"].md5sum(),
            Some("00000000000000000000000000000000")
        );
        Ok(())
    }

    #[test]
    fn test_unreadable_variant_falls_through() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let dists = dir.path().join("dists/stable");
        let bindir = dists.join("main/binary-amd64");
        std::fs::create_dir_all(&bindir)?;
        // Listed first in path order, but corrupt.
        std::fs::write(bindir.join("Packages.bz2"), b"garbage")?;
        std::fs::write(
            bindir.join("Packages.gz"),
            Compression::Gzip.compress(PACKAGES.as_bytes())?,
        )?;
        std::fs::write(
            dists.join("Release"),
            release_for(&dists, &["main/binary-amd64/Packages.bz2", "main/binary-amd64/Packages.gz"]),
        )?;

        let parsed = parse_repository(dists.join("Release"), None)?;
        assert_eq!(parsed.index_files, vec![bindir.join("Packages.gz")]);
        assert_eq!(parsed.packages.len(), 1);
        Ok(())
    }
}
