//! File digests for archives and index files.

use crate::control::ControlParagraph;
use crate::{AptRepositoryError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use tracing::debug;

/// Per-file digest fields that may appear in a Packages stanza without being tracked.
const UNTRACKED_DIGEST_FIELDS: &[&str] = &["SHA512"];

/// Digest algorithms used in Packages stanzas and Release manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    /// Short lower-case name.
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
        }
    }

    /// Heading of the checksum table in Release files.
    pub fn release_field(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "MD5Sum",
            HashAlgorithm::Sha1 => "SHA1",
            HashAlgorithm::Sha256 => "SHA256",
        }
    }

    /// Field name in Packages stanzas.
    pub fn control_field(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "MD5sum",
            HashAlgorithm::Sha1 => "SHA1",
            HashAlgorithm::Sha256 => "SHA256",
        }
    }

    /// Get all supported hash algorithms.
    pub fn all() -> &'static [HashAlgorithm] {
        &[HashAlgorithm::Md5, HashAlgorithm::Sha1, HashAlgorithm::Sha256]
    }

    /// Whether a control field name carries a digest of this kind.
    ///
    /// `MD5sum` and `MD5Sum` are both seen in the wild.
    pub fn from_field(name: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|a| a.control_field().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Hex digests keyed by algorithm.
pub type Digests = BTreeMap<HashAlgorithm, String>;

/// Computes several digests over one pass of the data.
pub struct MultiHasher {
    md5: Option<md5::Context>,
    sha1: Option<sha1::Sha1>,
    sha256: Option<sha2::Sha256>,
    size: u64,
}

impl MultiHasher {
    pub fn new(algorithms: &[HashAlgorithm]) -> Self {
        use sha2::Digest;

        let mut hasher = Self {
            md5: None,
            sha1: None,
            sha256: None,
            size: 0,
        };

        for algorithm in algorithms {
            match algorithm {
                HashAlgorithm::Md5 => hasher.md5 = Some(md5::Context::new()),
                HashAlgorithm::Sha1 => hasher.sha1 = Some(sha1::Sha1::new()),
                HashAlgorithm::Sha256 => hasher.sha256 = Some(sha2::Sha256::new()),
            }
        }

        hasher
    }

    pub fn update(&mut self, data: &[u8]) {
        use sha2::Digest;

        self.size += data.len() as u64;
        if let Some(ref mut h) = self.md5 {
            h.consume(data);
        }
        if let Some(ref mut h) = self.sha1 {
            h.update(data);
        }
        if let Some(ref mut h) = self.sha256 {
            h.update(data);
        }
    }

    /// Finish hashing, returning the byte count and the digests.
    pub fn finalize(self) -> (u64, Digests) {
        use sha2::Digest;

        let mut digests = Digests::new();
        if let Some(h) = self.md5 {
            digests.insert(HashAlgorithm::Md5, format!("{:x}", h.compute()));
        }
        if let Some(h) = self.sha1 {
            digests.insert(HashAlgorithm::Sha1, hex::encode(h.finalize()));
        }
        if let Some(h) = self.sha256 {
            digests.insert(HashAlgorithm::Sha256, hex::encode(h.finalize()));
        }
        (self.size, digests)
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Write for MultiHasher {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Hash a reader with the specified algorithms.
pub fn hash_reader<R: Read>(mut reader: R, algorithms: &[HashAlgorithm]) -> Result<(u64, Digests)> {
    let mut hasher = MultiHasher::new(algorithms);
    std::io::copy(&mut reader, &mut hasher)?;
    Ok(hasher.finalize())
}

/// Hash data with the specified algorithms.
pub fn hash_data(data: &[u8], algorithms: &[HashAlgorithm]) -> (u64, Digests) {
    let mut hasher = MultiHasher::new(algorithms);
    hasher.update(data);
    hasher.finalize()
}

/// Hash the contents of a file.
pub fn hash_file<P: AsRef<Path>>(path: P, algorithms: &[HashAlgorithm]) -> Result<(u64, Digests)> {
    let file = File::open(path.as_ref())?;
    hash_reader(BufReader::new(file), algorithms)
}

/// Hash a string's UTF-8 bytes.
pub fn hash_string(value: &str, algorithms: &[HashAlgorithm]) -> Digests {
    hash_data(value.as_bytes(), algorithms).1
}

/// One digest of one file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Checksum {
    pub digest: String,
    pub size: u64,
    /// Path relative to the repository (or codename) root.
    pub path: String,
}

impl Checksum {
    /// Format as a Release table line, without the leading space.
    pub fn table_line(&self) -> String {
        format!("{} {} {}", self.digest, self.size, self.path)
    }

    /// Parse a `<digest> <size> <path>` table line.
    pub fn from_table_line(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let (Some(digest), Some(size), Some(path), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AptRepositoryError::invalid_control(format!(
                "malformed checksum line '{}'",
                line.trim()
            )));
        };
        let size = size
            .parse()
            .map_err(|_| AptRepositoryError::invalid_field("Size", size))?;
        Ok(Self {
            digest: digest.to_string(),
            size,
            path: path.to_string(),
        })
    }
}

/// Digest, size and relative path of one file, per algorithm.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ChecksumSet {
    entries: BTreeMap<HashAlgorithm, Checksum>,
}

impl ChecksumSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash `path` with every supported algorithm, recording it under `relative_path`.
    pub fn from_file<P: AsRef<Path>>(path: P, relative_path: &str) -> Result<Self> {
        let (size, digests) = hash_file(path, HashAlgorithm::all())?;
        Ok(Self::from_digests(digests, size, relative_path))
    }

    pub fn from_digests(digests: Digests, size: u64, relative_path: &str) -> Self {
        let entries = digests
            .into_iter()
            .map(|(algorithm, digest)| {
                (
                    algorithm,
                    Checksum {
                        digest,
                        size,
                        path: relative_path.to_string(),
                    },
                )
            })
            .collect();
        Self { entries }
    }

    /// Pull the digest fields of a Packages stanza out of `paragraph`.
    ///
    /// `Size` and `Filename` are left in place; they are only read. File digests of algorithms
    /// the set does not track are removed and dropped. `Description-md5` digests the
    /// description, not the file, and stays.
    pub fn take_from_paragraph(paragraph: &mut ControlParagraph) -> Result<Self> {
        let size = match paragraph.get("Size") {
            Some(size) => size
                .parse()
                .map_err(|_| AptRepositoryError::invalid_field("Size", size))?,
            None => 0,
        };
        let path = paragraph.get("Filename").unwrap_or_default().to_string();

        let mut set = Self::new();
        for algorithm in HashAlgorithm::all() {
            if let Some(digest) = paragraph.remove(algorithm.control_field()) {
                set.insert(
                    *algorithm,
                    Checksum {
                        digest,
                        size,
                        path: path.clone(),
                    },
                );
            }
        }
        for field in UNTRACKED_DIGEST_FIELDS {
            if paragraph.remove(field).is_some() {
                debug!("Dropping {} of {}", field, path);
            }
        }
        Ok(set)
    }

    pub fn insert(&mut self, algorithm: HashAlgorithm, checksum: Checksum) {
        self.entries.insert(algorithm, checksum);
    }

    pub fn get(&self, algorithm: HashAlgorithm) -> Option<&Checksum> {
        self.entries.get(&algorithm)
    }

    pub fn digest(&self, algorithm: HashAlgorithm) -> Option<&str> {
        self.get(algorithm).map(|c| c.digest.as_str())
    }

    /// Size of the file, taken from any entry.
    pub fn size(&self) -> Option<u64> {
        self.entries.values().next().map(|c| c.size)
    }

    pub fn path(&self) -> Option<&str> {
        self.entries.values().next().map(|c| c.path.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (HashAlgorithm, &Checksum)> {
        self.entries.iter().map(|(a, c)| (*a, c))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Add entries from `other` for algorithms not yet present.
    pub fn merge(&mut self, other: &ChecksumSet) {
        for (algorithm, checksum) in other.iter() {
            self.entries
                .entry(algorithm)
                .or_insert_with(|| checksum.clone());
        }
    }

    /// Packages stanza fields, in `MD5sum`, `SHA1`, `SHA256` order.
    pub fn to_fields(&self) -> Vec<(&'static str, &str)> {
        self.iter()
            .map(|(a, c)| (a.control_field(), c.digest.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    const HELLO_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";
    const HELLO_SHA1: &str = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed";
    const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_field_names() {
        assert_eq!(HashAlgorithm::Md5.release_field(), "MD5Sum");
        assert_eq!(HashAlgorithm::Md5.control_field(), "MD5sum");
        assert_eq!(HashAlgorithm::from_field("MD5Sum"), Some(HashAlgorithm::Md5));
        assert_eq!(HashAlgorithm::from_field("sha256"), Some(HashAlgorithm::Sha256));
        assert_eq!(HashAlgorithm::from_field("SHA512"), None);
    }

    #[test]
    fn test_hash_data_known_values() {
        let (size, digests) = hash_data(b"hello world", HashAlgorithm::all());
        assert_eq!(size, 11);
        assert_eq!(digests[&HashAlgorithm::Md5], HELLO_MD5);
        assert_eq!(digests[&HashAlgorithm::Sha1], HELLO_SHA1);
        assert_eq!(digests[&HashAlgorithm::Sha256], HELLO_SHA256);
    }

    #[test]
    fn test_hash_string_subset() {
        let digests = hash_string("hello world", &[HashAlgorithm::Sha256]);
        assert_eq!(digests.len(), 1);
        assert_eq!(digests[&HashAlgorithm::Sha256], HELLO_SHA256);
    }

    #[test]
    fn test_checksum_set_from_file() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(b"hello world")?;

        let set = ChecksumSet::from_file(file.path(), "main/binary-amd64/Packages")?;
        assert_eq!(set.len(), 3);
        assert_eq!(set.size(), Some(11));
        assert_eq!(set.path(), Some("main/binary-amd64/Packages"));
        assert_eq!(set.digest(HashAlgorithm::Md5), Some(HELLO_MD5));
        assert_eq!(
            set.get(HashAlgorithm::Sha1).map(|c| c.table_line()),
            Some(format!("{} 11 main/binary-amd64/Packages", HELLO_SHA1))
        );
        Ok(())
    }

    #[test]
    fn test_table_line() -> Result<()> {
        let c = Checksum::from_table_line(" abc 42 main/binary-amd64/Packages.gz")?;
        assert_eq!(c.digest, "abc");
        assert_eq!(c.size, 42);
        assert_eq!(c.path, "main/binary-amd64/Packages.gz");
        assert!(Checksum::from_table_line("abc 42").is_err());
        assert!(Checksum::from_table_line("abc x path").is_err());
        Ok(())
    }

    #[test]
    fn test_take_from_paragraph() -> Result<()> {
        let mut p = ControlParagraph::new();
        p.set("Package", "foo");
        p.set("Filename", "pool/main/foo.deb");
        p.set("Size", "11");
        p.set("MD5sum", HELLO_MD5);
        p.set("SHA256", HELLO_SHA256);

        let set = ChecksumSet::take_from_paragraph(&mut p)?;
        assert_eq!(set.len(), 2);
        assert_eq!(set.size(), Some(11));
        assert_eq!(set.path(), Some("pool/main/foo.deb"));
        assert!(!p.contains("MD5sum"));
        assert!(!p.contains("SHA256"));
        assert!(p.contains("Size"));
        assert_eq!(
            set.to_fields(),
            vec![("MD5sum", HELLO_MD5), ("SHA256", HELLO_SHA256)]
        );
        Ok(())
    }

    #[test]
    fn test_take_drops_untracked_digests() -> Result<()> {
        let mut p = ControlParagraph::new();
        p.set("Package", "foo");
        p.set("SHA256", HELLO_SHA256);
        p.set("SHA512", "ab".repeat(64));
        p.set("Description-md5", HELLO_MD5);

        let set = ChecksumSet::take_from_paragraph(&mut p)?;
        assert_eq!(set.len(), 1);
        assert!(!p.contains("SHA512"));
        assert!(!p.contains("SHA256"));
        assert_eq!(p.get("Description-md5"), Some(HELLO_MD5));
        Ok(())
    }

    #[test]
    fn test_merge_keeps_existing() {
        let mut a = ChecksumSet::from_digests(hash_string("a", &[HashAlgorithm::Md5]), 1, "x");
        let b = ChecksumSet::from_digests(hash_string("b", HashAlgorithm::all()), 1, "x");
        let md5_a = a.digest(HashAlgorithm::Md5).map(str::to_string);
        a.merge(&b);
        assert_eq!(a.len(), 3);
        assert_eq!(a.digest(HashAlgorithm::Md5).map(str::to_string), md5_a);
    }
}
