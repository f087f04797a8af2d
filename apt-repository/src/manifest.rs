//! The list of files shipped by a package.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Member paths of a package's data archive, kept sorted.
///
/// Paths are relative, without a leading `./` or `/`. The per-file md5 digests from the
/// package's `md5sums` control member are kept alongside when they were available.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FileManifest {
    paths: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    md5sums: BTreeMap<String, String>,
}

fn normalize(path: &str) -> &str {
    let path = path.strip_prefix("./").unwrap_or(path);
    path.trim_start_matches('/')
}

impl FileManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a manifest from member paths and their md5 digests.
    ///
    /// Digests for paths not in `paths` are dropped.
    pub fn with_md5sums<I, S>(paths: I, md5sums: BTreeMap<String, String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut manifest: Self = paths.into_iter().collect();
        for (path, digest) in md5sums {
            let path = normalize(&path).to_string();
            if manifest.paths.contains(&path) {
                manifest.md5sums.insert(path, digest);
            }
        }
        manifest
    }

    pub fn insert<S: AsRef<str>>(&mut self, path: S) {
        let path = normalize(path.as_ref());
        if !path.is_empty() {
            self.paths.insert(path.to_string());
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(normalize(path))
    }

    /// Paths in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn md5sum(&self, path: &str) -> Option<&str> {
        self.md5sums.get(normalize(path)).map(String::as_str)
    }

    pub fn md5sums(&self) -> &BTreeMap<String, String> {
        &self.md5sums
    }

    /// Render the digests in `md5sums` member format: `<digest>  <path>` per line.
    pub fn md5sums_string(&self) -> String {
        self.md5sums
            .iter()
            .map(|(path, digest)| format!("{}  {}\n", digest, path))
            .collect()
    }

    /// Whether this manifest lists exactly the given paths, in any order.
    pub fn matches<S: AsRef<str>>(&self, paths: &[S]) -> bool {
        let other: BTreeSet<&str> = paths.iter().map(|p| normalize(p.as_ref())).collect();
        other.len() == self.paths.len() && other.iter().all(|p| self.paths.contains(*p))
    }
}

impl<S: AsRef<str>> FromIterator<S> for FileManifest {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut manifest = Self::new();
        for path in iter {
            manifest.insert(path);
        }
        manifest
    }
}

impl<S: AsRef<str>> PartialEq<[S]> for FileManifest {
    fn eq(&self, other: &[S]) -> bool {
        self.matches(other)
    }
}

impl<S: AsRef<str>> PartialEq<Vec<S>> for FileManifest {
    fn eq(&self, other: &Vec<S>) -> bool {
        self.matches(other)
    }
}

impl fmt::Display for FileManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let paths: Vec<&str> = self.iter().collect();
        f.write_str(&paths.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_files() -> Vec<&'static str> {
        vec![
            "usr/share/doc/foo/changelog.Debian.gz",
            "usr/share/doc/foo/copyright",
            "usr/share/doc/foo/README.Debian",
        ]
    }

    #[test]
    fn test_display_is_sorted() {
        let manifest: FileManifest = doc_files().into_iter().collect();
        assert_eq!(
            manifest.to_string(),
            "usr/share/doc/foo/README.Debian\n\
             usr/share/doc/foo/changelog.Debian.gz\n\
             usr/share/doc/foo/copyright"
        );
    }

    #[test]
    fn test_set_equality() {
        let manifest: FileManifest = doc_files().into_iter().collect();
        let mut reversed = doc_files();
        reversed.reverse();
        assert_eq!(manifest, reversed);
        assert_eq!(manifest, ["./usr/share/doc/foo/copyright", "usr/share/doc/foo/README.Debian", "/usr/share/doc/foo/changelog.Debian.gz"][..]);
        assert_ne!(manifest, vec!["usr/share/doc/foo/copyright"]);
        assert_ne!(manifest, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_normalizes_member_names() {
        let manifest: FileManifest = ["./usr/bin/foo", "./", "/etc/foo.conf"].into_iter().collect();
        assert_eq!(manifest.iter().collect::<Vec<_>>(), vec!["etc/foo.conf", "usr/bin/foo"]);
        assert!(manifest.contains("./usr/bin/foo"));
    }

    #[test]
    fn test_md5sums() {
        let mut digests = BTreeMap::new();
        digests.insert(
            "usr/share/doc/foo/copyright".to_string(),
            "a664cb0d199e56bb5691d8ae29ca759a".to_string(),
        );
        digests.insert("not/shipped".to_string(), "00".to_string());

        let manifest = FileManifest::with_md5sums(doc_files(), digests);
        assert_eq!(manifest.len(), 3);
        assert_eq!(manifest.md5sums().len(), 1);
        assert_eq!(
            manifest.md5sum("usr/share/doc/foo/copyright"),
            Some("a664cb0d199e56bb5691d8ae29ca759a")
        );
        assert_eq!(
            manifest.md5sums_string(),
            "a664cb0d199e56bb5691d8ae29ca759a  usr/share/doc/foo/copyright\n"
        );
    }
}
