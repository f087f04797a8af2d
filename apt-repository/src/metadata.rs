//! Repository-wide settings and the directory layout derived from them.

use crate::checksum::ChecksumSet;
use crate::package::PackageRecord;
use crate::release::Release;
use crate::{AptRepositoryError, Result};
use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Version written to the `Version` field when none is configured.
pub const DEFAULT_VERSION: &str = "1.0";
pub const DEFAULT_CODENAME: &str = "stable";
pub const DEFAULT_COMPONENTS: &[&str] = &["main"];
pub const DEFAULT_ARCHITECTURES: &[&str] = &["amd64", "i386"];

/// Settings describing one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryMetadata {
    pub origin: String,
    pub label: String,
    pub version: String,
    pub description: String,
    pub codename: String,
    pub components: Vec<String>,
    pub architectures: Vec<String>,
}

/// One `dists/<codename>/<component>/binary-<arch>` directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryDir {
    pub component: String,
    pub architecture: String,
    /// Relative to the repository root.
    pub path: PathBuf,
}

fn check_name(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() || value.contains('/') || value.contains(char::is_whitespace) {
        return Err(AptRepositoryError::invalid_config(format!(
            "invalid {} '{}'",
            kind, value
        )));
    }
    Ok(())
}

impl RepositoryMetadata {
    /// Metadata for a repository called `name`, with the default value for every other field.
    pub fn new(name: &str) -> Self {
        Self {
            origin: name.to_string(),
            label: name.to_string(),
            version: DEFAULT_VERSION.to_string(),
            description: format!("{} APT repository", name),
            codename: DEFAULT_CODENAME.to_string(),
            components: DEFAULT_COMPONENTS.iter().map(|s| s.to_string()).collect(),
            architectures: DEFAULT_ARCHITECTURES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Rebuild metadata from a parsed top-level Release.
    ///
    /// Fields are looked up by lower-cased name. `Codename` falls back to `Suite` and then to
    /// `fallback_codename`; fields missing entirely keep the defaults for a repository named
    /// after the release's label.
    pub fn from_release(release: &Release, fallback_codename: &str) -> Self {
        let fields = release.lowercase_fields();
        let get = |name: &str| fields.get(name).filter(|v| !v.is_empty()).cloned();
        let list = |name: &str| -> Option<Vec<String>> {
            let items: Vec<String> = fields
                .get(name)?
                .split_whitespace()
                .map(str::to_string)
                .collect();
            (!items.is_empty()).then_some(items)
        };

        let name = get("label")
            .or_else(|| get("origin"))
            .unwrap_or_else(|| fallback_codename.to_string());
        let defaults = Self::new(&name);

        Self {
            origin: get("origin").unwrap_or(defaults.origin),
            label: get("label").unwrap_or(defaults.label),
            version: get("version").unwrap_or(defaults.version),
            description: get("description").unwrap_or(defaults.description),
            codename: get("codename")
                .or_else(|| get("suite"))
                .unwrap_or_else(|| fallback_codename.to_string()),
            components: list("components").unwrap_or(defaults.components),
            architectures: list("architectures").unwrap_or(defaults.architectures),
        }
    }

    /// Check that the layout can be created on disk.
    pub fn validate(&self) -> Result<()> {
        check_name("codename", &self.codename)?;
        if self.components.is_empty() {
            return Err(AptRepositoryError::invalid_config(
                "at least one component is required",
            ));
        }
        if self.architectures.is_empty() {
            return Err(AptRepositoryError::invalid_config(
                "at least one architecture is required",
            ));
        }
        for component in &self.components {
            check_name("component", component)?;
        }
        for architecture in &self.architectures {
            check_name("architecture", architecture)?;
        }
        Ok(())
    }

    /// `dists/<codename>`
    pub fn repodir(&self) -> PathBuf {
        Path::new("dists").join(&self.codename)
    }

    /// `pool/<component>` for every component, in order.
    pub fn pools(&self) -> Vec<PathBuf> {
        self.components
            .iter()
            .map(|c| Path::new("pool").join(c))
            .collect()
    }

    /// Binary package directories, architectures outermost.
    pub fn bindirs(&self) -> Vec<BinaryDir> {
        let repodir = &self.repodir();
        self.architectures
            .iter()
            .flat_map(|arch| {
                self.components.iter().map(move |component| BinaryDir {
                    component: component.clone(),
                    architecture: arch.clone(),
                    path: repodir.join(component).join(format!("binary-{}", arch)),
                })
            })
            .collect()
    }

    /// Every directory the layout needs.
    pub fn directories(&self) -> Vec<PathBuf> {
        self.bindirs()
            .into_iter()
            .map(|b| b.path)
            .chain(self.pools())
            .collect()
    }

    /// The Release stanza placed next to a `binary-<arch>` index.
    pub fn component_release(&self, component: &str, architecture: &str) -> Release {
        Release {
            component: Some(component.to_string()),
            origin: Some(self.origin.clone()),
            label: Some(self.label.clone()),
            description: Some(self.description.clone()),
            architecture: Some(architecture.to_string()),
            ..Release::default()
        }
    }

    /// The top-level Release, dated now to the second.
    pub fn repository_release<'a, I>(&self, index_files: I) -> Release
    where
        I: IntoIterator<Item = &'a ChecksumSet>,
    {
        self.repository_release_at(index_files, Utc::now().trunc_subsecs(0))
    }

    pub fn repository_release_at<'a, I>(&self, index_files: I, date: DateTime<Utc>) -> Release
    where
        I: IntoIterator<Item = &'a ChecksumSet>,
    {
        let mut release = Release {
            suite: Some(self.codename.clone()),
            codename: Some(self.codename.clone()),
            version: Some(self.version.clone()),
            components: self.components.clone(),
            origin: Some(self.origin.clone()),
            label: Some(self.label.clone()),
            description: Some(self.description.clone()),
            architectures: self.architectures.clone(),
            date: Some(date),
            ..Release::default()
        };
        for checksums in index_files {
            release.add_file(checksums);
        }
        release
    }
}

/// State accumulated during one index or parse run.
///
/// Every map keeps the first value stored under a key; later inserts for the same key are
/// ignored and reported as `false`.
#[derive(Debug, Default)]
pub struct RunContext {
    archives: BTreeMap<PathBuf, PackageRecord>,
    releases: BTreeMap<PathBuf, Release>,
    index_files: BTreeMap<String, ChecksumSet>,
}

fn insert_first<K: Ord, V>(map: &mut BTreeMap<K, V>, key: K, value: V) -> bool {
    match map.entry(key) {
        Entry::Vacant(e) => {
            e.insert(value);
            true
        }
        Entry::Occupied(_) => false,
    }
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_archive(&mut self, path: PathBuf, record: PackageRecord) -> bool {
        insert_first(&mut self.archives, path, record)
    }

    pub fn contains_archive(&self, path: &Path) -> bool {
        self.archives.contains_key(path)
    }

    pub fn add_release(&mut self, path: PathBuf, release: Release) -> bool {
        insert_first(&mut self.releases, path, release)
    }

    /// Record an index file's checksums under its path relative to the codename root.
    pub fn add_index_file(&mut self, path: String, checksums: ChecksumSet) -> bool {
        insert_first(&mut self.index_files, path, checksums)
    }

    pub fn archives(&self) -> &BTreeMap<PathBuf, PackageRecord> {
        &self.archives
    }

    pub fn releases(&self) -> &BTreeMap<PathBuf, Release> {
        &self.releases
    }

    pub fn index_files(&self) -> &BTreeMap<String, ChecksumSet> {
        &self.index_files
    }

    pub fn into_archives(self) -> BTreeMap<PathBuf, PackageRecord> {
        self.archives
    }
}
