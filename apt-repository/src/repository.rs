//! Building repository layouts from a pile of `.deb` files.

use crate::checksum::ChecksumSet;
use crate::compression::{write_compressed, Compression};
use crate::control::dump_paragraphs;
use crate::deb::{ArchiveReader, DebArchive};
use crate::metadata::{BinaryDir, RepositoryMetadata, RunContext};
use crate::package::PackageRecord;
use crate::release::Release;
use crate::signing::{GpgSigner, SignOptions, Signer};
use crate::{AptRepositoryError, Result, PACKAGE_INDEX_FILENAMES};
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Compressed variants written next to every plain `Packages` file.
pub const INDEX_COMPRESSIONS: &[Compression] = &[Compression::Gzip, Compression::Bzip2];

/// Signature files a signer may leave next to the top-level Release.
pub const SIGNATURE_FILENAMES: &[&str] = &["InRelease", "Release.gpg"];

/// How [`Repository::create`] places input archives into the pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkMode {
    #[default]
    Copy,
    /// Symlink to the input file. An existing file at the destination is left alone.
    Symlink,
}

/// An APT repository rooted at a directory.
pub struct Repository {
    base_path: PathBuf,
    name: String,
    metadata: RepositoryMetadata,
    signer: Option<Box<dyn Signer>>,
    reader: Box<dyn ArchiveReader>,
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("base_path", &self.base_path)
            .field("name", &self.name)
            .field("metadata", &self.metadata)
            .field("signed", &self.signer.is_some())
            .finish()
    }
}

/// The result of one index run.
#[derive(Debug)]
pub struct IndexReport {
    /// Path of the top-level Release file.
    pub release_path: PathBuf,
    pub release: Release,
    /// Signature files written by the signer; empty when unsigned.
    pub signatures: Vec<PathBuf>,
    /// Everything discovered and written during the run.
    pub context: RunContext,
}

/// Path of `path` below `base`, with `/` separators.
pub(crate) fn relative_path(base: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

impl Repository {
    /// Open an existing repository, taking its settings from `dists/<codename>/Release`.
    ///
    /// The opened directory decides the codename, whatever the Release's `Codename` field says.
    pub fn open<P: AsRef<Path>>(base_path: P, codename: &str) -> Result<Self> {
        let base_path = absolute(base_path.as_ref())?;
        let release_path = base_path.join("dists").join(codename).join("Release");
        let text = fs::read_to_string(&release_path).map_err(|e| {
            AptRepositoryError::NotFound(format!("{}: {}", release_path.display(), e))
        })?;
        let release = Release::parse(&text)?;
        let mut metadata = RepositoryMetadata::from_release(&release, codename);
        if metadata.codename != codename {
            warn!(
                "{} claims codename {}, indexing as {}",
                release_path.display(),
                metadata.codename,
                codename
            );
            metadata.codename = codename.to_string();
        }
        metadata.validate()?;

        Ok(Self {
            base_path,
            name: metadata.label.clone(),
            metadata,
            signer: None,
            reader: Box::new(DebArchive),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &RepositoryMetadata {
        &self.metadata
    }

    pub fn set_signer(&mut self, signer: Box<dyn Signer>) {
        self.signer = Some(signer);
    }

    /// Lay out the directory tree, place `files` in every pool and index the result.
    pub fn create<P: AsRef<Path>>(&self, files: &[P], link_mode: LinkMode) -> Result<IndexReport> {
        for dir in self.metadata.directories() {
            fs::create_dir_all(self.base_path.join(dir))?;
        }

        for pool in self.metadata.pools() {
            let pool = self.base_path.join(pool);
            for file in files {
                let source = absolute(file.as_ref())?;
                let Some(file_name) = source.file_name() else {
                    return Err(AptRepositoryError::invalid_config(format!(
                        "not a file: {}",
                        source.display()
                    )));
                };
                let target = pool.join(file_name);
                match link_mode {
                    LinkMode::Copy => {
                        debug!("Copying {} to {}", source.display(), target.display());
                        fs::copy(&source, &target)?;
                    }
                    LinkMode::Symlink => {
                        if let Ok(existing) = fs::symlink_metadata(&target) {
                            if existing.file_type().is_symlink() {
                                debug!("Skipping existing link: {}", target.display());
                            } else {
                                debug!("Real file exists: {}", target.display());
                            }
                            continue;
                        }
                        debug!("Linking {} to {}", target.display(), source.display());
                        symlink(&source, &target)?;
                    }
                }
            }
        }

        self.index()
    }

    /// Regenerate every index and the top-level Release from the pool contents.
    pub fn index(&self) -> Result<IndexReport> {
        debug!("Indexing {}", self.metadata.codename);
        let mut context = RunContext::new();

        for pool in self.metadata.pools() {
            self.discover_archives(&pool, &mut context)?;
        }

        for bindir in self.metadata.bindirs() {
            self.write_binary_dir(&bindir, &mut context)?;
        }

        let repodir = self.base_path.join(self.metadata.repodir());
        self.discover_index_files(&repodir, &mut context)?;

        let release = self
            .metadata
            .repository_release(context.index_files().values());
        let release_path = repodir.join("Release");
        fs::write(&release_path, release.to_string())?;
        context.add_release(release_path.clone(), release.clone());

        let signatures = match &self.signer {
            Some(signer) => signer.sign(&release_path, &self.name, &self.metadata.codename)?,
            None => {
                remove_stale_signatures(&repodir)?;
                Vec::new()
            }
        };

        info!(
            "Indexed {} archives into {} index files for {}",
            context.archives().len(),
            context.index_files().len(),
            self.metadata.codename
        );

        Ok(IndexReport {
            release_path,
            release,
            signatures,
            context,
        })
    }

    /// Build a record for every `.deb` below `pool`, skipping archives that cannot be read.
    fn discover_archives(&self, pool: &Path, context: &mut RunContext) -> Result<()> {
        let root = self.base_path.join(pool);
        if !root.is_dir() {
            debug!("Pool {} does not exist, skipping", root.display());
            return Ok(());
        }

        debug!("Processing archives in {}", root.display());
        for entry in WalkDir::new(&root).follow_links(true).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().map_or(true, |e| e != "deb") {
                continue;
            }
            if context.contains_archive(path) {
                continue;
            }

            let filename = relative_path(&self.base_path, path);
            match PackageRecord::from_archive(self.reader.as_ref(), path, &filename) {
                Ok(record) => {
                    debug!("Found {} at {}", record.identity(), filename);
                    context.add_archive(path.to_path_buf(), record);
                }
                Err(e) if e.is_parse_error() => {
                    warn!("Skipping unreadable archive {}: {}", path.display(), e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Write `Packages`, its compressed variants and the per-directory `Release`.
    fn write_binary_dir(&self, bindir: &BinaryDir, context: &mut RunContext) -> Result<()> {
        let dir = self.base_path.join(&bindir.path);
        let pool = self.base_path.join("pool").join(&bindir.component);
        debug!(
            "Processing {} with arch {}",
            bindir.path.display(),
            bindir.architecture
        );

        let mut records: Vec<&PackageRecord> = context
            .archives()
            .iter()
            // `all` archives go into every architecture's index, and only archives from this
            // component's pool are listed, so the indices parse back to the pool contents.
            .filter(|(path, record)| {
                path.starts_with(&pool)
                    && (record.architecture() == bindir.architecture
                        || record.architecture() == "all")
            })
            .map(|(_, record)| record)
            .collect();
        records.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.cmp(b)));

        let paragraphs: Vec<_> = records.iter().map(|r| r.to_paragraph()).collect();
        let content = dump_paragraphs(&paragraphs);

        fs::create_dir_all(&dir)?;
        let plain = dir.join("Packages");
        fs::write(&plain, &content)?;
        for compression in INDEX_COMPRESSIONS {
            write_compressed(&plain, *compression, content.as_bytes())?;
        }

        let release = self
            .metadata
            .component_release(&bindir.component, &bindir.architecture);
        let release_path = dir.join("Release");
        fs::write(&release_path, release.to_string())?;
        context.add_release(release_path, release);
        Ok(())
    }

    /// Checksum every package index below the codename root.
    fn discover_index_files(&self, repodir: &Path, context: &mut RunContext) -> Result<()> {
        for entry in WalkDir::new(repodir).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !PACKAGE_INDEX_FILENAMES.iter().any(|n| *n == name) {
                continue;
            }
            let relative = relative_path(repodir, entry.path());
            let checksums = ChecksumSet::from_file(entry.path(), &relative)?;
            context.add_index_file(relative, checksums);
        }
        Ok(())
    }
}

/// Remove signatures of an earlier signed run, which no longer match the Release.
fn remove_stale_signatures(repodir: &Path) -> Result<()> {
    for name in SIGNATURE_FILENAMES {
        let path = repodir.join(name);
        match fs::remove_file(&path) {
            Ok(()) => info!("Removed stale signature {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[cfg(unix)]
fn symlink(source: &Path, target: &Path) -> Result<()> {
    std::os::unix::fs::symlink(source, target)?;
    Ok(())
}

#[cfg(not(unix))]
fn symlink(source: &Path, target: &Path) -> Result<()> {
    warn!("Symlinks are not supported here, copying {}", source.display());
    fs::copy(source, target)?;
    Ok(())
}

/// Builder for creating Repository instances.
pub struct RepositoryBuilder {
    base_path: PathBuf,
    name: String,
    metadata: RepositoryMetadata,
    signer: Option<Box<dyn Signer>>,
    sign_options: Option<SignOptions>,
    reader: Box<dyn ArchiveReader>,
}

impl RepositoryBuilder {
    /// A builder for repository `name` at `base_path`, starting from the default metadata.
    pub fn new<P: AsRef<Path>, S: Into<String>>(base_path: P, name: S) -> Self {
        let name = name.into();
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            metadata: RepositoryMetadata::new(&name),
            name,
            signer: None,
            sign_options: None,
            reader: Box::new(DebArchive),
        }
    }

    pub fn origin<S: Into<String>>(mut self, origin: S) -> Self {
        self.metadata.origin = origin.into();
        self
    }

    pub fn label<S: Into<String>>(mut self, label: S) -> Self {
        self.metadata.label = label.into();
        self
    }

    pub fn version<S: Into<String>>(mut self, version: S) -> Self {
        self.metadata.version = version.into();
        self
    }

    pub fn description<S: Into<String>>(mut self, description: S) -> Self {
        self.metadata.description = description.into();
        self
    }

    pub fn codename<S: Into<String>>(mut self, codename: S) -> Self {
        self.metadata.codename = codename.into();
        self
    }

    pub fn components(mut self, components: Vec<String>) -> Self {
        self.metadata.components = components;
        self
    }

    pub fn architectures(mut self, architectures: Vec<String>) -> Self {
        self.metadata.architectures = architectures;
        self
    }

    /// Sign with `gpg` using these options.
    pub fn sign_options(mut self, options: SignOptions) -> Self {
        self.sign_options = Some(options);
        self
    }

    /// Sign with a custom signer. Takes precedence over [`RepositoryBuilder::sign_options`].
    pub fn signer(mut self, signer: Box<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn archive_reader(mut self, reader: Box<dyn ArchiveReader>) -> Self {
        self.reader = reader;
        self
    }

    /// Build the Repository, validating the configuration.
    pub fn build(self) -> Result<Repository> {
        if self.name.trim().is_empty() {
            return Err(AptRepositoryError::invalid_config(
                "repository name cannot be empty",
            ));
        }
        self.metadata.validate()?;

        let signer = match (self.signer, self.sign_options) {
            (Some(signer), _) => Some(signer),
            (None, Some(options)) => Some(Box::new(GpgSigner::new(options)?) as Box<dyn Signer>),
            (None, None) => None,
        };

        Ok(Repository {
            base_path: absolute(&self.base_path)?,
            name: self.name,
            metadata: self.metadata,
            signer,
            reader: self.reader,
        })
    }
}
