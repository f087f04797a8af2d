//! # APT Repository Library
//!
//! Builds flat APT repositories from `.deb` archives and reads existing repositories back.
//!
//! ## Features
//!
//! - Extract control metadata, file lists and checksums from binary packages
//! - Generate `Packages` indices (plain, gzip, bzip2) and `Release` manifests
//! - Parse dependency relations and compare Debian versions
//! - Reconstruct package records from an existing repository
//! - Optional GPG signing of the top-level `Release`
//!
//! ## Example
//!
//! ```rust,no_run
//! use apt_repository::{LinkMode, RepositoryBuilder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let repo = RepositoryBuilder::new("/srv/apt", "example")
//!     .codename("stable")
//!     .architectures(vec!["amd64".to_string()])
//!     .components(vec!["main".to_string()])
//!     .build()?;
//!
//! let report = repo.create(&["hello_1.0-1_amd64.deb"], LinkMode::Copy)?;
//! println!("wrote {}", report.release_path.display());
//!
//! let parsed = apt_repository::parse_repository("/srv/apt", Some("stable"))?;
//! for identity in parsed.identities() {
//!     println!("{}", identity);
//! }
//! # Ok(())
//! # }
//! ```

pub mod checksum;
pub mod compression;
pub mod control;
pub mod deb;
pub mod error;
pub mod manifest;
pub mod metadata;
pub mod package;
pub mod parser;
pub mod relation;
pub mod release;
pub mod repository;
pub mod signing;
pub mod version;

pub use checksum::{Checksum, ChecksumSet, HashAlgorithm};
pub use compression::Compression;
pub use control::ControlParagraph;
pub use deb::{ArchiveContents, ArchiveReader, DebArchive};
pub use error::{AptRepositoryError, Result};
pub use manifest::FileManifest;
pub use metadata::{RepositoryMetadata, RunContext};
pub use package::PackageRecord;
pub use parser::{parse_repository, ParsedRepository};
pub use relation::{Dependency, Relation, RelationField};
pub use release::Release;
pub use repository::{IndexReport, LinkMode, Repository, RepositoryBuilder};
pub use signing::{GpgSigner, SignOptions, Signer};
pub use version::{compare_versions, PackageVersion};

/// Names under which a package index may appear in a Release manifest.
pub const PACKAGE_INDEX_FILENAMES: &[&str] = &[
    "Packages",
    "Packages.gz",
    "Packages.bz2",
    "Packages.xz",
    "Packages.lzma",
    "Packages.lz",
];

