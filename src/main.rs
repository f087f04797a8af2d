//! Build, re-index and inspect flat APT repositories.

use anyhow::{Context, Result};
use apt_indexer::config::RepositoryConfig;
use apt_indexer::logging::LoggingArgs;
use apt_repository::{
    parse_repository, DebArchive, GpgSigner, IndexReport, LinkMode, PackageRecord,
    ParsedRepository, Repository, SignOptions,
};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    name = "apt-indexer",
    version,
    about = "Build and inspect APT repositories of .deb archives"
)]
struct Cli {
    #[command(flatten)]
    logging: LoggingArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the repository layout, add archives to every pool and index them
    Create {
        #[command(flatten)]
        repository: RepositoryArgs,

        /// Symlink archives into the pools instead of copying them
        #[arg(long)]
        symlink: bool,

        /// Archives to add
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Regenerate indices and Release files from the pool contents
    Index {
        #[command(flatten)]
        repository: RepositoryArgs,
    },

    /// Read an existing repository back from its Release and Packages files
    Parse {
        /// Repository root, `dists/<codename>` directory or Release file
        path: PathBuf,

        /// Codename to look up below the repository root
        #[arg(long)]
        codename: Option<String>,

        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Show the metadata of individual archives
    Inspect {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print JSON instead of control stanzas
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Args)]
struct RepositoryArgs {
    /// Repository root directory
    #[arg(long, default_value = ".")]
    repo: PathBuf,

    /// Path to a JSON repository configuration
    #[arg(long, short = 'c', env = "APT_INDEXER_CONFIG")]
    config: Option<PathBuf>,

    /// Repository name
    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    origin: Option<String>,

    #[arg(long)]
    label: Option<String>,

    /// Value of the Release `Version` field
    #[arg(long = "repo-version")]
    version: Option<String>,

    #[arg(long)]
    description: Option<String>,

    #[arg(long)]
    codename: Option<String>,

    /// Component to create (can be specified multiple times)
    #[arg(long = "component")]
    components: Vec<String>,

    /// Architecture to index (can be specified multiple times)
    #[arg(long = "architecture")]
    architectures: Vec<String>,

    /// GPG key ID to sign the Release file with
    #[arg(long, env = "APT_INDEXER_GPG_KEY")]
    gpg_key: Option<String>,

    /// GPG home directory
    #[arg(long)]
    gpg_home: Option<PathBuf>,
}

impl RepositoryArgs {
    /// The configuration file, if any, with command-line values applied on top.
    ///
    /// Returns `None` when neither a configuration file nor a name was given.
    fn config(&self) -> Result<Option<RepositoryConfig>> {
        let mut config = match (&self.config, &self.name) {
            (Some(path), _) => RepositoryConfig::from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            (None, Some(name)) => RepositoryConfig::new(name.as_str()),
            (None, None) => return Ok(None),
        };

        if let Some(name) = &self.name {
            config.name = name.clone();
        }
        if let Some(origin) = &self.origin {
            config.origin = Some(origin.clone());
        }
        if let Some(label) = &self.label {
            config.label = Some(label.clone());
        }
        if let Some(version) = &self.version {
            config.version = Some(version.clone());
        }
        if let Some(description) = &self.description {
            config.description = Some(description.clone());
        }
        if let Some(codename) = &self.codename {
            config.codename = codename.clone();
        }
        if !self.components.is_empty() {
            config.components = self.components.clone();
        }
        if !self.architectures.is_empty() {
            config.architectures = self.architectures.clone();
        }
        if let Some(options) = self.sign_options(config.gpg.take()) {
            config.gpg = Some(options);
        }

        config.validate()?;
        Ok(Some(config))
    }

    /// Signing options from the command line, on top of `existing`.
    fn sign_options(&self, existing: Option<SignOptions>) -> Option<SignOptions> {
        let mut options = match (&self.gpg_key, existing) {
            (Some(key_id), Some(mut options)) => {
                options.key_id = key_id.clone();
                options
            }
            (Some(key_id), None) => SignOptions::new(key_id.as_str()),
            (None, existing) => existing?,
        };
        if let Some(home) = &self.gpg_home {
            options.gpg_home = Some(home.clone());
        }
        Some(options)
    }

    fn repository(&self) -> Result<Repository> {
        match self.config()? {
            Some(config) => Ok(config.builder(&self.repo).build()?),
            None => {
                let codename = self.codename.as_deref().unwrap_or("stable");
                let mut repository = Repository::open(&self.repo, codename).with_context(|| {
                    format!(
                        "No configuration given and no repository at {}",
                        self.repo.display()
                    )
                })?;
                if let Some(options) = self.sign_options(None) {
                    repository.set_signer(Box::new(GpgSigner::new(options)?));
                }
                Ok(repository)
            }
        }
    }
}

fn print_report(report: &IndexReport) {
    println!(
        "Indexed {} archives into {} index files",
        report.context.archives().len(),
        report.context.index_files().len()
    );
    println!("Release: {}", report.release_path.display());
    for signature in &report.signatures {
        println!("Signature: {}", signature.display());
    }
}

fn print_parsed(parsed: &ParsedRepository, json: bool) -> Result<()> {
    if json {
        let packages: Vec<_> = parsed
            .packages
            .iter()
            .map(|(filename, record)| {
                let dependencies: serde_json::Map<String, serde_json::Value> = record
                    .dependencies()
                    .into_iter()
                    .filter(|(_, relation)| !relation.is_empty())
                    .map(|(field, relation)| (field.to_string(), relation.to_string().into()))
                    .collect();
                serde_json::json!({
                    "filename": filename,
                    "package": record.name(),
                    "version": record.version(),
                    "architecture": record.architecture(),
                    "identity": record.identity(),
                    "md5sum": record.md5sum(),
                    "sha256": record.sha256(),
                    "dependencies": dependencies,
                })
            })
            .collect();
        let value = serde_json::json!({
            "metadata": parsed.metadata,
            "release": parsed.release_path,
            "index_files": parsed.index_files,
            "packages": packages,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!(
        "{} ({}): {} packages",
        parsed.metadata.label,
        parsed.metadata.codename,
        parsed.packages.len()
    );
    for (filename, record) in &parsed.packages {
        println!("{}\t{}", record.identity(), filename);
    }
    Ok(())
}

fn inspect(path: &Path, json: bool) -> Result<()> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("Not a file: {}", path.display()))?;
    let record = PackageRecord::from_archive(&DebArchive, path, &filename)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    if json {
        let control: serde_json::Map<String, serde_json::Value> = record
            .control()
            .iter()
            .map(|(k, v)| (k.to_string(), v.into()))
            .collect();
        let checksums: serde_json::Map<String, serde_json::Value> = record
            .checksum_paragraph()
            .iter()
            .map(|(k, v)| (k.to_string(), v.into()))
            .collect();
        let value = serde_json::json!({
            "name": record.name(),
            "identity": record.identity(),
            "control": control,
            "files": record.files().iter().collect::<Vec<_>>(),
            "md5sums": record.files().md5sums(),
            "checksums": checksums,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}: {}", path.display(), record.identity());
    println!();
    print!("{}", record.control());
    println!();
    for file in record.files().iter() {
        println!("{}", file);
    }
    println!();
    print!("{}", record.files().md5sums_string());
    println!();
    print!("{}", record.checksum_paragraph());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.logging.init();

    match &cli.command {
        Command::Create {
            repository,
            symlink,
            files,
        } => {
            let config = repository
                .config()?
                .context("create needs --name or --config")?;
            let repo = config.builder(&repository.repo).build()?;
            let link_mode = if *symlink {
                LinkMode::Symlink
            } else {
                LinkMode::Copy
            };
            info!("Creating {} at {}", repo.name(), repo.base_path().display());
            let report = repo.create(files.as_slice(), link_mode)?;
            print_report(&report);
        }
        Command::Index { repository } => {
            let repo = repository.repository()?;
            info!("Indexing {} at {}", repo.name(), repo.base_path().display());
            let report = repo.index()?;
            print_report(&report);
        }
        Command::Parse {
            path,
            codename,
            json,
        } => {
            let parsed = parse_repository(path, codename.as_deref())
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            print_parsed(&parsed, *json)?;
        }
        Command::Inspect { files, json } => {
            for file in files {
                inspect(file, *json)?;
            }
        }
    }

    Ok(())
}
