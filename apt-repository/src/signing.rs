//! Signing the top-level Release file.

use crate::{AptRepositoryError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, error, info};

/// Produces signature files for a Release file.
pub trait Signer {
    /// Sign `path`, returning the signature files written next to it.
    ///
    /// `repository_name` and `codename` identify what is being signed, for logging and for
    /// signers that pick a key per repository.
    fn sign(&self, path: &Path, repository_name: &str, codename: &str) -> Result<Vec<PathBuf>>;
}

fn default_true() -> bool {
    true
}

fn default_gpg_binary() -> PathBuf {
    PathBuf::from("gpg")
}

/// GPG configuration for repository signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignOptions {
    /// Key to sign with.
    pub key_id: String,
    /// GPG home directory; `GNUPGHOME` or `~/.gnupg` when unset.
    #[serde(default)]
    pub gpg_home: Option<PathBuf>,
    /// File holding the key passphrase.
    #[serde(default)]
    pub passphrase_file: Option<PathBuf>,
    /// Write a detached, armored `Release.gpg`.
    #[serde(default = "default_true")]
    pub detached_signature: bool,
    /// Write a clearsigned `InRelease`.
    #[serde(default = "default_true")]
    pub clearsign: bool,
    #[serde(default = "default_gpg_binary")]
    pub gpg_binary: PathBuf,
}

impl SignOptions {
    pub fn new<S: Into<String>>(key_id: S) -> Self {
        Self {
            key_id: key_id.into(),
            gpg_home: None,
            passphrase_file: None,
            detached_signature: true,
            clearsign: true,
            gpg_binary: default_gpg_binary(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.key_id.trim().is_empty() {
            return Err(AptRepositoryError::invalid_config(
                "GPG key ID cannot be empty",
            ));
        }
        if !self.detached_signature && !self.clearsign {
            return Err(AptRepositoryError::invalid_config(
                "at least one of detached_signature and clearsign must be enabled",
            ));
        }
        Ok(())
    }
}

/// Signs by running the `gpg` binary.
#[derive(Debug, Clone)]
pub struct GpgSigner {
    options: SignOptions,
}

impl GpgSigner {
    pub fn new(options: SignOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &SignOptions {
        &self.options
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.options.gpg_binary);
        cmd.arg("--batch")
            .arg("--yes")
            .arg("--armor")
            .arg("--local-user")
            .arg(&self.options.key_id)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(home) = &self.options.gpg_home {
            cmd.arg("--homedir").arg(home);
        }
        if let Some(passphrase_file) = &self.options.passphrase_file {
            cmd.arg("--pinentry-mode")
                .arg("loopback")
                .arg("--passphrase-file")
                .arg(passphrase_file);
        }
        cmd
    }

    fn run(&self, mode: &str, input: &Path, output: &Path) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg(mode).arg("--output").arg(output).arg(input);

        debug!("Running command: {:?}", cmd);

        let result = cmd.output().map_err(|e| {
            AptRepositoryError::Signing(format!(
                "failed to run {}: {}",
                self.options.gpg_binary.display(),
                e
            ))
        })?;

        if result.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&result.stderr);
        let exit_code = result.status.code().unwrap_or(-1);
        error!(
            "Failed to sign {} (exit code {}): {}",
            input.display(),
            exit_code,
            stderr
        );
        Err(AptRepositoryError::Signing(format!(
            "gpg {} failed with exit code {}: {}",
            mode,
            exit_code,
            stderr.trim()
        )))
    }
}

impl Signer for GpgSigner {
    fn sign(&self, path: &Path, repository_name: &str, codename: &str) -> Result<Vec<PathBuf>> {
        info!(
            "Signing {} for {} ({}) with key {}",
            path.display(),
            repository_name,
            codename,
            self.options.key_id
        );

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut written = Vec::new();

        if self.options.detached_signature {
            let output = dir.join("Release.gpg");
            self.run("--detach-sign", path, &output)?;
            written.push(output);
        }

        if self.options.clearsign {
            let output = dir.join("InRelease");
            self.run("--clearsign", path, &output)?;
            written.push(output);
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_json() {
        let options: SignOptions = serde_json::from_str(r#"{"key_id": "ABCDEF"}"#).unwrap();
        assert_eq!(options, SignOptions::new("ABCDEF"));

        let options: SignOptions = serde_json::from_str(
            r#"{"key_id": "ABCDEF", "gpg_home": "/srv/gnupg", "clearsign": false}"#,
        )
        .unwrap();
        assert_eq!(options.gpg_home, Some(PathBuf::from("/srv/gnupg")));
        assert!(options.detached_signature);
        assert!(!options.clearsign);
    }

    #[test]
    fn test_options_wrong_shape() {
        assert!(serde_json::from_str::<SignOptions>(r#""ABCDEF""#).is_err());
        assert!(serde_json::from_str::<SignOptions>(r#"{"key_id": 42}"#).is_err());
        assert!(serde_json::from_str::<SignOptions>(r#"{"key_id": "A", "keyid": "B"}"#).is_err());
    }

    #[test]
    fn test_validate() {
        assert!(GpgSigner::new(SignOptions::new("")).is_err());

        let mut options = SignOptions::new("ABCDEF");
        options.detached_signature = false;
        options.clearsign = false;
        assert!(matches!(
            GpgSigner::new(options),
            Err(AptRepositoryError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_missing_binary_is_signing_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let release = dir.path().join("Release");
        std::fs::write(&release, "Origin: test\n")?;

        let mut options = SignOptions::new("ABCDEF");
        options.gpg_binary = dir.path().join("no-such-gpg");
        let signer = GpgSigner::new(options)?;

        let err = signer.sign(&release, "test", "stable").unwrap_err();
        assert!(matches!(err, AptRepositoryError::Signing(_)));
        Ok(())
    }
}
