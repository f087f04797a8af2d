//! Repository configuration files.
//!
//! A configuration is a JSON object describing one repository. Every field except `name` may
//! be omitted and then takes the same default as [`RepositoryBuilder`] uses.

use apt_repository::metadata::{DEFAULT_ARCHITECTURES, DEFAULT_CODENAME, DEFAULT_COMPONENTS};
use apt_repository::{AptRepositoryError, RepositoryBuilder, Result, SignOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_codename() -> String {
    DEFAULT_CODENAME.to_string()
}

fn default_components() -> Vec<String> {
    DEFAULT_COMPONENTS.iter().map(|s| s.to_string()).collect()
}

fn default_architectures() -> Vec<String> {
    DEFAULT_ARCHITECTURES.iter().map(|s| s.to_string()).collect()
}

/// APT repository configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryConfig {
    /// Repository name; default for origin and label.
    pub name: String,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_codename")]
    pub codename: String,
    #[serde(default = "default_components")]
    pub components: Vec<String>,
    #[serde(default = "default_architectures")]
    pub architectures: Vec<String>,
    /// Sign the top-level Release with gpg.
    #[serde(default)]
    pub gpg: Option<SignOptions>,
}

impl RepositoryConfig {
    /// A configuration for `name` with every other field defaulted.
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            origin: None,
            label: None,
            version: None,
            description: None,
            codename: default_codename(),
            components: default_components(),
            architectures: default_architectures(),
            gpg: None,
        }
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: RepositoryConfig = serde_json::from_str(text).map_err(|e| {
            AptRepositoryError::invalid_config(format!("Failed to parse config: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AptRepositoryError::invalid_config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            AptRepositoryError::invalid_config(format!("Failed to serialize config: {}", e))
        })
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AptRepositoryError::invalid_config(
                "Repository name cannot be empty",
            ));
        }

        if self.codename.trim().is_empty() {
            return Err(AptRepositoryError::invalid_config(
                "Codename cannot be empty",
            ));
        }

        if self.architectures.is_empty() {
            return Err(AptRepositoryError::invalid_config(
                "At least one architecture must be specified",
            ));
        }

        if self.components.is_empty() {
            return Err(AptRepositoryError::invalid_config(
                "At least one component must be specified",
            ));
        }

        if let Some(gpg) = &self.gpg {
            gpg.validate()?;
        }

        Ok(())
    }

    /// A builder for the repository at `base_path` with these settings.
    pub fn builder<P: AsRef<Path>>(&self, base_path: P) -> RepositoryBuilder {
        let mut builder = RepositoryBuilder::new(base_path, self.name.as_str())
            .codename(self.codename.as_str())
            .components(self.components.clone())
            .architectures(self.architectures.clone());
        if let Some(origin) = &self.origin {
            builder = builder.origin(origin.as_str());
        }
        if let Some(label) = &self.label {
            builder = builder.label(label.as_str());
        }
        if let Some(version) = &self.version {
            builder = builder.version(version.as_str());
        }
        if let Some(description) = &self.description {
            builder = builder.description(description.as_str());
        }
        if let Some(gpg) = &self.gpg {
            builder = builder.sign_options(gpg.clone());
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config = RepositoryConfig::from_json(r#"{"name": "janitor"}"#).unwrap();
        assert_eq!(config, RepositoryConfig::new("janitor"));
        assert_eq!(config.codename, "stable");
        assert_eq!(config.components, vec!["main"]);
        assert_eq!(config.architectures, vec!["amd64", "i386"]);
        assert!(config.gpg.is_none());
    }

    #[test]
    fn test_full_config() {
        let config = RepositoryConfig::from_json(
            r#"{
                "name": "janitor",
                "origin": "Janitor",
                "label": "Janitor",
                "version": "2.0",
                "description": "Janitor packages",
                "codename": "bookworm",
                "components": ["main", "contrib"],
                "architectures": ["arm64"],
                "gpg": {"key_id": "ABCDEF", "clearsign": false}
            }"#,
        )
        .unwrap();
        assert_eq!(config.codename, "bookworm");
        assert_eq!(config.components, vec!["main", "contrib"]);
        let gpg = config.gpg.as_ref().unwrap();
        assert_eq!(gpg.key_id, "ABCDEF");
        assert!(gpg.detached_signature);
        assert!(!gpg.clearsign);

        let roundtrip = RepositoryConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(roundtrip, config);
    }

    #[test]
    fn test_invalid_configs() {
        for text in [
            r#"{"name": ""}"#,
            r#"{"name": "x", "codename": " "}"#,
            r#"{"name": "x", "components": []}"#,
            r#"{"name": "x", "architectures": []}"#,
            r#"{"name": "x", "gpg": {"key_id": ""}}"#,
            r#"{"name": "x", "gpg": "ABCDEF"}"#,
            r#"{"name": "x", "gpg": {"key_id": 42}}"#,
            r#"{"name": "x", "suite": "stable"}"#,
            r#"{"origin": "x"}"#,
            "not json",
        ] {
            let err = RepositoryConfig::from_json(text).unwrap_err();
            assert!(
                matches!(err, AptRepositoryError::InvalidConfiguration(_)),
                "{}: {:?}",
                text,
                err
            );
        }
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repo.json");
        std::fs::write(&path, r#"{"name": "janitor", "codename": "sid"}"#).unwrap();
        let config = RepositoryConfig::from_file(&path).unwrap();
        assert_eq!(config.codename, "sid");

        let err = RepositoryConfig::from_file(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, AptRepositoryError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_builder_applies_settings() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RepositoryConfig::new("janitor");
        config.label = Some("Janitor".to_string());
        config.architectures = vec!["arm64".to_string()];

        let repo = config.builder(dir.path()).build().unwrap();
        assert_eq!(repo.name(), "janitor");
        assert_eq!(repo.metadata().origin, "janitor");
        assert_eq!(repo.metadata().label, "Janitor");
        assert_eq!(repo.metadata().description, "janitor APT repository");
        assert_eq!(repo.metadata().architectures, vec!["arm64"]);
    }
}
