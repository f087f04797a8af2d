//! Error types for the APT repository library.

/// Result type for APT repository operations.
pub type Result<T> = std::result::Result<T, AptRepositoryError>;

/// Errors that can occur when working with APT repositories.
#[derive(Debug, thiserror::Error)]
pub enum AptRepositoryError {
    /// I/O error occurred during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An expected manifest or index file is absent or unreadable.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid repository or signing configuration.
    #[error("Invalid repository configuration: {0}")]
    InvalidConfiguration(String),

    /// Malformed control stanza.
    #[error("Invalid control data: {0}")]
    InvalidControl(String),

    /// Malformed relation field.
    #[error("Invalid relation in '{field}': {value}: {reason}")]
    InvalidRelation {
        field: String,
        value: String,
        reason: String,
    },

    /// Malformed version string.
    #[error("Invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    /// Missing required field.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Invalid field value.
    #[error("Invalid field value for '{field}': {value}")]
    InvalidField { field: String, value: String },

    /// Compression error.
    #[error("Compression error: {0}")]
    Compression(String),

    /// The package archive container is malformed.
    #[error("Invalid package archive {path}: {reason}")]
    Archive { path: String, reason: String },

    /// The external signer failed.
    #[error("Signing failed: {0}")]
    Signing(String),
}

impl AptRepositoryError {
    /// Create a new invalid configuration error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a new invalid control data error.
    pub fn invalid_control<S: Into<String>>(msg: S) -> Self {
        Self::InvalidControl(msg.into())
    }

    /// Create a new missing field error.
    pub fn missing_field<S: Into<String>>(field: S) -> Self {
        Self::MissingField(field.into())
    }

    /// Create a new invalid field error.
    pub fn invalid_field<F: Into<String>, V: Into<String>>(field: F, value: V) -> Self {
        Self::InvalidField {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Create a new archive error.
    pub fn archive<P: Into<String>, S: Into<String>>(path: P, reason: S) -> Self {
        Self::Archive {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error stems from malformed input rather than the environment.
    ///
    /// Bulk discovery skips inputs failing with these errors and keeps going.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidControl(_)
                | Self::InvalidRelation { .. }
                | Self::InvalidVersion { .. }
                | Self::MissingField(_)
                | Self::InvalidField { .. }
                | Self::Compression(_)
                | Self::Archive { .. }
        )
    }
}

impl From<walkdir::Error> for AptRepositoryError {
    fn from(e: walkdir::Error) -> Self {
        let message = e.to_string();
        match e.into_io_error() {
            Some(io) => Self::Io(io),
            None => Self::Io(std::io::Error::new(std::io::ErrorKind::Other, message)),
        }
    }
}
