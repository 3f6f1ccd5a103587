use std::path::PathBuf;
use thiserror::Error;

use crate::certificate::CertificateError;

/// Every failure a key request can end in.
///
/// The orchestrator never lets one of these escape as a panic; callers see
/// them as the `Err` side of [`crate::provider::KeyProvider::get_key`].
#[derive(Debug, Error)]
pub enum KeyProviderError {
    #[error("database file has wrong extension (expected {expected}): {path}")]
    InvalidPathExtension { path: PathBuf, expected: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata file does not exist: {0}")]
    NotFound(PathBuf),

    #[error("metadata file is not valid: {0}")]
    ParseFailure(String),

    #[error("missing key {0}")]
    MissingRequiredField(&'static str),

    #[error("key {0} is already set")]
    DuplicateKey(String),

    #[error("metadata entry rejected: {0}")]
    InvalidEntry(String),

    #[error("no certificates with a private key are available")]
    NoCertificatesAvailable,

    #[error("no valid certificate selected")]
    CertificateSelectionCancelled,

    #[error("certificate key type is not supported: {0}")]
    UnsupportedKeyType(String),

    #[error("signing failed: {0}")]
    SigningFailure(String),

    #[error("unable to decode entered hex string: {0}")]
    RecoveryDecode(String),

    #[error("recovery key entry cancelled")]
    RecoveryCancelled,

    #[error("unable to save metadata file {path}: {source}")]
    PersistFailure {
        path: PathBuf,
        #[source]
        source: Box<KeyProviderError>,
    },
}

impl From<CertificateError> for KeyProviderError {
    fn from(err: CertificateError) -> Self {
        match err {
            CertificateError::UnsupportedAlgorithm(alg) => KeyProviderError::UnsupportedKeyType(alg),
            CertificateError::NoPrivateKey(thumbprint) => KeyProviderError::UnsupportedKeyType(
                format!("certificate {thumbprint} has no private key"),
            ),
            other => KeyProviderError::SigningFailure(other.to_string()),
        }
    }
}

impl KeyProviderError {
    /// Wrap a store error raised while writing metadata.
    pub fn persist(path: impl Into<PathBuf>, source: KeyProviderError) -> Self {
        KeyProviderError::PersistFailure {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// Errors raised before any certificate is involved end the request
    /// without a recovery prompt.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            KeyProviderError::InvalidPathExtension { .. } | KeyProviderError::PersistFailure { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, KeyProviderError>;
