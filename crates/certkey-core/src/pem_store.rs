//! Certificate store backed by a directory of PEM-encoded RSA private keys.
//!
//! Each `*.pem` file holding a PKCS#8 or PKCS#1 RSA key becomes one
//! [`RsaKeyCertificate`] whose subject is the file stem. Files that do not
//! parse are skipped so that one stray file cannot hide the others.

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::certificate::{CertificateError, CertificateStore, RsaKeyCertificate, SigningCertificate};

pub struct PemDirectoryStore {
    root: PathBuf,
}

impl PemDirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn load_key(path: &Path) -> Result<RsaPrivateKey, CertificateError> {
        let text = fs::read_to_string(path)?;
        RsaPrivateKey::from_pkcs8_pem(&text)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(&text))
            .map_err(|e| CertificateError::UnsupportedAlgorithm(format!("not an RSA private key: {e}")))
    }
}

impl CertificateStore for PemDirectoryStore {
    fn list_certificates(&self) -> Result<Vec<Arc<dyn SigningCertificate>>, CertificateError> {
        let entries = fs::read_dir(&self.root).map_err(|e| {
            CertificateError::Store(format!("read key directory {}: {e}", self.root.display()))
        })?;

        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "pem"))
            .collect();
        paths.sort();

        let mut certificates: Vec<Arc<dyn SigningCertificate>> = Vec::new();
        for path in paths {
            let subject = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let loaded = Self::load_key(&path).and_then(|key| RsaKeyCertificate::new(subject, key));
            match loaded {
                Ok(cert) => {
                    debug!(path = %path.display(), thumbprint = cert.thumbprint(), "loaded signing key");
                    certificates.push(Arc::new(cert));
                }
                Err(e) => warn!(path = %path.display(), "skipping key file: {e}"),
            }
        }
        Ok(certificates)
    }
}
