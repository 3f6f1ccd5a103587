//! Certificate capability consumed by the key provider.
//!
//! The core never enumerates an operating-system store itself. Hosts inject a
//! [`CertificateStore`]; the bundled [`RsaKeyCertificate`] covers software
//! keys and is what the PEM directory store hands out.

use rsa::pkcs1::EncodeRsaPublicKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("certificate {0} has no private key")]
    NoPrivateKey(String),

    #[error("unsupported key algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("certificate store error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Rsa,
    Other(String),
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAlgorithm::Rsa => f.write_str("RSA"),
            KeyAlgorithm::Other(name) => f.write_str(name),
        }
    }
}

/// The only scheme the key derivation protocol signs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    RsaPkcs1v15Sha512,
}

pub trait SigningCertificate: Send + Sync {
    /// Stable identifier, e.g. the hex thumbprint shown by the store.
    fn thumbprint(&self) -> &str;

    /// Human-readable name for selection prompts.
    fn subject(&self) -> &str;

    fn has_private_key(&self) -> bool;

    fn key_algorithm(&self) -> KeyAlgorithm;

    fn sign(&self, payload: &[u8], scheme: SignatureScheme) -> Result<Vec<u8>, CertificateError>;
}

pub trait CertificateStore: Send + Sync {
    fn list_certificates(&self) -> Result<Vec<Arc<dyn SigningCertificate>>, CertificateError>;
}

/// A fixed set of certificates, for hosts that enumerate on their own.
#[derive(Clone, Default)]
pub struct StaticCertificateStore {
    certificates: Vec<Arc<dyn SigningCertificate>>,
}

impl StaticCertificateStore {
    pub fn new(certificates: Vec<Arc<dyn SigningCertificate>>) -> Self {
        Self { certificates }
    }
}

impl CertificateStore for StaticCertificateStore {
    fn list_certificates(&self) -> Result<Vec<Arc<dyn SigningCertificate>>, CertificateError> {
        Ok(self.certificates.clone())
    }
}

/// Software RSA key acting as a signing certificate.
pub struct RsaKeyCertificate {
    subject: String,
    thumbprint: String,
    key: RsaPrivateKey,
}

impl RsaKeyCertificate {
    pub fn new(subject: impl Into<String>, key: RsaPrivateKey) -> Result<Self, CertificateError> {
        let thumbprint = rsa_thumbprint(&key)?;
        Ok(Self {
            subject: subject.into(),
            thumbprint,
            key,
        })
    }
}

impl SigningCertificate for RsaKeyCertificate {
    fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    fn subject(&self) -> &str {
        &self.subject
    }

    fn has_private_key(&self) -> bool {
        true
    }

    fn key_algorithm(&self) -> KeyAlgorithm {
        KeyAlgorithm::Rsa
    }

    fn sign(&self, payload: &[u8], scheme: SignatureScheme) -> Result<Vec<u8>, CertificateError> {
        match scheme {
            SignatureScheme::RsaPkcs1v15Sha512 => {
                let digest = Sha512::digest(payload);
                self.key
                    .sign(Pkcs1v15Sign::new::<Sha512>(), &digest)
                    .map_err(|e| CertificateError::Signing(e.to_string()))
            }
        }
    }
}

/// Uppercase hex SHA-256 over the PKCS#1 DER public key.
pub fn rsa_thumbprint(key: &RsaPrivateKey) -> Result<String, CertificateError> {
    let der = key
        .to_public_key()
        .to_pkcs1_der()
        .map_err(|e| CertificateError::Store(format!("encode public key: {e}")))?;
    Ok(hex::encode_upper(Sha256::digest(der.as_bytes())))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::OnceLock;

    /// Key generation is slow in debug builds; share a small pool.
    pub(crate) fn test_key(index: usize) -> RsaPrivateKey {
        static KEYS: OnceLock<Vec<RsaPrivateKey>> = OnceLock::new();
        KEYS.get_or_init(|| {
            (0..2)
                .map(|_| RsaPrivateKey::new(&mut rand::rngs::OsRng, 1024).unwrap())
                .collect()
        })[index]
            .clone()
    }

    #[test]
    fn rsa_signature_is_deterministic() {
        let cert = RsaKeyCertificate::new("alice", test_key(0)).unwrap();
        let a = cert.sign(b"payload", SignatureScheme::RsaPkcs1v15Sha512).unwrap();
        let b = cert.sign(b"payload", SignatureScheme::RsaPkcs1v15Sha512).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 128);
        let c = cert.sign(b"other", SignatureScheme::RsaPkcs1v15Sha512).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn signature_verifies_with_public_key() {
        let key = test_key(0);
        let cert = RsaKeyCertificate::new("alice", key.clone()).unwrap();
        let sig = cert.sign(b"payload", SignatureScheme::RsaPkcs1v15Sha512).unwrap();
        let digest = Sha512::digest(b"payload");
        key.to_public_key()
            .verify(Pkcs1v15Sign::new::<Sha512>(), &digest, &sig)
            .unwrap();
    }

    #[test]
    fn thumbprint_is_stable_and_distinct() {
        let a = RsaKeyCertificate::new("a", test_key(0)).unwrap();
        let again = RsaKeyCertificate::new("a2", test_key(0)).unwrap();
        let b = RsaKeyCertificate::new("b", test_key(1)).unwrap();
        assert_eq!(a.thumbprint(), again.thumbprint());
        assert_ne!(a.thumbprint(), b.thumbprint());
        assert_eq!(a.thumbprint().len(), 64);
        assert!(a.thumbprint().chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }
}
