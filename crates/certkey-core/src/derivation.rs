//! Signature-derived database keys.
//!
//! key = RSA-PKCS#1v1.5-SHA512-sign(cert, "<salt hex>:" + SIGNATURE_DATA_TEXT)
//!
//! PKCS#1 v1.5 signatures are deterministic, so the same certificate and salt
//! always reproduce the same key without it ever being stored. The payload
//! format and constant are a compatibility contract with every database that
//! already exists: changing either silently locks users out.

use std::fmt;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::certificate::{CertificateError, KeyAlgorithm, SignatureScheme, SigningCertificate};
use crate::error::{KeyProviderError, Result};

pub const SIGNATURE_DATA_TEXT: &str =
    "Data text for KeePass Password Safe Plugin - {F3EF424C-7517-4D58-A3FB-C1FB458FDDB6}!";
pub const PAYLOAD_SEPARATOR: char = ':';
pub const SIGNATURE_SCHEME: SignatureScheme = SignatureScheme::RsaPkcs1v15Sha512;

/// Raw key material handed to the caller. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey(Vec<u8>);

impl DerivedKey {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lowercase hex, the form users archive as their recovery key.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(&self.0))
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DerivedKey({} bytes)", self.0.len())
    }
}

pub fn build_payload(salt_hex: &str) -> Vec<u8> {
    format!("{salt_hex}{PAYLOAD_SEPARATOR}{SIGNATURE_DATA_TEXT}").into_bytes()
}

pub fn derive_key(certificate: &dyn SigningCertificate, payload: &[u8]) -> Result<DerivedKey> {
    if !certificate.has_private_key() {
        return Err(CertificateError::NoPrivateKey(certificate.thumbprint().to_string()).into());
    }
    match certificate.key_algorithm() {
        KeyAlgorithm::Rsa => {}
        other => return Err(KeyProviderError::UnsupportedKeyType(other.to_string())),
    }

    let signature = certificate.sign(payload, SIGNATURE_SCHEME)?;
    if signature.is_empty() {
        return Err(KeyProviderError::SigningFailure("empty signature".into()));
    }
    debug!(thumbprint = certificate.thumbprint(), len = signature.len(), "derived key");
    Ok(DerivedKey(signature))
}
