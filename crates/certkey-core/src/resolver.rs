use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::certificate::{CertificateStore, SigningCertificate};
use crate::interaction::UserInteraction;
use crate::metadata::FINGERPRINT_LEN;

/// SHA-256 over the thumbprint text. This, never the thumbprint itself, is
/// what gets written to the metadata file.
pub fn fingerprint_hash(thumbprint: &str) -> [u8; FINGERPRINT_LEN] {
    Sha256::digest(thumbprint.as_bytes()).into()
}

pub struct CertificateResolver {
    store: Arc<dyn CertificateStore>,
    interaction: Arc<dyn UserInteraction>,
}

impl CertificateResolver {
    pub fn new(store: Arc<dyn CertificateStore>, interaction: Arc<dyn UserInteraction>) -> Self {
        Self { store, interaction }
    }

    /// Certificates that can sign. A store that cannot be enumerated yields
    /// no candidates.
    pub fn list_signing_certificates(&self) -> Vec<Arc<dyn SigningCertificate>> {
        match self.store.list_certificates() {
            Ok(certificates) => certificates
                .into_iter()
                .filter(|cert| {
                    let usable = cert.has_private_key();
                    if !usable {
                        debug!(thumbprint = cert.thumbprint(), "ignoring certificate without private key");
                    }
                    usable
                })
                .collect(),
            Err(e) => {
                warn!("cannot enumerate certificates: {e}");
                Vec::new()
            }
        }
    }

    pub fn resolve_by_fingerprint(
        candidates: &[Arc<dyn SigningCertificate>],
        hash: &[u8; FINGERPRINT_LEN],
    ) -> Option<Arc<dyn SigningCertificate>> {
        unique_match(candidates, |cert| fingerprint_hash(cert.thumbprint()) == *hash)
    }

    pub fn resolve_by_thumbprint(
        candidates: &[Arc<dyn SigningCertificate>],
        thumbprint: &str,
    ) -> Option<Arc<dyn SigningCertificate>> {
        unique_match(candidates, |cert| cert.thumbprint() == thumbprint)
    }

    pub fn request_selection(
        &self,
        candidates: &[Arc<dyn SigningCertificate>],
    ) -> Option<Arc<dyn SigningCertificate>> {
        let index = self.interaction.select_certificate(candidates)?;
        match candidates.get(index) {
            Some(cert) => Some(Arc::clone(cert)),
            None => {
                warn!(index, available = candidates.len(), "selection index out of range");
                None
            }
        }
    }
}

/// Exactly one match or nothing. Two certificates answering to the same
/// identifier are never disambiguated by picking one.
fn unique_match<F>(
    candidates: &[Arc<dyn SigningCertificate>],
    predicate: F,
) -> Option<Arc<dyn SigningCertificate>>
where
    F: Fn(&Arc<dyn SigningCertificate>) -> bool,
{
    let mut matches = candidates.iter().filter(|cert| predicate(*cert));
    let first = matches.next()?;
    if matches.next().is_some() {
        warn!("several certificates match the stored identifier; asking for a selection instead");
        return None;
    }
    Some(Arc::clone(first))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::certificate::{
        CertificateError, KeyAlgorithm, SignatureScheme, StaticCertificateStore,
    };
    use crate::interaction::Severity;
    use parking_lot::Mutex;

    pub(crate) struct FakeCertificate {
        pub subject: String,
        pub thumbprint: String,
        pub private_key: bool,
    }

    impl FakeCertificate {
        pub(crate) fn arc(subject: &str, thumbprint: &str) -> Arc<dyn SigningCertificate> {
            Arc::new(Self {
                subject: subject.into(),
                thumbprint: thumbprint.into(),
                private_key: true,
            })
        }
    }

    impl SigningCertificate for FakeCertificate {
        fn thumbprint(&self) -> &str {
            &self.thumbprint
        }
        fn subject(&self) -> &str {
            &self.subject
        }
        fn has_private_key(&self) -> bool {
            self.private_key
        }
        fn key_algorithm(&self) -> KeyAlgorithm {
            KeyAlgorithm::Rsa
        }
        fn sign(&self, payload: &[u8], _: SignatureScheme) -> Result<Vec<u8>, CertificateError> {
            Ok(payload.to_vec())
        }
    }

    struct FailingStore;

    impl CertificateStore for FailingStore {
        fn list_certificates(&self) -> Result<Vec<Arc<dyn SigningCertificate>>, CertificateError> {
            Err(CertificateError::Store("store locked".into()))
        }
    }

    #[derive(Default)]
    struct Picker {
        answer: Option<usize>,
        prompts: Mutex<usize>,
    }

    impl UserInteraction for Picker {
        fn select_certificate(&self, _: &[Arc<dyn SigningCertificate>]) -> Option<usize> {
            *self.prompts.lock() += 1;
            self.answer
        }
        fn enter_recovery_key(&self) -> Option<String> {
            None
        }
        fn show_recovery_key(&self, _: &str) {}
        fn notify(&self, _: &str, _: Severity) {}
    }

    fn resolver(certs: Vec<Arc<dyn SigningCertificate>>, answer: Option<usize>) -> (CertificateResolver, Arc<Picker>) {
        let picker = Arc::new(Picker {
            answer,
            ..Picker::default()
        });
        let store = Arc::new(StaticCertificateStore::new(certs));
        (CertificateResolver::new(store, picker.clone()), picker)
    }

    #[test]
    fn fingerprint_is_sha256_of_thumbprint_text() {
        let hash = fingerprint_hash("abc");
        assert_eq!(
            hex::encode(hash),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn excludes_certificates_without_private_key() {
        let without_key: Arc<dyn SigningCertificate> = Arc::new(FakeCertificate {
            subject: "public only".into(),
            thumbprint: "00".into(),
            private_key: false,
        });
        let (resolver, _) = resolver(vec![without_key, FakeCertificate::arc("alice", "AA")], None);
        let listed = resolver.list_signing_certificates();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].subject(), "alice");
    }

    #[test]
    fn store_failure_yields_no_candidates() {
        let resolver = CertificateResolver::new(Arc::new(FailingStore), Arc::new(Picker::default()));
        assert!(resolver.list_signing_certificates().is_empty());
    }

    #[test]
    fn resolves_unique_fingerprint() {
        let certs = vec![FakeCertificate::arc("a", "AA"), FakeCertificate::arc("b", "BB")];
        let found = CertificateResolver::resolve_by_fingerprint(&certs, &fingerprint_hash("BB")).unwrap();
        assert_eq!(found.subject(), "b");
        assert!(CertificateResolver::resolve_by_fingerprint(&certs, &fingerprint_hash("CC")).is_none());
    }

    #[test]
    fn colliding_fingerprints_resolve_to_nothing() {
        let certs = vec![
            FakeCertificate::arc("original", "AA"),
            FakeCertificate::arc("impostor", "AA"),
            FakeCertificate::arc("other", "BB"),
        ];
        assert!(CertificateResolver::resolve_by_fingerprint(&certs, &fingerprint_hash("AA")).is_none());
        assert!(CertificateResolver::resolve_by_thumbprint(&certs, "AA").is_none());
        assert!(CertificateResolver::resolve_by_thumbprint(&certs, "BB").is_some());
    }

    #[test]
    fn selection_maps_index_and_cancellation() {
        let certs = vec![FakeCertificate::arc("a", "AA"), FakeCertificate::arc("b", "BB")];
        let (chosen, picker) = resolver(certs.clone(), Some(1));
        assert_eq!(chosen.request_selection(&certs).unwrap().subject(), "b");
        assert_eq!(*picker.prompts.lock(), 1);

        let (cancelled, _) = resolver(certs.clone(), None);
        assert!(cancelled.request_selection(&certs).is_none());

        let (out_of_range, _) = resolver(certs.clone(), Some(5));
        assert!(out_of_range.request_selection(&certs).is_none());
    }
}
