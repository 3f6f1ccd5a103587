//! Manual override: the user types back the hex key shown at creation time.
//!
//! Nothing here can tell whether the entered key is the right one for the
//! database. A wrong key surfaces later when the database refuses to open.

use std::sync::Arc;
use zeroize::Zeroizing;

use crate::derivation::DerivedKey;
use crate::error::{KeyProviderError, Result};
use crate::interaction::UserInteraction;

pub struct RecoveryFlow {
    interaction: Arc<dyn UserInteraction>,
}

impl RecoveryFlow {
    pub fn new(interaction: Arc<dyn UserInteraction>) -> Self {
        Self { interaction }
    }

    pub fn request_recovery_key(&self) -> Option<Zeroizing<String>> {
        self.interaction.enter_recovery_key().map(Zeroizing::new)
    }

    /// Prompt once and decode once.
    pub fn recover(&self) -> Result<DerivedKey> {
        let entered = self
            .request_recovery_key()
            .ok_or(KeyProviderError::RecoveryCancelled)?;
        decode(&entered)
    }
}

/// Strict hex: even length, hex digits only. Surrounding whitespace from a
/// paste is ignored.
pub fn decode(input: &str) -> Result<DerivedKey> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(KeyProviderError::RecoveryDecode("recovery key is empty".into()));
    }
    let bytes = hex::decode(trimmed).map_err(|e| KeyProviderError::RecoveryDecode(e.to_string()))?;
    Ok(DerivedKey::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::SigningCertificate;
    use crate::interaction::Severity;

    struct Typist(Option<&'static str>);

    impl UserInteraction for Typist {
        fn select_certificate(&self, _: &[Arc<dyn SigningCertificate>]) -> Option<usize> {
            None
        }
        fn enter_recovery_key(&self) -> Option<String> {
            self.0.map(str::to_string)
        }
        fn show_recovery_key(&self, _: &str) {}
        fn notify(&self, _: &str, _: Severity) {}
    }

    #[test]
    fn hex_round_trip() {
        let all_bytes: Vec<u8> = (0..=255).collect();
        for bytes in [vec![0u8], vec![0xde, 0xad, 0xbe, 0xef], all_bytes] {
            let decoded = decode(&hex::encode(&bytes)).unwrap();
            assert_eq!(decoded.as_bytes(), bytes.as_slice());
        }
    }

    #[test]
    fn accepts_uppercase_and_surrounding_whitespace() {
        let key = decode("  DEADbeef\n").unwrap();
        assert_eq!(key.as_bytes(), &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn rejects_malformed_input() {
        for input in ["zz", "abc", "", "   ", "de ad"] {
            assert!(
                matches!(decode(input), Err(KeyProviderError::RecoveryDecode(_))),
                "{input:?} should not decode"
            );
        }
    }

    #[test]
    fn recover_reports_cancellation() {
        let flow = RecoveryFlow::new(Arc::new(Typist(None)));
        assert!(matches!(flow.recover(), Err(KeyProviderError::RecoveryCancelled)));

        let flow = RecoveryFlow::new(Arc::new(Typist(Some("0102"))));
        assert_eq!(flow.recover().unwrap().as_bytes(), &[1, 2]);
    }
}
