use std::fmt;
use std::sync::Arc;

use crate::certificate::SigningCertificate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
        }
    }
}

/// Modal prompts the provider needs from its host.
///
/// Every call blocks until the user answers. Cancellation is `None`; the
/// provider decides what happens next and never re-prompts on its own.
pub trait UserInteraction: Send + Sync {
    /// Index into `candidates` of the chosen certificate.
    fn select_certificate(&self, candidates: &[Arc<dyn SigningCertificate>]) -> Option<usize>;

    fn enter_recovery_key(&self) -> Option<String>;

    /// One-time display of a freshly derived key for the user to archive.
    fn show_recovery_key(&self, hex: &str);

    fn notify(&self, message: &str, severity: Severity);
}
