//! certkey-core: database keys derived from a certificate signature.
//!
//! A per-database salt is signed with the user's RSA certificate; the
//! signature is the key. Nothing secret is stored. The sidecar metadata file
//! only remembers the salt and a hash of which certificate was used, and a
//! hex recovery key shown once at creation covers a lost certificate.
//!
//! # Module layout
//! - `metadata`     sidecar `key=value` file with salt and certificate hash
//! - `certificate`  certificate/store capability traits, software RSA keys
//! - `pem_store`    certificate store over a directory of PEM keys
//! - `resolver`     candidate listing, fingerprint matching, selection
//! - `cache`        session cache of confirmed certificate choices
//! - `derivation`   signing payload and signature-derived keys
//! - `recovery`     hex recovery-key entry
//! - `provider`     the state machine tying it together
//! - `settings`     JSON configuration
//! - `error`        error taxonomy

pub mod cache;
pub mod certificate;
pub mod derivation;
pub mod error;
pub mod interaction;
pub mod metadata;
pub mod paths;
pub mod pem_store;
pub mod provider;
pub mod random;
pub mod recovery;
pub mod resolver;
pub mod settings;

pub use derivation::DerivedKey;
pub use error::KeyProviderError;
pub use interaction::{Severity, UserInteraction};
pub use provider::{KeyProvider, KeyQueryContext};
pub use settings::ProviderSettings;
