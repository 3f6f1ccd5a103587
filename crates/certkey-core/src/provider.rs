//! Key provider: turns a database path into key material.
//!
//! Each request walks an explicit state machine:
//!
//! ```text
//! Start ─┬─ CreatingNew ──────┐
//!        └─ OpeningExisting ──┴─ SaltReady ─ CertificateResolved ─ KeySigned
//!                                                 ─ CertificatePersisted ─ Done
//! ```
//!
//! Failures once a certificate is involved divert to a single recovery-key
//! prompt; path errors and metadata write failures end the request directly.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::ResolutionCache;
use crate::certificate::{CertificateStore, SigningCertificate};
use crate::derivation::{build_payload, derive_key, DerivedKey};
use crate::error::{KeyProviderError, Result};
use crate::interaction::{Severity, UserInteraction};
use crate::metadata::{self, metadata_path_for, DatabaseKeyMetadata, SALT_LEN};
use crate::random::{OsRandom, RandomSource};
use crate::recovery::RecoveryFlow;
use crate::resolver::{fingerprint_hash, CertificateResolver};
use crate::settings::ProviderSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyQueryContext {
    pub database_path: PathBuf,
    pub creating_new_key: bool,
}

impl KeyQueryContext {
    pub fn open(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            creating_new_key: false,
        }
    }

    pub fn create(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            creating_new_key: true,
        }
    }
}

struct Session {
    metadata_path: PathBuf,
    metadata: DatabaseKeyMetadata,
}

enum Step {
    Start,
    OpeningExisting(PathBuf),
    CreatingNew(PathBuf),
    SaltReady(Session),
    CertificateResolved(Session, Arc<dyn SigningCertificate>),
    KeySigned(Session, Arc<dyn SigningCertificate>, DerivedKey),
    CertificatePersisted(DerivedKey),
    RecoveryAttempt(KeyProviderError),
    Done(DerivedKey),
    Failed(KeyProviderError),
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::Start => "start",
            Step::OpeningExisting(_) => "opening_existing",
            Step::CreatingNew(_) => "creating_new",
            Step::SaltReady(_) => "salt_ready",
            Step::CertificateResolved(..) => "certificate_resolved",
            Step::KeySigned(..) => "key_signed",
            Step::CertificatePersisted(_) => "certificate_persisted",
            Step::RecoveryAttempt(_) => "recovery_attempt",
            Step::Done(_) => "done",
            Step::Failed(_) => "failed",
        }
    }
}

pub struct KeyProvider {
    settings: ProviderSettings,
    resolver: CertificateResolver,
    recovery: RecoveryFlow,
    interaction: Arc<dyn UserInteraction>,
    random: Arc<dyn RandomSource>,
    cache: Arc<ResolutionCache>,
}

impl KeyProvider {
    pub fn new(
        settings: ProviderSettings,
        store: Arc<dyn CertificateStore>,
        interaction: Arc<dyn UserInteraction>,
    ) -> Self {
        Self {
            resolver: CertificateResolver::new(store, Arc::clone(&interaction)),
            recovery: RecoveryFlow::new(Arc::clone(&interaction)),
            settings,
            interaction,
            random: Arc::new(OsRandom),
            cache: Arc::new(ResolutionCache::new()),
        }
    }

    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// Share one cache between providers serving the same process.
    pub fn with_cache(mut self, cache: Arc<ResolutionCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &Arc<ResolutionCache> {
        &self.cache
    }

    pub fn get_key(&self, ctx: &KeyQueryContext) -> Result<DerivedKey> {
        let mut step = Step::Start;
        loop {
            debug!(
                state = step.name(),
                database = %ctx.database_path.display(),
                "key provider step"
            );
            step = match step {
                Step::Done(key) => {
                    info!(database = %ctx.database_path.display(), "key available");
                    return Ok(key);
                }
                Step::Failed(err) => {
                    warn!(database = %ctx.database_path.display(), "key unavailable: {err}");
                    self.interaction.notify(&err.to_string(), Severity::Warning);
                    return Err(err);
                }
                other => self.advance(ctx, other),
            };
        }
    }

    fn advance(&self, ctx: &KeyQueryContext, step: Step) -> Step {
        match step {
            Step::Start => match metadata_path_for(&ctx.database_path, &self.settings) {
                Ok(path) if ctx.creating_new_key => Step::CreatingNew(path),
                Ok(path) => Step::OpeningExisting(path),
                Err(e) => Step::Failed(e),
            },

            Step::OpeningExisting(metadata_path) => match metadata::load(&metadata_path) {
                Ok(metadata) => Step::SaltReady(Session {
                    metadata_path,
                    metadata,
                }),
                Err(e) => Step::RecoveryAttempt(e),
            },

            Step::CreatingNew(metadata_path) => {
                self.cache.invalidate(&ctx.database_path);
                let mut salt = [0u8; SALT_LEN];
                self.random.fill_bytes(&mut salt);
                let metadata = DatabaseKeyMetadata::with_salt(&salt);
                match metadata::save(&metadata_path, &metadata) {
                    Ok(()) => {
                        info!(path = %metadata_path.display(), "created key metadata");
                        Step::SaltReady(Session {
                            metadata_path,
                            metadata,
                        })
                    }
                    Err(e) => Step::Failed(KeyProviderError::persist(metadata_path, e)),
                }
            }

            Step::SaltReady(session) => {
                let candidates = self.resolver.list_signing_certificates();
                if candidates.is_empty() {
                    return Step::RecoveryAttempt(KeyProviderError::NoCertificatesAvailable);
                }
                let remembered = if ctx.creating_new_key {
                    None
                } else {
                    self.resolve_remembered(&ctx.database_path, &session.metadata, &candidates)
                };
                match remembered.or_else(|| self.resolver.request_selection(&candidates)) {
                    Some(cert) => Step::CertificateResolved(session, cert),
                    None => Step::RecoveryAttempt(KeyProviderError::CertificateSelectionCancelled),
                }
            }

            Step::CertificateResolved(session, cert) => {
                let derived = session
                    .metadata
                    .salt_hex()
                    .and_then(|salt| derive_key(cert.as_ref(), &build_payload(salt)));
                match derived {
                    Ok(key) => {
                        if self.settings.resolution_cache {
                            self.cache.remember(&ctx.database_path, cert.thumbprint());
                        }
                        Step::KeySigned(session, cert, key)
                    }
                    Err(e) => Step::RecoveryAttempt(e),
                }
            }

            Step::KeySigned(mut session, cert, key) => {
                let hash = fingerprint_hash(cert.thumbprint());
                match session.metadata.fingerprint_hash() {
                    Ok(Some(stored)) => {
                        if stored != hash {
                            warn!(
                                database = %ctx.database_path.display(),
                                "selected certificate differs from the one bound to this database"
                            );
                        }
                        Step::CertificatePersisted(key)
                    }
                    _ => {
                        session.metadata.clear_fingerprint_hash();
                        let saved = session
                            .metadata
                            .set_fingerprint_hash(&hash)
                            .and_then(|()| metadata::save(&session.metadata_path, &session.metadata));
                        match saved {
                            Ok(()) => {
                                info!(path = %session.metadata_path.display(), "bound certificate to database");
                                Step::CertificatePersisted(key)
                            }
                            Err(e) => {
                                self.cache.invalidate(&ctx.database_path);
                                Step::Failed(KeyProviderError::persist(session.metadata_path, e))
                            }
                        }
                    }
                }
            }

            Step::CertificatePersisted(key) => {
                if ctx.creating_new_key {
                    self.interaction.show_recovery_key(&key.to_hex());
                }
                Step::Done(key)
            }

            Step::RecoveryAttempt(reason) => {
                warn!(database = %ctx.database_path.display(), "certificate key unavailable: {reason}");
                if reason.is_terminal() || !self.settings.recovery_enabled {
                    return Step::Failed(reason);
                }
                self.interaction.notify(
                    &format!("{reason}\nYou can now use your recovery key."),
                    Severity::Warning,
                );
                match self.recovery.recover() {
                    Ok(key) => {
                        self.cache.invalidate(&ctx.database_path);
                        info!(database = %ctx.database_path.display(), "using recovery key");
                        Step::Done(key)
                    }
                    Err(e) => Step::Failed(e),
                }
            }

            done @ (Step::Done(_) | Step::Failed(_)) => done,
        }
    }

    /// A confirmed cache entry first, then the fingerprint stored in the
    /// metadata file.
    fn resolve_remembered(
        &self,
        database: &Path,
        metadata: &DatabaseKeyMetadata,
        candidates: &[Arc<dyn SigningCertificate>],
    ) -> Option<Arc<dyn SigningCertificate>> {
        let stored = metadata.fingerprint_hash().ok().flatten();

        if self.settings.resolution_cache {
            if let Some(thumbprint) = self.cache.confirmed_thumbprint(database) {
                let consistent = stored.map_or(true, |hash| fingerprint_hash(&thumbprint) == hash);
                if consistent {
                    if let Some(cert) = CertificateResolver::resolve_by_thumbprint(candidates, &thumbprint) {
                        debug!(thumbprint = %thumbprint, "resolved certificate from session cache");
                        return Some(cert);
                    }
                } else {
                    debug!("session cache disagrees with stored fingerprint; ignoring it");
                }
            }
        }

        let cert = CertificateResolver::resolve_by_fingerprint(candidates, &stored?)?;
        debug!(thumbprint = cert.thumbprint(), "resolved certificate from stored fingerprint");
        Some(cert)
    }

    /// Host hook for a database that opened with the key last returned for
    /// it. Confirms the pending cache entry.
    pub fn on_database_opened(&self, database: &Path) -> bool {
        self.cache.confirm(database)
    }

    pub fn forget_database(&self, database: &Path) -> bool {
        self.cache.invalidate(database)
    }

    /// Remove the certificate binding so the next open asks for a selection.
    pub fn forget_certificate(&self, database: &Path) -> Result<bool> {
        let path = metadata_path_for(database, &self.settings)?;
        let mut metadata = metadata::load(&path)?;
        self.cache.invalidate(database);
        if !metadata.clear_fingerprint_hash() {
            return Ok(false);
        }
        metadata::save(&path, &metadata).map_err(|e| KeyProviderError::persist(&path, e))?;
        info!(path = %path.display(), "cleared certificate binding");
        Ok(true)
    }

    pub fn inspect(&self, database: &Path) -> Result<(PathBuf, DatabaseKeyMetadata)> {
        let path = metadata_path_for(database, &self.settings)?;
        let metadata = metadata::load(&path)?;
        Ok((path, metadata))
    }
}
