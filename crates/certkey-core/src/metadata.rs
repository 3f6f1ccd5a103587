//! Sidecar metadata file paired with each protected database.
//!
//! The file is plain ASCII, one `key=value` pair per line. Only the first `=`
//! separates key from value, so values may themselves contain `=`. Lines
//! without a separator are skipped rather than rejected; older files written
//! by hand or by other tools load as long as the required fields are present.
//!
//! Known keys:
//! - `salt` (required): 32 random bytes, lowercase hex.
//! - `cert` (optional): SHA-256 of the bound certificate's thumbprint, hex.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{KeyProviderError, Result};
use crate::settings::ProviderSettings;

pub const SALT_KEY: &str = "salt";
pub const CERT_KEY: &str = "cert";
pub const SALT_LEN: usize = 32;
pub const FINGERPRINT_LEN: usize = 32;

const REQUIRED_FIELDS: &[&str] = &[SALT_KEY];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseKeyMetadata {
    entries: BTreeMap<String, String>,
}

impl DatabaseKeyMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh metadata for a database whose key is being established.
    pub fn with_salt(salt: &[u8; SALT_LEN]) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(SALT_KEY.to_string(), hex::encode(salt));
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Insert a new pair. Overwriting an existing key is refused so that a
    /// value like the salt can never be silently replaced.
    pub fn put(&mut self, key: &str, value: &str) -> Result<()> {
        validate_entry(key, value)?;
        if self.entries.contains_key(key) {
            return Err(KeyProviderError::DuplicateKey(key.to_string()));
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The salt exactly as stored. The signing payload is built from this
    /// text, not from a re-encoding of the decoded bytes.
    pub fn salt_hex(&self) -> Result<&str> {
        self.get(SALT_KEY)
            .ok_or(KeyProviderError::MissingRequiredField(SALT_KEY))
    }

    pub fn salt(&self) -> Result<[u8; SALT_LEN]> {
        decode_fixed(SALT_KEY, self.salt_hex()?)
    }

    pub fn fingerprint_hash(&self) -> Result<Option<[u8; FINGERPRINT_LEN]>> {
        self.get(CERT_KEY)
            .map(|value| decode_fixed(CERT_KEY, value))
            .transpose()
    }

    pub fn set_fingerprint_hash(&mut self, hash: &[u8; FINGERPRINT_LEN]) -> Result<()> {
        self.put(CERT_KEY, &hex::encode(hash))
    }

    /// Drop the certificate binding. Returns whether one was present.
    pub fn clear_fingerprint_hash(&mut self) -> bool {
        self.entries.remove(CERT_KEY).is_some()
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines().peekable();
        if lines.peek().is_none() {
            return Err(KeyProviderError::ParseFailure("file is empty".into()));
        }

        let mut entries = BTreeMap::new();
        for (index, line) in lines.enumerate() {
            let Some((key, value)) = line.split_once('=') else {
                debug!(line = index + 1, "skipping metadata line without separator");
                continue;
            };
            if key.is_empty() {
                debug!(line = index + 1, "skipping metadata line with empty key");
                continue;
            }
            if entries.insert(key.to_string(), value.to_string()).is_some() {
                return Err(KeyProviderError::ParseFailure(format!(
                    "duplicate key {key} on line {}",
                    index + 1
                )));
            }
        }

        for field in REQUIRED_FIELDS {
            if !entries.contains_key(*field) {
                return Err(KeyProviderError::MissingRequiredField(*field));
            }
        }

        let metadata = Self { entries };
        metadata.salt()?;
        metadata.fingerprint_hash()?;
        Ok(metadata)
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out
    }
}

fn validate_entry(key: &str, value: &str) -> Result<()> {
    if key.is_empty() {
        return Err(KeyProviderError::InvalidEntry("empty key".into()));
    }
    if key.contains('=') {
        return Err(KeyProviderError::InvalidEntry(format!(
            "key {key:?} contains '='"
        )));
    }
    if key.contains(['\n', '\r']) || value.contains(['\n', '\r']) {
        return Err(KeyProviderError::InvalidEntry(format!(
            "entry {key:?} contains a line break"
        )));
    }
    Ok(())
}

fn decode_fixed<const N: usize>(field: &str, value: &str) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    hex::decode_to_slice(value, &mut out).map_err(|e| {
        KeyProviderError::ParseFailure(format!("{field} is not {N} bytes of hex: {e}"))
    })?;
    Ok(out)
}

/// Path of the metadata file that belongs to `database`: the database
/// extension is swapped for the metadata extension.
pub fn metadata_path_for(database: &Path, settings: &ProviderSettings) -> Result<PathBuf> {
    let invalid = || KeyProviderError::InvalidPathExtension {
        path: database.to_path_buf(),
        expected: settings.database_extension.clone(),
    };
    let name = database
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(invalid)?;
    let stem = name
        .strip_suffix(settings.database_extension.as_str())
        .filter(|stem| !stem.is_empty())
        .ok_or_else(invalid)?;
    Ok(database.with_file_name(format!("{stem}{}", settings.metadata_extension)))
}

pub fn exists(path: &Path) -> bool {
    path.is_file()
}

pub fn load(path: &Path) -> Result<DatabaseKeyMetadata> {
    if !exists(path) {
        return Err(KeyProviderError::NotFound(path.to_path_buf()));
    }
    let bytes = fs::read(path)?;
    let text = String::from_utf8(bytes)
        .map_err(|_| KeyProviderError::ParseFailure("file is not valid text".into()))?;
    DatabaseKeyMetadata::parse(&text)
}

/// Write through a synced `.staging` sibling and rename it into place.
pub fn save(path: &Path, metadata: &DatabaseKeyMetadata) -> Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| KeyProviderError::InvalidEntry(format!("{} has no file name", path.display())))?;
    let mut staging_name = file_name.to_os_string();
    staging_name.push(".staging");
    let staging_path = path.with_file_name(staging_name);

    let written = (|| -> std::io::Result<()> {
        let mut file = File::create(&staging_path)?;
        file.write_all(metadata.to_text().as_bytes())?;
        file.sync_all()?;
        fs::rename(&staging_path, path)?;
        if let Some(parent) = path.parent() {
            fsync_dir(parent)?;
        }
        Ok(())
    })();

    if let Err(err) = written {
        if staging_path.exists() {
            if let Err(e) = fs::remove_file(&staging_path) {
                warn!(path = %staging_path.display(), "cannot remove metadata staging file: {e}");
            }
        }
        return Err(err.into());
    }
    Ok(())
}

fn fsync_dir(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::fs::OpenOptions;

        let dir = if path.as_os_str().is_empty() {
            OpenOptions::new().read(true).open(".")?
        } else {
            OpenOptions::new().read(true).open(path)?
        };
        dir.sync_all()?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
