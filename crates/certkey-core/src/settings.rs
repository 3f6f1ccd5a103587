use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_DATABASE_EXTENSION: &str = ".kdbx";
pub const DEFAULT_METADATA_EXTENSION: &str = ".properties";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("read settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse settings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid settings: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProviderSettings {
    /// Suffix a database path must carry, including the dot.
    pub database_extension: String,
    /// Suffix of the sidecar metadata file that replaces the database suffix.
    pub metadata_extension: String,
    /// Reuse a confirmed certificate choice for the rest of the session.
    pub resolution_cache: bool,
    /// Offer the recovery-key prompt when certificate derivation is unavailable.
    pub recovery_enabled: bool,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            database_extension: DEFAULT_DATABASE_EXTENSION.into(),
            metadata_extension: DEFAULT_METADATA_EXTENSION.into(),
            resolution_cache: true,
            recovery_enabled: true,
        }
    }
}

impl ProviderSettings {
    /// Load settings from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read(path)?;
        let settings: ProviderSettings = serde_json::from_slice(&data)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        for (name, ext) in [
            ("database_extension", &self.database_extension),
            ("metadata_extension", &self.metadata_extension),
        ] {
            if !ext.starts_with('.') || ext.len() < 2 {
                return Err(SettingsError::Invalid(format!(
                    "{name} must start with '.' and name a suffix, got {ext:?}"
                )));
            }
        }
        if self.database_extension == self.metadata_extension {
            return Err(SettingsError::Invalid(
                "metadata_extension must differ from database_extension".into(),
            ));
        }
        Ok(())
    }
}
