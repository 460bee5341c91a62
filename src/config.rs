//! Image Vault - Configuration
//!
//! Loaded once at startup from a JSON file. Every field has a default, so an
//! empty object `{}` is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};
use crate::transform::TransformerBackend;

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Which external resize tool to invoke
    pub transformer: TransformerBackend,
    /// Override for the tool's executable (defaults to `magick` / `gm`)
    pub transformer_program: Option<PathBuf>,
    /// Upper bound on a single resize subprocess
    pub transform_timeout_secs: u64,
    /// Accepted declared content types
    pub allowed_content_types: Vec<String>,
    /// Maximum accepted source width in pixels
    pub max_width: u32,
    /// Maximum accepted source height in pixels
    pub max_height: u32,
    /// Key artifact location
    pub key_path: PathBuf,
    /// Directory for staged and resized temp files
    pub work_dir: PathBuf,
    /// SQLite database file
    pub database_path: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            transformer: TransformerBackend::ImageMagick,
            transformer_program: None,
            transform_timeout_secs: 60,
            allowed_content_types: vec!["image/png".into(), "image/jpeg".into()],
            max_width: 4000,
            max_height: 4000,
            key_path: PathBuf::from("secret.key"),
            work_dir: PathBuf::from("uploads"),
            database_path: PathBuf::from("images.db"),
        }
    }
}

impl ServiceConfig {
    /// Read and validate a JSON configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> VaultResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            VaultError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: ServiceConfig = serde_json::from_str(&raw)
            .map_err(|e| VaultError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot work with
    pub fn validate(&self) -> VaultResult<()> {
        if self.max_width == 0 || self.max_height == 0 {
            return Err(VaultError::Config(format!(
                "max dimensions must be positive (got {}x{})",
                self.max_width, self.max_height
            )));
        }
        if self.allowed_content_types.is_empty() {
            return Err(VaultError::Config(
                "allowed_content_types must not be empty".into(),
            ));
        }
        if self.transform_timeout_secs == 0 {
            return Err(VaultError::Config(
                "transform_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn transform_timeout(&self) -> Duration {
        Duration::from_secs(self.transform_timeout_secs)
    }
}
