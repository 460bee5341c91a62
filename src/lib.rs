//! # Image Vault
//!
//! Resizes uploaded images with an external tool, encrypts the result and
//! stores it by original file name.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       IMAGE SERVICE                       │
//! │                                                           │
//! │  upload ─► VALIDATOR ─► STAGING ─► TRANSFORMER ─► CIPHER  │
//! │            type/dims/    temp       magick | gm    AES-256 │
//! │            duplicate     files                      -GCM   │
//! │                                                      │     │
//! │  download / bundle ◄── CIPHER ◄──── IMAGE STORE ◄────┘     │
//! │                                     (SQLite)               │
//! │                                                           │
//! │                 KEY STORE: single key file                │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Model
//!
//! - Resized images encrypted with AES-256-GCM before they reach the store
//! - One key, generated on first use and never rewritten
//! - Staged plaintext lives only in scoped temp files
//!
//! ```rust,ignore
//! use image_vault::{ImageService, ServiceConfig, UploadedFile};
//!
//! let service = ImageService::from_config(&ServiceConfig::default())?;
//! let report = service.upload(&[UploadedFile::new("a.jpg", "image/jpeg", bytes)], 50, 50)?;
//! let jpeg = service.download("a.jpg")?;
//! let zip = service.bundle_all()?;
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod media;
pub mod service;
pub mod staging;
pub mod store;
pub mod transform;
pub mod validation;

pub use config::ServiceConfig;
pub use crypto::{Cipher, KeyStore, VaultKey};
pub use error::{ErrorKind, VaultError, VaultResult};
pub use media::{DownloadedImage, ImageContentType, UploadedFile};
pub use service::{FileOutcome, ImageService, UploadReport};
pub use staging::Workspace;
pub use store::{ImageStore, SqliteImageStore, StoredImage};
pub use transform::{
    build_transformer, GraphicsMagickTransformer, ImageMagickTransformer, ImageTransformer,
    TransformerBackend,
};
pub use validation::{ImageDimensions, Validator};

/// Image Vault version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
