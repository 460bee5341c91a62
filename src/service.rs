//! Image Vault - Upload and Retrieval Pipeline
//!
//! Upload: validate → stage → resize → encrypt → persist, per file.
//! Retrieval: look up → decrypt, singly or as a ZIP bundle.

use std::io::{Cursor, Write};
use std::sync::Arc;

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::config::ServiceConfig;
use crate::crypto::{Cipher, KeyStore};
use crate::error::{VaultError, VaultResult};
use crate::media::{DownloadedImage, ImageContentType, UploadedFile};
use crate::staging::Workspace;
use crate::store::{ImageStore, SqliteImageStore};
use crate::transform::{build_transformer, ImageTransformer};
use crate::validation::Validator;

/// Result of one file in an upload batch
#[derive(Debug)]
pub struct FileOutcome {
    pub name: String,
    pub result: VaultResult<()>,
}

/// Per-file results of an upload batch, in request order
#[derive(Debug, Default)]
pub struct UploadReport {
    pub outcomes: Vec<FileOutcome>,
}

impl UploadReport {
    /// Names that were stored
    pub fn stored(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| o.name.as_str())
            .collect()
    }

    /// Names that failed, with the reason
    pub fn failed(&self) -> Vec<(&str, &VaultError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.name.as_str(), e)))
            .collect()
    }

    /// True if every file was stored
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }
}

/// Image service - the pipeline entry point
///
/// Safe to share across threads; concurrent requests only meet in the store.
pub struct ImageService {
    validator: Validator,
    transformer: Box<dyn ImageTransformer>,
    cipher: Cipher,
    store: Arc<dyn ImageStore>,
    workspace: Workspace,
}

impl ImageService {
    /// Wire up the service from its parts
    pub fn new(
        validator: Validator,
        transformer: Box<dyn ImageTransformer>,
        cipher: Cipher,
        store: Arc<dyn ImageStore>,
        workspace: Workspace,
    ) -> Self {
        Self {
            validator,
            transformer,
            cipher,
            store,
            workspace,
        }
    }

    /// Build everything from configuration: SQLite store, key file, transformer
    pub fn from_config(config: &ServiceConfig) -> VaultResult<Self> {
        config.validate()?;

        let store = Arc::new(SqliteImageStore::open(&config.database_path)?);
        let keys = Arc::new(KeyStore::new(&config.key_path));

        let transformer = build_transformer(config);

        // Materialize the key before serving anything
        let key = keys.load_or_create()?;
        log::info!(
            "Image service ready: transformer={}, key={}, store={}",
            transformer.name(),
            key.fingerprint(),
            config.database_path.display()
        );

        Ok(Self::new(
            Validator::from_config(config),
            transformer,
            Cipher::new(keys),
            store,
            Workspace::new(&config.work_dir),
        ))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // UPLOAD
    // ═══════════════════════════════════════════════════════════════════════

    /// Process a batch of uploads, each resized to `width`x`height`.
    ///
    /// Files are handled one after another and independently: a failure is
    /// recorded in the report and processing moves on.
    pub fn upload(&self, files: &[UploadedFile], width: u32, height: u32) -> VaultResult<UploadReport> {
        if width == 0 || height == 0 {
            return Err(VaultError::InvalidTargetSize { width, height });
        }

        let mut report = UploadReport::default();
        for file in files {
            let result = self.process_file(file, width, height);
            match &result {
                Ok(()) => log::info!("Stored {} ({}x{})", file.name, width, height),
                Err(e) if e.is_client_error() => log::info!("Rejected {}: {}", file.name, e),
                Err(e) => log::error!("Failed to store {}: {}", file.name, e),
            }
            report.outcomes.push(FileOutcome {
                name: file.name.clone(),
                result,
            });
        }

        Ok(report)
    }

    fn process_file(&self, file: &UploadedFile, width: u32, height: u32) -> VaultResult<()> {
        let dims = self.validator.validate(file, self.store.as_ref())?;
        log::debug!(
            "Validated {} ({}, {}x{})",
            file.name,
            file.content_type,
            dims.width,
            dims.height
        );

        // Both temp files are removed on drop, whichever step fails
        let suffix = file.suffix();
        let staged = self.workspace.stage(&file.bytes, &suffix)?;
        let resized = self.workspace.reserve(&suffix)?;

        self.transformer
            .resize(staged.path(), width, height, resized.path())?;

        let pixels = resized.read_all()?;
        let ciphertext = self.cipher.encrypt(&pixels)?;
        self.store.save(&file.name, &ciphertext)?;

        // Record is committed; a failed cleanup only warns
        if let Err(e) = staged.remove().and(resized.remove()) {
            log::warn!("Temp cleanup for {} failed: {}", file.name, e);
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // RETRIEVAL
    // ═══════════════════════════════════════════════════════════════════════

    /// Decrypted bytes of one stored image
    pub fn download(&self, name: &str) -> VaultResult<Vec<u8>> {
        let image = self
            .store
            .find(name)?
            .ok_or_else(|| VaultError::NotFound(name.to_string()))?;
        self.cipher.decrypt(&image.ciphertext)
    }

    /// Decrypted bytes plus the content type implied by the name's extension
    pub fn download_with_type(&self, name: &str) -> VaultResult<DownloadedImage> {
        let bytes = self.download(name)?;
        let content_type = ImageContentType::from_file_name(name)?;
        Ok(DownloadedImage {
            name: name.to_string(),
            content_type,
            bytes,
        })
    }

    /// ZIP archive of every stored image, decrypted, named by stored name.
    ///
    /// All or nothing: one undecryptable record fails the whole bundle.
    pub fn bundle_all(&self) -> VaultResult<Vec<u8>> {
        let images = self.store.find_all()?;

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();

        for image in &images {
            let plaintext = self.cipher.decrypt(&image.ciphertext).map_err(|e| {
                log::error!("Bundle aborted at {}: {}", image.name, e);
                e
            })?;
            zip.start_file(image.name.as_str(), options)?;
            zip.write_all(&plaintext)?;
        }

        let archive = zip.finish()?.into_inner();
        log::info!("Bundled {} images ({} bytes)", images.len(), archive.len());
        Ok(archive)
    }

    /// Stored names in store order
    pub fn list(&self) -> VaultResult<Vec<String>> {
        self.store.names()
    }
}
