//! Image Vault - Upload Validation
//!
//! Rules run in a fixed order and stop at the first violation:
//! content type, then pixel dimensions, then name uniqueness.

use std::io::Cursor;

use image::ImageReader;

use crate::config::ServiceConfig;
use crate::error::{VaultError, VaultResult};
use crate::media::{check_file_name, UploadedFile};
use crate::store::ImageStore;

/// Decoded pixel size of an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

/// Upload policy
#[derive(Debug, Clone)]
pub struct Validator {
    allowed_content_types: Vec<String>,
    max_width: u32,
    max_height: u32,
}

impl Validator {
    pub fn new(allowed_content_types: Vec<String>, max_width: u32, max_height: u32) -> Self {
        Self {
            allowed_content_types,
            max_width,
            max_height,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            config.allowed_content_types.clone(),
            config.max_width,
            config.max_height,
        )
    }

    /// Validate one upload against the policy and the store
    pub fn validate(&self, file: &UploadedFile, store: &dyn ImageStore) -> VaultResult<ImageDimensions> {
        check_file_name(&file.name)?;
        self.check_type(&file.content_type)?;
        let dims = self.check_dimensions(&file.bytes)?;
        Self::check_unique(&file.name, store)?;
        Ok(dims)
    }

    fn check_type(&self, content_type: &str) -> VaultResult<()> {
        if !self.allowed_content_types.iter().any(|t| t == content_type) {
            return Err(VaultError::UnsupportedType {
                content_type: content_type.to_string(),
            });
        }
        Ok(())
    }

    fn check_dimensions(&self, bytes: &[u8]) -> VaultResult<ImageDimensions> {
        let (width, height) = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| VaultError::Decode(e.to_string()))?
            .into_dimensions()?;

        if width > self.max_width || height > self.max_height {
            return Err(VaultError::DimensionExceeded {
                max_width: self.max_width,
                max_height: self.max_height,
            });
        }

        Ok(ImageDimensions { width, height })
    }

    fn check_unique(name: &str, store: &dyn ImageStore) -> VaultResult<()> {
        if store.exists(name)? {
            return Err(VaultError::AlreadyExists(name.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteImageStore;
    use image::{DynamicImage, ImageFormat};

    fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = DynamicImage::new_rgb8(width, height);
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), format).unwrap();
        buffer
    }

    fn validator() -> Validator {
        Validator::new(vec!["image/png".into(), "image/jpeg".into()], 200, 100)
    }

    #[test]
    fn test_accepts_valid_upload() {
        let store = SqliteImageStore::in_memory().unwrap();
        let file = UploadedFile::new("a.png", "image/png", encode(200, 100, ImageFormat::Png));

        let dims = validator().validate(&file, &store).unwrap();
        assert_eq!(dims, ImageDimensions { width: 200, height: 100 });
    }

    #[test]
    fn test_type_checked_before_decode() {
        let store = SqliteImageStore::in_memory().unwrap();
        // Bytes are garbage; the type rule must fire first
        let file = UploadedFile::new("a.txt", "text/plain", b"Invalid data".to_vec());

        let err = validator().validate(&file, &store).unwrap_err();
        assert!(matches!(err, VaultError::UnsupportedType { ref content_type } if content_type == "text/plain"));
    }

    #[test]
    fn test_dimension_ceiling() {
        let store = SqliteImageStore::in_memory().unwrap();

        for (w, h) in [(201, 100), (200, 101)] {
            let file = UploadedFile::new("big.jpg", "image/jpeg", encode(w, h, ImageFormat::Jpeg));
            let err = validator().validate(&file, &store).unwrap_err();
            assert!(matches!(
                err,
                VaultError::DimensionExceeded { max_width: 200, max_height: 100 }
            ));
            assert_eq!(err.to_string(), "Image size must not exceed 200x100 pixels");
        }
    }

    #[test]
    fn test_undecodable_bytes() {
        let store = SqliteImageStore::in_memory().unwrap();
        let file = UploadedFile::new("a.jpg", "image/jpeg", b"not really a jpeg".to_vec());

        let err = validator().validate(&file, &store).unwrap_err();
        assert!(matches!(err, VaultError::Decode(_)));
    }

    #[test]
    fn test_duplicate_checked_last() {
        let store = SqliteImageStore::in_memory().unwrap();
        store.save("dup.png", b"cipher").unwrap();

        let ok_image = UploadedFile::new("dup.png", "image/png", encode(10, 10, ImageFormat::Png));
        let err = validator().validate(&ok_image, &store).unwrap_err();
        assert!(matches!(err, VaultError::AlreadyExists(ref n) if n == "dup.png"));

        // Oversized duplicate reports the dimension problem, not the conflict
        let big = UploadedFile::new("dup.png", "image/png", encode(500, 10, ImageFormat::Png));
        let err = validator().validate(&big, &store).unwrap_err();
        assert!(matches!(err, VaultError::DimensionExceeded { .. }));
    }

    #[test]
    fn test_path_like_names_rejected() {
        let store = SqliteImageStore::in_memory().unwrap();
        let file = UploadedFile::new("../a.png", "image/png", encode(10, 10, ImageFormat::Png));

        let err = validator().validate(&file, &store).unwrap_err();
        assert!(matches!(err, VaultError::InvalidFileName(_)));
    }
}
