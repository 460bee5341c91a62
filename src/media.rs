//! Image Vault - Upload and Media Types

use std::fmt;
use std::path::Path;

use crate::error::{VaultError, VaultResult};

/// One named payload of an upload batch
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Original file name, becomes the storage key
    pub name: String,
    /// Content type declared by the client
    pub content_type: String,
    /// Raw file bytes
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Extension of the original name including the dot, or empty
    pub fn suffix(&self) -> String {
        extension(&self.name)
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default()
    }
}

/// The two image formats the vault serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageContentType {
    Png,
    Jpeg,
}

impl ImageContentType {
    /// Derive the content type from a file name's extension (case-insensitive)
    pub fn from_file_name(name: &str) -> VaultResult<Self> {
        let ext = extension(name).unwrap_or("").to_ascii_lowercase();
        match ext.as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            _ => Err(VaultError::UnsupportedExtension(name.to_string())),
        }
    }

    /// MIME string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }
}

impl fmt::Display for ImageContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decrypted image plus the content type to serve it with
#[derive(Debug, Clone)]
pub struct DownloadedImage {
    pub name: String,
    pub content_type: ImageContentType,
    pub bytes: Vec<u8>,
}

/// Reject names that cannot safely be a temp-file suffix or archive entry
pub fn check_file_name(name: &str) -> VaultResult<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if bad {
        return Err(VaultError::InvalidFileName(name.to_string()));
    }
    Ok(())
}

fn extension(name: &str) -> Option<&str> {
    Path::new(name).extension().and_then(|e| e.to_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_from_extension() {
        assert_eq!(ImageContentType::from_file_name("a.png").unwrap(), ImageContentType::Png);
        assert_eq!(ImageContentType::from_file_name("a.JPG").unwrap(), ImageContentType::Jpeg);
        assert_eq!(
            ImageContentType::from_file_name("photo.final.jpeg").unwrap().as_str(),
            "image/jpeg"
        );

        for name in ["a.gif", "noext", ""] {
            assert!(matches!(
                ImageContentType::from_file_name(name),
                Err(VaultError::UnsupportedExtension(_))
            ));
        }
    }

    #[test]
    fn test_file_name_checks() {
        assert!(check_file_name("a.jpg").is_ok());
        assert!(check_file_name("my photo (1).png").is_ok());
        for name in ["", ".", "..", "../a.jpg", "dir/a.jpg", "c:\\a.jpg"] {
            assert!(matches!(
                check_file_name(name),
                Err(VaultError::InvalidFileName(_))
            ));
        }
    }

    #[test]
    fn test_suffix() {
        assert_eq!(UploadedFile::new("a.jpg", "image/jpeg", vec![]).suffix(), ".jpg");
        assert_eq!(UploadedFile::new("a", "image/jpeg", vec![]).suffix(), "");
    }
}
