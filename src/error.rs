//! Image Vault - Error Types

use thiserror::Error;

/// Result type for vault operations
pub type VaultResult<T> = Result<T, VaultError>;

/// Coarse error category, stable across message changes.
///
/// Transport layers map these onto their own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller sent something the vault refuses to accept
    ClientInput,
    /// The requested image does not exist
    NotFound,
    /// An image with the same name is already stored
    Conflict,
    /// The external resize tool failed
    Processing,
    /// Key or ciphertext problems
    Crypto,
    /// Everything else
    Internal,
}

/// Vault error types
#[derive(Error, Debug)]
pub enum VaultError {
    // ═══════════════════════════════════════════════════════════════
    // VALIDATION ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Only PNG and JPG files are accepted (got {content_type})")]
    UnsupportedType { content_type: String },

    #[error("Image size must not exceed {max_width}x{max_height} pixels")]
    DimensionExceeded { max_width: u32, max_height: u32 },

    #[error("Not a decodable image: {0}")]
    Decode(String),

    #[error("File already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid file name: {0:?}")]
    InvalidFileName(String),

    #[error("Target size must be positive (got {width}x{height})")]
    InvalidTargetSize { width: u32, height: u32 },

    #[error("Unsupported file extension: {0}")]
    UnsupportedExtension(String),

    // ═══════════════════════════════════════════════════════════════
    // RETRIEVAL ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("File not found: {0}")]
    NotFound(String),

    // ═══════════════════════════════════════════════════════════════
    // TRANSFORM ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("{tool} process failed with exit code {}: {message}", display_code(.code))]
    Transform {
        tool: String,
        code: Option<i32>,
        message: String,
    },

    #[error("{tool} process timed out after {seconds} seconds")]
    TransformTimeout { tool: String, seconds: u64 },

    // ═══════════════════════════════════════════════════════════════
    // CRYPTO ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Invalid key file {path}: expected {expected} bytes, got {actual}")]
    KeyFormat {
        path: String,
        expected: usize,
        actual: usize,
    },

    // ═══════════════════════════════════════════════════════════════
    // INFRASTRUCTURE ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Database error: {0}")]
    Database(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "none".to_string(),
    }
}

impl VaultError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::UnsupportedType { .. }
            | VaultError::DimensionExceeded { .. }
            | VaultError::Decode(_)
            | VaultError::InvalidFileName(_)
            | VaultError::InvalidTargetSize { .. }
            | VaultError::UnsupportedExtension(_) => ErrorKind::ClientInput,
            VaultError::AlreadyExists(_) => ErrorKind::Conflict,
            VaultError::NotFound(_) => ErrorKind::NotFound,
            VaultError::Transform { .. } | VaultError::TransformTimeout { .. } => {
                ErrorKind::Processing
            }
            VaultError::Encryption(_)
            | VaultError::Decryption(_)
            | VaultError::KeyFormat { .. } => ErrorKind::Crypto,
            VaultError::Database(_)
            | VaultError::Archive(_)
            | VaultError::Config(_)
            | VaultError::Serialization(_)
            | VaultError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Check if the caller can fix this by changing the request
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ClientInput | ErrorKind::NotFound | ErrorKind::Conflict
        )
    }
}

impl From<rusqlite::Error> for VaultError {
    fn from(e: rusqlite::Error) -> Self {
        VaultError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::Serialization(e.to_string())
    }
}

impl From<image::ImageError> for VaultError {
    fn from(e: image::ImageError) -> Self {
        VaultError::Decode(e.to_string())
    }
}

impl From<zip::result::ZipError> for VaultError {
    fn from(e: zip::result::ZipError) -> Self {
        VaultError::Archive(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_parameters() {
        let e = VaultError::DimensionExceeded {
            max_width: 800,
            max_height: 600,
        };
        assert_eq!(e.to_string(), "Image size must not exceed 800x600 pixels");

        let e = VaultError::AlreadyExists("a.jpg".into());
        assert_eq!(e.to_string(), "File already exists: a.jpg");

        let e = VaultError::Transform {
            tool: "ImageMagick".into(),
            code: Some(1),
            message: "bad input".into(),
        };
        assert_eq!(e.to_string(), "ImageMagick process failed with exit code 1: bad input");
    }

    #[test]
    fn test_kinds() {
        assert_eq!(VaultError::NotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(VaultError::AlreadyExists("x".into()).kind(), ErrorKind::Conflict);
        assert_eq!(
            VaultError::UnsupportedExtension("gif".into()).kind(),
            ErrorKind::ClientInput
        );
        assert_eq!(VaultError::Decryption("x".into()).kind(), ErrorKind::Crypto);
        assert!(!VaultError::Database("x".into()).is_client_error());
    }
}
