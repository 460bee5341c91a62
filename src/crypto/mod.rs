//! Image Vault - Cryptographic Core
//!
//! One persisted AES-256 key and the cipher that uses it.

pub mod keys;
pub mod aead;

pub use keys::*;
pub use aead::*;
