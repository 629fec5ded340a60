//! AES-256-GCM Encryption Implementation
//!
//! Payloads are sealed with a 128-bit nonce and the authentication tag is
//! kept apart from the ciphertext, because the package format carries the tag
//! inside the RSA-wrapped key bundle rather than after the ciphertext.

use crate::crypto::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};
use crate::error::{Error, Result};
use aes_gcm::aead::consts::U16;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::AesGcm;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

/// AES-256-GCM with a 16-byte nonce
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Output of [`seal`]: ciphertext with the nonce and tag kept separately
#[derive(Debug, Clone)]
pub struct Sealed {
    /// Nonce used for encryption (unique per encryption)
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext, same length as the plaintext
    pub ciphertext: Vec<u8>,
    /// GCM authentication tag
    pub tag: [u8; TAG_SIZE],
}

/// Generate a fresh random AES-256 key from the OS CSPRNG
pub fn generate_key() -> Result<Zeroizing<[u8; KEY_SIZE]>> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    OsRng
        .try_fill_bytes(&mut key[..])
        .map_err(|e| Error::Encryption(format!("OS random generator failed: {}", e)))?;
    Ok(key)
}

/// Encrypt data using AES-256-GCM with no associated data
///
/// A random nonce is generated for every call.
pub fn seal(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<Sealed> {
    let cipher = Aes256Gcm16::new(GenericArray::from_slice(key));

    let mut nonce = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| Error::Encryption(format!("OS random generator failed: {}", e)))?;

    let mut ciphertext = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(&nonce), &[], &mut ciphertext)
        .map_err(|_| Error::Encryption("AES-GCM encryption failed".to_string()))?;

    let mut tag_bytes = [0u8; TAG_SIZE];
    tag_bytes.copy_from_slice(&tag);

    Ok(Sealed {
        nonce,
        ciphertext,
        tag: tag_bytes,
    })
}

/// Decrypt and verify data using AES-256-GCM
///
/// The tag is checked before any byte is decrypted; on mismatch nothing is
/// returned and the error is [`Error::Integrity`].
pub fn open(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
    tag: &[u8; TAG_SIZE],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm16::new(GenericArray::from_slice(key));

    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(nonce),
            &[],
            &mut buffer,
            GenericArray::from_slice(tag),
        )
        .map_err(|_| Error::Integrity)?;

    Ok(buffer)
}
