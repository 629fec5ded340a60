//! Chunked message cipher
//!
//! Text is split into blocks that each fit one RSA-OAEP encryption, every
//! block is encrypted on its own, and the ciphertexts are base64url-encoded
//! (padding kept) and joined with `::`.
//!
//! Blocks are independent. Reordering or dropping segments is not detected
//! beyond each segment being a valid OAEP ciphertext for the key; there is no
//! MAC over the whole sequence.

use crate::crypto::{KeyPair, PublicKey, OAEP_OVERHEAD};
use crate::error::{Error, Result};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

/// Separator between encoded segments; never produced by base64url
pub const DELIMITER: &str = "::";

/// Plaintext bytes per segment for a modulus of `modulus_bytes`
pub fn chunk_size(modulus_bytes: usize) -> Result<usize> {
    match modulus_bytes.checked_sub(OAEP_OVERHEAD) {
        Some(size) if size > 0 => Ok(size),
        _ => Err(Error::InvalidKey(format!(
            "{}-byte modulus leaves no room after {} bytes of OAEP overhead",
            modulus_bytes, OAEP_OVERHEAD
        ))),
    }
}

/// Split `plaintext` into consecutive chunks of at most `chunk_size` bytes
///
/// Empty input yields a single empty chunk.
pub fn split_chunks(plaintext: &[u8], chunk_size: usize) -> Vec<&[u8]> {
    if plaintext.is_empty() {
        return vec![plaintext];
    }
    plaintext.chunks(chunk_size).collect()
}

/// Number of segments in an encoded message
pub fn segment_count(encoded: &str) -> usize {
    encoded.trim().split(DELIMITER).count()
}

/// Strip surrounding whitespace from user-entered text
///
/// Fails with [`Error::MalformedInput`] if nothing is left.
pub fn normalize_text(text: &str) -> Result<&str> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::MalformedInput("message is empty".to_string()));
    }
    Ok(text)
}

/// Encrypt `plaintext` for one recipient
pub fn encrypt(plaintext: &[u8], recipient: &PublicKey) -> Result<String> {
    let size = chunk_size(recipient.modulus_size_bytes())?;

    let segments = split_chunks(plaintext, size)
        .into_iter()
        .map(|chunk| recipient.encrypt_oaep(chunk).map(|ct| URL_SAFE.encode(ct)))
        .collect::<Result<Vec<_>>>()?;

    debug!(
        plaintext_len = plaintext.len(),
        segments = segments.len(),
        "Encrypted message"
    );
    Ok(segments.join(DELIMITER))
}

/// Encrypt UTF-8 text for one recipient
pub fn encrypt_text(text: &str, recipient: &PublicKey) -> Result<String> {
    encrypt(text.as_bytes(), recipient)
}

/// Encrypt `plaintext` for every recipient independently
///
/// One result per recipient, in order; a bad key only fails its own entry.
pub fn encrypt_for_recipients(plaintext: &[u8], recipients: &[PublicKey]) -> Vec<Result<String>> {
    recipients
        .iter()
        .enumerate()
        .map(|(index, recipient)| {
            encrypt(plaintext, recipient).map_err(|e| e.for_recipient(index))
        })
        .collect()
}

/// Decrypt an encoded message with the recipient's key pair
///
/// Any bad segment fails the whole message; no partial plaintext is returned.
pub fn decrypt(encoded: &str, key_pair: &KeyPair) -> Result<String> {
    let mut plaintext = Zeroizing::new(Vec::new());

    for (index, segment) in encoded.trim().split(DELIMITER).enumerate() {
        let segment = segment.trim();
        if segment.is_empty() {
            return Err(Error::MalformedInput(format!("segment {} is empty", index)));
        }

        let ciphertext = URL_SAFE.decode(segment).map_err(|e| {
            Error::MalformedInput(format!("segment {} is not base64url: {}", index, e))
        })?;

        let block = key_pair.decrypt_oaep(&ciphertext).map_err(|_| {
            Error::MalformedInput(format!(
                "segment {} could not be decrypted with this key",
                index
            ))
        })?;
        plaintext.extend_from_slice(&block);
    }

    let bytes = std::mem::take(&mut *plaintext);
    let text = String::from_utf8(bytes).map_err(|e| {
        let valid_up_to = e.utf8_error().valid_up_to();
        e.into_bytes().zeroize();
        Error::Encoding(format!(
            "decrypted message is not UTF-8 (invalid byte at {})",
            valid_up_to
        ))
    })?;

    debug!(plaintext_len = text.len(), "Decrypted message");
    Ok(text)
}
