//! The 64-byte symmetric bundle wrapped for every recipient
//!
//! Layout is fixed: `[0, 32)` AES key, `[32, 48)` GCM nonce, `[48, 64)` GCM tag.

use crate::crypto::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};
use crate::error::{Error, Result};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Size of a serialized bundle in bytes
pub const BUNDLE_SIZE: usize = KEY_SIZE + NONCE_SIZE + TAG_SIZE;

const NONCE_OFFSET: usize = KEY_SIZE;
const TAG_OFFSET: usize = KEY_SIZE + NONCE_SIZE;

/// AES key, nonce and tag for one package encryption
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricBundle {
    pub(crate) key: [u8; KEY_SIZE],
    pub(crate) nonce: [u8; NONCE_SIZE],
    pub(crate) tag: [u8; TAG_SIZE],
}

impl SymmetricBundle {
    /// Serialize to the fixed 64-byte layout
    pub fn to_bytes(&self) -> Zeroizing<[u8; BUNDLE_SIZE]> {
        let mut bytes = Zeroizing::new([0u8; BUNDLE_SIZE]);
        bytes[..NONCE_OFFSET].copy_from_slice(&self.key);
        bytes[NONCE_OFFSET..TAG_OFFSET].copy_from_slice(&self.nonce);
        bytes[TAG_OFFSET..].copy_from_slice(&self.tag);
        bytes
    }

    /// Split a 64-byte bundle at its fixed offsets
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != BUNDLE_SIZE {
            return Err(Error::MalformedInput(format!(
                "symmetric bundle must be {} bytes, got {}",
                BUNDLE_SIZE,
                bytes.len()
            )));
        }

        let mut bundle = SymmetricBundle {
            key: [0u8; KEY_SIZE],
            nonce: [0u8; NONCE_SIZE],
            tag: [0u8; TAG_SIZE],
        };
        bundle.key.copy_from_slice(&bytes[..NONCE_OFFSET]);
        bundle.nonce.copy_from_slice(&bytes[NONCE_OFFSET..TAG_OFFSET]);
        bundle.tag.copy_from_slice(&bytes[TAG_OFFSET..]);
        Ok(bundle)
    }
}

impl std::fmt::Debug for SymmetricBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricBundle(..)")
    }
}
