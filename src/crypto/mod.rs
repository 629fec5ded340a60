//! Cryptography module for hybridcrypt
//!
//! Provides the two primitives everything else is built on: RSA-OAEP
//! (SHA-1) key pairs and AES-256-GCM with a 128-bit nonce and detached tag.

mod encryption;
mod keys;

pub use encryption::{generate_key, open, seal, Sealed};
pub use keys::{KeyPair, PublicKey};

#[cfg(test)]
pub(crate) use keys::test_keys;

/// Size of AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of GCM nonce in bytes
pub const NONCE_SIZE: usize = 16;

/// Size of GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Bytes of RSA modulus consumed by OAEP padding with SHA-1 (2 * 20 + 2)
pub const OAEP_OVERHEAD: usize = 42;

/// Default RSA modulus size in bits for generated keys
pub const DEFAULT_KEY_BITS: usize = 2048;
