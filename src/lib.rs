//! hybridcrypt - RSA-OAEP messages and AES-256-GCM multi-recipient packages
//!
//! Two ciphers built on one key type:
//! - [`message`]: short text split into RSA-OAEP blocks, encoded as
//!   `::`-joined base64url segments
//! - [`package`]: arbitrary payloads encrypted once with AES-256-GCM, the key
//!   wrapped per recipient with RSA-OAEP
//!
//! [`archive`] turns files into the payload bytes the package cipher expects.

pub mod archive;
pub mod config;
pub mod crypto;
pub mod error;
pub mod message;
pub mod package;

pub use config::Config;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::archive::{Archive, BundleArchive};
    pub use crate::config::Config;
    pub use crate::crypto::{KeyPair, PublicKey};
    pub use crate::error::{Error, Result};
    pub use crate::package::{decrypt_package, encrypt_package, EncryptOptions, Package};
}
