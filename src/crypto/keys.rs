//! RSA key management for hybridcrypt
//!
//! Wraps the `rsa` crate behind two types with a capability split:
//! - [`PublicKey`]: can encrypt (OAEP with SHA-1) and report its size
//! - [`KeyPair`]: a private key plus its derived public key, can also decrypt
//!
//! Private keys are exported as PKCS#1 PEM and public keys as SPKI PEM.
//! Both PKCS#1 and PKCS#8 / SPKI encodings are accepted on import.

use crate::crypto::OAEP_OVERHEAD;
use crate::error::{Error, Result};
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use zeroize::Zeroizing;

/// RSA public key usable for OAEP encryption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    inner: RsaPublicKey,
}

impl PublicKey {
    /// Parse a PEM public key (SPKI "PUBLIC KEY" or PKCS#1 "RSA PUBLIC KEY")
    pub fn from_pem(pem: &str) -> Result<Self> {
        let pem = pem.trim();
        let inner = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map_err(|e| Error::KeyFormat(format!("not a PEM RSA public key: {}", e)))?;
        Ok(PublicKey { inner })
    }

    /// Load a PEM public key from a file
    pub fn load_pem_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let pem = fs::read_to_string(path.as_ref())?;
        Self::from_pem(&pem)
    }

    /// Serialize as an SPKI PEM string
    pub fn to_pem(&self) -> Result<String> {
        self.inner
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| Error::KeyFormat(e.to_string()))
    }

    /// Size of the RSA modulus in bytes (256 for a 2048-bit key)
    pub fn modulus_size_bytes(&self) -> usize {
        self.inner.size()
    }

    /// Largest message a single OAEP block can carry, if any
    pub fn max_message_len(&self) -> Option<usize> {
        self.modulus_size_bytes()
            .checked_sub(OAEP_OVERHEAD)
            .filter(|len| *len > 0)
    }

    /// Hex SHA-256 of the SPKI DER encoding
    pub fn fingerprint(&self) -> Result<String> {
        let der = self
            .inner
            .to_public_key_der()
            .map_err(|e| Error::KeyFormat(e.to_string()))?;
        Ok(hex::encode(Sha256::digest(der.as_bytes())))
    }

    /// Encrypt one block with RSA-OAEP (SHA-1)
    ///
    /// Fails with [`Error::InvalidKey`] if the modulus cannot hold `message`
    /// plus the OAEP overhead.
    pub fn encrypt_oaep(&self, message: &[u8]) -> Result<Vec<u8>> {
        let fits = self
            .modulus_size_bytes()
            .checked_sub(OAEP_OVERHEAD)
            .is_some_and(|capacity| message.len() <= capacity);
        if !fits {
            return Err(Error::InvalidKey(format!(
                "{}-byte modulus cannot hold a {}-byte OAEP message",
                self.modulus_size_bytes(),
                message.len()
            )));
        }

        self.inner
            .encrypt(&mut OsRng, Oaep::new::<Sha1>(), message)
            .map_err(|e| Error::InvalidKey(format!("OAEP encryption failed: {}", e)))
    }
}

/// RSA private key together with its public half
pub struct KeyPair {
    private: RsaPrivateKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate(bits: usize) -> Result<Self> {
        debug!(bits, "Generating RSA key pair");
        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| Error::InvalidKey(format!("key generation failed: {}", e)))?;
        Ok(Self::from_private(private))
    }

    /// Import a private key from PEM (PKCS#1 or PKCS#8) and derive the public key
    pub fn from_private_pem(pem: &str) -> Result<Self> {
        let pem = pem.trim();
        let private = RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| Error::KeyFormat(format!("not a PEM RSA private key: {}", e)))?;
        private
            .validate()
            .map_err(|e| Error::InvalidKey(e.to_string()))?;
        Ok(Self::from_private(private))
    }

    /// Load a PEM private key from a file
    pub fn load_pem_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let pem = Zeroizing::new(fs::read_to_string(path.as_ref())?);
        Self::from_private_pem(&pem)
    }

    fn from_private(private: RsaPrivateKey) -> Self {
        let public = PublicKey {
            inner: RsaPublicKey::from(&private),
        };
        KeyPair { private, public }
    }

    /// The public half of this pair
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Size of the RSA modulus in bytes
    pub fn modulus_size_bytes(&self) -> usize {
        self.public.modulus_size_bytes()
    }

    /// Serialize the private key as PKCS#1 PEM
    pub fn to_private_pem(&self) -> Result<Zeroizing<String>> {
        self.private
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| Error::KeyFormat(e.to_string()))
    }

    /// Serialize the public key as SPKI PEM
    pub fn to_public_pem(&self) -> Result<String> {
        self.public.to_pem()
    }

    /// Write the private key to `path` and the public key to `<stem>_pub.pem`
    /// next to it. Returns the public key path.
    pub fn save_pem_files<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf> {
        let path = path.as_ref();
        let private_pem = self.to_private_pem()?;
        write_private(path, private_pem.as_bytes())?;

        let public_path = public_path_for(path);
        fs::write(&public_path, self.to_public_pem()?)?;

        debug!(?path, ?public_path, "Saved key pair");
        Ok(public_path)
    }

    /// Decrypt one RSA-OAEP (SHA-1) block
    ///
    /// The error is deliberately opaque; callers map it to their own kind.
    pub(crate) fn decrypt_oaep(
        &self,
        ciphertext: &[u8],
    ) -> std::result::Result<Zeroizing<Vec<u8>>, rsa::Error> {
        self.private
            .decrypt(Oaep::new::<Sha1>(), ciphertext)
            .map(Zeroizing::new)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("bits", &(self.modulus_size_bytes() * 8))
            .finish_non_exhaustive()
    }
}

/// `keys/alice.pem` -> `keys/alice_pub.pem`
fn public_path_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "key".to_string());
    path.with_file_name(format!("{}_pub.pem", stem))
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    fs::write(path, contents)?;
    Ok(())
}

/// Key pairs shared by every test in the crate: generating RSA keys is by
/// far the slowest thing the tests do.
#[cfg(test)]
pub(crate) fn test_keys() -> &'static [KeyPair] {
    use std::sync::OnceLock;

    static KEYS: OnceLock<Vec<KeyPair>> = OnceLock::new();
    KEYS.get_or_init(|| {
        (0..3)
            .map(|_| KeyPair::generate(1024).expect("test key generation"))
            .collect()
    })
}
