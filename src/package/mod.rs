//! Hybrid package cipher
//!
//! Encrypts an opaque payload (usually a packed archive) once with
//! AES-256-GCM under a fresh key, then wraps the key, nonce and tag for each
//! recipient with RSA-OAEP. One [`Package`] is produced per recipient; they
//! differ only in the wrapped bundle.
//!
//! Encryption runs `generate key -> encrypt payload -> wrap bundle (per
//! recipient)`, decryption runs `parse header -> unwrap bundle -> verify tag`.
//! Every error returned from this module is tagged with the [`Stage`] it
//! failed in; use [`Error::root`] to get at the underlying kind.

mod bundle;
mod format;

pub use bundle::{SymmetricBundle, BUNDLE_SIZE};
pub use format::{Package, PackageView, HEADER_LEN_SIZE};

use crate::crypto::{self, KeyPair, PublicKey};
use crate::error::{Error, Result};
use bytes::Bytes;
use rayon::prelude::*;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Step of a package operation, reported on failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Generating the random AES key
    GenerateKey,
    /// AES-GCM encryption of the payload
    EncryptPayload,
    /// RSA-OAEP wrapping of the bundle for one recipient
    WrapBundle,
    /// Reading the length prefix and splitting the package
    ParseHeader,
    /// RSA-OAEP unwrapping of the bundle
    UnwrapBundle,
    /// AES-GCM tag verification and decryption
    VerifyTag,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::GenerateKey => "generate key",
            Stage::EncryptPayload => "encrypt payload",
            Stage::WrapBundle => "wrap bundle",
            Stage::ParseHeader => "parse header",
            Stage::UnwrapBundle => "unwrap bundle",
            Stage::VerifyTag => "verify tag",
        };
        f.write_str(name)
    }
}

/// Called with the recipient index after that recipient's bundle is wrapped
pub type WrapProgress = Arc<dyn Fn(usize) + Send + Sync>;

/// Options for [`encrypt_package_with`]
#[derive(Clone, Default)]
pub struct EncryptOptions {
    /// Wrap the bundle for all recipients concurrently
    pub parallel: bool,
    /// Checked before each recipient's wrap step; once set, the operation
    /// fails with [`Error::Cancelled`] and returns no packages
    pub cancel: Option<Arc<AtomicBool>>,
    /// Progress hook; in parallel mode indices arrive in completion order
    pub on_wrapped: Option<WrapProgress>,
}

impl fmt::Debug for EncryptOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptOptions")
            .field("parallel", &self.parallel)
            .field("cancel", &self.cancel)
            .field("on_wrapped", &self.on_wrapped.is_some())
            .finish()
    }
}

impl EncryptOptions {
    /// Enable or disable concurrent wrapping
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Attach a cancellation flag
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Attach a progress hook
    pub fn on_wrapped(mut self, hook: WrapProgress) -> Self {
        self.on_wrapped = Some(hook);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// Encrypt `payload` for every recipient, sequentially
pub fn encrypt_package(payload: &[u8], recipients: &[PublicKey]) -> Result<Vec<Package>> {
    encrypt_package_with(payload, recipients, &EncryptOptions::default())
}

/// Encrypt `payload` for every recipient
///
/// Returns one package per recipient, in recipient order. If wrapping fails
/// for any recipient the whole operation fails and the error names that
/// recipient's index; no packages are returned.
pub fn encrypt_package_with(
    payload: &[u8],
    recipients: &[PublicKey],
    options: &EncryptOptions,
) -> Result<Vec<Package>> {
    if recipients.is_empty() {
        return Err(Error::InvalidKey(
            "at least one recipient is required".to_string(),
        ));
    }

    let key = crypto::generate_key().map_err(|e| e.at(Stage::GenerateKey))?;

    let sealed = crypto::seal(&key, payload).map_err(|e| e.at(Stage::EncryptPayload))?;
    debug!(
        payload_len = payload.len(),
        recipients = recipients.len(),
        "Encrypted package payload"
    );

    let bundle = SymmetricBundle {
        key: *key,
        nonce: sealed.nonce,
        tag: sealed.tag,
    };
    let bundle_bytes = bundle.to_bytes();
    drop(bundle);

    let wrapped = wrap_for_recipients(&bundle_bytes[..], recipients, options)
        .map_err(|e| e.at(Stage::WrapBundle))?;

    let ciphertext = Bytes::from(sealed.ciphertext);
    Ok(wrapped
        .into_iter()
        .map(|wrapped_bundle| Package::new(wrapped_bundle, ciphertext.clone()))
        .collect())
}

fn wrap_for_recipients(
    bundle: &[u8],
    recipients: &[PublicKey],
    options: &EncryptOptions,
) -> Result<Vec<Vec<u8>>> {
    let wrap = |(index, recipient): (usize, &PublicKey)| -> Result<Vec<u8>> {
        if options.is_cancelled() {
            debug!(index, "Package encryption cancelled");
            return Err(Error::Cancelled.for_recipient(index));
        }
        let wrapped = recipient
            .encrypt_oaep(bundle)
            .map_err(|e| e.for_recipient(index))?;
        debug!(index, wrapped_len = wrapped.len(), "Wrapped bundle");
        if let Some(hook) = &options.on_wrapped {
            hook(index);
        }
        Ok(wrapped)
    };

    if options.parallel && recipients.len() > 1 {
        // Collect everything first so the lowest failing index is reported
        let results: Vec<Result<Vec<u8>>> = recipients.par_iter().enumerate().map(&wrap).collect();
        results.into_iter().collect()
    } else {
        recipients.iter().enumerate().map(&wrap).collect()
    }
}

/// Decrypt a serialized package with the recipient's key pair
///
/// The payload is only returned once the GCM tag has verified.
pub fn decrypt_package(package: &[u8], key_pair: &KeyPair) -> Result<Vec<u8>> {
    let view = PackageView::parse(package).map_err(|e| e.at(Stage::ParseHeader))?;
    debug!(
        header_len = view.header_len(),
        ciphertext_len = view.ciphertext.len(),
        "Parsed package header"
    );

    // A wrong key and a corrupted header must fail identically
    let bundle = key_pair
        .decrypt_oaep(view.wrapped_bundle)
        .ok()
        .and_then(|bytes| SymmetricBundle::from_bytes(&bytes).ok())
        .ok_or_else(|| Error::KeyMismatch.at(Stage::UnwrapBundle))?;

    let payload = crypto::open(&bundle.key, &bundle.nonce, view.ciphertext, &bundle.tag)
        .map_err(|e| e.at(Stage::VerifyTag))?;
    debug!(payload_len = payload.len(), "Decrypted package");

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_keys;

    fn publics(pairs: &[KeyPair]) -> Vec<PublicKey> {
        pairs.iter().map(|p| p.public_key().clone()).collect()
    }

    #[test]
    fn test_roundtrip_single_recipient() {
        let keys = test_keys();
        let payload = b"archive bytes";

        let packages = encrypt_package(payload, &publics(&keys[..1])).unwrap();
        assert_eq!(packages.len(), 1);

        let bytes = packages[0].to_bytes().unwrap();
        let decrypted = decrypt_package(&bytes, &keys[0]).unwrap();
        assert_eq!(decrypted, payload);
    }

    #[test]
    fn test_header_length_is_modulus_size() {
        let keys = test_keys();
        let packages = encrypt_package(b"x", &publics(keys)).unwrap();

        for (package, pair) in packages.iter().zip(keys) {
            let bytes = package.to_bytes().unwrap();
            let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
            assert_eq!(len, pair.modulus_size_bytes());
        }
    }

    #[test]
    fn test_ciphertext_excludes_tag() {
        let keys = test_keys();
        let payload = vec![9u8; 100];
        let packages = encrypt_package(&payload, &publics(&keys[..1])).unwrap();

        assert_eq!(packages[0].ciphertext().len(), payload.len());
        assert_eq!(
            packages[0].size(),
            HEADER_LEN_SIZE + keys[0].modulus_size_bytes() + payload.len()
        );
    }

    #[test]
    fn test_empty_payload() {
        let keys = test_keys();
        let packages = encrypt_package(b"", &publics(&keys[..1])).unwrap();
        let bytes = packages[0].to_bytes().unwrap();

        assert!(decrypt_package(&bytes, &keys[0]).unwrap().is_empty());
    }

    #[test]
    fn test_multi_recipient_independence() {
        let keys = test_keys();
        let payload = b"shared payload";
        let packages = encrypt_package(payload, &publics(&keys[..2])).unwrap();

        let a = packages[0].to_bytes().unwrap();
        let b = packages[1].to_bytes().unwrap();

        assert_eq!(packages[0].ciphertext(), packages[1].ciphertext());
        assert_ne!(packages[0].wrapped_bundle(), packages[1].wrapped_bundle());

        assert_eq!(decrypt_package(&a, &keys[0]).unwrap(), payload);
        assert_eq!(decrypt_package(&b, &keys[1]).unwrap(), payload);

        let err = decrypt_package(&a, &keys[1]).unwrap_err();
        assert!(matches!(err.root(), Error::KeyMismatch));
        let err = decrypt_package(&b, &keys[0]).unwrap_err();
        assert!(matches!(err.root(), Error::KeyMismatch));
    }

    #[test]
    fn test_parallel_matches_recipient_order() {
        let keys = test_keys();
        let options = EncryptOptions::default().parallel(true);
        let packages = encrypt_package_with(b"parallel", &publics(keys), &options).unwrap();

        assert_eq!(packages.len(), keys.len());
        for (package, pair) in packages.iter().zip(keys) {
            let bytes = package.to_bytes().unwrap();
            assert_eq!(decrypt_package(&bytes, pair).unwrap(), b"parallel");
        }
    }

    #[test]
    fn test_fresh_randomness_per_encryption() {
        let keys = test_keys();
        let recipients = publics(&keys[..1]);

        let a = encrypt_package(b"same", &recipients).unwrap();
        let b = encrypt_package(b"same", &recipients).unwrap();

        assert_ne!(a[0].to_bytes().unwrap(), b[0].to_bytes().unwrap());
        assert_ne!(a[0].ciphertext(), b[0].ciphertext());
        assert_eq!(
            decrypt_package(&a[0].to_bytes().unwrap(), &keys[0]).unwrap(),
            decrypt_package(&b[0].to_bytes().unwrap(), &keys[0]).unwrap()
        );
    }

    #[test]
    fn test_every_ciphertext_bit_flip_is_detected() {
        let keys = test_keys();
        let payload = b"tamper me";
        let packages = encrypt_package(payload, &publics(&keys[..1])).unwrap();
        let bytes = packages[0].to_bytes().unwrap();
        let start = HEADER_LEN_SIZE + keys[0].modulus_size_bytes();

        for offset in start..bytes.len() {
            for bit in 0..8 {
                let mut tampered = bytes.clone();
                tampered[offset] ^= 1 << bit;

                let err = decrypt_package(&tampered, &keys[0]).unwrap_err();
                assert!(matches!(err.root(), Error::Integrity));
                assert_eq!(err.stage(), Some(Stage::VerifyTag));
            }
        }
    }

    #[test]
    fn test_corrupted_bundle_is_key_mismatch() {
        let keys = test_keys();
        let packages = encrypt_package(b"payload", &publics(&keys[..1])).unwrap();
        let mut bytes = packages[0].to_bytes().unwrap();
        bytes[HEADER_LEN_SIZE + 10] ^= 0xFF;

        let err = decrypt_package(&bytes, &keys[0]).unwrap_err();
        assert!(matches!(err.root(), Error::KeyMismatch));
        assert_eq!(err.stage(), Some(Stage::UnwrapBundle));
    }

    #[test]
    fn test_wrapped_non_bundle_is_key_mismatch() {
        let keys = test_keys();
        let wrapped = keys[0].public_key().encrypt_oaep(&[0u8; 10]).unwrap();
        let package = Package::new(wrapped, Bytes::from_static(b"ct"));

        let err = decrypt_package(&package.to_bytes().unwrap(), &keys[0]).unwrap_err();
        assert!(matches!(err.root(), Error::KeyMismatch));
    }

    #[test]
    fn test_truncated_package() {
        let keys = test_keys();

        let err = decrypt_package(&[0, 0], &keys[0]).unwrap_err();
        assert!(matches!(err.root(), Error::TruncatedInput { .. }));
        assert_eq!(err.stage(), Some(Stage::ParseHeader));

        let packages = encrypt_package(b"payload", &publics(&keys[..1])).unwrap();
        let bytes = packages[0].to_bytes().unwrap();
        let err = decrypt_package(&bytes[..HEADER_LEN_SIZE + 20], &keys[0]).unwrap_err();
        assert!(matches!(err.root(), Error::TruncatedInput { .. }));
    }

    #[test]
    fn test_truncated_ciphertext_fails_integrity() {
        let keys = test_keys();
        let packages = encrypt_package(b"payload", &publics(&keys[..1])).unwrap();
        let bytes = packages[0].to_bytes().unwrap();

        let err = decrypt_package(&bytes[..bytes.len() - 1], &keys[0]).unwrap_err();
        assert!(matches!(err.root(), Error::Integrity));
    }

    #[test]
    fn test_no_recipients() {
        let result = encrypt_package(b"payload", &[]);
        assert!(matches!(result, Err(Error::InvalidKey(_))));
    }

    #[test]
    fn test_small_key_reports_recipient_index() {
        let keys = test_keys();
        let small = KeyPair::generate(512).unwrap();
        let recipients = vec![
            keys[0].public_key().clone(),
            small.public_key().clone(),
            keys[1].public_key().clone(),
        ];

        for parallel in [false, true] {
            let options = EncryptOptions::default().parallel(parallel);
            let err = encrypt_package_with(b"payload", &recipients, &options).unwrap_err();

            assert!(matches!(err.root(), Error::InvalidKey(_)));
            assert_eq!(err.stage(), Some(Stage::WrapBundle));
            assert_eq!(err.recipient(), Some(1));
        }
    }

    #[test]
    fn test_cancelled_before_wrap() {
        let keys = test_keys();
        let cancel = Arc::new(AtomicBool::new(true));
        let options = EncryptOptions::default().with_cancel(cancel);

        let err = encrypt_package_with(b"payload", &publics(keys), &options).unwrap_err();
        assert!(matches!(err.root(), Error::Cancelled));
        assert_eq!(err.stage(), Some(Stage::WrapBundle));
        assert_eq!(err.recipient(), Some(0));
    }

    #[test]
    fn test_cancelled_between_wraps() {
        let keys = test_keys();
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);
        let options = EncryptOptions::default()
            .with_cancel(cancel)
            .on_wrapped(Arc::new(move |index| {
                if index == 0 {
                    flag.store(true, Ordering::Relaxed);
                }
            }));

        let err = encrypt_package_with(b"payload", &publics(keys), &options).unwrap_err();
        assert!(matches!(err.root(), Error::Cancelled));
        assert_eq!(err.stage(), Some(Stage::WrapBundle));
        assert_eq!(err.recipient(), Some(1));
    }

    #[test]
    fn test_progress_reports_every_recipient() {
        use std::sync::Mutex;

        let keys = test_keys();
        for parallel in [false, true] {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&seen);
            let options = EncryptOptions::default()
                .parallel(parallel)
                .on_wrapped(Arc::new(move |index| sink.lock().unwrap().push(index)));

            encrypt_package_with(b"payload", &publics(keys), &options).unwrap();

            let mut seen = seen.lock().unwrap().clone();
            seen.sort_unstable();
            assert_eq!(seen, (0..keys.len()).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_unset_cancel_flag_is_ignored() {
        let keys = test_keys();
        let cancel = Arc::new(AtomicBool::new(false));
        let options = EncryptOptions::default().with_cancel(cancel);

        let packages = encrypt_package_with(b"payload", &publics(keys), &options).unwrap();
        assert_eq!(packages.len(), keys.len());
    }
}
