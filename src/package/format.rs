//! Package file format
//!
//! ```text
//! offset  size       field
//! 0       4          wrapped bundle length L, big-endian u32
//! 4       L          RSA-OAEP wrapped SymmetricBundle
//! 4+L     remainder  AES-256-GCM ciphertext (tag is inside the bundle)
//! ```
//!
//! There is no magic number or version field.

use crate::error::{Error, Result};
use bytes::Bytes;
use std::io::Write;

/// Size of the length prefix in bytes
pub const HEADER_LEN_SIZE: usize = 4;

/// One recipient's package
///
/// All packages from one encryption share the same ciphertext buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    wrapped_bundle: Vec<u8>,
    ciphertext: Bytes,
}

impl Package {
    pub(crate) fn new(wrapped_bundle: Vec<u8>, ciphertext: Bytes) -> Self {
        Package {
            wrapped_bundle,
            ciphertext,
        }
    }

    /// The RSA-wrapped symmetric bundle
    pub fn wrapped_bundle(&self) -> &[u8] {
        &self.wrapped_bundle
    }

    /// The AES-GCM ciphertext, without tag
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Total size when serialized
    pub fn size(&self) -> usize {
        HEADER_LEN_SIZE + self.wrapped_bundle.len() + self.ciphertext.len()
    }

    /// Serialize to the package file format
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.size());
        self.write_to(&mut bytes)?;
        Ok(bytes)
    }

    /// Write the package file format to `writer`
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        let len = u32::try_from(self.wrapped_bundle.len()).map_err(|_| {
            Error::Encryption(format!(
                "wrapped bundle of {} bytes does not fit the length prefix",
                self.wrapped_bundle.len()
            ))
        })?;
        writer.write_all(&len.to_be_bytes())?;
        writer.write_all(&self.wrapped_bundle)?;
        writer.write_all(&self.ciphertext)?;
        Ok(())
    }

    /// Parse a serialized package
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let view = PackageView::parse(bytes)?;
        Ok(Package {
            wrapped_bundle: view.wrapped_bundle.to_vec(),
            ciphertext: Bytes::copy_from_slice(view.ciphertext),
        })
    }
}

/// Borrowed view over a serialized package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageView<'a> {
    /// The RSA-wrapped symmetric bundle
    pub wrapped_bundle: &'a [u8],
    /// The AES-GCM ciphertext, without tag
    pub ciphertext: &'a [u8],
}

impl<'a> PackageView<'a> {
    /// Split `bytes` into header fields without copying
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN_SIZE {
            return Err(Error::TruncatedInput {
                needed: HEADER_LEN_SIZE,
                available: bytes.len(),
            });
        }

        let (prefix, rest) = bytes.split_at(HEADER_LEN_SIZE);
        let mut len_bytes = [0u8; HEADER_LEN_SIZE];
        len_bytes.copy_from_slice(prefix);
        let len = u32::from_be_bytes(len_bytes) as usize;

        if rest.len() < len {
            return Err(Error::TruncatedInput {
                needed: HEADER_LEN_SIZE.saturating_add(len),
                available: bytes.len(),
            });
        }

        let (wrapped_bundle, ciphertext) = rest.split_at(len);
        Ok(PackageView {
            wrapped_bundle,
            ciphertext,
        })
    }

    /// The declared wrapped-bundle length `L`
    pub fn header_len(&self) -> usize {
        self.wrapped_bundle.len()
    }
}
