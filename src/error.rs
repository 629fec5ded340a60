//! Error types for hybridcrypt

use crate::package::Stage;
use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for hybridcrypt
#[derive(Error, Debug)]
pub enum Error {
    // Key errors
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Key format error: {0}")]
    KeyFormat(String),

    // Input errors
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Truncated input: needed {needed} bytes, only {available} available")]
    TruncatedInput { needed: usize, available: usize },

    #[error("Encoding error: {0}")]
    Encoding(String),

    // Decryption failures. These never carry a cause: OAEP and GCM failures
    // must look the same whatever went wrong.
    #[error("Key mismatch: this key cannot open the package")]
    KeyMismatch,

    #[error("Integrity check failed: package data was modified or corrupted")]
    Integrity,

    // Operation errors
    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Recipient {index}: {source}")]
    Recipient {
        index: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("{stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },

    // Archive errors
    #[error("Archive error: {0}")]
    Archive(String),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Tag this error with the package stage it occurred in
    pub(crate) fn at(self, stage: Stage) -> Self {
        Error::Stage {
            stage,
            source: Box::new(self),
        }
    }

    /// Tag this error with the index of the recipient being processed
    pub(crate) fn for_recipient(self, index: usize) -> Self {
        Error::Recipient {
            index,
            source: Box::new(self),
        }
    }

    /// The underlying error, with stage and recipient context stripped
    pub fn root(&self) -> &Error {
        match self {
            Error::Stage { source, .. } | Error::Recipient { source, .. } => source.root(),
            other => other,
        }
    }

    /// Package stage at which the operation failed, if known
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Stage { stage, .. } => Some(*stage),
            Error::Recipient { source, .. } => source.stage(),
            _ => None,
        }
    }

    /// Index of the recipient whose step failed, if any
    pub fn recipient(&self) -> Option<usize> {
        match self {
            Error::Recipient { index, .. } => Some(*index),
            Error::Stage { source, .. } => source.recipient(),
            _ => None,
        }
    }

    /// Convert to a process exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        match self.root() {
            Error::InvalidKey(_) | Error::KeyFormat(_) => 2,
            Error::MalformedInput(_) | Error::TruncatedInput { .. } | Error::Encoding(_) => 3,
            Error::KeyMismatch => 4,
            Error::Integrity => 5,
            Error::Cancelled => 130,
            Error::Config(_) | Error::InvalidConfig(_) => 78,
            Error::Io(_) => 74,
            _ => 1,
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
