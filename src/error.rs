//! Error types for the disburser.

use std::path::PathBuf;

use thiserror::Error;

/// Failures loading or interpreting the key=value settings file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to access config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Missing configuration key: {0}")]
    MissingKey(&'static str),

    #[error("Invalid value for configuration key '{key}': {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// Failures reading a receiver file or scanning the receiver folder.
#[derive(Error, Debug)]
pub enum ReceiverError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address must be 48 characters in user-friendly form, got {0}")]
    InvalidLength(usize),

    #[error("address is not valid base64: {0}")]
    InvalidEncoding(String),

    #[error("address checksum mismatch")]
    ChecksumMismatch,

    #[error("unknown address tag 0x{0:02x}")]
    UnknownTag(u8),

    #[error("invalid raw address: {0}")]
    InvalidRaw(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,

    #[error("amount '{0}' is not a plain decimal number")]
    Malformed(String),

    #[error("amount '{0}' has more than 9 decimal places")]
    TooManyDecimals(String),

    #[error("amount '{0}' does not fit into nanotons")]
    Overflow(String),
}

/// Failures reported by the ledger boundary.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Ledger connection failed: {0}")]
    Connection(String),

    #[error("Account derivation failed: {0}")]
    Account(String),

    #[error("Balance query failed: {0}")]
    Query(String),

    #[error("Submission failed: {0}")]
    Submit(String),

    /// The network or the wallet gateway refused the transaction outright.
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    #[error("Wallet gateway returned {status}: {message}")]
    Gateway { status: u16, message: String },

    #[error("Timed out waiting for confirmation")]
    Timeout,

    /// The gateway may have confirmed the transaction but its answer could not be read.
    #[error("Submission outcome unknown: {0}")]
    UnknownOutcome(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl LedgerError {
    /// Whether resubmitting the same batch later can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Rejected(_) | LedgerError::UnknownOutcome(_) => false,
            LedgerError::Gateway { status, .. } => {
                *status >= 500 || *status == 429 || *status == 408
            }
            _ => true,
        }
    }
}

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("Failed to rename {from:?} to {to:?}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Receiver file {0:?} has no file name")]
    NoFileName(PathBuf),
}

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("Failed to access journal {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode journal record: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
