//! Communication Link Error Types
//!
//! Errors raised at the call boundary of the S7 client. Transport failures
//! are never represented here: they travel as status codes through the
//! completion path.

use thiserror::Error;

/// Result type for s7-comlink operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Address notation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressParseError {
    /// Text matches none of the supported address forms
    #[error("Address does not match any known form: {0:?}")]
    NoMatch(String),

    /// Area letters outside E/A/M/DB
    #[error("Unknown memory area: {0:?}")]
    UnknownArea(String),

    /// Width letter outside B/W/D (X for data block bits)
    #[error("Unknown width letter: {0:?}")]
    UnknownWidth(char),

    /// Digit group that does not fit its target integer
    #[error("Numeric field out of range or malformed: {0:?}")]
    NumericOverflowOrFormat(String),

    /// Bit position outside 0..=7
    #[error("Bit offset out of range (0-7): {0}")]
    BitOffsetOutOfRange(u8),
}

/// Client call errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// Address text rejected by the parser
    #[error("Invalid address: {0}")]
    Address(#[from] AddressParseError),

    /// Value type width disagrees with the addressed region
    #[error("Size mismatch at {address}: address holds {expected} byte(s), {type_name} has {actual}")]
    SizeMismatch {
        address: String,
        expected: usize,
        actual: usize,
        type_name: &'static str,
    },

    /// Worker thread is gone, the job was never executed
    #[error("Client worker stopped")]
    WorkerStopped,

    /// Worker thread terminated by a panic
    #[error("Client worker panicked")]
    WorkerPanicked,

    /// Worker thread could not be started
    #[error("Failed to spawn client worker: {0}")]
    Spawn(String),
}

impl ClientError {
    pub fn size_mismatch(
        address: impl Into<String>,
        expected: usize,
        actual: usize,
        type_name: &'static str,
    ) -> Self {
        ClientError::SizeMismatch {
            address: address.into(),
            expected,
            actual,
            type_name,
        }
    }

    /// Check if the rejection happened before anything was queued
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ClientError::Address(_) | ClientError::SizeMismatch { .. }
        )
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Spawn(err.to_string())
    }
}
