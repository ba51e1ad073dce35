//! Errors and result types of the token encoder.

use alloc::string::String;
use thiserror::Error;

/// Error that can occur during encoding.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EncodeError {
    /// The macroblock grid is empty or exceeds the configured limits.
    #[error("Invalid dimensions: {0}x{1} macroblocks")]
    InvalidDimensions(u32, u32),

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A token page could not be allocated; the frame cannot be encoded.
    #[error("Token buffer exhausted after {pages} pages ({tokens} tokens)")]
    TokenBufferExhausted {
        /// Pages allocated before the failure.
        pages: usize,
        /// Tokens recorded before the failure.
        tokens: usize,
    },

    /// The output partition could not grow.
    #[error("Partition buffer allocation failed at {0} bytes")]
    PartitionOverflow(usize),

    /// More macroblocks were recorded than the frame holds.
    #[error("Macroblock overflow: frame holds {0} macroblocks")]
    MacroblockOverflow(usize),

    /// The frame was finished before every macroblock was recorded.
    #[error("Incomplete frame: {recorded} of {expected} macroblocks recorded")]
    IncompleteFrame {
        /// Macroblocks recorded.
        recorded: usize,
        /// Macroblocks in the frame.
        expected: usize,
    },

    /// A saved coder state does not describe a resumable partition.
    #[error("Invalid partition state: {0}")]
    InvalidPartitionState(String),
}

/// Result type alias using `At<EncodeError>` for location tracking.
///
/// Errors are wrapped where they are raised and gain a frame at each
/// propagation point, so a failure reports the call path that produced it.
pub type EncodeResult<T> = core::result::Result<T, whereat::At<EncodeError>>;
