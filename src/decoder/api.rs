use alloc::string::String;
use thiserror::Error;

/// Errors that can occur when reading back a token partition
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// The partition ended before the coded data did
    #[error("Corrupt bitstream")]
    BitStreamError,

    /// More macroblocks were requested than the frame holds
    #[error("Macroblock overflow: frame holds {0} macroblocks")]
    MacroblockOverflow(usize),

    /// An argument was out of range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}
