//! Entropy coding back end of a VP8 (lossy WebP) encoder
//!
//! This crate turns quantized coefficient levels into a VP8 token partition:
//! it walks the coefficient token tree, records the binary decisions in a
//! paginated buffer, fits the frame's coefficient probabilities to their
//! statistics, and replays the tokens through the boolean entropy coder.
//!
//! # Features
//!
//! - `std` (default): Enable standard library support.
//!
//! # no_std Support
//!
//! The crate builds in `no_std` environments (requires `alloc`):
//! ```toml
//! [dependencies]
//! webp-entropy = { version = "...", default-features = false }
//! ```
//!
//! # Encoding a frame
//!
//! Feed macroblocks in raster order to a [`FrameTokenEncoder`]:
//!
//! ```rust
//! use webp_entropy::{FrameTokenEncoder, MacroblockLevels, TokenConfig};
//!
//! let mut encoder = FrameTokenEncoder::new(2, 1, &TokenConfig::new())?;
//! let mut mb = MacroblockLevels::empty_i4();
//! mb.chroma[0][0] = -7;
//! encoder.record_macroblock(&mb)?;
//! encoder.record_macroblock(&MacroblockLevels::empty_i16())?;
//! let partition = encoder.finish()?;
//! println!("{} bytes, {} tokens", partition.data.len(), partition.stats.tokens());
//! # Ok::<(), whereat::At<webp_entropy::EncodeError>>(())
//! ```
//!
//! Or use [`encode_partition`] for a whole frame at once.
//!
//! # Lower level
//!
//! [`record_coeff_tokens`] drives any [`TokenSink`]: a [`TokenBuffer`] to
//! defer emission, a [`ProbaStats`] to tally, a [`DirectEmitter`] to code
//! against a known table, or a pair of them.
//!
//! ```rust
//! use webp_entropy::{find_last, record_coeff_tokens, BitWriter, DirectEmitter, COEFF_PROBS};
//!
//! let coeffs = [5, -2, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
//! let mut writer = BitWriter::new(64);
//! let mut sink = DirectEmitter::new(&mut writer, &COEFF_PROBS);
//! record_coeff_tokens(&mut sink, 0, 3, 0, find_last(&coeffs, 0), &coeffs);
//! let bytes = writer.finish();
//! assert!(!bytes.is_empty());
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

extern crate alloc;

// Core modules
pub mod common;
pub mod decoder;
pub mod encoder;
pub mod heuristics;

// Boolean decoder (used by the verification decoder)
mod vp8_bit_reader;

pub use vp8_bit_reader::VP8BitReader;

// Re-export shared types
pub use common::macroblock::{BlockLevels, LumaLevels, MacroblockLevels};
pub use common::types::{CoeffType, TokenProbTables, COEFF_PROBS, COEFF_UPDATE_PROBS};

// Re-export decoder public API
pub use decoder::vp8::{read_coefficients, read_token_probas, PartitionDecoder};
pub use decoder::DecodeError;

// Re-export encoder public API
pub use encoder::vp8::{
    calc_skip_proba, find_last, finalize_skip_proba, record_coeff_tokens, write_token_probas,
};
pub use encoder::{
    encode_partition, finalize_token_probas, BitWriter, DirectEmitter, EncodeError,
    EncodeResult, EncodedPartition, FinalizedProbas, FrameTokenEncoder, Limits, PartitionState,
    ProbaStats, RecordingStrategy, Token, TokenBuffer, TokenConfig, TokenSink, TokenStats,
    MIN_PAGE_SIZE,
};
