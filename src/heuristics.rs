//! Resource estimation for frame token encoding.
//!
//! Provides approximate token counts, memory use and partition size for a
//! frame before it is recorded. Use these for budgeting memory limits and
//! pre-sizing output buffers.
//!
//! # Accuracy
//!
//! Token counts depend on the levels being coded:
//! - Empty frames: one token per block (lower bound)
//! - Typical quantized photos: middle estimate
//! - Every level in the largest category: upper bound
//!
//! # Example
//!
//! ```rust
//! use webp_entropy::heuristics::estimate_tokens;
//! use webp_entropy::TokenConfig;
//!
//! let est = estimate_tokens(120, 68, &TokenConfig::new());
//! println!("Token memory: ~{:.1} MB", est.token_memory_bytes as f64 / 1_000_000.0);
//! ```

use crate::encoder::token_buffer::Token;
use crate::encoder::TokenConfig;

/// Blocks coded per 16x16 macroblock (Y2, 16 luma, 8 chroma).
const BLOCKS_PER_MB: u64 = 25;

/// Worst case tokens per block: every position a category 6 level
/// (nodes 0, 1, 2, 3, 6, 8, 10, 11 extra bits, sign).
const MAX_TOKENS_PER_BLOCK: u64 = 16 * 19;

/// Typical tokens per macroblock at quality 0 and 100.
const TYPICAL_TOKENS_PER_MB_LOW: f64 = 60.0;
const TYPICAL_TOKENS_PER_MB_HIGH: f64 = 700.0;

/// Typical coded bits per token.
const BITS_PER_TOKEN: f64 = 0.8;

/// Resource estimation for one frame.
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub struct TokenEstimate {
    /// Tokens per page the encoder will use.
    pub page_size: usize,
    /// Fewest tokens the frame can produce.
    pub tokens_min: u64,
    /// Typical token count.
    pub tokens: u64,
    /// Most tokens the frame can produce.
    pub tokens_max: u64,
    /// Typical token buffer memory in bytes, whole pages.
    pub token_memory_bytes: u64,
    /// Worst case token buffer memory in bytes, whole pages.
    pub token_memory_bytes_max: u64,
    /// Typical partition size in bytes.
    pub partition_bytes: u64,
}

/// Estimate token counts and memory for a frame of macroblocks.
#[must_use]
pub fn estimate_tokens(mb_width: u32, mb_height: u32, config: &TokenConfig) -> TokenEstimate {
    let mbs = u64::from(mb_width) * u64::from(mb_height);
    let page_size = config.page_size_for(mbs as usize);

    let q = f64::from(config.quality.clamp(0.0, 100.0)) / 100.0;
    let per_mb = TYPICAL_TOKENS_PER_MB_LOW + q * (TYPICAL_TOKENS_PER_MB_HIGH - TYPICAL_TOKENS_PER_MB_LOW);

    let tokens_min = mbs * BLOCKS_PER_MB;
    let tokens = ((mbs as f64 * per_mb) as u64).max(tokens_min);
    let tokens_max = mbs * BLOCKS_PER_MB * MAX_TOKENS_PER_BLOCK;

    let page_bytes = (page_size * core::mem::size_of::<Token>()) as u64;
    let pages = |n: u64| n.div_ceil(page_size as u64);

    TokenEstimate {
        page_size,
        tokens_min,
        tokens,
        tokens_max,
        token_memory_bytes: pages(tokens) * page_bytes,
        token_memory_bytes_max: pages(tokens_max) * page_bytes,
        partition_bytes: (tokens as f64 * BITS_PER_TOKEN / 8.0) as u64,
    }
}

/// Initial partition capacity for a frame, in bytes.
#[must_use]
pub fn estimate_partition_size(mb_width: u32, mb_height: u32, config: &TokenConfig) -> usize {
    estimate_tokens(mb_width, mb_height, config).partition_bytes as usize
}
