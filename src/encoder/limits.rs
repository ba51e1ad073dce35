//! Resource limits for frame token encoding.
//!
//! These bound the macroblock grid a [`FrameTokenEncoder`](super::FrameTokenEncoder)
//! or [`PartitionDecoder`](crate::PartitionDecoder) accepts and the memory
//! the token buffer may claim.

use whereat::at;

use super::api::{EncodeError, EncodeResult};
use super::token_buffer::Token;

/// Configuration for encode limits.
///
/// All limits are optional; `None` means unlimited.
///
/// # Example
///
/// ```rust
/// use webp_entropy::Limits;
///
/// let limits = Limits::default()
///     .max_dimensions(256, 256)
///     .max_token_memory(64 * 1024 * 1024);
///
/// let unlimited = Limits::none();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Limits {
    /// Maximum frame width in macroblocks.
    pub max_mb_width: Option<u32>,

    /// Maximum frame height in macroblocks.
    pub max_mb_height: Option<u32>,

    /// Maximum macroblocks per frame.
    pub max_macroblocks: Option<u64>,

    /// Maximum bytes held by recorded tokens.
    pub max_token_memory: Option<u64>,
}

impl Default for Limits {
    /// Limits matching the VP8 format.
    ///
    /// - Max dimensions: 1024 x 1024 macroblocks (16383 pixels)
    /// - Max token memory: 1 GB
    fn default() -> Self {
        Self {
            max_mb_width: Some(1024),
            max_mb_height: Some(1024),
            max_macroblocks: None,
            max_token_memory: Some(1024 * 1024 * 1024),
        }
    }
}

impl Limits {
    /// Create limits with no restrictions.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_mb_width: None,
            max_mb_height: None,
            max_macroblocks: None,
            max_token_memory: None,
        }
    }

    /// Set maximum dimensions in macroblocks.
    #[must_use]
    pub fn max_dimensions(mut self, mb_width: u32, mb_height: u32) -> Self {
        self.max_mb_width = Some(mb_width);
        self.max_mb_height = Some(mb_height);
        self
    }

    /// Set maximum macroblocks per frame.
    #[must_use]
    pub fn max_macroblocks(mut self, count: u64) -> Self {
        self.max_macroblocks = Some(count);
        self
    }

    /// Set maximum token memory in bytes.
    #[must_use]
    pub fn max_token_memory(mut self, bytes: u64) -> Self {
        self.max_token_memory = Some(bytes);
        self
    }

    /// Check that a macroblock grid is non-empty and within limits.
    pub fn check_dimensions(&self, mb_width: u32, mb_height: u32) -> EncodeResult<()> {
        if mb_width == 0 || mb_height == 0 {
            return Err(at(EncodeError::InvalidDimensions(mb_width, mb_height)));
        }
        if self.max_mb_width.is_some_and(|max| mb_width > max)
            || self.max_mb_height.is_some_and(|max| mb_height > max)
        {
            return Err(at(EncodeError::InvalidDimensions(mb_width, mb_height)));
        }
        let total = u64::from(mb_width) * u64::from(mb_height);
        if self.max_macroblocks.is_some_and(|max| total > max) {
            return Err(at(EncodeError::InvalidDimensions(mb_width, mb_height)));
        }
        Ok(())
    }

    /// Number of token pages of `page_size` tokens that fit in the memory
    /// limit, or `None` when unlimited.
    pub fn max_pages(&self, page_size: usize) -> Option<usize> {
        let page_bytes = (page_size.max(1) * core::mem::size_of::<Token>()) as u64;
        self.max_token_memory
            .map(|max| usize::try_from(max / page_bytes).unwrap_or(usize::MAX))
    }
}
