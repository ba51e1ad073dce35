//! Token encoder configuration.
//!
//! ```rust
//! use webp_entropy::{RecordingStrategy, TokenConfig};
//!
//! let config = TokenConfig::new()
//!     .with_quality(90.0)
//!     .with_skip_empty_macroblocks(true)
//!     .with_strategy(RecordingStrategy::CountThenEmit);
//! assert!(config.validate().is_ok());
//! ```

use alloc::format;

use whereat::at;

use super::api::{EncodeError, EncodeResult};
use super::limits::Limits;
use super::token_buffer::MIN_PAGE_SIZE;

/// How probability statistics are gathered while tokens are recorded.
///
/// Both strategies produce identical statistics and output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RecordingStrategy {
    /// Tally every dynamic token as it is recorded.
    #[default]
    CountWhileRecording,
    /// Record first, then replay the token buffer into the statistics.
    CountThenEmit,
}

/// Configuration of a [`FrameTokenEncoder`](super::FrameTokenEncoder).
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct TokenConfig {
    /// Quality hint (0.0..=100.0) used to size token pages. Default: 75.0.
    pub quality: f32,
    /// Tokens per page. `None` derives it from the frame size and quality.
    pub page_size: Option<usize>,
    /// Cap on token pages. Combined with the token memory limit.
    pub max_pages: Option<usize>,
    /// Initial capacity of the output partition in bytes. `None` derives it
    /// from the recorded tokens.
    pub expected_partition_size: Option<usize>,
    /// Adapt coefficient probabilities to the frame. Default: true.
    pub update_probabilities: bool,
    /// Elide the tokens of all-zero macroblocks and signal them through the
    /// skip flag. Default: false.
    pub skip_empty_macroblocks: bool,
    /// Statistics gathering strategy.
    pub strategy: RecordingStrategy,
    /// Resource limits.
    pub limits: Limits,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenConfig {
    /// Defaults: quality 75, derived page size, probability updates on,
    /// no skip elision.
    #[must_use]
    pub fn new() -> Self {
        Self {
            quality: 75.0,
            page_size: None,
            max_pages: None,
            expected_partition_size: None,
            update_probabilities: true,
            skip_empty_macroblocks: false,
            strategy: RecordingStrategy::default(),
            limits: Limits::default(),
        }
    }

    /// Set the quality hint (clamped to 0.0..=100.0).
    #[must_use]
    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = quality.clamp(0.0, 100.0);
        self
    }

    /// Set tokens per page (at least 8192 are used).
    #[must_use]
    pub fn with_page_size(mut self, tokens: usize) -> Self {
        self.page_size = Some(tokens);
        self
    }

    /// Cap the number of token pages.
    #[must_use]
    pub fn with_max_pages(mut self, pages: usize) -> Self {
        self.max_pages = Some(pages);
        self
    }

    /// Set the initial output capacity in bytes.
    #[must_use]
    pub fn with_expected_partition_size(mut self, bytes: usize) -> Self {
        self.expected_partition_size = Some(bytes);
        self
    }

    /// Enable or disable probability adaptation.
    #[must_use]
    pub fn with_probability_updates(mut self, enable: bool) -> Self {
        self.update_probabilities = enable;
        self
    }

    /// Enable or disable skip elision of empty macroblocks.
    #[must_use]
    pub fn with_skip_empty_macroblocks(mut self, enable: bool) -> Self {
        self.skip_empty_macroblocks = enable;
        self
    }

    /// Set the statistics strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: RecordingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set resource limits.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Check values a builder cannot clamp.
    pub fn validate(&self) -> EncodeResult<()> {
        if !self.quality.is_finite() || !(0.0..=100.0).contains(&self.quality) {
            return Err(at(EncodeError::InvalidConfig(format!(
                "quality {} outside 0..=100",
                self.quality
            ))));
        }
        if self.max_pages == Some(0) {
            return Err(at(EncodeError::InvalidConfig(
                "max_pages must be at least 1".into(),
            )));
        }
        Ok(())
    }

    /// Tokens per page for a frame of `num_macroblocks`.
    ///
    /// Lower quality means fewer tokens, so the page shrinks with quality:
    /// `4 * macroblocks * (1 + quality / 20)`, never below 8192.
    pub fn page_size_for(&self, num_macroblocks: usize) -> usize {
        self.page_size
            .unwrap_or_else(|| {
                let scale = 1.0 + f64::from(self.quality) * 5.0 / 100.0;
                (num_macroblocks as f64 * 4.0 * scale) as usize
            })
            .max(MIN_PAGE_SIZE)
    }

    /// Effective page cap: the smaller of `max_pages` and what the token
    /// memory limit allows.
    pub fn page_limit(&self, page_size: usize) -> Option<usize> {
        match (self.max_pages, self.limits.max_pages(page_size)) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}
