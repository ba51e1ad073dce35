//! Frame-level token encoding.
//!
//! A frame is coded in two passes over its tokens: macroblocks are recorded
//! in raster order while the statistics are gathered, then the probabilities
//! are finalized and the recorded tokens replayed into the partition.
//!
//! ```rust
//! use webp_entropy::{encode_partition, MacroblockLevels, TokenConfig};
//!
//! let mut mbs = vec![MacroblockLevels::empty_i4(); 4];
//! mbs[1].chroma[0][0] = 3;
//! let partition = encode_partition(2, 2, &mbs, &TokenConfig::new())?;
//! assert!(!partition.data.is_empty());
//! # Ok::<(), whereat::At<webp_entropy::EncodeError>>(())
//! ```

use alloc::vec::Vec;

use whereat::{at, ResultAtExt};

use super::api::{EncodeError, EncodeResult};
use super::arithmetic::{BitWriter, PartitionState};
use super::config::{RecordingStrategy, TokenConfig};
use super::cost::{cost_to_bytes, FinalizedProbas, ProbaStats};
use super::token_buffer::{Token, TokenBuffer};
use crate::common::macroblock::{MacroblockLevels, NonZeroContext};
use crate::common::types::COEFF_PROBS;

pub(crate) mod header;
pub(crate) mod residuals;

pub use header::{calc_skip_proba, finalize_skip_proba, write_token_probas, SKIP_PROBA_THRESHOLD};
pub use residuals::{find_last, record_coeff_tokens, record_macroblock_tokens};

/// Counters gathered while a frame is encoded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct TokenStats {
    /// Macroblocks recorded.
    pub macroblocks: usize,
    /// Macroblocks elided through the skip flag.
    pub skipped_macroblocks: usize,
    /// All-zero macroblocks, skipped or not.
    pub empty_macroblocks: usize,
    /// Coded 4x4 blocks.
    pub blocks: usize,
    /// Coded blocks holding a non-zero level.
    pub non_zero_blocks: usize,
    /// Tokens addressed by probability slot.
    pub dynamic_tokens: usize,
    /// Tokens with a fixed probability (signs, extra bits).
    pub constant_tokens: usize,
    /// Token pages allocated.
    pub pages: usize,
}

impl TokenStats {
    /// All recorded tokens.
    pub fn tokens(&self) -> usize {
        self.dynamic_tokens + self.constant_tokens
    }
}

/// Result of encoding one frame's token partition.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct EncodedPartition {
    /// Partition bytes.
    pub data: Vec<u8>,
    /// Coder registers after the last token, before padding.
    pub state: PartitionState,
    /// Probabilities the partition was coded with.
    pub probas: FinalizedProbas,
    /// Skip probability to signal, if macroblocks were elided.
    pub skip_proba: Option<u8>,
    /// Modeled size of the tokens in 1/256 bits, under `probas`.
    pub estimated_bits: u64,
    /// Modeled size under the default probabilities, in 1/256 bits.
    pub default_bits: u64,
    /// Frame counters.
    pub stats: TokenStats,
}

impl EncodedPartition {
    /// True if any probability differs from the defaults.
    pub fn dirty(&self) -> bool {
        self.probas.dirty
    }

    /// Modeled cost in 1/256 bits of signalling the probability updates.
    pub fn header_cost(&self) -> u64 {
        self.probas.header_cost
    }

    /// Write the probability section of the frame header for this partition.
    pub fn write_header(&self, writer: &mut BitWriter) {
        write_token_probas(writer, &self.probas.probas, self.skip_proba);
    }
}

/// Records the macroblocks of one frame and produces its token partition.
#[derive(Debug)]
pub struct FrameTokenEncoder {
    mb_width: usize,
    mb_height: usize,
    mb_index: usize,
    tokens: TokenBuffer,
    stats: ProbaStats,
    nz: NonZeroContext,
    config: TokenConfig,
    frame_stats: TokenStats,
}

impl FrameTokenEncoder {
    /// Encoder for a frame of `mb_width` x `mb_height` macroblocks.
    pub fn new(mb_width: u32, mb_height: u32, config: &TokenConfig) -> EncodeResult<Self> {
        config.validate().at()?;
        config.limits.check_dimensions(mb_width, mb_height).at()?;
        let too_large = || at(EncodeError::InvalidDimensions(mb_width, mb_height));
        let (mb_width, mb_height) = (mb_width as usize, mb_height as usize);
        let num_macroblocks = mb_width.checked_mul(mb_height).ok_or_else(too_large)?;
        let nz = NonZeroContext::try_new(mb_width).ok_or_else(too_large)?;

        let page_size = config.page_size_for(num_macroblocks);
        let max_pages = config.page_limit(page_size);
        log::debug!(
            "token encoder: {mb_width}x{mb_height} macroblocks, page size {page_size}, max pages {max_pages:?}"
        );

        Ok(Self {
            mb_width,
            mb_height,
            mb_index: 0,
            tokens: TokenBuffer::with_limits(page_size, max_pages),
            stats: ProbaStats::new(),
            nz,
            config: config.clone(),
            frame_stats: TokenStats::default(),
        })
    }

    /// Macroblocks in the frame.
    pub fn num_macroblocks(&self) -> usize {
        self.mb_width * self.mb_height
    }

    /// Macroblocks recorded so far.
    pub fn recorded(&self) -> usize {
        self.mb_index
    }

    /// Record the next macroblock in raster order.
    ///
    /// Returns true when the macroblock was elided and must be signalled
    /// with the skip flag set.
    pub fn record_macroblock(&mut self, levels: &MacroblockLevels) -> EncodeResult<bool> {
        if self.mb_index >= self.num_macroblocks() {
            return Err(at(EncodeError::MacroblockOverflow(self.num_macroblocks())));
        }
        let mbx = self.mb_index % self.mb_width;
        if mbx == 0 {
            self.nz.start_row();
            log::trace!("macroblock row {}", self.mb_index / self.mb_width);
        }
        self.mb_index += 1;
        self.frame_stats.macroblocks += 1;

        let empty = levels.is_empty();
        if empty {
            self.frame_stats.empty_macroblocks += 1;
            if self.config.skip_empty_macroblocks {
                self.frame_stats.skipped_macroblocks += 1;
                self.nz.skip(mbx, levels.is_i16());
                return Ok(true);
            }
        }

        self.frame_stats.blocks += levels.num_blocks();
        let non_zero = match self.config.strategy {
            RecordingStrategy::CountWhileRecording => {
                let mut sink = (&mut self.tokens, &mut self.stats);
                record_macroblock_tokens(&mut sink, levels, &mut self.nz, mbx)
            }
            RecordingStrategy::CountThenEmit => {
                record_macroblock_tokens(&mut self.tokens, levels, &mut self.nz, mbx)
            }
        };
        self.frame_stats.non_zero_blocks += non_zero;

        self.tokens.check().at()?;
        Ok(false)
    }

    /// Finalize probabilities and code the recorded tokens.
    pub fn finish(mut self) -> EncodeResult<EncodedPartition> {
        let expected = self.num_macroblocks();
        if self.mb_index != expected {
            return Err(at(EncodeError::IncompleteFrame {
                recorded: self.mb_index,
                expected,
            }));
        }
        self.tokens.check().at()?;

        if self.config.strategy == RecordingStrategy::CountThenEmit {
            self.stats.record_tokens(&self.tokens);
        }
        let probas = if self.config.update_probabilities {
            self.stats.finalize()
        } else {
            FinalizedProbas::unchanged()
        };

        let skip_proba = if self.config.skip_empty_macroblocks {
            // elided macroblocks must be flagged even when the flag is costly
            Some(calc_skip_proba(
                self.frame_stats.skipped_macroblocks as u64,
                expected as u64,
            ))
        } else {
            None
        };

        let estimated_bits = self.tokens.estimate_size(&probas.probas);
        let default_bits = self.tokens.estimate_size(&COEFF_PROBS);

        let capacity = self
            .config
            .expected_partition_size
            .unwrap_or_else(|| cost_to_bytes(estimated_bits) as usize + 16);
        let mut writer = BitWriter::new(capacity);
        self.tokens.emit_tokens(&mut writer, &probas.probas);
        let state = writer.state();
        if writer.has_error() {
            return Err(at(EncodeError::PartitionOverflow(writer.size())));
        }
        let data = writer.finish();

        let mut stats = self.frame_stats;
        stats.pages = self.tokens.num_pages();
        for token in self.tokens.iter() {
            match token {
                Token::Dynamic { .. } => stats.dynamic_tokens += 1,
                Token::Constant { .. } => stats.constant_tokens += 1,
            }
        }

        log::debug!(
            "token partition: {} bytes, {} tokens in {} pages, estimate {} bytes ({} with defaults), {} probabilities updated",
            data.len(),
            stats.tokens(),
            stats.pages,
            cost_to_bytes(estimated_bits),
            cost_to_bytes(default_bits),
            probas.updated_slots
        );

        Ok(EncodedPartition {
            data,
            state,
            probas,
            skip_proba,
            estimated_bits,
            default_bits,
            stats,
        })
    }
}

/// Encode a whole frame of macroblocks in raster order.
///
/// Skip elision is decided from the frame itself: when
/// `skip_empty_macroblocks` is set it is used only if enough macroblocks are
/// empty for the skip flag to pay off.
pub fn encode_partition(
    mb_width: u32,
    mb_height: u32,
    macroblocks: &[MacroblockLevels],
    config: &TokenConfig,
) -> EncodeResult<EncodedPartition> {
    let mut config = config.clone();
    if config.skip_empty_macroblocks {
        let empty = macroblocks.iter().filter(|mb| mb.is_empty()).count();
        let use_skip = finalize_skip_proba(empty as u64, macroblocks.len() as u64).is_some();
        log::debug!("{empty} of {} macroblocks empty, skip flag {use_skip}", macroblocks.len());
        config.skip_empty_macroblocks = use_skip;
    }

    let mut encoder = FrameTokenEncoder::new(mb_width, mb_height, &config).at()?;
    for levels in macroblocks {
        encoder.record_macroblock(levels).at()?;
    }
    encoder.finish().at()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::macroblock::LumaLevels;
    use crate::encoder::limits::Limits;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_block(rng: &mut StdRng, scale: i16) -> [i16; 16] {
        let mut b = [0i16; 16];
        for (i, v) in b.iter_mut().enumerate() {
            if rng.gen_ratio(1, 2 + i as u32) {
                *v = rng.gen_range(-scale..=scale);
            }
        }
        b
    }

    fn random_mb(rng: &mut StdRng) -> MacroblockLevels {
        let chroma = core::array::from_fn(|_| random_block(rng, 4));
        if rng.gen_bool(0.5) {
            let dc = random_block(rng, 40);
            MacroblockLevels::i16(dc, core::array::from_fn(|_| random_block(rng, 3)), chroma)
        } else {
            MacroblockLevels::i4(core::array::from_fn(|_| random_block(rng, 12)), chroma)
        }
    }

    #[test]
    fn strategies_agree() {
        let mut rng = StdRng::seed_from_u64(7);
        let mbs: Vec<_> = (0..12).map(|_| random_mb(&mut rng)).collect();
        let a = encode_partition(4, 3, &mbs, &TokenConfig::new()).map(|p| p.data);
        let b = encode_partition(
            4,
            3,
            &mbs,
            &TokenConfig::new().with_strategy(RecordingStrategy::CountThenEmit),
        )
        .map(|p| p.data);
        assert!(a.is_ok());
        assert_eq!(a.ok(), b.ok());
    }

    #[test]
    fn incomplete_and_overflowing_frames() {
        let config = TokenConfig::new();
        let mut enc = FrameTokenEncoder::new(2, 1, &config).unwrap();
        enc.record_macroblock(&MacroblockLevels::empty_i16()).unwrap();
        assert_eq!(enc.recorded(), 1);
        let err = enc.finish().unwrap_err();
        assert!(matches!(
            err.error(),
            EncodeError::IncompleteFrame {
                recorded: 1,
                expected: 2
            }
        ));

        let mut enc = FrameTokenEncoder::new(1, 1, &config).unwrap();
        enc.record_macroblock(&MacroblockLevels::empty_i16()).unwrap();
        let err = enc
            .record_macroblock(&MacroblockLevels::empty_i16())
            .unwrap_err();
        assert!(matches!(err.error(), EncodeError::MacroblockOverflow(1)));
    }

    #[test]
    fn invalid_dimensions() {
        let config = TokenConfig::new().with_limits(Limits::none().max_dimensions(8, 8));
        let err = FrameTokenEncoder::new(0, 1, &config).unwrap_err();
        assert!(matches!(err.error(), EncodeError::InvalidDimensions(0, 1)));
        assert!(FrameTokenEncoder::new(9, 1, &config).is_err());
    }

    #[test]
    fn page_limit_surfaces_as_exhaustion() {
        let mut rng = StdRng::seed_from_u64(3);
        let config = TokenConfig::new().with_max_pages(1);
        let mut enc = FrameTokenEncoder::new(64, 64, &config).unwrap();
        let mut result = Ok(false);
        for _ in 0..64 * 64 {
            result = enc.record_macroblock(&random_mb(&mut rng));
            if result.is_err() {
                break;
            }
        }
        let err = result.unwrap_err();
        assert!(matches!(
            err.error(),
            EncodeError::TokenBufferExhausted { pages: 1, .. }
        ));
    }

    #[test]
    fn empty_frame_counts() {
        let mbs = vec![MacroblockLevels::empty_i16(); 6];
        let p = encode_partition(3, 2, &mbs, &TokenConfig::new()).unwrap();
        // one node-0 token per block: 25 per i16 macroblock
        assert_eq!(p.stats.dynamic_tokens, 6 * 25);
        assert_eq!(p.stats.constant_tokens, 0);
        assert_eq!(p.stats.empty_macroblocks, 6);
        assert_eq!(p.stats.non_zero_blocks, 0);
        assert_eq!(p.skip_proba, None);
    }

    #[test]
    fn skip_elision_drops_tokens() {
        let mut mbs = vec![MacroblockLevels::empty_i4(); 8];
        mbs[5].chroma[2][1] = 1;
        let config = TokenConfig::new().with_skip_empty_macroblocks(true);
        let p = encode_partition(4, 2, &mbs, &config).unwrap();
        assert_eq!(p.stats.skipped_macroblocks, 7);
        assert_eq!(p.stats.blocks, 24);
        assert_eq!(p.skip_proba, Some(calc_skip_proba(7, 8)));
        assert!(matches!(mbs[5].luma, LumaLevels::I4 { .. }));
    }

    #[test]
    fn estimate_tracks_output() {
        let mut rng = StdRng::seed_from_u64(11);
        let mbs: Vec<_> = (0..40).map(|_| random_mb(&mut rng)).collect();
        let p = encode_partition(8, 5, &mbs, &TokenConfig::new()).unwrap();
        let estimate = cost_to_bytes(p.estimated_bits) as i64;
        let actual = p.data.len() as i64;
        assert!((estimate - actual).abs() <= actual / 10 + 8);
        assert!(p.estimated_bits <= p.default_bits);
    }
}
