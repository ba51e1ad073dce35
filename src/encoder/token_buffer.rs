//! Paginated token buffer for deferred coefficient emission.
//!
//! The recording pass appends one [`Token`] per binary decision of the
//! coefficient tree. Dynamic tokens keep a probability slot that is resolved
//! only at emission time, after the frame's probabilities are finalized.
//! Constant tokens (signs and extra bits) carry their probability inline.

use alloc::vec::Vec;

use whereat::at;

use crate::common::types::{slot_proba, TokenProbTables, NUM_SLOTS};
use crate::encoder::api::{EncodeError, EncodeResult};
use crate::encoder::arithmetic::BitWriter;
use crate::encoder::cost::vp8_bit_cost;

/// Smallest page capacity, in tokens. Smaller requests are clamped up.
pub const MIN_PAGE_SIZE: usize = 8192;

/// One recorded binary decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token {
    /// Bit coded with the probability found at `slot` of the final table.
    Dynamic {
        /// Coded bit.
        bit: bool,
        /// Flat probability slot, `11 * (ctx + 3 * (band + 8 * type)) + node`.
        slot: u16,
    },
    /// Bit coded with a fixed probability.
    Constant {
        /// Coded bit.
        bit: bool,
        /// Probability of a 0.
        proba: u8,
    },
}

impl Token {
    /// The coded bit.
    #[inline]
    pub fn bit(self) -> bool {
        match self {
            Token::Dynamic { bit, .. } | Token::Constant { bit, .. } => bit,
        }
    }

    /// Probability this token is coded with under `probas`.
    #[inline]
    pub fn proba(self, probas: &TokenProbTables) -> u8 {
        match self {
            Token::Dynamic { slot, .. } => slot_proba(probas, slot),
            Token::Constant { proba, .. } => proba,
        }
    }
}

/// Destination of the coefficient tree traversal.
///
/// Implemented by the token buffer (record for later), the statistics
/// accumulator (tally only), [`DirectEmitter`] (code immediately against a
/// known table) and pairs of sinks (record and tally in one pass).
pub trait TokenSink {
    /// Consume a bit addressed by a probability slot. Returns `bit`.
    fn add_token(&mut self, bit: bool, slot: u16) -> bool;

    /// Consume a bit with a fixed probability.
    fn add_constant_token(&mut self, bit: bool, proba: u8);
}

impl<S: TokenSink + ?Sized> TokenSink for &mut S {
    #[inline]
    fn add_token(&mut self, bit: bool, slot: u16) -> bool {
        (**self).add_token(bit, slot)
    }

    #[inline]
    fn add_constant_token(&mut self, bit: bool, proba: u8) {
        (**self).add_constant_token(bit, proba)
    }
}

impl<A: TokenSink, B: TokenSink> TokenSink for (A, B) {
    #[inline]
    fn add_token(&mut self, bit: bool, slot: u16) -> bool {
        self.0.add_token(bit, slot);
        self.1.add_token(bit, slot)
    }

    #[inline]
    fn add_constant_token(&mut self, bit: bool, proba: u8) {
        self.0.add_constant_token(bit, proba);
        self.1.add_constant_token(bit, proba);
    }
}

/// Sink that codes tokens straight into a [`BitWriter`] with a fixed table.
pub struct DirectEmitter<'a> {
    writer: &'a mut BitWriter,
    probas: &'a TokenProbTables,
}

impl<'a> DirectEmitter<'a> {
    /// Code into `writer` using `probas`.
    pub fn new(writer: &'a mut BitWriter, probas: &'a TokenProbTables) -> Self {
        Self { writer, probas }
    }
}

impl TokenSink for DirectEmitter<'_> {
    #[inline]
    fn add_token(&mut self, bit: bool, slot: u16) -> bool {
        self.writer.put_bit(bit, slot_proba(self.probas, slot))
    }

    #[inline]
    fn add_constant_token(&mut self, bit: bool, proba: u8) {
        self.writer.put_bit(bit, proba);
    }
}

/// Append-only log of tokens, chunked into fixed-capacity pages.
///
/// A failed page allocation sets a sticky error: later appends are dropped
/// and the recorded stream must be treated as invalid.
#[derive(Debug, Clone)]
pub struct TokenBuffer {
    pages: Vec<Vec<Token>>,
    page_size: usize,
    max_pages: Option<usize>,
    len: usize,
    error: bool,
}

impl TokenBuffer {
    /// New buffer with `page_size` tokens per page (at least [`MIN_PAGE_SIZE`]).
    pub fn new(page_size: usize) -> Self {
        Self::with_limits(page_size, None)
    }

    /// New buffer that refuses to grow past `max_pages` pages.
    pub fn with_limits(page_size: usize, max_pages: Option<usize>) -> Self {
        Self {
            pages: Vec::new(),
            page_size: page_size.max(MIN_PAGE_SIZE),
            max_pages,
            len: 0,
            error: false,
        }
    }

    /// Tokens per page.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of allocated pages.
    pub fn num_pages(&self) -> usize {
        self.pages.len()
    }

    /// Number of recorded tokens.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no token has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True if a page allocation failed.
    pub fn has_error(&self) -> bool {
        self.error
    }

    /// Fails with [`EncodeError::TokenBufferExhausted`] once a page
    /// allocation has failed.
    pub fn check(&self) -> EncodeResult<()> {
        if self.error {
            return Err(at(EncodeError::TokenBufferExhausted {
                pages: self.pages.len(),
                tokens: self.len,
            }));
        }
        Ok(())
    }

    /// Bytes reserved by the allocated pages.
    pub fn allocated_bytes(&self) -> usize {
        self.pages.len() * self.page_size * core::mem::size_of::<Token>()
    }

    /// Release every page and clear the error flag.
    pub fn clear(&mut self) {
        self.pages = Vec::new();
        self.len = 0;
        self.error = false;
    }

    fn new_page(&mut self) -> bool {
        if let Some(max) = self.max_pages {
            if self.pages.len() >= max {
                log::warn!("token buffer page limit reached ({max} pages)");
                self.error = true;
                return false;
            }
        }
        let mut page = Vec::new();
        if page.try_reserve_exact(self.page_size).is_err() || self.pages.try_reserve(1).is_err()
        {
            log::warn!(
                "token page allocation failed after {} pages",
                self.pages.len()
            );
            self.error = true;
            return false;
        }
        self.pages.push(page);
        log::trace!("token page {} allocated", self.pages.len());
        true
    }

    #[inline]
    fn push(&mut self, token: Token) {
        if self.error {
            return;
        }
        let full = self
            .pages
            .last()
            .map_or(true, |page| page.len() >= self.page_size);
        if full && !self.new_page() {
            return;
        }
        if let Some(page) = self.pages.last_mut() {
            page.push(token);
            self.len += 1;
        }
    }

    /// Forward iteration in recording order, across pages.
    pub fn iter(&self) -> impl Iterator<Item = Token> + '_ {
        self.pages.iter().flat_map(|page| page.iter().copied())
    }

    /// Code every token into `writer`, resolving dynamic slots in `probas`.
    pub fn emit_tokens(&self, writer: &mut BitWriter, probas: &TokenProbTables) {
        for token in self.iter() {
            writer.put_bit(token.bit(), token.proba(probas));
        }
    }

    /// Modeled size of [`emit_tokens`](Self::emit_tokens) in 1/256 bits.
    /// Touches no coder state.
    pub fn estimate_size(&self, probas: &TokenProbTables) -> u64 {
        self.iter()
            .map(|token| u64::from(vp8_bit_cost(token.bit(), token.proba(probas))))
            .sum()
    }
}

impl TokenSink for TokenBuffer {
    #[inline]
    fn add_token(&mut self, bit: bool, slot: u16) -> bool {
        debug_assert!((slot as usize) < NUM_SLOTS);
        self.push(Token::Dynamic { bit, slot });
        bit
    }

    #[inline]
    fn add_constant_token(&mut self, bit: bool, proba: u8) {
        self.push(Token::Constant { bit, proba });
    }
}
