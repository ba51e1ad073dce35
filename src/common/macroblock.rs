//! Quantized levels of one macroblock and the non-zero context that links
//! neighbouring blocks.
//!
//! Levels are stored in coefficient scan (zigzag) order, the order in which
//! the token tree visits them.

use alloc::vec;
use alloc::vec::Vec;

use super::types::CoeffType;

/// Levels of a 4x4 block in scan order.
pub type BlockLevels = [i16; 16];

/// Entries of a non-zero context row: 4 luma, 2 U, 2 V, 1 Y2.
pub const NZ_ENTRIES: usize = 9;
/// Index of the Y2 (DC) flag in a context row.
pub const NZ_DC: usize = 8;

/// Luma part of a macroblock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LumaLevels {
    /// 16x16 prediction: a Y2 block holding the DCs, plus 16 blocks whose
    /// position 0 is not coded.
    I16 {
        /// Walsh-Hadamard DC block.
        dc: BlockLevels,
        /// Luma blocks in raster order; position 0 is ignored.
        ac: [BlockLevels; 16],
    },
    /// 4x4 prediction: 16 complete luma blocks in raster order.
    I4 {
        /// Luma blocks in raster order.
        blocks: [BlockLevels; 16],
    },
}

/// All quantized levels of one macroblock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MacroblockLevels {
    /// Luma levels.
    pub luma: LumaLevels,
    /// Chroma blocks: U in raster order (0..4), then V (4..8).
    pub chroma: [BlockLevels; 8],
}

impl MacroblockLevels {
    /// 16x16 predicted macroblock.
    pub fn i16(dc: BlockLevels, ac: [BlockLevels; 16], chroma: [BlockLevels; 8]) -> Self {
        Self {
            luma: LumaLevels::I16 { dc, ac },
            chroma,
        }
    }

    /// 4x4 predicted macroblock.
    pub fn i4(blocks: [BlockLevels; 16], chroma: [BlockLevels; 8]) -> Self {
        Self {
            luma: LumaLevels::I4 { blocks },
            chroma,
        }
    }

    /// All-zero 16x16 macroblock.
    pub fn empty_i16() -> Self {
        Self::i16([0; 16], [[0; 16]; 16], [[0; 16]; 8])
    }

    /// All-zero 4x4 macroblock.
    pub fn empty_i4() -> Self {
        Self::i4([[0; 16]; 16], [[0; 16]; 8])
    }

    /// True for 16x16 prediction.
    pub fn is_i16(&self) -> bool {
        matches!(self.luma, LumaLevels::I16 { .. })
    }

    /// True when no coded position holds a non-zero level, so the
    /// macroblock can be signalled as skipped.
    pub fn is_empty(&self) -> bool {
        let chroma_empty = self.chroma.iter().all(|b| b.iter().all(|&v| v == 0));
        let luma_empty = match &self.luma {
            LumaLevels::I16 { dc, ac } => {
                dc.iter().all(|&v| v == 0) && ac.iter().all(|b| b[1..].iter().all(|&v| v == 0))
            }
            LumaLevels::I4 { blocks } => blocks.iter().all(|b| b.iter().all(|&v| v == 0)),
        };
        luma_empty && chroma_empty
    }

    /// Number of coded blocks (25 for 16x16, 24 for 4x4).
    pub fn num_blocks(&self) -> usize {
        match self.luma {
            LumaLevels::I16 { .. } => 25,
            LumaLevels::I4 { .. } => 24,
        }
    }

    /// Block addressed by `index`, if this macroblock codes it.
    pub fn block(&self, index: BlockIndex) -> Option<&BlockLevels> {
        match (index, &self.luma) {
            (BlockIndex::Y2, LumaLevels::I16 { dc, .. }) => Some(dc),
            (BlockIndex::Y2, LumaLevels::I4 { .. }) => None,
            (BlockIndex::Luma(i), LumaLevels::I16 { ac, .. }) => ac.get(i),
            (BlockIndex::Luma(i), LumaLevels::I4 { blocks }) => blocks.get(i),
            (BlockIndex::Chroma(i), _) => self.chroma.get(i),
        }
    }

    /// Mutable access to the block addressed by `index`.
    pub fn block_mut(&mut self, index: BlockIndex) -> Option<&mut BlockLevels> {
        match (index, &mut self.luma) {
            (BlockIndex::Y2, LumaLevels::I16 { dc, .. }) => Some(dc),
            (BlockIndex::Y2, LumaLevels::I4 { .. }) => None,
            (BlockIndex::Luma(i), LumaLevels::I16 { ac, .. }) => ac.get_mut(i),
            (BlockIndex::Luma(i), LumaLevels::I4 { blocks }) => blocks.get_mut(i),
            (BlockIndex::Chroma(i), _) => self.chroma.get_mut(i),
        }
    }

    /// Visits every coded block in bitstream order with its type and
    /// non-zero context slots.
    ///
    /// The callback receives `(type, top index, left index, levels)`; the
    /// indices address a context row of [`NZ_ENTRIES`] flags.
    pub fn for_each_block<F>(&self, mut f: F)
    where
        F: FnMut(CoeffType, usize, usize, &BlockLevels),
    {
        for (coeff_type, top, left, index) in block_order(self.is_i16()) {
            if let Some(block) = self.block(index) {
                f(coeff_type, top, left, block);
            }
        }
    }
}

/// Address of a block inside a [`MacroblockLevels`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockIndex {
    /// The Y2 block of a 16x16 macroblock.
    Y2,
    /// Luma block, raster order.
    Luma(usize),
    /// Chroma block: U 0..4, V 4..8.
    Chroma(usize),
}

/// Coded blocks of a macroblock in bitstream order, as
/// `(type, top context index, left context index, block)`.
///
/// Y2 first for 16x16 macroblocks, then luma in raster order, then U and V
/// each as a 2x2 raster.
pub fn block_order(is_i16: bool) -> impl Iterator<Item = (CoeffType, usize, usize, BlockIndex)> {
    let y2 = is_i16.then_some((CoeffType::I16Dc, NZ_DC, NZ_DC, BlockIndex::Y2));
    let luma_type = if is_i16 {
        CoeffType::I16Ac
    } else {
        CoeffType::I4
    };
    let luma = (0..16).map(move |i| (luma_type, i & 3, i >> 2, BlockIndex::Luma(i)));
    let chroma = [0usize, 2].into_iter().flat_map(|ch| {
        (0..4).map(move |i| {
            let (x, y) = (i & 1, i >> 1);
            (
                CoeffType::Chroma,
                4 + ch + x,
                4 + ch + y,
                BlockIndex::Chroma(ch * 2 + x + y * 2),
            )
        })
    });
    y2.into_iter().chain(luma).chain(chroma)
}

/// Per-frame non-zero flags of the blocks above (one row per macroblock
/// column) and to the left of the current macroblock.
#[derive(Clone, Debug)]
pub struct NonZeroContext {
    top: Vec<[u8; NZ_ENTRIES]>,
    left: [u8; NZ_ENTRIES],
}

impl NonZeroContext {
    /// Cleared context for a frame `mb_width` macroblocks wide.
    pub fn new(mb_width: usize) -> Self {
        Self {
            top: vec![[0; NZ_ENTRIES]; mb_width],
            left: [0; NZ_ENTRIES],
        }
    }

    /// Like [`new`](Self::new), but returns `None` if the row cannot be
    /// allocated.
    pub fn try_new(mb_width: usize) -> Option<Self> {
        let mut top = Vec::new();
        top.try_reserve_exact(mb_width).ok()?;
        top.resize(mb_width, [0; NZ_ENTRIES]);
        Some(Self {
            top,
            left: [0; NZ_ENTRIES],
        })
    }

    /// Clears the left flags at the start of a macroblock row.
    pub fn start_row(&mut self) {
        self.left = [0; NZ_ENTRIES];
    }

    /// Clears everything for a new frame.
    pub fn reset(&mut self) {
        self.top.iter_mut().for_each(|row| *row = [0; NZ_ENTRIES]);
        self.start_row();
    }

    /// Context value (0..=2) of a block: its non-zero neighbours above and
    /// to the left.
    #[inline]
    pub fn context(&self, mbx: usize, top: usize, left: usize) -> usize {
        usize::from(self.top[mbx][top] + self.left[left])
    }

    /// Store the flag of a coded block.
    #[inline]
    pub fn set(&mut self, mbx: usize, top: usize, left: usize, non_zero: bool) {
        self.top[mbx][top] = u8::from(non_zero);
        self.left[left] = u8::from(non_zero);
    }

    /// Passes the block context to `code` and stores the flag it returns.
    #[inline]
    pub fn update<F>(&mut self, mbx: usize, top: usize, left: usize, code: F)
    where
        F: FnOnce(usize) -> bool,
    {
        let non_zero = code(self.context(mbx, top, left));
        self.set(mbx, top, left, non_zero);
    }

    /// Flags of a skipped macroblock: every block is empty, except that a
    /// 4x4 macroblock leaves the Y2 flags alone since it codes no Y2 block.
    pub fn skip(&mut self, mbx: usize, is_i16: bool) {
        let keep = if is_i16 { NZ_DC + 1 } else { NZ_DC };
        self.top[mbx][..keep].fill(0);
        self.left[..keep].fill(0);
    }

    /// Current flags above macroblock column `mbx`.
    pub fn top(&self, mbx: usize) -> &[u8; NZ_ENTRIES] {
        &self.top[mbx]
    }

    /// Current left flags.
    pub fn left(&self) -> &[u8; NZ_ENTRIES] {
        &self.left
    }
}
