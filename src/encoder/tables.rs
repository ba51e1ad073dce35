//! Constant tables used by the token encoder and the cost model.

/// Fixed-point cost of coding a 0 with probability `p`, in 1/256 bit units.
///
/// `VP8_ENTROPY_COST[p] ~= -log2(p / 256) * 256`; the cost of a 1 is
/// `VP8_ENTROPY_COST[255 - p]`.
#[rustfmt::skip]
pub const VP8_ENTROPY_COST: [u16; 256] = [
    1792, 1792, 1792, 1536, 1536, 1408, 1366, 1280, 1280, 1216,
    1178, 1152, 1110, 1076, 1061, 1024, 1024,  992,  968,  951,
     939,  911,  896,  878,  871,  854,  838,  820,  811,  794,
     786,  768,  768,  752,  740,  732,  720,  709,  704,  690,
     683,  672,  666,  655,  647,  640,  631,  622,  615,  607,
     598,  592,  586,  576,  572,  564,  559,  555,  547,  541,
     534,  528,  522,  512,  512,  504,  500,  494,  488,  483,
     477,  473,  467,  461,  458,  452,  448,  443,  438,  434,
     427,  424,  419,  415,  410,  406,  403,  399,  394,  390,
     384,  384,  377,  374,  370,  366,  362,  359,  355,  351,
     347,  342,  342,  336,  333,  330,  326,  323,  320,  316,
     312,  308,  305,  302,  299,  296,  293,  288,  287,  283,
     280,  277,  274,  272,  268,  266,  262,  256,  256,  256,
     251,  248,  245,  242,  240,  237,  234,  232,  228,  226,
     223,  221,  218,  216,  214,  211,  208,  205,  203,  201,
     198,  196,  192,  191,  188,  187,  183,  181,  179,  176,
     175,  171,  171,  168,  165,  163,  160,  159,  156,  154,
     152,  150,  148,  146,  144,  142,  139,  138,  135,  133,
     131,  128,  128,  125,  123,  121,  119,  117,  115,  113,
     111,  110,  107,  105,  103,  102,  100,   98,   96,   94,
      92,   91,   89,   86,   86,   83,   82,   80,   77,   76,
      74,   73,   71,   69,   67,   66,   64,   63,   61,   59,
      57,   55,   54,   52,   51,   49,   47,   46,   44,   43,
      41,   40,   38,   36,   35,   33,   32,   30,   29,   27,
      25,   24,   22,   21,   19,   18,   16,   15,   13,   12,
      10,    9,    7,    6,    4,    3,
];

/// Coefficient position to band. Index 16 is a sentinel for the position
/// after the last coefficient.
pub const VP8_ENC_BANDS: [u8; 16 + 1] = [0, 1, 2, 3, 6, 4, 5, 6, 6, 6, 6, 6, 6, 6, 6, 7, 0];

/// Extra-bit probabilities for DCT_CAT3 (magnitudes 11..=18).
pub const VP8_CAT3: [u8; 3] = [173, 148, 140];
/// Extra-bit probabilities for DCT_CAT4 (magnitudes 19..=34).
pub const VP8_CAT4: [u8; 4] = [176, 155, 140, 135];
/// Extra-bit probabilities for DCT_CAT5 (magnitudes 35..=66).
pub const VP8_CAT5: [u8; 5] = [180, 157, 141, 134, 130];
/// Extra-bit probabilities for DCT_CAT6 (magnitudes 67..=2048).
pub const VP8_CAT6: [u8; 11] = [254, 254, 243, 230, 196, 177, 153, 140, 133, 130, 129];

/// Largest magnitude the coefficient tree can carry (cat6 with all extra bits set).
pub const MAX_LEVEL: u32 = 67 + (1 << 11) - 1;

/// Extra-bit probability table for cat3..=cat6, indexed by `cat - 3`.
pub(crate) const CAT_PROBAS: [&[u8]; 4] = [&VP8_CAT3, &VP8_CAT4, &VP8_CAT5, &VP8_CAT6];
