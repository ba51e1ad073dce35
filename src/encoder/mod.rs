//! VP8 coefficient token encoder

mod api;
/// Boolean entropy coder
pub mod arithmetic;
mod config;
/// Bit costs, statistics and probability finalization
pub mod cost;
mod limits;
pub mod tables;
/// Paginated token storage and the sink trait
pub mod token_buffer;
/// Frame-level recording, header syntax and token tree traversal
pub mod vp8;

// Re-export public API
pub use api::{EncodeError, EncodeResult};
pub use arithmetic::{BitWriter, PartitionState, PARTITION_STATE_WORDS};
pub use config::{RecordingStrategy, TokenConfig};
pub use cost::{finalize_token_probas, FinalizedProbas, ProbaStats};
pub use limits::Limits;
pub use token_buffer::{DirectEmitter, Token, TokenBuffer, TokenSink, MIN_PAGE_SIZE};
pub use vp8::{encode_partition, EncodedPartition, FrameTokenEncoder, TokenStats};
