//! Types shared between the token encoder and the verification decoder

pub mod macroblock;
pub mod types;
