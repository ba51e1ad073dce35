//! Token partition decoder, used to verify encoder output

mod api;

/// Coefficient and probability parsing
pub mod vp8;

pub use api::DecodeError;
