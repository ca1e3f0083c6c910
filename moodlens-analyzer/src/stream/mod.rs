//! NDJSON stream decoding
//!
//! Bytes from the transport pass through the [`LineFramer`] into complete
//! lines, and each line is tagged by the [`classify`] function.

pub mod classifier;
pub mod framer;

pub use classifier::{classify, ParseFailure, StreamMessage};
pub use framer::LineFramer;
