//! Upload decoding.
//!
//! Turns an uploaded CSV into rows and rows into reviews ready to persist.

pub mod decoder;

pub use decoder::*;
