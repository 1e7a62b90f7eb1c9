//! Analysis modules.
//!
//! Mapping of raw model output into analysis records, plus the
//! distribution and theme statistics built from them.

pub mod aggregator;

pub use aggregator::*;
