//! Measurement vocabulary: phases, sequence descriptions, samples, and the
//! pure helpers that turn raw readings and selector tokens into display text
//! and instrument ranges.

pub mod format;
pub mod phase;
pub mod range;
pub mod sample;

pub use format::{format_reading, parse_leading_number, parse_reading, PLACEHOLDER};
pub use phase::{OrderMode, Phase, PhaseEntries, PhaseSpec, PhaseSpecs, SequenceSpec};
pub use range::{range_tokens, resolve_range, RangeValue};
pub use sample::Sample;
