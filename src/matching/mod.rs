//! Patient normalization, the match index, and score renormalization.

pub mod index;
pub mod normalize;
pub mod scoring;

pub use index::{MatchIndex, MatchResult, PATIENT_INDEX};
pub use normalize::{Normalizer, ValidationError};
