//! State encoding: schema-guided flatten, then per-feature normalization

pub mod features;
pub mod flatten;
pub mod state_encoder;

pub use features::{base100_encode, count_encoder, normalize_by_specific_number, state_hash, Primitive};
pub use flatten::flatten;
pub use state_encoder::StateEncoder;
