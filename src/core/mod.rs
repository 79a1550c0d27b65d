pub mod config;
pub mod error;
pub mod types;

pub use config::ReconConfig;
pub use error::{ReconError, Result};
pub use types::{ActionIndex, StateVector, Transition};
