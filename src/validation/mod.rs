//! Validation, correction and canonical sorting of parsed patches
//!
//! Patches pass through `Validator::validate`, `Corrector::correct` and
//! `sort_state` in that order before they reach the blackboard.

pub mod catalogue;
pub mod corrector;
pub mod probe;
pub mod sorter;
pub mod validator;

pub use catalogue::{KernelList, OsCatalogue};
pub use corrector::{CorrectnessCache, Corrector};
pub use probe::{Fact, FactProbe, HttpPathProbe, NmapPortProbe, Observation};
pub use sorter::sort_state;
pub use validator::Validator;
