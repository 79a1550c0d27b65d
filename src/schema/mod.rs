//! State schema and default world-model structure

pub mod path;
pub mod state_schema;
pub mod structure;

pub use path::{generalize_key, SchemaPath, Segment};
pub use state_schema::{SchemaEntry, StateSchema};
pub use structure::{
    blackboard_for, default_blackboard, default_target_structure, target_structure, STATUS_CODES,
};
