//! Protocol leaf types: constants, type codes and identifiers.

pub mod constants;
pub mod data_type;
pub mod entry_type;
pub mod error_code;
pub mod fixed_str;
pub mod node_id;
pub mod scalar;
