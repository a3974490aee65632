//! # RRLite Protocol Types
//!
//! Leaf value types shared by every layer of the RRLite stack.
//!
//! ## Design Philosophy
//!
//! - **No Allocation**: every type here is fixed-size and `Copy` (or inline storage)
//! - **Wire-Exact Codes**: enumerations carry the exact 16-bit codes used on the wire
//! - **Checked Conversion**: raw codes convert through `TryFrom<u16>` (num_enum), unknown
//!   codes stay representable as raw integers in the codec headers
//!
//! ## Quick Start
//!
//! ```rust
//! use rrlite_types::{DataType, EntryType, NodeId, MESSAGE_MAGIC};
//!
//! let id = NodeId::random();
//! assert!(!id.is_nil());
//!
//! assert!(DataType::Structure.is_nested());
//! assert_eq!(EntryType::FunctionCallReq.response(), Some(EntryType::FunctionCallRes));
//! assert_eq!(&MESSAGE_MAGIC, b"RRAC");
//! ```
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → libs/codec → libs/network → services/
//!     ↑            ↓              ↓
//! Codes &      Reader/Writer   Connection state,
//! Node ids     over buffers    node, transport
//! ```

pub mod protocol;

pub use protocol::constants::*;
pub use protocol::data_type::DataType;
pub use protocol::entry_type::EntryType;
pub use protocol::error_code::MessageErrorType;
pub use protocol::fixed_str::{FixedStr, FixedStrError};
pub use protocol::node_id::{NodeId, NodeIdParseError};
pub use protocol::scalar::{CDouble, CSingle, WireBool, WireScalar};
