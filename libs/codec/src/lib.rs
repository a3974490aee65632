//! # RRLite Codec - Allocation-Free Message Reading and Writing
//!
//! ## Purpose
//!
//! The "rules" layer of the stack: how messages look on the wire and how to walk
//! or produce them over caller-owned memory.
//! - [`ScatterGatherBuffer`] / [`ScatterGatherBufferMut`]: one logical byte range
//!   over many disjoint spans, with cross-span and size-converting copies
//! - [`MessageReader`] → [`EntryReader`] → [`ElementReader`]: lazy cursor parsing
//!   with every declared length checked against its container
//! - [`MessageWriter`] → [`EntryWriter`] → [`ElementWriter`]: single-pass
//!   serialization with backpatched sizes and counts
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → [codec] → libs/network
//!     ↑           ↓            ↓
//! Type codes   Reader/      Connection
//! NodeId       Writer       buffers
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Connection state, sockets or polling (belongs in network/)
//! - Interpretation of entry types beyond their codes
//!
//! ## Wire Format
//!
//! All integers are in host byte order.
//!
//! ```text
//! Message:  "RRAC" | msg_size:u32 | version:u16 | header_size:u16 |
//!           sender_nodeid:16 | receiver_nodeid:16 | sender_ep:u32 | receiver_ep:u32 |
//!           sender_name:str | receiver_name:str | metadata:str |
//!           entry_count:u16 | message_id:u16 | message_res_id:u16
//! Entry:    entry_size:u32 | entry_type:u16 | reserved:u16 | service_path:str |
//!           member_name:str | request_id:u32 | error:u16 | metadata:str | element_count:u16
//! Element:  element_size:u32 | name:str | element_type:u16 | type_name:str |
//!           metadata:str | data_count:u32 | payload
//! ```
//!
//! `str` is a u16 length followed by that many bytes.
//!
//! ## Example
//!
//! ```rust
//! use rrlite_codec::{EntryHeader, MessageHeader, MessageReader, MessageWriter,
//!     ScatterGatherBuffer, ScatterGatherBufferMut};
//! use rrlite_types::EntryType;
//!
//! let mut raw = [0u8; 256];
//! let writer = MessageWriter::init(ScatterGatherBufferMut::single(&mut raw), 0, 256)?;
//! let mut entries = writer.begin_message(&MessageHeader::default())?;
//! let mut elements = entries.begin_entry(&EntryHeader::new(
//!     EntryType::PropertyGetRes, "svc", "d1", 1))?;
//! elements.write_scalar("value", 3.5f64)?;
//! elements.end_entry()?;
//! let written = entries.end_message()?;
//!
//! let reader = MessageReader::init(ScatterGatherBuffer::single(&raw), 0, written.message_size)?;
//! let entry = reader.begin_entries()?;
//! let value: f64 = entry.find_element("value")?.read_scalar()?;
//! assert_eq!(value, 3.5);
//! # Ok::<(), rrlite_codec::ProtocolError>(())
//! ```

pub mod buffers;
pub mod builder;
pub mod error;
pub mod header;
pub mod parser;

pub use buffers::{copy, copy_typed, ScatterGatherBuffer, ScatterGatherBufferMut};
pub use builder::{ElementWriter, EntryWriter, MessageWriter, WrittenMessage};
pub use error::{ProtocolError, ProtocolResult};
pub use header::{
    ElementBufferInfo, ElementHeader, EntryBufferInfo, EntryHeader, MessageHeader, StringStorage,
    WireStr,
};
pub use parser::{ArrayLength, DataInfo, ElementReader, EntryReader, MessageReader};
