//! Header value types for messages, entries and elements
//!
//! Readers hand these out and writers take them in. String fields are
//! [`WireStr`] so a reader can return them without copying: a string that sits
//! inside one span is borrowed directly, one that straddles spans is returned
//! as a location to be copied out on demand.

use crate::buffers::ScatterGatherBuffer;
use crate::error::{ProtocolError, ProtocolResult};
use rrlite_types::{DataType, EntryType, MessageErrorType, NodeId};

/// Length-prefixed wire string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireStr<'a> {
    /// Bytes available as one slice
    Bytes(&'a [u8]),
    /// Logical position of the bytes in the source buffer
    Located { offset: usize, len: usize },
}

impl<'a> WireStr<'a> {
    pub fn len(&self) -> usize {
        match self {
            WireStr::Bytes(b) => b.len(),
            WireStr::Located { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Direct bytes, if the string was not split across spans
    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match self {
            WireStr::Bytes(b) => Some(*b),
            WireStr::Located { .. } => None,
        }
    }

    /// Copy the string into `dest`, returning its length
    ///
    /// `source` must be the buffer the string was read from.
    pub fn copy_to(&self, source: &ScatterGatherBuffer<'_>, dest: &mut [u8]) -> ProtocolResult<usize> {
        let len = self.len();
        if len > dest.len() {
            return Err(ProtocolError::invalid_argument("string destination too small"));
        }
        match self {
            WireStr::Bytes(b) => dest[..len].copy_from_slice(b),
            WireStr::Located { offset, .. } => source.read_into(*offset, &mut dest[..len])?,
        }
        Ok(len)
    }
}

impl Default for WireStr<'_> {
    fn default() -> Self {
        WireStr::Bytes(&[])
    }
}

impl<'a> From<&'a str> for WireStr<'a> {
    fn from(s: &'a str) -> Self {
        WireStr::Bytes(s.as_bytes())
    }
}

impl<'a> From<&'a [u8]> for WireStr<'a> {
    fn from(b: &'a [u8]) -> Self {
        WireStr::Bytes(b)
    }
}

impl PartialEq<&str> for WireStr<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == Some(other.as_bytes())
    }
}

/// Caller-provided storage that header strings are copied into
///
/// Strings are carved off the front of the slice one after another.
#[derive(Debug)]
pub struct StringStorage<'s> {
    free: &'s mut [u8],
}

impl<'s> StringStorage<'s> {
    pub fn new(storage: &'s mut [u8]) -> Self {
        Self { free: storage }
    }

    pub fn remaining(&self) -> usize {
        self.free.len()
    }

    pub(crate) fn take(&mut self, len: usize) -> ProtocolResult<&'s mut [u8]> {
        if len > self.free.len() {
            return Err(ProtocolError::invalid_argument("string storage too small"));
        }
        let free = std::mem::take(&mut self.free);
        let (head, tail) = free.split_at_mut(len);
        self.free = tail;
        Ok(head)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageHeader<'a> {
    pub message_size: u32,
    pub header_size: u16,
    pub sender_nodeid: NodeId,
    pub receiver_nodeid: NodeId,
    pub sender_endpoint: u32,
    pub receiver_endpoint: u32,
    pub sender_nodename: WireStr<'a>,
    pub receiver_nodename: WireStr<'a>,
    pub metadata: WireStr<'a>,
    pub entry_count: u16,
    pub message_id: u16,
    pub message_res_id: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryHeader<'a> {
    pub entry_size: u32,
    /// Raw code; see [`EntryHeader::kind`]
    pub entry_type: u16,
    pub service_path: WireStr<'a>,
    pub member_name: WireStr<'a>,
    pub request_id: u32,
    pub error: u16,
    pub metadata: WireStr<'a>,
    pub element_count: u16,
}

impl<'a> EntryHeader<'a> {
    /// Header for a new entry with the given routing fields
    pub fn new(
        entry_type: EntryType,
        service_path: impl Into<WireStr<'a>>,
        member_name: impl Into<WireStr<'a>>,
        request_id: u32,
    ) -> Self {
        Self {
            entry_type: entry_type.code(),
            service_path: service_path.into(),
            member_name: member_name.into(),
            request_id,
            ..Default::default()
        }
    }

    pub fn kind(&self) -> Option<EntryType> {
        EntryType::try_from(self.entry_type).ok()
    }

    pub fn error_kind(&self) -> Option<MessageErrorType> {
        MessageErrorType::try_from(self.error).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ElementHeader<'a> {
    pub element_size: u32,
    pub element_name: WireStr<'a>,
    /// Raw code; see [`ElementHeader::data_type`]
    pub element_type: u16,
    pub element_type_name: WireStr<'a>,
    pub metadata: WireStr<'a>,
    pub data_count: u32,
}

impl<'a> ElementHeader<'a> {
    /// Header for a composite element opened with `begin_nested_element`
    pub fn nested(name: impl Into<WireStr<'a>>, data_type: DataType) -> Self {
        Self {
            element_name: name.into(),
            element_type: data_type.code(),
            ..Default::default()
        }
    }

    pub fn data_type(&self) -> Option<DataType> {
        DataType::try_from(self.element_type).ok()
    }
}

/// Offsets inside an entry needed to walk its elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryBufferInfo {
    pub element_count_offset: usize,
    pub header_size: usize,
    pub element_start_offset: usize,
}

/// Offsets inside an element needed to reach its name and payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ElementBufferInfo {
    pub data_count_offset: usize,
    pub name_offset: usize,
    pub header_size: usize,
    pub data_start_offset: usize,
}
