//! # Message Writer - Single-Pass Backpatched Construction
//!
//! ## Purpose
//!
//! Serializes a message straight into a caller-owned [`ScatterGatherBufferMut`]
//! in one forward pass. Sizes and counts are not known until a container is
//! finished, so every container is written in two phases:
//!
//! 1. `begin_*` writes the header with zeroed size/count placeholders and
//!    remembers where they are
//! 2. `end_*` patches the placeholders from the running totals and adds the
//!    container to its parent's totals
//!
//! ```text
//! MessageWriter ──begin_message──▶ EntryWriter ──begin_entry──▶ ElementWriter
//!                                       ▲  end_message               │ write_* / begin_nested_element
//!                                       └──────── end_entry ─────────┘
//! ```
//!
//! A child [`ElementWriter`] mutably borrows its parent for its whole life, so
//! the borrow checker rules out writing to a parent while a child is open. A
//! child dropped without its `end_*` call contributes nothing: the parent's
//! totals are untouched and the next write reuses the space.

use crate::buffers::{copy_typed, ScatterGatherBuffer, ScatterGatherBufferMut};
use crate::error::{ProtocolError, ProtocolResult};
use crate::header::{ElementHeader, EntryHeader, MessageHeader, WireStr};
use rrlite_types::{
    DataType, WireScalar, ELEMENT_FIXED_HEADER_SIZE, MAX_ENTRY_COUNT, MESSAGE_MAGIC,
    PROTOCOL_VERSION,
};
use tracing::trace;

/// Children written into a container so far
#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    count: usize,
    size: usize,
}

/// Field writer bounded by the end of the writer window
struct FieldWriter<'w, 'a, 'b> {
    buffer: &'w mut ScatterGatherBufferMut<'a, 'b>,
    pos: usize,
    end: usize,
}

impl<'w, 'a, 'b> FieldWriter<'w, 'a, 'b> {
    fn new(buffer: &'w mut ScatterGatherBufferMut<'a, 'b>, pos: usize, end: usize) -> Self {
        Self { buffer, pos, end }
    }

    fn reserve(&mut self, len: usize) -> ProtocolResult<usize> {
        let at = self.pos;
        match at.checked_add(len) {
            Some(next) if next <= self.end => {
                self.pos = next;
                Ok(at)
            }
            _ => Err(ProtocolError::out_of_range("message does not fit in buffer")),
        }
    }

    fn u16(&mut self, value: u16) -> ProtocolResult<usize> {
        let at = self.reserve(2)?;
        self.buffer.write_u16(at, value)?;
        Ok(at)
    }

    fn u32(&mut self, value: u32) -> ProtocolResult<usize> {
        let at = self.reserve(4)?;
        self.buffer.write_u32(at, value)?;
        Ok(at)
    }

    fn bytes(&mut self, data: &[u8]) -> ProtocolResult<()> {
        let at = self.reserve(data.len())?;
        self.buffer.write_from(at, data)
    }

    fn string(&mut self, s: &WireStr<'_>) -> ProtocolResult<()> {
        let bytes = resolve(s)?;
        let len = u16::try_from(bytes.len())
            .map_err(|_| ProtocolError::out_of_range("string longer than 65535 bytes"))?;
        self.u16(len)?;
        self.bytes(bytes)
    }
}

fn resolve<'s>(s: &WireStr<'s>) -> ProtocolResult<&'s [u8]> {
    s.as_bytes()
        .ok_or(ProtocolError::invalid_argument("located string has no backing bytes"))
}

/// Summary returned by [`EntryWriter::end_message`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrittenMessage {
    pub message_size: usize,
    pub header_size: usize,
    pub entry_count: usize,
}

/// Writer for one message at `buffer[offset..offset + count]`
#[derive(Debug)]
pub struct MessageWriter<'a, 'b> {
    buffer: ScatterGatherBufferMut<'a, 'b>,
    offset: usize,
    count: usize,
}

impl<'a, 'b> MessageWriter<'a, 'b> {
    pub fn init(buffer: ScatterGatherBufferMut<'a, 'b>, offset: usize, count: usize) -> ProtocolResult<Self> {
        match offset.checked_add(count) {
            Some(end) if end <= buffer.total_length() => Ok(Self {
                buffer,
                offset,
                count,
            }),
            _ => Err(ProtocolError::out_of_range("writer window exceeds buffer")),
        }
    }

    /// Write the message header and return a writer for its entries
    ///
    /// Size fields and the entry count of `header` are ignored; they are
    /// computed as the message is written.
    pub fn begin_message(mut self, header: &MessageHeader<'_>) -> ProtocolResult<EntryWriter<'a, 'b>> {
        let end = self.offset + self.count;
        let mut f = FieldWriter::new(&mut self.buffer, self.offset, end);

        f.bytes(&MESSAGE_MAGIC)?;
        f.u32(0)?;
        f.u16(PROTOCOL_VERSION)?;
        let header_size_offset = f.u16(0)?;
        f.bytes(header.sender_nodeid.as_ref())?;
        f.bytes(header.receiver_nodeid.as_ref())?;
        f.u32(header.sender_endpoint)?;
        f.u32(header.receiver_endpoint)?;
        f.string(&header.sender_nodename)?;
        f.string(&header.receiver_nodename)?;
        f.string(&header.metadata)?;
        let entry_count_offset = f.u16(0)?;
        f.u16(header.message_id)?;
        f.u16(header.message_res_id)?;

        let header_size = f.pos - self.offset;
        let header_size_field = u16::try_from(header_size)
            .map_err(|_| ProtocolError::out_of_range("message header too large"))?;
        self.buffer.write_u16(header_size_offset, header_size_field)?;

        Ok(EntryWriter {
            buffer: self.buffer,
            message_start: self.offset,
            header_size,
            entry_count_offset,
            limit: end,
            written: Tally::default(),
        })
    }
}

/// Writer for the entries of one message
#[derive(Debug)]
pub struct EntryWriter<'a, 'b> {
    buffer: ScatterGatherBufferMut<'a, 'b>,
    message_start: usize,
    header_size: usize,
    entry_count_offset: usize,
    limit: usize,
    written: Tally,
}

impl<'a, 'b> EntryWriter<'a, 'b> {
    fn pos(&self) -> usize {
        self.message_start + self.header_size + self.written.size
    }

    /// Entries completed so far
    pub fn entry_count(&self) -> usize {
        self.written.count
    }

    /// Open a new entry; its elements are written through the returned writer
    pub fn begin_entry(&mut self, header: &EntryHeader<'_>) -> ProtocolResult<ElementWriter<'_, 'a, 'b>> {
        if self.written.count >= MAX_ENTRY_COUNT {
            return Err(ProtocolError::protocol("too many entries in message"));
        }

        let start = self.pos();
        let mut f = FieldWriter::new(&mut self.buffer, start, self.limit);
        f.u32(0)?;
        f.u16(header.entry_type)?;
        // reserved
        f.u16(0)?;
        f.string(&header.service_path)?;
        f.string(&header.member_name)?;
        f.u32(header.request_id)?;
        f.u16(header.error)?;
        f.string(&header.metadata)?;
        let count_offset = f.u16(0)?;
        let header_size = f.pos - start;

        Ok(ElementWriter {
            buffer: &mut self.buffer,
            parent: &mut self.written,
            start,
            header_size,
            count_offset,
            limit: self.limit,
            kind: Closing::Entry,
            written: Tally::default(),
        })
    }

    /// Patch the message size and entry count
    pub fn end_message(mut self) -> ProtocolResult<WrittenMessage> {
        let message_size = self.header_size + self.written.size;
        let size_field = u32::try_from(message_size)
            .map_err(|_| ProtocolError::out_of_range("message larger than 4 GiB"))?;
        self.buffer.write_u32(self.message_start + MESSAGE_MAGIC.len(), size_field)?;
        self.buffer
            .write_u16(self.entry_count_offset, self.written.count as u16)?;

        trace!(
            message_size,
            entry_count = self.written.count,
            "message written"
        );

        Ok(WrittenMessage {
            message_size,
            header_size: self.header_size,
            entry_count: self.written.count,
        })
    }
}

/// Which placeholder layout an [`ElementWriter`] closes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Closing {
    /// Entry: u32 size, u16 element count
    Entry,
    /// Composite element: u32 size, u32 data count
    Nested,
}

impl Closing {
    fn max_children(self) -> usize {
        match self {
            Closing::Entry => u16::MAX as usize,
            Closing::Nested => u32::MAX as usize,
        }
    }
}

/// Writer for the elements inside an entry or a composite element
#[derive(Debug)]
pub struct ElementWriter<'w, 'a, 'b> {
    buffer: &'w mut ScatterGatherBufferMut<'a, 'b>,
    parent: &'w mut Tally,
    start: usize,
    header_size: usize,
    count_offset: usize,
    limit: usize,
    kind: Closing,
    written: Tally,
}

impl<'w, 'a, 'b> ElementWriter<'w, 'a, 'b> {
    fn pos(&self) -> usize {
        self.start + self.header_size + self.written.size
    }

    /// Elements completed so far
    pub fn element_count(&self) -> usize {
        self.written.count
    }

    fn check_child_count(&self) -> ProtocolResult<()> {
        if self.written.count >= self.kind.max_children() {
            return Err(ProtocolError::protocol("too many elements in container"));
        }
        Ok(())
    }

    /// Write one complete leaf element
    ///
    /// `payload` holds `item_count` items of `elem_size` bytes each. The type
    /// name and metadata of leaf elements are written empty.
    pub fn write_raw(
        &mut self,
        name: &[u8],
        data_type: DataType,
        elem_size: usize,
        item_count: usize,
        payload: &[u8],
    ) -> ProtocolResult<()> {
        let name_len = u16::try_from(name.len())
            .map_err(|_| ProtocolError::out_of_range("element name longer than 65535 bytes"))?;
        let count_field = u32::try_from(item_count)
            .ok()
            .filter(|c| *c < u32::MAX)
            .ok_or(ProtocolError::protocol("element item count too large"))?;
        self.check_child_count()?;

        let data_size = item_count
            .checked_mul(elem_size)
            .ok_or(ProtocolError::out_of_range("element payload too large"))?;
        if data_size != payload.len() {
            return Err(ProtocolError::invalid_argument("payload length disagrees with item count"));
        }
        let element_size = ELEMENT_FIXED_HEADER_SIZE + name.len() + data_size;
        let size_field = u32::try_from(element_size)
            .map_err(|_| ProtocolError::out_of_range("element larger than 4 GiB"))?;

        let start = self.pos();
        match start.checked_add(element_size) {
            Some(end) if end <= self.limit => {}
            _ => return Err(ProtocolError::out_of_range("element does not fit in buffer")),
        }

        let mut f = FieldWriter::new(&mut *self.buffer, start, self.limit);
        f.u32(size_field)?;
        f.u16(name_len)?;
        f.bytes(name)?;
        f.u16(data_type.code())?;
        // empty type name and metadata
        f.u16(0)?;
        f.u16(0)?;
        f.u32(count_field)?;
        let data_at = f.reserve(data_size)?;
        copy_typed(
            &ScatterGatherBuffer::single(payload),
            0,
            elem_size,
            item_count,
            &mut *self.buffer,
            data_at,
            1,
            data_size,
        )?;

        self.written.count += 1;
        self.written.size += element_size;
        Ok(())
    }

    pub fn write_scalar<T: WireScalar>(&mut self, name: impl AsRef<[u8]>, value: T) -> ProtocolResult<()> {
        self.write_array(name, std::slice::from_ref(&value))
    }

    pub fn write_array<T: WireScalar>(&mut self, name: impl AsRef<[u8]>, values: &[T]) -> ProtocolResult<()> {
        self.write_raw(
            name.as_ref(),
            T::DATA_TYPE,
            std::mem::size_of::<T>(),
            values.len(),
            bytemuck::cast_slice(values),
        )
    }

    pub fn write_string(&mut self, name: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> ProtocolResult<()> {
        let value = value.as_ref();
        self.write_raw(name.as_ref(), DataType::String, 1, value.len(), value)
    }

    /// Open a composite element; its children go through the returned writer
    pub fn begin_nested_element(
        &mut self,
        header: &ElementHeader<'_>,
    ) -> ProtocolResult<ElementWriter<'_, 'a, 'b>> {
        if !DataType::is_nested_code(header.element_type) {
            return Err(ProtocolError::invalid_argument("nested element needs a composite type"));
        }
        self.check_child_count()?;

        let start = self.pos();
        let mut f = FieldWriter::new(&mut *self.buffer, start, self.limit);
        f.u32(0)?;
        f.string(&header.element_name)?;
        f.u16(header.element_type)?;
        f.string(&header.element_type_name)?;
        f.string(&header.metadata)?;
        let count_offset = f.u32(0)?;
        let header_size = f.pos - start;

        Ok(ElementWriter {
            buffer: &mut *self.buffer,
            parent: &mut self.written,
            start,
            header_size,
            count_offset,
            limit: self.limit,
            kind: Closing::Nested,
            written: Tally::default(),
        })
    }

    fn finish(self, expected: Closing) -> ProtocolResult<()> {
        if self.kind != expected {
            return Err(ProtocolError::invalid_operation("container closed with the wrong end call"));
        }

        let size = self.header_size + self.written.size;
        let size_field = u32::try_from(size)
            .map_err(|_| ProtocolError::out_of_range("container larger than 4 GiB"))?;
        self.buffer.write_u32(self.start, size_field)?;
        match self.kind {
            Closing::Entry => self
                .buffer
                .write_u16(self.count_offset, self.written.count as u16)?,
            Closing::Nested => self
                .buffer
                .write_u32(self.count_offset, self.written.count as u32)?,
        }

        self.parent.count += 1;
        self.parent.size += size;
        Ok(())
    }

    /// Patch the entry size and element count
    pub fn end_entry(self) -> ProtocolResult<()> {
        self.finish(Closing::Entry)
    }

    /// Patch the composite element size and child count
    pub fn end_nested_element(self) -> ProtocolResult<()> {
        self.finish(Closing::Nested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rrlite_types::NodeId;

    fn header() -> MessageHeader<'static> {
        MessageHeader {
            sender_nodeid: NodeId::from_bytes([1; 16]),
            sender_nodename: "writer".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_message_sizes() {
        let mut raw = [0u8; 128];
        let writer = MessageWriter::init(ScatterGatherBufferMut::single(&mut raw), 0, 128).unwrap();
        let entries = writer.begin_message(&header()).unwrap();
        let written = entries.end_message().unwrap();
        assert_eq!(written.header_size, 64 + "writer".len());
        assert_eq!(written.message_size, written.header_size);
        assert_eq!(written.entry_count, 0);
        assert_eq!(&raw[..4], b"RRAC");
    }

    #[test]
    fn test_header_overflow_is_out_of_range() {
        let mut raw = [0u8; 40];
        let writer = MessageWriter::init(ScatterGatherBufferMut::single(&mut raw), 0, 40).unwrap();
        let err = writer.begin_message(&header()).unwrap_err();
        assert!(matches!(err, ProtocolError::OutOfRange { .. }));
    }

    #[test]
    fn test_wrong_end_call_rejected() {
        let mut raw = [0u8; 256];
        let writer = MessageWriter::init(ScatterGatherBufferMut::single(&mut raw), 0, 256).unwrap();
        let mut entries = writer.begin_message(&header()).unwrap();
        let elements = entries
            .begin_entry(&EntryHeader::default())
            .unwrap();
        let err = elements.end_nested_element().unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidOperation { .. }));
        assert_eq!(entries.entry_count(), 0);
    }

    #[test]
    fn test_located_string_rejected() {
        let mut raw = [0u8; 256];
        let writer = MessageWriter::init(ScatterGatherBufferMut::single(&mut raw), 0, 256).unwrap();
        let bad = MessageHeader {
            metadata: WireStr::Located { offset: 0, len: 3 },
            ..Default::default()
        };
        let err = writer.begin_message(&bad).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidArgument { .. }));
    }

    #[test]
    fn test_raw_payload_length_checked() {
        let mut raw = [0u8; 256];
        let writer = MessageWriter::init(ScatterGatherBufferMut::single(&mut raw), 0, 256).unwrap();
        let mut entries = writer.begin_message(&header()).unwrap();
        let mut elements = entries.begin_entry(&EntryHeader::default()).unwrap();
        let err = elements
            .write_raw(b"v", DataType::Int32, 4, 2, &[0u8; 4])
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidArgument { .. }));
        elements.write_raw(b"v", DataType::Int32, 4, 1, &[0u8; 4]).unwrap();
        assert_eq!(elements.element_count(), 1);
    }
}
