//! # Message Reader - Lazy Cursor Parsing
//!
//! ## Purpose
//!
//! Walks a received message without copying or allocating. Each level of the
//! tree has its own cursor, a small `Copy` value holding a window
//! `[offset, offset + count)` into the shared [`ScatterGatherBuffer`] plus the
//! bytes still available to later siblings:
//!
//! ```text
//! MessageReader ──begin_entries──▶ EntryReader ──begin_elements──▶ ElementReader
//!                                      │ move_next                     │ move_next
//!                                      ▼                               ▼ begin_nested_elements
//!                                 next entry                      ElementReader (one level down)
//! ```
//!
//! Sizes declared on the wire are checked against the enclosing window before a
//! cursor moves, so a corrupt length yields [`ProtocolError::Protocol`] instead
//! of a read outside the message.
//!
//! ## Strings
//!
//! Header strings come back as [`WireStr`]. Without storage they borrow from the
//! buffer (or name their location when they straddle spans); `read_header_with`
//! copies them into caller-supplied [`StringStorage`] instead.

use crate::buffers::ScatterGatherBuffer;
use crate::error::{ProtocolError, ProtocolResult};
use crate::header::{
    ElementBufferInfo, ElementHeader, EntryBufferInfo, EntryHeader, MessageHeader, StringStorage,
    WireStr,
};
use rrlite_types::{
    DataType, NodeId, WireScalar, MESSAGE_MAGIC, MIN_MESSAGE_SIZE, NODE_ID_SIZE, PROTOCOL_VERSION,
};

/// Chunk size used when comparing element names against the wire
const NAME_CHUNK: usize = 16;

/// Size of the length field that opens every entry and element
const SIZE_FIELD: usize = 4;

/// Where header strings end up
trait StrSink<'a, 's> {
    fn string(
        &mut self,
        buffer: &ScatterGatherBuffer<'a>,
        location: (usize, usize),
    ) -> ProtocolResult<WireStr<'s>>;
}

/// Zero-copy: borrow from the buffer when possible
struct Borrowed;

impl<'a> StrSink<'a, 'a> for Borrowed {
    fn string(
        &mut self,
        buffer: &ScatterGatherBuffer<'a>,
        (offset, len): (usize, usize),
    ) -> ProtocolResult<WireStr<'a>> {
        Ok(match buffer.contiguous(offset, len) {
            Some(bytes) => WireStr::Bytes(bytes),
            None => WireStr::Located { offset, len },
        })
    }
}

impl<'a, 's> StrSink<'a, 's> for StringStorage<'s> {
    fn string(
        &mut self,
        buffer: &ScatterGatherBuffer<'a>,
        (offset, len): (usize, usize),
    ) -> ProtocolResult<WireStr<'s>> {
        let dest = self.take(len)?;
        buffer.read_into(offset, dest)?;
        Ok(WireStr::Bytes(dest))
    }
}

/// Sequential field decoder bounded by a container window
struct FieldCursor<'a> {
    buffer: ScatterGatherBuffer<'a>,
    pos: usize,
    end: usize,
}

impl<'a> FieldCursor<'a> {
    fn new(buffer: ScatterGatherBuffer<'a>, start: usize, len: usize) -> Self {
        Self {
            buffer,
            pos: start,
            end: start.saturating_add(len),
        }
    }

    fn reserve(&mut self, len: usize) -> ProtocolResult<usize> {
        let at = self.pos;
        match at.checked_add(len) {
            Some(next) if next <= self.end => {
                self.pos = next;
                Ok(at)
            }
            _ => Err(ProtocolError::protocol("header field overruns its container")),
        }
    }

    fn skip(&mut self, len: usize) -> ProtocolResult<()> {
        self.reserve(len).map(|_| ())
    }

    fn u16(&mut self) -> ProtocolResult<u16> {
        let at = self.reserve(2)?;
        self.buffer.read_u16(at)
    }

    fn u32(&mut self) -> ProtocolResult<u32> {
        let at = self.reserve(4)?;
        self.buffer.read_u32(at)
    }

    fn node_id(&mut self) -> ProtocolResult<NodeId> {
        let at = self.reserve(NODE_ID_SIZE)?;
        let mut raw = [0u8; NODE_ID_SIZE];
        self.buffer.read_into(at, &mut raw)?;
        Ok(NodeId::from_bytes(raw))
    }

    /// Skip over a length-prefixed string, returning where its bytes are
    fn string_location(&mut self) -> ProtocolResult<(usize, usize)> {
        let len = self.u16()? as usize;
        let at = self.reserve(len)?;
        Ok((at, len))
    }
}

/// Bytes available to a child window of `size` that starts `used` bytes into
/// a parent of `parent_len` bytes
fn child_window(used: usize, size: usize, parent_len: usize) -> ProtocolResult<usize> {
    match used.checked_add(size) {
        Some(end) if end <= parent_len => Ok(parent_len - end),
        _ => Err(ProtocolError::protocol("declared size overruns its container")),
    }
}

/// Read the 32-bit size that opens the container at `pos`, checking that the
/// field itself fits in the parent
fn peek_size(
    buffer: &ScatterGatherBuffer<'_>,
    pos: usize,
    available: usize,
) -> ProtocolResult<usize> {
    if available < SIZE_FIELD {
        return Err(ProtocolError::protocol("size field overruns its container"));
    }
    Ok(buffer.read_u32(pos)? as usize)
}

/// Item count expected by [`ElementReader::verify_array`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayLength {
    Exact(usize),
    UpTo(usize),
}

/// Payload location of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataInfo {
    pub offset: usize,
    pub size: usize,
    pub count: u32,
}

/// Reader for one whole message
#[derive(Debug, Clone, Copy)]
pub struct MessageReader<'a> {
    buffer: ScatterGatherBuffer<'a>,
    offset: usize,
    count: usize,
    message_size: usize,
}

impl<'a> MessageReader<'a> {
    /// Validate framing of the message at `buffer[offset..offset + count]`
    ///
    /// Only the magic and the declared size are checked here; header fields are
    /// decoded lazily.
    pub fn init(buffer: ScatterGatherBuffer<'a>, offset: usize, count: usize) -> ProtocolResult<Self> {
        match offset.checked_add(count) {
            Some(end) if end <= buffer.total_length() => {}
            _ => return Err(ProtocolError::out_of_range("message window exceeds buffer")),
        }
        if count < MIN_MESSAGE_SIZE {
            return Err(ProtocolError::out_of_range("message shorter than minimum header"));
        }

        let mut magic = [0u8; 4];
        buffer.read_into(offset, &mut magic)?;
        if magic != MESSAGE_MAGIC {
            return Err(ProtocolError::protocol("bad message magic"));
        }

        let message_size = buffer.read_u32(offset + 4)? as usize;
        if message_size > count {
            return Err(ProtocolError::out_of_range("declared message size exceeds buffer"));
        }

        Ok(Self {
            buffer,
            offset,
            count,
            message_size,
        })
    }

    pub fn buffer(&self) -> ScatterGatherBuffer<'a> {
        self.buffer
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Size of the window handed to `init`
    pub fn count(&self) -> usize {
        self.count
    }

    /// Declared total message size
    pub fn message_size(&self) -> usize {
        self.message_size
    }

    fn decode_header<'s, S: StrSink<'a, 's>>(
        &self,
        sink: &mut S,
    ) -> ProtocolResult<(MessageHeader<'s>, usize)> {
        let mut f = FieldCursor::new(self.buffer, self.offset, self.message_size);
        f.skip(MESSAGE_MAGIC.len())?;
        let message_size = f.u32()?;
        let version = f.u16()?;
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::protocol("unsupported message version"));
        }
        let header_size = f.u16()?;
        let sender_nodeid = f.node_id()?;
        let receiver_nodeid = f.node_id()?;
        let sender_endpoint = f.u32()?;
        let receiver_endpoint = f.u32()?;
        let sender_nodename = f.string_location()?;
        let receiver_nodename = f.string_location()?;
        let metadata = f.string_location()?;
        let entry_count_offset = f.pos;
        let entry_count = f.u16()?;
        let message_id = f.u16()?;
        let message_res_id = f.u16()?;

        if f.pos - self.offset != header_size as usize {
            return Err(ProtocolError::protocol("message header size mismatch"));
        }

        let header = MessageHeader {
            message_size,
            header_size,
            sender_nodeid,
            receiver_nodeid,
            sender_endpoint,
            receiver_endpoint,
            sender_nodename: sink.string(&self.buffer, sender_nodename)?,
            receiver_nodename: sink.string(&self.buffer, receiver_nodename)?,
            metadata: sink.string(&self.buffer, metadata)?,
            entry_count,
            message_id,
            message_res_id,
        };
        Ok((header, entry_count_offset))
    }

    pub fn read_header(&self) -> ProtocolResult<MessageHeader<'a>> {
        self.decode_header(&mut Borrowed).map(|(h, _)| h)
    }

    /// Decode the header, copying its strings into `storage`
    pub fn read_header_with<'s>(
        &self,
        storage: &mut StringStorage<'s>,
    ) -> ProtocolResult<MessageHeader<'s>> {
        self.decode_header(storage).map(|(h, _)| h)
    }

    /// Cursor on the first entry
    ///
    /// Fails with [`ProtocolError::NoMore`] when the message has no entries.
    pub fn begin_entries(&self) -> ProtocolResult<EntryReader<'a>> {
        let (header, entry_count_offset) = self.decode_header(&mut Borrowed)?;
        if header.entry_count == 0 {
            return Err(ProtocolError::NoMore);
        }

        let header_size = header.header_size as usize;
        let start = self.offset + header_size;
        let entry_size = peek_size(&self.buffer, start, self.message_size - header_size)?;
        let remaining = child_window(header_size, entry_size, self.message_size)?;

        Ok(EntryReader {
            buffer: self.buffer,
            offset: start,
            count: entry_size,
            remaining,
            current: 0,
            entry_count_offset,
        })
    }
}

/// Cursor over the entries of a message
#[derive(Debug, Clone, Copy)]
pub struct EntryReader<'a> {
    buffer: ScatterGatherBuffer<'a>,
    offset: usize,
    count: usize,
    remaining: usize,
    current: usize,
    entry_count_offset: usize,
}

impl<'a> EntryReader<'a> {
    pub fn buffer(&self) -> ScatterGatherBuffer<'a> {
        self.buffer
    }

    /// Zero-based index of the current entry
    pub fn index(&self) -> usize {
        self.current
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Byte size of the current entry
    pub fn entry_size(&self) -> usize {
        self.count
    }

    /// Advance to the next entry
    ///
    /// The entry count is re-read from the message header on every call.
    pub fn move_next(&mut self) -> ProtocolResult<()> {
        let entry_count = self.buffer.read_u16(self.entry_count_offset)? as usize;
        if self.current + 1 >= entry_count {
            return Err(ProtocolError::NoMore);
        }

        let next = self.offset + self.count;
        let entry_size = peek_size(&self.buffer, next, self.remaining)?;
        if entry_size > self.remaining {
            return Err(ProtocolError::protocol("entry size overruns message"));
        }

        self.offset = next;
        self.count = entry_size;
        self.remaining -= entry_size;
        self.current += 1;
        Ok(())
    }

    fn decode_header<'s, S: StrSink<'a, 's>>(
        &self,
        sink: &mut S,
    ) -> ProtocolResult<(EntryHeader<'s>, EntryBufferInfo)> {
        let mut f = FieldCursor::new(self.buffer, self.offset, self.count);
        let entry_size = f.u32()?;
        let entry_type = f.u16()?;
        // reserved
        f.skip(2)?;
        let service_path = f.string_location()?;
        let member_name = f.string_location()?;
        let request_id = f.u32()?;
        let error = f.u16()?;
        let metadata = f.string_location()?;
        let element_count_offset = f.pos;
        let element_count = f.u16()?;

        let info = EntryBufferInfo {
            element_count_offset,
            header_size: f.pos - self.offset,
            element_start_offset: f.pos,
        };
        let header = EntryHeader {
            entry_size,
            entry_type,
            service_path: sink.string(&self.buffer, service_path)?,
            member_name: sink.string(&self.buffer, member_name)?,
            request_id,
            error,
            metadata: sink.string(&self.buffer, metadata)?,
            element_count,
        };
        Ok((header, info))
    }

    pub fn read_header(&self) -> ProtocolResult<EntryHeader<'a>> {
        self.decode_header(&mut Borrowed).map(|(h, _)| h)
    }

    pub fn read_header_with<'s>(
        &self,
        storage: &mut StringStorage<'s>,
    ) -> ProtocolResult<EntryHeader<'s>> {
        self.decode_header(storage).map(|(h, _)| h)
    }

    /// Header plus the offsets element iteration needs
    pub fn read_header_ex(&self) -> ProtocolResult<(EntryHeader<'a>, EntryBufferInfo)> {
        self.decode_header(&mut Borrowed)
    }

    /// Cursor on the first element of this entry
    pub fn begin_elements(&self) -> ProtocolResult<ElementReader<'a>> {
        let (header, info) = self.read_header_ex()?;
        if header.element_count == 0 {
            return Err(ProtocolError::NoMore);
        }

        let available = self.count - info.header_size;
        let element_size = peek_size(&self.buffer, info.element_start_offset, available)?;
        let remaining = child_window(info.header_size, element_size, self.count)?;

        Ok(ElementReader {
            buffer: self.buffer,
            offset: info.element_start_offset,
            count: element_size,
            remaining,
            current: 0,
            total: header.element_count as usize,
        })
    }

    /// First element of this entry named `name`
    pub fn find_element(&self, name: impl AsRef<[u8]>) -> ProtocolResult<ElementReader<'a>> {
        scan_for(self.begin_elements(), name.as_ref())
    }

    pub fn find_element_verify_scalar(
        &self,
        name: impl AsRef<[u8]>,
        expected: DataType,
    ) -> ProtocolResult<ElementReader<'a>> {
        let element = self.find_element(name)?;
        element.verify_scalar(expected)?;
        Ok(element)
    }

    pub fn find_element_verify_array(
        &self,
        name: impl AsRef<[u8]>,
        expected: DataType,
        length: ArrayLength,
    ) -> ProtocolResult<ElementReader<'a>> {
        let element = self.find_element(name)?;
        element.verify_array(expected, length)?;
        Ok(element)
    }

    pub fn find_element_verify_string(
        &self,
        name: impl AsRef<[u8]>,
        max_len: usize,
    ) -> ProtocolResult<ElementReader<'a>> {
        let element = self.find_element(name)?;
        element.verify_string(max_len)?;
        Ok(element)
    }
}

/// Linear scan from `first` to the element named `name`
fn scan_for<'a>(
    first: ProtocolResult<ElementReader<'a>>,
    name: &[u8],
) -> ProtocolResult<ElementReader<'a>> {
    let mut element = match first {
        Err(ProtocolError::NoMore) => return Err(ProtocolError::MessageElementNotFound),
        other => other?,
    };
    loop {
        if element.name_equals(name)? {
            return Ok(element);
        }
        match element.move_next() {
            Ok(()) => {}
            Err(ProtocolError::NoMore) => return Err(ProtocolError::MessageElementNotFound),
            Err(e) => return Err(e),
        }
    }
}

/// Cursor over a sequence of sibling elements
#[derive(Debug, Clone, Copy)]
pub struct ElementReader<'a> {
    buffer: ScatterGatherBuffer<'a>,
    offset: usize,
    count: usize,
    remaining: usize,
    current: usize,
    total: usize,
}

impl<'a> ElementReader<'a> {
    pub fn buffer(&self) -> ScatterGatherBuffer<'a> {
        self.buffer
    }

    pub fn index(&self) -> usize {
        self.current
    }

    /// Number of siblings in this sequence
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn element_size(&self) -> usize {
        self.count
    }

    /// Advance to the next sibling, using the count captured when the
    /// sequence was entered
    pub fn move_next(&mut self) -> ProtocolResult<()> {
        if self.current + 1 >= self.total {
            return Err(ProtocolError::NoMore);
        }

        let next = self.offset + self.count;
        let element_size = peek_size(&self.buffer, next, self.remaining)?;
        if element_size > self.remaining {
            return Err(ProtocolError::protocol("element size overruns container"));
        }

        self.offset = next;
        self.count = element_size;
        self.remaining -= element_size;
        self.current += 1;
        Ok(())
    }

    fn decode_header<'s, S: StrSink<'a, 's>>(
        &self,
        sink: &mut S,
    ) -> ProtocolResult<(ElementHeader<'s>, ElementBufferInfo)> {
        let mut f = FieldCursor::new(self.buffer, self.offset, self.count);
        let element_size = f.u32()?;
        let element_name = f.string_location()?;
        let element_type = f.u16()?;
        let element_type_name = f.string_location()?;
        let metadata = f.string_location()?;
        let data_count_offset = f.pos;
        let data_count = f.u32()?;

        let header_size = f.pos - self.offset;
        if (element_size as usize) < header_size {
            return Err(ProtocolError::protocol("element smaller than its header"));
        }

        let info = ElementBufferInfo {
            data_count_offset,
            name_offset: element_name.0,
            header_size,
            data_start_offset: f.pos,
        };
        let header = ElementHeader {
            element_size,
            element_name: sink.string(&self.buffer, element_name)?,
            element_type,
            element_type_name: sink.string(&self.buffer, element_type_name)?,
            metadata: sink.string(&self.buffer, metadata)?,
            data_count,
        };
        Ok((header, info))
    }

    pub fn read_header(&self) -> ProtocolResult<ElementHeader<'a>> {
        self.decode_header(&mut Borrowed).map(|(h, _)| h)
    }

    pub fn read_header_with<'s>(
        &self,
        storage: &mut StringStorage<'s>,
    ) -> ProtocolResult<ElementHeader<'s>> {
        self.decode_header(storage).map(|(h, _)| h)
    }

    pub fn read_header_ex(&self) -> ProtocolResult<(ElementHeader<'a>, ElementBufferInfo)> {
        self.decode_header(&mut Borrowed)
    }

    /// Compare this element's name against `name`, streaming the wire bytes
    /// through a small fixed buffer
    pub fn name_equals(&self, name: &[u8]) -> ProtocolResult<bool> {
        let (header, info) = self.read_header_ex()?;
        if header.element_name.len() != name.len() {
            return Ok(false);
        }

        let mut chunk = [0u8; NAME_CHUNK];
        for (index, expected) in name.chunks(NAME_CHUNK).enumerate() {
            let got = &mut chunk[..expected.len()];
            self.buffer.read_into(info.name_offset + index * NAME_CHUNK, got)?;
            if got != expected {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Payload location, checking the type code and, for fixed-size items,
    /// that the count agrees with the payload size
    pub fn get_data_info(&self, data_type: DataType, elem_size: usize) -> ProtocolResult<DataInfo> {
        let (header, info) = self.read_header_ex()?;
        if header.element_type != data_type.code() {
            return Err(ProtocolError::type_mismatch("element data type"));
        }

        let size = header.element_size as usize - info.header_size;
        if elem_size != 0 && elem_size * header.data_count as usize != size {
            return Err(ProtocolError::protocol("element data size mismatch"));
        }

        Ok(DataInfo {
            offset: info.data_start_offset,
            size,
            count: header.data_count,
        })
    }

    pub fn read_scalar<T: WireScalar>(&self) -> ProtocolResult<T> {
        let info = self.get_data_info(T::DATA_TYPE, std::mem::size_of::<T>())?;
        if info.count != 1 {
            return Err(ProtocolError::protocol("scalar element count is not one"));
        }
        let mut value = [T::zeroed()];
        self.buffer.read_typed(info.offset, &mut value)?;
        Ok(value[0])
    }

    /// Copy the array payload into `dest`, returning the item count
    pub fn read_array<T: WireScalar>(&self, dest: &mut [T]) -> ProtocolResult<usize> {
        let info = self.get_data_info(T::DATA_TYPE, std::mem::size_of::<T>())?;
        let count = info.count as usize;
        if count > dest.len() {
            return Err(ProtocolError::out_of_range("array destination too small"));
        }
        self.buffer.read_typed(info.offset, &mut dest[..count])?;
        Ok(count)
    }

    /// Copy the string payload into `dest`, returning its byte length
    pub fn read_string(&self, dest: &mut [u8]) -> ProtocolResult<usize> {
        let info = self.get_data_info(DataType::String, 1)?;
        let len = info.count as usize;
        if len > dest.len() {
            return Err(ProtocolError::out_of_range("string destination too small"));
        }
        self.buffer.read_into(info.offset, &mut dest[..len])?;
        Ok(len)
    }

    /// String payload without copying
    pub fn string_ref(&self) -> ProtocolResult<WireStr<'a>> {
        let info = self.get_data_info(DataType::String, 1)?;
        Borrowed.string(&self.buffer, (info.offset, info.count as usize))
    }

    /// Cursor on the first element nested inside this composite element
    pub fn begin_nested_elements(&self) -> ProtocolResult<ElementReader<'a>> {
        let (header, info) = self.read_header_ex()?;
        if !DataType::is_nested_code(header.element_type) {
            return Err(ProtocolError::type_mismatch("element is not a composite"));
        }
        if header.data_count == 0 {
            return Err(ProtocolError::NoMore);
        }

        let available = self.count - info.header_size;
        let nested_size = peek_size(&self.buffer, info.data_start_offset, available)?;
        let remaining = child_window(info.header_size, nested_size, self.count)?;

        Ok(ElementReader {
            buffer: self.buffer,
            offset: info.data_start_offset,
            count: nested_size,
            remaining,
            current: 0,
            total: header.data_count as usize,
        })
    }

    pub fn find_nested_element(&self, name: impl AsRef<[u8]>) -> ProtocolResult<ElementReader<'a>> {
        scan_for(self.begin_nested_elements(), name.as_ref())
    }

    pub fn find_nested_element_verify_scalar(
        &self,
        name: impl AsRef<[u8]>,
        expected: DataType,
    ) -> ProtocolResult<ElementReader<'a>> {
        let element = self.find_nested_element(name)?;
        element.verify_scalar(expected)?;
        Ok(element)
    }

    pub fn find_nested_element_verify_array(
        &self,
        name: impl AsRef<[u8]>,
        expected: DataType,
        length: ArrayLength,
    ) -> ProtocolResult<ElementReader<'a>> {
        let element = self.find_nested_element(name)?;
        element.verify_array(expected, length)?;
        Ok(element)
    }

    pub fn find_nested_element_verify_string(
        &self,
        name: impl AsRef<[u8]>,
        max_len: usize,
    ) -> ProtocolResult<ElementReader<'a>> {
        let element = self.find_nested_element(name)?;
        element.verify_string(max_len)?;
        Ok(element)
    }

    pub fn verify_scalar(&self, expected: DataType) -> ProtocolResult<()> {
        let header = self.read_header()?;
        if header.element_type != expected.code() || header.data_count != 1 {
            return Err(ProtocolError::type_mismatch("expected a scalar"));
        }
        Ok(())
    }

    pub fn verify_array(&self, expected: DataType, length: ArrayLength) -> ProtocolResult<()> {
        let header = self.read_header()?;
        if header.element_type != expected.code() {
            return Err(ProtocolError::type_mismatch("array element type"));
        }
        let count = header.data_count as usize;
        match length {
            ArrayLength::Exact(n) if count != n => {
                Err(ProtocolError::type_mismatch("array length"))
            }
            ArrayLength::UpTo(max) if count > max => {
                Err(ProtocolError::out_of_range("array longer than allowed"))
            }
            _ => Ok(()),
        }
    }

    pub fn verify_string(&self, max_len: usize) -> ProtocolResult<()> {
        let header = self.read_header()?;
        if header.element_type != DataType::String.code() {
            return Err(ProtocolError::type_mismatch("expected a string"));
        }
        if header.data_count as usize > max_len {
            return Err(ProtocolError::out_of_range("string longer than allowed"));
        }
        Ok(())
    }
}
