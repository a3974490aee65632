//! Reader validation against malformed input
//!
//! Every test starts from a well-formed message and corrupts one field, then
//! checks the reader reports the right error kind without reading outside the
//! message.

use rrlite_codec::{
    EntryHeader, MessageHeader, MessageReader, MessageWriter, ProtocolError, ScatterGatherBuffer,
    ScatterGatherBufferMut,
};
use rrlite_types::{EntryType, MIN_MESSAGE_SIZE};

// Field offsets within a message header with empty strings
const MSG_SIZE_AT: usize = 4;
const VERSION_AT: usize = 8;
const HEADER_SIZE_AT: usize = 10;
const ENTRY_COUNT_AT: usize = 58;

fn write_message(raw: &mut [u8], entries: usize) -> usize {
    let len = raw.len();
    let writer = MessageWriter::init(ScatterGatherBufferMut::single(raw), 0, len).unwrap();
    let mut entry_writer = writer.begin_message(&MessageHeader::default()).unwrap();
    for i in 0..entries {
        let mut elements = entry_writer
            .begin_entry(&EntryHeader::new(EntryType::FunctionCallReq, "svc", "f", i as u32))
            .unwrap();
        elements.write_scalar("arg", i as i32).unwrap();
        elements.end_entry().unwrap();
    }
    entry_writer.end_message().unwrap().message_size
}

fn put_u16(raw: &mut [u8], at: usize, v: u16) {
    raw[at..at + 2].copy_from_slice(&v.to_ne_bytes());
}

fn put_u32(raw: &mut [u8], at: usize, v: u32) {
    raw[at..at + 4].copy_from_slice(&v.to_ne_bytes());
}

#[test]
fn test_empty_header_layout() {
    let mut raw = [0u8; 256];
    let size = write_message(&mut raw, 0);
    assert_eq!(size, MIN_MESSAGE_SIZE);
    assert_eq!(u16::from_ne_bytes([raw[HEADER_SIZE_AT], raw[HEADER_SIZE_AT + 1]]), 64);
    assert_eq!(u16::from_ne_bytes([raw[VERSION_AT], raw[VERSION_AT + 1]]), 2);
    let reader = MessageReader::init(ScatterGatherBuffer::single(&raw), 0, size).unwrap();
    assert_eq!(reader.begin_entries().unwrap_err(), ProtocolError::NoMore);
}

#[test]
fn test_bad_magic_any_byte() {
    for corrupt in 0..4 {
        let mut raw = [0u8; 256];
        let size = write_message(&mut raw, 1);
        raw[corrupt] ^= 0xff;
        let err = MessageReader::init(ScatterGatherBuffer::single(&raw), 0, size).unwrap_err();
        assert!(matches!(err, ProtocolError::Protocol { .. }), "byte {corrupt}: {err:?}");
    }
}

#[test]
fn test_declared_size_beyond_buffer() {
    let mut raw = [0u8; 256];
    let size = write_message(&mut raw, 1);
    put_u32(&mut raw, MSG_SIZE_AT, size as u32 + 100);
    let err = MessageReader::init(ScatterGatherBuffer::single(&raw), 0, size).unwrap_err();
    assert!(matches!(err, ProtocolError::OutOfRange { .. }));
}

#[test]
fn test_window_checks() {
    let raw = [0u8; 100];
    let buffer = ScatterGatherBuffer::single(&raw);
    assert!(matches!(
        MessageReader::init(buffer, 0, 32),
        Err(ProtocolError::OutOfRange { .. })
    ));
    assert!(matches!(
        MessageReader::init(buffer, 50, 64),
        Err(ProtocolError::OutOfRange { .. })
    ));
}

#[test]
fn test_unsupported_version() {
    let mut raw = [0u8; 256];
    let size = write_message(&mut raw, 1);
    put_u16(&mut raw, VERSION_AT, 3);
    let reader = MessageReader::init(ScatterGatherBuffer::single(&raw), 0, size).unwrap();
    assert!(matches!(reader.read_header(), Err(ProtocolError::Protocol { .. })));
    assert!(matches!(reader.begin_entries(), Err(ProtocolError::Protocol { .. })));
}

#[test]
fn test_header_size_mismatch() {
    let mut raw = [0u8; 256];
    let size = write_message(&mut raw, 1);
    put_u16(&mut raw, HEADER_SIZE_AT, 66);
    let reader = MessageReader::init(ScatterGatherBuffer::single(&raw), 0, size).unwrap();
    assert!(matches!(reader.read_header(), Err(ProtocolError::Protocol { .. })));
}

#[test]
fn test_entry_size_overrun() {
    let mut raw = [0u8; 256];
    let size = write_message(&mut raw, 1);
    // first entry size field sits right after the 64-byte header
    put_u32(&mut raw, 64, size as u32);
    let reader = MessageReader::init(ScatterGatherBuffer::single(&raw), 0, size).unwrap();
    assert!(matches!(reader.begin_entries(), Err(ProtocolError::Protocol { .. })));
}

#[test]
fn test_inflated_entry_count() {
    let mut raw = [0u8; 512];
    let size = write_message(&mut raw, 2);
    put_u16(&mut raw, ENTRY_COUNT_AT, 3);
    let reader = MessageReader::init(ScatterGatherBuffer::single(&raw), 0, size).unwrap();
    let mut entry = reader.begin_entries().unwrap();
    entry.move_next().unwrap();
    assert!(matches!(entry.move_next(), Err(ProtocolError::Protocol { .. })));
}

#[test]
fn test_entry_count_reread_on_move() {
    let mut raw = [0u8; 512];
    let size = write_message(&mut raw, 2);
    let mut patched = raw;
    put_u16(&mut patched, ENTRY_COUNT_AT, 1);

    // a cursor over the patched copy sees the smaller count immediately
    let reader = MessageReader::init(ScatterGatherBuffer::single(&patched), 0, size).unwrap();
    let mut entry = reader.begin_entries().unwrap();
    assert_eq!(entry.move_next(), Err(ProtocolError::NoMore));

    let reader = MessageReader::init(ScatterGatherBuffer::single(&raw), 0, size).unwrap();
    let mut entry = reader.begin_entries().unwrap();
    assert_eq!(entry.move_next(), Ok(()));
}

#[test]
fn test_element_count_payload_mismatch() {
    let mut raw = [0u8; 256];
    let size = write_message(&mut raw, 1);
    let reader = MessageReader::init(ScatterGatherBuffer::single(&raw), 0, size).unwrap();
    let element = reader.begin_entries().unwrap().begin_elements().unwrap();
    let (_, info) = element.read_header_ex().unwrap();

    put_u32(&mut raw, info.data_count_offset, 2);
    let reader = MessageReader::init(ScatterGatherBuffer::single(&raw), 0, size).unwrap();
    let element = reader.begin_entries().unwrap().begin_elements().unwrap();
    assert!(matches!(
        element.read_scalar::<i32>(),
        Err(ProtocolError::Protocol { .. })
    ));
}

#[test]
fn test_truncated_message_rejected() {
    let mut raw = [0u8; 256];
    let size = write_message(&mut raw, 1);
    // claim the message ends in the middle of the entry
    put_u32(&mut raw, MSG_SIZE_AT, size as u32 - 6);
    let reader = MessageReader::init(ScatterGatherBuffer::single(&raw), 0, size).unwrap();
    assert!(matches!(reader.begin_entries(), Err(ProtocolError::Protocol { .. })));
}
