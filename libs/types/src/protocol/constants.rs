//! Protocol constants for message framing
//!
//! These values are fixed by the version 2 wire format and shared by the
//! codec (parsing and building) and the connection layer (preamble checks).

/// Four-byte magic that opens every message
pub const MESSAGE_MAGIC: [u8; 4] = *b"RRAC";

/// The only supported message format version
pub const PROTOCOL_VERSION: u16 = 2;

/// Smallest message the reader accepts: the fixed header fields with every
/// string empty
pub const MIN_MESSAGE_SIZE: usize = 64;

/// Bytes needed to frame a message: magic(4) + message size(4) + version(2),
/// rounded up to the header-size field
pub const PREAMBLE_SIZE: usize = 12;

/// Size of a node identifier on the wire
pub const NODE_ID_SIZE: usize = 16;

/// Bytes of an element header that do not depend on its strings:
/// size(4) + name len(2) + type(2) + type name len(2) + metadata len(2) + count(4)
pub const ELEMENT_FIXED_HEADER_SIZE: usize = 16;

/// Largest entry count representable in a message header
pub const MAX_ENTRY_COUNT: usize = u16::MAX as usize;

/// Longest node name a node will carry in its headers
pub const MAX_NODE_NAME_LEN: usize = 256;

/// Entry types below this value are connection-level requests handled by the node
pub const SPECIAL_REQUEST_LIMIT: u16 = 500;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimum_message_covers_fixed_fields() {
        // magic + size + version + header size + 2 node ids + 2 endpoints
        // + 3 empty strings + entry count + message id + response id
        let fixed = 4 + 4 + 2 + 2 + 2 * NODE_ID_SIZE + 2 * 4 + 3 * 2 + 2 + 2 + 2;
        assert_eq!(fixed, MIN_MESSAGE_SIZE);
    }

    #[test]
    fn test_preamble_holds_version() {
        assert!(PREAMBLE_SIZE >= 4 + 4 + 2);
    }
}
