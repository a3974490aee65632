//! Events reported by [`Node::next_event`](super::Node::next_event)

use crate::connection::{NameString, NAME_CAPACITY};
use crate::pool::ConnectionId;
use rrlite_codec::{
    EntryHeader, MessageHeader, ProtocolError, ProtocolResult, ScatterGatherBuffer, WireStr,
};
use rrlite_types::{EntryType, MessageErrorType, NodeId};

/// Something the event loop has to act on, one connection at a time
///
/// Every event except `NextCycle` must be passed back to
/// [`Node::consume_event`](super::Node::consume_event) once handled.
#[allow(clippy::large_enum_variant)]
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Every connection has been visited this cycle
    NextCycle,
    ConnectionClosed(ConnectionId),
    /// The connection is faulted and will be closed by the transport
    ConnectionError {
        connection: ConnectionId,
        error: ProtocolError,
    },
    ConnectionConnected(ConnectionId),
    MessageReceived(ReceivedMessage),
}

impl Event {
    pub fn connection(&self) -> Option<ConnectionId> {
        match self {
            Event::NextCycle => None,
            Event::ConnectionClosed(id) | Event::ConnectionConnected(id) => Some(*id),
            Event::ConnectionError { connection, .. } => Some(*connection),
            Event::MessageReceived(message) => Some(message.connection),
        }
    }
}

/// Message header fields copied out of the receive buffer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReceivedHeader {
    pub sender_nodeid: NodeId,
    pub receiver_nodeid: NodeId,
    pub sender_endpoint: u32,
    pub receiver_endpoint: u32,
    pub sender_nodename: NameString,
    pub receiver_nodename: NameString,
    pub entry_count: u16,
    pub message_id: u16,
    pub message_res_id: u16,
}

/// First entry header of a received message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReceivedEntry {
    pub entry_type: u16,
    pub service_path: NameString,
    pub member_name: NameString,
    pub request_id: u32,
    pub error: u16,
    pub element_count: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    pub connection: ConnectionId,
    pub header: ReceivedHeader,
    pub entry: ReceivedEntry,
    /// Why the headers could not be read, if they could not
    pub error: Option<ProtocolError>,
}

pub(crate) fn capture(s: &WireStr<'_>, source: &ScatterGatherBuffer<'_>) -> ProtocolResult<NameString> {
    if s.len() > NAME_CAPACITY {
        return Err(ProtocolError::out_of_range("header string exceeds capture capacity"));
    }
    let mut out = NameString::new();
    let len = s.copy_to(source, &mut out.storage_mut()[..])?;
    out.set_len(len)
        .map_err(|_| ProtocolError::internal("captured string length"))?;
    Ok(out)
}

impl ReceivedHeader {
    pub(crate) fn capture(header: &MessageHeader<'_>, source: &ScatterGatherBuffer<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            sender_nodeid: header.sender_nodeid,
            receiver_nodeid: header.receiver_nodeid,
            sender_endpoint: header.sender_endpoint,
            receiver_endpoint: header.receiver_endpoint,
            sender_nodename: capture(&header.sender_nodename, source)?,
            receiver_nodename: capture(&header.receiver_nodename, source)?,
            entry_count: header.entry_count,
            message_id: header.message_id,
            message_res_id: header.message_res_id,
        })
    }
}

impl ReceivedEntry {
    pub(crate) fn capture(entry: &EntryHeader<'_>, source: &ScatterGatherBuffer<'_>) -> ProtocolResult<Self> {
        Ok(Self {
            entry_type: entry.entry_type,
            service_path: capture(&entry.service_path, source)?,
            member_name: capture(&entry.member_name, source)?,
            request_id: entry.request_id,
            error: entry.error,
            element_count: entry.element_count,
        })
    }

    pub fn kind(&self) -> Option<EntryType> {
        EntryType::try_from(self.entry_type).ok()
    }

    pub fn is_request(&self) -> bool {
        EntryType::is_request_code(self.entry_type)
    }

    /// Header of the response to this request: next entry type, same routing
    pub fn response_header(&self) -> EntryHeader<'_> {
        EntryHeader {
            entry_type: self.entry_type.wrapping_add(1),
            service_path: WireStr::Bytes(self.service_path.as_bytes()),
            member_name: WireStr::Bytes(self.member_name.as_bytes()),
            request_id: self.request_id,
            ..Default::default()
        }
    }

    /// Response header carrying `error`
    pub fn error_response_header(&self, error: MessageErrorType) -> EntryHeader<'_> {
        EntryHeader {
            error: error.code(),
            ..self.response_header()
        }
    }

    pub fn member_is(&self, name: &str) -> bool {
        self.member_name.as_bytes() == name.as_bytes()
    }
}
