//! Connection-level requests the node answers itself
//!
//! Entry types up to 500 belong to the transport session rather than a
//! service: opening the stream, attaching a client endpoint and so on. The
//! node answers the ones it can without application help, rejects unknown
//! requests with an error response and closes the connection on unexpected
//! responses.

use super::{Event, Node, ReceivedMessage};
use crate::connection::Session;
use rand::Rng;
use rrlite_codec::{ProtocolError, ProtocolResult};
use rrlite_types::{EntryType, MessageErrorType, SPECIAL_REQUEST_LIMIT};
use tracing::{debug, warn};

/// Outcome of [`Node::handle_special_request`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// The node acted on the message and consumed its event
    Consumed,
    /// The application must handle the message
    Unhandled,
}

impl Node {
    /// Answer session-level requests in a received message
    ///
    /// Returns `Err(Retry)` when the response cannot be queued yet; the event
    /// is left unconsumed so it comes back on the next cycle.
    pub fn handle_special_request(&mut self, message: &ReceivedMessage) -> ProtocolResult<Handled> {
        let entry = &message.entry;
        if entry.entry_type > SPECIAL_REQUEST_LIMIT {
            return Ok(Handled::Unhandled);
        }
        let id = message.connection;

        if let Some(error) = message.error {
            warn!(connection = %id, %error, "unreadable session message");
            self.connection_mut(id)?.fail(error);
            self.consume_message(message)?;
            return Ok(Handled::Consumed);
        }

        match entry.kind() {
            Some(EntryType::StreamOp) if entry.member_is("CreateConnection") => {
                let conn = self.connection_mut(id)?;
                if conn.is_server() && conn.session() == Some(Session::Opened) {
                    conn.set_remote_nodeid(message.header.sender_nodeid);
                    conn.set_remote_nodename(message.header.sender_nodename);
                    if let Err(e) = self.send_empty_response(id, entry) {
                        return self.special_request_failed(message, e);
                    }
                    self.connection_mut(id)?.set_session(Session::Established)?;
                    debug!(connection = %id, remote = %message.header.sender_nodeid, "stream established");
                    self.consume_message(message)?;
                    return Ok(Handled::Consumed);
                }
            }
            Some(EntryType::GetServiceDesc | EntryType::ObjectTypeName) => {
                return Ok(Handled::Unhandled);
            }
            Some(EntryType::ConnectClient) => {
                let conn = self.connection_mut(id)?;
                if conn.local_endpoint() == 0 {
                    conn.set_local_endpoint(rand::thread_rng().gen_range(1..=u32::MAX));
                }
                conn.set_remote_endpoint(message.header.sender_endpoint);
                if let Err(e) = self.send_empty_response(id, entry) {
                    return self.special_request_failed(message, e);
                }
                self.connection_mut(id)?
                    .set_session(Session::ClientEstablished)?;
                debug!(
                    connection = %id,
                    remote_endpoint = message.header.sender_endpoint,
                    "client endpoint connected"
                );
                self.consume_message(message)?;
                return Ok(Handled::Consumed);
            }
            _ => {}
        }

        if entry.is_request() {
            let error = MessageErrorType::InvalidOperation;
            match self.send_error_response(id, entry, error, error.error_name(), "Invalid operation") {
                Err(ProtocolError::Retry) => return Err(ProtocolError::Retry),
                Err(e) => debug!(connection = %id, error = %e, "error response not sent"),
                Ok(()) => {}
            }
        } else {
            debug!(connection = %id, entry_type = entry.entry_type, "unexpected session response, closing");
            self.connection_mut(id)?.close();
        }
        self.consume_message(message)?;
        Ok(Handled::Consumed)
    }

    fn consume_message(&mut self, message: &ReceivedMessage) -> ProtocolResult<()> {
        self.consume_event(&Event::MessageReceived(message.clone()))
    }

    fn special_request_failed(&mut self, message: &ReceivedMessage, err: ProtocolError) -> ProtocolResult<Handled> {
        if err.is_retry() {
            return Err(err);
        }
        self.connection_mut(message.connection)?.fail(err);
        self.consume_message(message)?;
        Ok(Handled::Consumed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::tests::{connect, deliver, node_with, take_sent};
    use rrlite_codec::{EntryHeader, MessageReader, ScatterGatherBuffer};
    use rrlite_types::NodeId;

    /// Walk events until a message shows up, allowing one rewind
    fn received(node: &mut Node) -> ReceivedMessage {
        let mut rewound = false;
        loop {
            match node.next_event() {
                Event::MessageReceived(message) => return message,
                Event::NextCycle if rewound => panic!("no message pending"),
                other => {
                    rewound = other == Event::NextCycle;
                    node.consume_event(&other).unwrap();
                }
            }
        }
    }

    #[test]
    fn test_create_connection_establishes() {
        let mut node = node_with(1);
        let a = connect(&mut node);
        let client = NodeId::random();
        deliver(
            &mut node,
            a,
            client,
            &EntryHeader::new(EntryType::StreamOp, "", "CreateConnection", 1),
        );
        let message = received(&mut node);
        assert_eq!(node.handle_special_request(&message).unwrap(), Handled::Consumed);

        let conn = node.connection(a).unwrap();
        assert_eq!(conn.session(), Some(Session::Established));
        assert_eq!(conn.remote_nodeid(), client);
        assert_eq!(conn.remote_nodename().as_bytes(), b"client");

        let data = take_sent(&mut node, a);
        let reader = MessageReader::init(ScatterGatherBuffer::single(&data), 0, data.len()).unwrap();
        assert_eq!(reader.read_header().unwrap().receiver_nodeid, client);
        let entry = reader.begin_entries().unwrap().read_header().unwrap();
        assert_eq!(entry.kind(), Some(EntryType::StreamOpRet));
        assert_eq!(entry.member_name, "CreateConnection");
        assert_eq!(entry.element_count, 0);
    }

    #[test]
    fn test_connect_client_assigns_endpoints() {
        let mut node = node_with(1);
        let a = connect(&mut node);
        deliver(
            &mut node,
            a,
            NodeId::random(),
            &EntryHeader::new(EntryType::ConnectClient, "tiny_service", "", 2),
        );
        let message = received(&mut node);
        assert_eq!(node.handle_special_request(&message).unwrap(), Handled::Consumed);

        let conn = node.connection(a).unwrap();
        assert_eq!(conn.session(), Some(Session::ClientEstablished));
        assert_ne!(conn.local_endpoint(), 0);
        assert_eq!(conn.remote_endpoint(), 77);

        let data = take_sent(&mut node, a);
        let reader = MessageReader::init(ScatterGatherBuffer::single(&data), 0, data.len()).unwrap();
        let header = reader.read_header().unwrap();
        assert_eq!(header.receiver_endpoint, 77);
        assert_eq!(header.sender_endpoint, node.connection(a).unwrap().local_endpoint());
    }

    #[test]
    fn test_unknown_request_gets_error_response() {
        let mut node = node_with(1);
        let a = connect(&mut node);
        deliver(
            &mut node,
            a,
            NodeId::random(),
            &EntryHeader::new(EntryType::GetNodeInfo, "", "", 5),
        );
        let message = received(&mut node);
        assert_eq!(node.handle_special_request(&message).unwrap(), Handled::Consumed);

        let data = take_sent(&mut node, a);
        let reader = MessageReader::init(ScatterGatherBuffer::single(&data), 0, data.len()).unwrap();
        let entry = reader.begin_entries().unwrap();
        let header = entry.read_header().unwrap();
        assert_eq!(header.kind(), Some(EntryType::GetNodeInfoRet));
        assert_eq!(header.error_kind(), Some(MessageErrorType::InvalidOperation));

        let mut name = [0u8; 64];
        let len = entry.find_element("errorname").unwrap().read_string(&mut name).unwrap();
        assert_eq!(&name[..len], b"RobotRaconteur.InvalidOperation");
        let len = entry.find_element("errorstring").unwrap().read_string(&mut name).unwrap();
        assert_eq!(&name[..len], b"Invalid operation");
    }

    #[test]
    fn test_unexpected_response_closes() {
        let mut node = node_with(1);
        let a = connect(&mut node);
        deliver(
            &mut node,
            a,
            NodeId::random(),
            &EntryHeader::new(EntryType::ConnectionTestRet, "", "", 5),
        );
        let message = received(&mut node);
        assert_eq!(node.handle_special_request(&message).unwrap(), Handled::Consumed);
        assert!(node.connection(a).unwrap().close_requested());
    }

    #[test]
    fn test_service_requests_left_to_application() {
        for (entry_type, member) in [
            (EntryType::PropertyGetReq, "d1"),
            (EntryType::GetServiceDesc, ""),
            (EntryType::ObjectTypeName, ""),
        ] {
            let mut node = node_with(1);
            let a = connect(&mut node);
            deliver(
                &mut node,
                a,
                NodeId::random(),
                &EntryHeader::new(entry_type, "tiny_service", member, 5),
            );
            let message = received(&mut node);
            assert_eq!(node.handle_special_request(&message).unwrap(), Handled::Unhandled);
            assert!(node.connection(a).unwrap().is_message_received_event());
        }
    }

    #[test]
    fn test_retry_leaves_event_pending() {
        let mut node = node_with(1);
        let a = connect(&mut node);
        deliver(
            &mut node,
            a,
            NodeId::random(),
            &EntryHeader::new(EntryType::GetNodeInfo, "", "", 5),
        );
        node.connection_mut(a).unwrap().block_send();
        let message = received(&mut node);
        assert_eq!(node.handle_special_request(&message), Err(ProtocolError::Retry));
        assert!(node.connection(a).unwrap().is_message_received_event());

        node.connection_mut(a).unwrap().unblock_send();
        assert_eq!(node.handle_special_request(&message).unwrap(), Handled::Consumed);
    }

    #[test]
    fn test_unreadable_message_faults_connection() {
        let mut node = node_with(1);
        let a = connect(&mut node);
        deliver(
            &mut node,
            a,
            NodeId::random(),
            &EntryHeader::new(EntryType::StreamOp, "", "CreateConnection", 1),
        );
        let mut message = received(&mut node);
        message.error = Some(ProtocolError::protocol("entry overruns message"));
        assert_eq!(node.handle_special_request(&message).unwrap(), Handled::Consumed);
        assert!(node.connection(a).unwrap().is_error());
    }
}
