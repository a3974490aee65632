//! Server and client nodes talking over loopback TCP

use rrlite_codec::{EntryHeader, ProtocolError};
use rrlite_network::{
    ConnectionId, ConnectionPool, Event, Handled, Node, ReceivedMessage, Session, TcpTransport,
};
use rrlite_types::{EntryType, MessageErrorType, NodeId};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

const STEP: Duration = Duration::from_millis(5);
const DEADLINE: Duration = Duration::from_secs(5);

struct Peer {
    node: Node,
    transport: TcpTransport,
}

impl Peer {
    fn new(name: &str) -> Self {
        let pool = ConnectionPool::new(2, 4096).unwrap();
        let node = Node::new(NodeId::random(), name, pool).unwrap();
        let transport = TcpTransport::for_node(&node).unwrap();
        Self { node, transport }
    }

    /// One transport pass, then every event of the cycle through `handle`
    ///
    /// `handle` returns whether the event should be consumed.
    fn step(&mut self, mut handle: impl FnMut(&mut Node, &Event) -> bool) {
        self.transport.run_once(&mut self.node, Some(STEP)).unwrap();
        loop {
            let event = self.node.next_event();
            if event == Event::NextCycle {
                self.node.consume_event(&event).unwrap();
                return;
            }
            if handle(&mut self.node, &event) {
                self.node.consume_event(&event).unwrap();
            }
        }
    }
}

/// Minimal service: property `d1` reads 3.5, everything else is unknown
fn serve(node: &mut Node, event: &Event) -> bool {
    let Event::MessageReceived(message) = event else {
        return true;
    };
    match node.handle_special_request(message) {
        Ok(Handled::Consumed) => false,
        Ok(Handled::Unhandled) => {
            let entry = &message.entry;
            let sent = if entry.kind() == Some(EntryType::PropertyGetReq) && entry.member_is("d1") {
                node.send_response(message.connection, entry, |elements| {
                    elements.write_scalar("value", 3.5f64)
                })
            } else {
                let error = MessageErrorType::MemberNotFound;
                node.send_error_response(message.connection, entry, error, error.error_name(), "Member not found")
            };
            match sent {
                Ok(()) => true,
                Err(ProtocolError::Retry) => false,
                Err(e) => panic!("response failed: {e}"),
            }
        }
        Err(ProtocolError::Retry) => false,
        Err(e) => panic!("special request failed: {e}"),
    }
}

fn listening_server() -> (Peer, SocketAddr) {
    let mut server = Peer::new("server");
    let addr = server
        .transport
        .listen((Ipv4Addr::LOCALHOST, 0).into(), 8)
        .unwrap();
    (server, addr)
}

/// Step both peers until the client connection reports connected
fn connect(server: &mut Peer, client: &mut Peer, addr: SocketAddr) -> ConnectionId {
    let id = client.transport.connect(&mut client.node, addr).unwrap();
    let deadline = Instant::now() + DEADLINE;
    let mut connected = false;
    while !connected {
        assert!(Instant::now() < deadline, "client never connected");
        server.step(serve);
        client.step(|_, event| {
            connected |= *event == Event::ConnectionConnected(id);
            true
        });
    }
    id
}

/// Step both peers until the client receives a message; returns it with its
/// `value` element if there is one
fn await_reply(server: &mut Peer, client: &mut Peer) -> (ReceivedMessage, Option<f64>) {
    let deadline = Instant::now() + DEADLINE;
    let mut reply = None;
    while reply.is_none() {
        assert!(Instant::now() < deadline, "no reply");
        server.step(serve);
        client.step(|node, event| {
            if let Event::MessageReceived(message) = event {
                let reader = node.connection(message.connection).unwrap().message_receive().unwrap();
                let value = reader
                    .begin_entries()
                    .and_then(|entry| entry.find_element("value"))
                    .and_then(|element| element.read_scalar::<f64>())
                    .ok();
                reply = Some((message.clone(), value));
            }
            true
        });
    }
    reply.unwrap()
}

#[test_log::test]
fn test_stream_handshake_and_property_get() {
    let (mut server, addr) = listening_server();
    let mut client = Peer::new("client");
    let id = connect(&mut server, &mut client, addr);

    client
        .node
        .send_entry(
            id,
            &EntryHeader::new(EntryType::StreamOp, "", "CreateConnection", 1),
            |_| Ok(()),
        )
        .unwrap();
    let (reply, _) = await_reply(&mut server, &mut client);
    assert_eq!(reply.entry.kind(), Some(EntryType::StreamOpRet));
    assert_eq!(reply.entry.request_id, 1);
    assert_eq!(reply.header.sender_nodeid, server.node.node_id());
    assert_eq!(reply.header.sender_nodename.as_bytes(), b"server");

    let server_side = server.node.pool().first_active().unwrap();
    let conn = server.node.connection(server_side).unwrap();
    assert_eq!(conn.session(), Some(Session::Established));
    assert_eq!(conn.remote_nodeid(), client.node.node_id());

    client
        .node
        .send_entry(
            id,
            &EntryHeader::new(EntryType::PropertyGetReq, "tiny_service", "d1", 2),
            |_| Ok(()),
        )
        .unwrap();
    let (reply, value) = await_reply(&mut server, &mut client);
    assert_eq!(reply.entry.kind(), Some(EntryType::PropertyGetRes));
    assert_eq!(reply.entry.error, 0);
    assert_eq!(value, Some(3.5));

    client
        .node
        .send_entry(
            id,
            &EntryHeader::new(EntryType::FunctionCallReq, "tiny_service", "missing", 3),
            |_| Ok(()),
        )
        .unwrap();
    let (reply, _) = await_reply(&mut server, &mut client);
    assert_eq!(reply.entry.kind(), Some(EntryType::FunctionCallRes));
    assert_eq!(reply.entry.error, MessageErrorType::MemberNotFound.code());
}

#[test_log::test]
fn test_client_close_releases_server_slot() {
    let (mut server, addr) = listening_server();
    let mut client = Peer::new("client");
    let id = connect(&mut server, &mut client, addr);
    assert_eq!(server.node.pool().len(), 1);

    client.node.connection_mut(id).unwrap().close();
    let deadline = Instant::now() + DEADLINE;
    while !(server.node.pool().is_empty() && client.node.pool().is_empty()) {
        assert!(Instant::now() < deadline, "connections never released");
        client.step(|_, _| true);
        server.step(serve);
    }
}

#[test_log::test]
fn test_malformed_preamble_faults_server_connection() {
    use std::io::Write;

    let (mut server, addr) = listening_server();
    let mut raw = std::net::TcpStream::connect(addr).unwrap();
    raw.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();

    let deadline = Instant::now() + DEADLINE;
    let mut faulted = false;
    let mut closed = false;
    while !closed {
        assert!(Instant::now() < deadline, "bad peer never closed");
        server.step(|_, event| {
            match event {
                Event::ConnectionError { error, .. } => {
                    assert!(matches!(error, ProtocolError::ConnectionError { .. }));
                    faulted = true;
                }
                Event::ConnectionClosed(_) => closed = true,
                _ => {}
            }
            true
        });
    }
    assert!(faulted);
    assert!(server.node.pool().is_empty());
}
