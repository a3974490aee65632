//! Non-blocking TCP transport
//!
//! Moves bytes between sockets and the node's connection buffers. One mio
//! registration per pool slot; the token is the slot index plus one, token 0
//! is the listener. Registrations are edge-triggered, so every pass visits all
//! sockets and reads or writes until the kernel reports `WouldBlock` instead
//! of relying on readiness events alone.

use crate::connection::{Connection, Lifecycle, Role, SendState};
use crate::error::{Result, TransportError};
use crate::node::Node;
use crate::pool::ConnectionId;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use rrlite_codec::ProtocolError;
use rrlite_config::TcpConfig;
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const LISTENER: Token = Token(0);
const EVENTS_CAPACITY: usize = 256;

/// How long an outgoing connect may stay pending
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

struct TcpSlot {
    id: ConnectionId,
    stream: TcpStream,
    peer: SocketAddr,
    connect_deadline: Option<Instant>,
}

pub struct TcpTransport {
    poll: Poll,
    events: Events,
    listener: Option<TcpListener>,
    /// Indexed like the connection pool
    slots: Box<[Option<TcpSlot>]>,
}

impl TcpTransport {
    /// Transport for a pool of `capacity` connections
    pub fn new(capacity: usize) -> Result<Self> {
        let poll = Poll::new().map_err(|e| TransportError::io("create poll instance", e))?;
        Ok(Self {
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            listener: None,
            slots: (0..capacity).map(|_| None).collect(),
        })
    }

    pub fn for_node(node: &Node) -> Result<Self> {
        Self::new(node.pool().capacity())
    }

    /// Bind a listening socket with the given accept backlog
    pub fn listen(&mut self, addr: SocketAddr, backlog: u32) -> Result<SocketAddr> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| TransportError::io("create listener socket", e))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| TransportError::io("set SO_REUSEADDR", e))?;
        socket
            .bind(&addr.into())
            .map_err(|e| TransportError::connection_with_source("bind failed", Some(addr), e))?;
        let backlog = i32::try_from(backlog).unwrap_or(i32::MAX);
        socket
            .listen(backlog)
            .map_err(|e| TransportError::io("listen failed", e))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| TransportError::io("set listener non-blocking", e))?;

        let mut listener = TcpListener::from_std(socket.into());
        self.poll
            .registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .map_err(|e| TransportError::io("register listener", e))?;

        let local = listener
            .local_addr()
            .map_err(|e| TransportError::io("listener address", e))?;
        info!(address = %local, backlog, "listening for connections");
        self.listener = Some(listener);
        Ok(local)
    }

    /// Listen on the configured bind address
    pub fn listen_config(&mut self, config: &TcpConfig) -> Result<SocketAddr> {
        let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
            TransportError::configuration(format!(
                "invalid bind address {:?}: {e}",
                config.bind_address
            ))
        })?;
        self.listen(addr, config.backlog)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref()?.local_addr().ok()
    }

    /// Remote address of the socket behind `id`
    pub fn peer_addr(&self, id: ConnectionId) -> Option<SocketAddr> {
        match self.slots.get(id.index())? {
            Some(slot) if slot.id == id => Some(slot.peer),
            _ => None,
        }
    }

    /// Start an outgoing connection; it reports `ConnectionConnected` once up
    pub fn connect(&mut self, node: &mut Node, addr: SocketAddr) -> Result<ConnectionId> {
        let now = Instant::now();
        let id = node
            .acquire_connection(now)
            .ok_or(TransportError::PoolExhausted {
                capacity: node.pool().capacity(),
            })?;

        let stream = match TcpStream::connect(addr) {
            Ok(stream) => stream,
            Err(e) => {
                node.release_connection(id)?;
                return Err(TransportError::connection_with_source(
                    "connect failed",
                    Some(addr),
                    e,
                ));
            }
        };
        if let Err(e) = self.attach(id, stream, addr, Some(now + CONNECT_TIMEOUT)) {
            node.release_connection(id)?;
            return Err(e);
        }

        let conn = node.connection_mut(id)?;
        conn.mark_connecting(Role::Client)?;
        conn.set_transport_next_wake(Some(now + CONNECT_TIMEOUT));
        debug!(connection = %id, peer = %addr, "connecting");
        Ok(id)
    }

    /// Accept every queued incoming connection
    ///
    /// Connections beyond the pool capacity are dropped on accept.
    pub fn accept_pending(&mut self, node: &mut Node) -> Result<usize> {
        let mut accepted = 0;
        loop {
            let result = match self.listener.as_ref() {
                Some(listener) => listener.accept(),
                None => return Ok(0),
            };
            let (stream, peer) = match result {
                Ok(pair) => pair,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::io("accept failed", e)),
            };

            let now = Instant::now();
            let Some(id) = node.acquire_connection(now) else {
                warn!(%peer, capacity = node.pool().capacity(), "connection pool full, rejecting");
                continue;
            };
            if let Err(e) = stream.set_nodelay(true) {
                debug!(%peer, error = %e, "TCP_NODELAY not set");
            }
            if let Err(e) = self.attach(id, stream, peer, None) {
                warn!(%peer, error = %e, "could not register accepted socket");
                node.release_connection(id)?;
                continue;
            }
            node.connection_mut(id)?.mark_connected(Role::Server, now)?;
            info!(connection = %id, %peer, "connection accepted");
            accepted += 1;
        }
        Ok(accepted)
    }

    fn attach(
        &mut self,
        id: ConnectionId,
        mut stream: TcpStream,
        peer: SocketAddr,
        connect_deadline: Option<Instant>,
    ) -> Result<()> {
        if id.index() >= self.slots.len() {
            return Err(TransportError::UnknownConnection(id));
        }
        self.drop_slot(id.index());
        self.poll
            .registry()
            .register(
                &mut stream,
                Token(id.index() + 1),
                Interest::READABLE | Interest::WRITABLE,
            )
            .map_err(|e| TransportError::io("register socket", e))?;
        self.slots[id.index()] = Some(TcpSlot {
            id,
            stream,
            peer,
            connect_deadline,
        });
        Ok(())
    }

    fn drop_slot(&mut self, index: usize) {
        if let Some(mut slot) = self.slots[index].take() {
            if let Err(e) = self.poll.registry().deregister(&mut slot.stream) {
                debug!(connection = %slot.id, error = %e, "deregister failed");
            }
            debug!(connection = %slot.id, peer = %slot.peer, "socket dropped");
        }
    }

    /// One I/O pass over every socket
    ///
    /// Shuts sockets whose close was requested, closes faulted connections
    /// (their error event has had a pass to be seen), finishes pending
    /// connects, then flushes queued sends and fills receive buffers.
    pub fn communicate(&mut self, node: &mut Node) {
        let now = Instant::now();
        node.check_heartbeats(now);

        for index in 0..self.slots.len() {
            let Some(slot) = self.slots[index].as_mut() else {
                continue;
            };
            let Ok(conn) = node.connection_mut(slot.id) else {
                self.drop_slot(index);
                continue;
            };

            match conn.lifecycle() {
                Lifecycle::Idle | Lifecycle::Closed => {
                    self.drop_slot(index);
                    continue;
                }
                Lifecycle::CloseRequested => {
                    if let Err(e) = slot.stream.shutdown(Shutdown::Both) {
                        debug!(connection = %slot.id, error = %e, "shutdown failed");
                    }
                    conn.mark_closed();
                    info!(connection = %slot.id, peer = %slot.peer, "connection closed");
                    self.drop_slot(index);
                    continue;
                }
                Lifecycle::Connecting => {
                    if conn.is_error() {
                        conn.mark_closed();
                        self.drop_slot(index);
                        continue;
                    }
                    if !finish_connect(slot, conn, now) {
                        continue;
                    }
                }
                Lifecycle::Connected { .. } => {
                    if conn.is_error() {
                        conn.mark_closed();
                        info!(connection = %slot.id, peer = %slot.peer, "faulted connection closed");
                        self.drop_slot(index);
                        continue;
                    }
                }
            }

            conn.begin_cycle();
            flush(slot, conn);
            fill(slot, conn, now);
        }
    }

    /// Wait for socket readiness or the node's next deadline, capped at `max_wait`
    ///
    /// Returns the number of readiness events.
    pub fn poll(&mut self, node: &Node, max_wait: Option<Duration>) -> Result<usize> {
        let now = Instant::now();
        let timeout = match node.next_wake(now) {
            Some(wake) => {
                let until = wake.saturating_duration_since(now);
                Some(max_wait.map_or(until, |max| max.min(until)))
            }
            None => max_wait,
        };

        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => Ok(self.events.iter().count()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(TransportError::io("poll failed", e)),
        }
    }

    /// Poll, accept and move bytes once
    pub fn run_once(&mut self, node: &mut Node, max_wait: Option<Duration>) -> Result<()> {
        self.poll(node, max_wait)?;
        self.accept_pending(node)?;
        self.communicate(node);
        Ok(())
    }
}

/// Complete a pending connect; true once the socket is usable
fn finish_connect(slot: &mut TcpSlot, conn: &mut Connection, now: Instant) -> bool {
    match slot.stream.take_error() {
        Ok(None) => {}
        Ok(Some(e)) | Err(e) => {
            warn!(connection = %slot.id, peer = %slot.peer, error = %e, "connect failed");
            conn.fail(ProtocolError::connection("connect failed"));
            return false;
        }
    }

    match slot.stream.peer_addr() {
        Ok(_) => {
            slot.connect_deadline = None;
            conn.set_transport_next_wake(None);
            if let Err(e) = conn.mark_connected(Role::Client, now) {
                conn.fail(e);
                return false;
            }
            if let Err(e) = slot.stream.set_nodelay(true) {
                debug!(connection = %slot.id, error = %e, "TCP_NODELAY not set");
            }
            info!(connection = %slot.id, peer = %slot.peer, "connected");
            true
        }
        Err(e)
            if e.kind() == io::ErrorKind::NotConnected || e.kind() == io::ErrorKind::WouldBlock =>
        {
            if slot.connect_deadline.is_some_and(|deadline| now >= deadline) {
                warn!(connection = %slot.id, peer = %slot.peer, "connect timed out");
                conn.fail(ProtocolError::connection("connect timed out"));
            }
            false
        }
        Err(e) => {
            warn!(connection = %slot.id, peer = %slot.peer, error = %e, "connect failed");
            conn.fail(ProtocolError::connection("connect failed"));
            false
        }
    }
}

/// Write the pending message until it is out or the socket is full
fn flush(slot: &mut TcpSlot, conn: &mut Connection) {
    loop {
        let pending = conn.pending_send();
        if pending.is_empty() {
            break;
        }
        match slot.stream.write(pending) {
            Ok(0) => {
                conn.fail(ProtocolError::connection("socket closed during send"));
                return;
            }
            Ok(n) => {
                if let Err(e) = conn.commit_sent(n) {
                    conn.fail(e);
                    return;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(connection = %slot.id, peer = %slot.peer, error = %e, "send failed");
                conn.fail(ProtocolError::connection("send failed"));
                return;
            }
        }
    }
    if conn.send_state() == SendState::Sent {
        if let Err(e) = conn.consume_message_sent() {
            conn.fail(e);
        }
    }
}

/// Read into the receive buffer until a message completes or the socket drains
fn fill(slot: &mut TcpSlot, conn: &mut Connection, now: Instant) {
    loop {
        let space = conn.recv_space();
        if space.is_empty() {
            return;
        }
        match slot.stream.read(space) {
            Ok(0) => {
                info!(connection = %slot.id, peer = %slot.peer, "peer closed connection");
                conn.mark_closed();
                return;
            }
            Ok(n) => {
                if let Err(e) = conn.commit_received(n, now) {
                    conn.fail(e);
                    return;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(connection = %slot.id, peer = %slot.peer, error = %e, "receive failed");
                conn.fail(ProtocolError::connection("receive failed"));
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ConnectionPool;
    use rrlite_types::NodeId;
    use std::net::{Ipv4Addr, TcpStream as StdTcpStream};

    fn node(capacity: usize) -> Node {
        Node::new(NodeId::random(), "tcp_test", ConnectionPool::new(capacity, 2048).unwrap()).unwrap()
    }

    fn loopback() -> SocketAddr {
        (Ipv4Addr::LOCALHOST, 0).into()
    }

    #[test]
    fn test_listen_reports_bound_port() {
        let mut transport = TcpTransport::new(1).unwrap();
        assert_eq!(transport.local_addr(), None);
        let addr = transport.listen(loopback(), 4).unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(transport.local_addr(), Some(addr));
    }

    #[test]
    fn test_listen_config_rejects_bad_address() {
        let mut transport = TcpTransport::new(1).unwrap();
        let config = TcpConfig {
            bind_address: "not an address".into(),
            backlog: 4,
        };
        assert!(matches!(
            transport.listen_config(&config),
            Err(TransportError::Configuration { .. })
        ));
    }

    #[test]
    fn test_accept_beyond_capacity_drops_socket() {
        let mut server = node(1);
        let mut transport = TcpTransport::for_node(&server).unwrap();
        let addr = transport.listen(loopback(), 4).unwrap();

        let _first = StdTcpStream::connect(addr).unwrap();
        let _second = StdTcpStream::connect(addr).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while server.pool().len() < 1 && Instant::now() < deadline {
            transport
                .run_once(&mut server, Some(Duration::from_millis(20)))
                .unwrap();
        }
        // let the second connection reach the backlog too
        for _ in 0..5 {
            transport
                .run_once(&mut server, Some(Duration::from_millis(20)))
                .unwrap();
        }
        assert_eq!(server.pool().len(), 1);
        let id = server.pool().first_active().unwrap();
        assert!(transport.peer_addr(id).is_some());
    }

    #[test]
    fn test_poll_without_work_honours_max_wait() {
        let server = node(1);
        let mut transport = TcpTransport::for_node(&server).unwrap();
        assert_eq!(
            transport
                .poll(&server, Some(Duration::from_millis(10)))
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_connect_refused_reports_error_then_close() {
        // grab a free port, then free it again
        let addr = std::net::TcpListener::bind(loopback())
            .unwrap()
            .local_addr()
            .unwrap();

        let mut client = node(1);
        let mut transport = TcpTransport::for_node(&client).unwrap();
        let id = match transport.connect(&mut client, addr) {
            Ok(id) => id,
            // some platforms refuse synchronously
            Err(TransportError::Connection { .. }) => {
                assert!(client.pool().is_empty());
                return;
            }
            Err(e) => panic!("unexpected error {e}"),
        };

        let deadline = Instant::now() + CONNECT_TIMEOUT + Duration::from_secs(1);
        while !client.connection(id).unwrap().is_error() && Instant::now() < deadline {
            transport
                .run_once(&mut client, Some(Duration::from_millis(20)))
                .unwrap();
        }
        assert!(client.connection(id).unwrap().is_error());

        transport.communicate(&mut client);
        assert!(client.connection(id).unwrap().is_closed_event());
        assert_eq!(client.next_event(), crate::node::Event::ConnectionClosed(id));
    }
}
