//! Node: identity, connection pool and event cycle
//!
//! The node owns every connection. Each pass of the event loop walks the
//! active connections once through [`Node::next_event`], acting on and
//! consuming each event, until `NextCycle` comes back. Consuming `NextCycle`
//! rewinds the walk for the next pass.
//!
//! ```text
//! loop {
//!     transport.run_once(&mut node, ..)?;
//!     loop {
//!         let event = node.next_event();
//!         // act on the event
//!         node.consume_event(&event)?;
//!         if event == NextCycle { break }
//!     }
//! }
//! ```

pub mod event;
mod special;

pub use event::{Event, ReceivedEntry, ReceivedHeader, ReceivedMessage};
pub use special::Handled;

use crate::connection::{Connection, NameString};
use crate::error::{Result, TransportError};
use crate::pool::{ConnectionId, ConnectionPool};
use rrlite_codec::{
    ElementWriter, EntryHeader, EntryWriter, MessageHeader, ProtocolError, ProtocolResult, WireStr,
    WrittenMessage,
};
use rrlite_config::NodeConfig;
use rrlite_types::{MessageErrorType, NodeId};
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug)]
pub struct Node {
    node_id: NodeId,
    node_name: NameString,
    pool: ConnectionPool,
    /// Next connection the current pass will visit
    cursor: Option<ConnectionId>,
    events_serviced: u64,
    heartbeat_period: Duration,
}

impl Node {
    pub fn new(node_id: NodeId, node_name: &str, pool: ConnectionPool) -> Result<Self> {
        let node_name = NameString::try_from(node_name)
            .map_err(|e| TransportError::configuration(format!("node name: {e}")))?;
        let cursor = pool.first_active();
        Ok(Self {
            node_id,
            node_name,
            pool,
            cursor,
            events_serviced: 0,
            heartbeat_period: Duration::ZERO,
        })
    }

    /// Build the node and its pool from configuration
    pub fn from_config(config: &NodeConfig) -> Result<Self> {
        config.validate()?;
        let pool = ConnectionPool::from_config(&config.pool)?;
        let mut node = Self::new(config.resolve_node_id(), &config.node_name, pool)?;
        node.heartbeat_period = Duration::from_millis(config.heartbeat_period_ms);
        info!(
            node_id = %node.node_id,
            node_name = %config.node_name,
            max_connections = config.pool.max_connections,
            "node initialized"
        );
        Ok(node)
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn node_name(&self) -> &NameString {
        &self.node_name
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn set_heartbeat_period(&mut self, period: Duration) {
        self.heartbeat_period = period;
    }

    /// Events returned since the last `NextCycle` was consumed
    pub fn events_serviced(&self) -> u64 {
        self.events_serviced
    }

    pub fn connection(&self, id: ConnectionId) -> ProtocolResult<&Connection> {
        self.pool.get(id)
    }

    pub fn connection_mut(&mut self, id: ConnectionId) -> ProtocolResult<&mut Connection> {
        self.pool.get_mut(id)
    }

    /// Take a pool slot for a new socket
    pub fn acquire_connection(&mut self, now: Instant) -> Option<ConnectionId> {
        let id = self.pool.acquire()?;
        if let Ok(conn) = self.pool.get_mut(id) {
            conn.set_heartbeat(self.heartbeat_period, now);
        }
        if self.cursor.is_none() && self.pool.len() == 1 {
            self.cursor = Some(id);
        }
        Some(id)
    }

    /// Return a slot to the pool, keeping the cycle cursor valid
    pub fn release_connection(&mut self, id: ConnectionId) -> ProtocolResult<()> {
        if self.cursor == Some(id) {
            self.cursor = self.pool.next_active(id);
        }
        self.pool.release(id)
    }

    /// Request close on every connection
    pub fn shutdown(&mut self) {
        info!(connections = self.pool.len(), "node shutting down");
        let mut cursor = self.pool.first_active();
        while let Some(id) = cursor {
            cursor = self.pool.next_active(id);
            if let Ok(conn) = self.pool.get_mut(id) {
                conn.close();
            }
        }
    }

    /// Close connections whose heartbeat expired
    pub fn check_heartbeats(&mut self, now: Instant) {
        let mut cursor = self.pool.first_active();
        while let Some(id) = cursor {
            cursor = self.pool.next_active(id);
            if let Ok(conn) = self.pool.get_mut(id) {
                if conn.check_heartbeat(now) {
                    info!(connection = %id, "heartbeat expired, closing connection");
                }
            }
        }
    }

    /// Earliest time any connection needs service
    pub fn next_wake(&self, now: Instant) -> Option<Instant> {
        self.pool
            .active_ids()
            .filter_map(|id| self.pool.get(id).ok()?.next_wake(now))
            .min()
    }

    /// Next pending event, visiting connections round-robin
    ///
    /// Priority per connection is closed, error, connected, message received.
    pub fn next_event(&mut self) -> Event {
        while let Some(id) = self.cursor {
            if !self.pool.contains(id) {
                self.cursor = None;
                break;
            }
            self.cursor = self.pool.next_active(id);

            let Ok(conn) = self.pool.get(id) else {
                continue;
            };
            let event = if conn.is_closed_event() {
                Event::ConnectionClosed(id)
            } else if let Some(error) = conn.fault() {
                Event::ConnectionError {
                    connection: id,
                    error,
                }
            } else if conn.is_connected_event() {
                Event::ConnectionConnected(id)
            } else if conn.is_message_received_event() {
                Event::MessageReceived(Self::receive_message_entry(id, conn))
            } else {
                continue;
            };

            self.events_serviced += 1;
            return event;
        }
        Event::NextCycle
    }

    fn receive_message_entry(id: ConnectionId, conn: &Connection) -> ReceivedMessage {
        let mut message = ReceivedMessage {
            connection: id,
            header: ReceivedHeader::default(),
            entry: ReceivedEntry::default(),
            error: None,
        };
        if let Err(e) = Self::read_received(conn, &mut message) {
            debug!(connection = %id, error = %e, "received message unreadable");
            message.error = Some(e);
        }
        message
    }

    fn read_received(conn: &Connection, message: &mut ReceivedMessage) -> ProtocolResult<()> {
        let reader = conn.message_receive()?;
        let source = reader.buffer();
        message.header = ReceivedHeader::capture(&reader.read_header()?, &source)?;
        let entries = reader.begin_entries()?;
        message.entry = ReceivedEntry::capture(&entries.read_header()?, &source)?;
        Ok(())
    }

    /// Mark an event as handled
    pub fn consume_event(&mut self, event: &Event) -> ProtocolResult<()> {
        match event {
            Event::NextCycle => {
                self.cursor = self.pool.first_active();
                self.events_serviced = 0;
                Ok(())
            }
            Event::ConnectionClosed(id) => {
                if !self.pool.get(*id)?.is_closed_event() {
                    return Err(ProtocolError::invalid_operation("connection is not closed"));
                }
                debug!(connection = %id, "closed connection consumed");
                self.release_connection(*id)
            }
            // faults are sticky until the slot is released
            Event::ConnectionError { .. } => Ok(()),
            Event::ConnectionConnected(id) => self.pool.get_mut(*id)?.consume_connected(),
            Event::MessageReceived(message) => {
                self.pool.get_mut(message.connection)?.message_receive_consume()
            }
        }
    }

    /// Start an outgoing message on `id` with the node's routing header
    ///
    /// Write entries through the returned writer, finish it with
    /// `end_message`, then pass the result to [`Node::end_send_entry`].
    pub fn begin_send_entry(&mut self, id: ConnectionId) -> ProtocolResult<EntryWriter<'_, 'static>> {
        let node_id = self.node_id;
        let node_name = self.node_name;
        let conn = self.pool.get_mut(id)?;
        let remote_name = *conn.remote_nodename();
        let header = MessageHeader {
            sender_nodeid: node_id,
            receiver_nodeid: conn.remote_nodeid(),
            sender_endpoint: conn.local_endpoint(),
            receiver_endpoint: conn.remote_endpoint(),
            sender_nodename: WireStr::Bytes(node_name.as_bytes()),
            receiver_nodename: WireStr::Bytes(remote_name.as_bytes()),
            ..Default::default()
        };
        conn.begin_send_message()?.begin_message(&header)
    }

    /// Hand a finished message to the transport
    pub fn end_send_entry(&mut self, id: ConnectionId, written: WrittenMessage) -> ProtocolResult<()> {
        self.pool.get_mut(id)?.end_send_message(written.message_size)
    }

    pub fn abort_send_entry(&mut self, id: ConnectionId) -> ProtocolResult<()> {
        self.pool.get_mut(id)?.abort_send_message()
    }

    /// Send a one-entry message whose elements are written by `write`
    pub fn send_entry<F>(&mut self, id: ConnectionId, header: &EntryHeader<'_>, write: F) -> ProtocolResult<()>
    where
        F: FnOnce(&mut ElementWriter<'_, '_, 'static>) -> ProtocolResult<()>,
    {
        let written = match self.write_entry(id, header, write) {
            Ok(written) => written,
            Err(e) => {
                self.abort_send_entry(id)?;
                return Err(e);
            }
        };
        self.end_send_entry(id, written)?;
        debug!(
            connection = %id,
            entry_type = header.entry_type,
            bytes = written.message_size,
            "entry queued for send"
        );
        Ok(())
    }

    fn write_entry<F>(&mut self, id: ConnectionId, header: &EntryHeader<'_>, write: F) -> ProtocolResult<WrittenMessage>
    where
        F: FnOnce(&mut ElementWriter<'_, '_, 'static>) -> ProtocolResult<()>,
    {
        let mut entries = self.begin_send_entry(id)?;
        let mut elements = entries.begin_entry(header)?;
        write(&mut elements)?;
        elements.end_entry()?;
        entries.end_message()
    }

    /// Respond to `request` with elements written by `write`
    pub fn send_response<F>(&mut self, id: ConnectionId, request: &ReceivedEntry, write: F) -> ProtocolResult<()>
    where
        F: FnOnce(&mut ElementWriter<'_, '_, 'static>) -> ProtocolResult<()>,
    {
        self.send_entry(id, &request.response_header(), write)
    }

    /// Respond to `request` with no elements
    pub fn send_empty_response(&mut self, id: ConnectionId, request: &ReceivedEntry) -> ProtocolResult<()> {
        self.send_response(id, request, |_| Ok(()))
    }

    /// Respond to `request` with an error code plus `errorname` and `errorstring`
    pub fn send_error_response(
        &mut self,
        id: ConnectionId,
        request: &ReceivedEntry,
        error: MessageErrorType,
        error_name: &str,
        error_message: &str,
    ) -> ProtocolResult<()> {
        self.send_entry(id, &request.error_response_header(error), |elements| {
            elements.write_string("errorname", error_name)?;
            elements.write_string("errorstring", error_message)
        })
    }
}
