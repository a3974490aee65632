//! Per-connection state machine and buffers
//!
//! A [`Connection`] owns one receive buffer and one send buffer and tracks
//! where each direction is in its cycle. It never touches a socket: the
//! transport moves bytes in through [`Connection::recv_space`] /
//! [`Connection::commit_received`] and out through [`Connection::pending_send`]
//! / [`Connection::commit_sent`], and the node reads and writes messages in
//! between.
//!
//! At most one received message and one outgoing message are outstanding per
//! connection. Asking for a second one returns [`ProtocolError::Retry`].

pub mod state;

pub use state::{Fault, Lifecycle, ReceiveState, Role, SendState, Session};

use rrlite_codec::{
    MessageReader, MessageWriter, ProtocolError, ProtocolResult, ScatterGatherBuffer,
    ScatterGatherBufferMut,
};
use rrlite_types::{
    FixedStr, NodeId, MAX_NODE_NAME_LEN, MESSAGE_MAGIC, MIN_MESSAGE_SIZE, PREAMBLE_SIZE, PROTOCOL_VERSION,
};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Capacity of node names and other header strings kept outside the buffers
pub const NAME_CAPACITY: usize = MAX_NODE_NAME_LEN;

pub type NameString = FixedStr<NAME_CAPACITY>;

pub struct Connection {
    lifecycle: Lifecycle,
    role: Role,
    receive: ReceiveState,
    send: SendState,
    send_blocked: bool,
    fault: Fault,

    recv_buffer: Box<[u8]>,
    recv_pos: usize,
    recv_message_len: usize,
    send_buffer: Box<[u8]>,
    send_pos: usize,
    send_message_len: usize,

    local_endpoint: u32,
    remote_endpoint: u32,
    remote_nodeid: NodeId,
    remote_nodename: NameString,

    heartbeat_period: Option<Duration>,
    heartbeat_next_check: Option<Instant>,
    last_activity: Option<Instant>,
    transport_next_wake: Option<Instant>,
}

impl Connection {
    /// Connection with receive and send buffers of `buffer_size` bytes each
    pub fn new(buffer_size: usize) -> Self {
        Self {
            lifecycle: Lifecycle::Idle,
            role: Role::Server,
            receive: ReceiveState::Inactive,
            send: SendState::Idle,
            send_blocked: false,
            fault: Fault::Clear,
            recv_buffer: vec![0u8; buffer_size].into_boxed_slice(),
            recv_pos: 0,
            recv_message_len: 0,
            send_buffer: vec![0u8; buffer_size].into_boxed_slice(),
            send_pos: 0,
            send_message_len: 0,
            local_endpoint: 0,
            remote_endpoint: 0,
            remote_nodeid: NodeId::nil(),
            remote_nodename: NameString::new(),
            heartbeat_period: None,
            heartbeat_next_check: None,
            last_activity: None,
            transport_next_wake: None,
        }
    }

    /// Return to `Idle` with every position, endpoint and flag cleared
    ///
    /// Buffers are kept; only their fill positions reset.
    pub fn reset(&mut self) {
        self.lifecycle = Lifecycle::Idle;
        self.role = Role::Server;
        self.receive = ReceiveState::Inactive;
        self.send = SendState::Idle;
        self.send_blocked = false;
        self.fault = Fault::Clear;
        self.recv_pos = 0;
        self.recv_message_len = 0;
        self.send_pos = 0;
        self.send_message_len = 0;
        self.local_endpoint = 0;
        self.remote_endpoint = 0;
        self.remote_nodeid = NodeId::nil();
        self.remote_nodename = NameString::new();
        self.heartbeat_period = None;
        self.heartbeat_next_check = None;
        self.last_activity = None;
        self.transport_next_wake = None;
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_server(&self) -> bool {
        self.role == Role::Server
    }

    pub fn receive_state(&self) -> ReceiveState {
        self.receive
    }

    pub fn send_state(&self) -> SendState {
        self.send
    }

    /// The error that faulted this connection, if any
    pub fn fault(&self) -> Option<ProtocolError> {
        match self.fault {
            Fault::Clear => None,
            Fault::Faulted(err) => Some(err),
        }
    }

    pub fn session(&self) -> Option<Session> {
        self.lifecycle.session()
    }

    pub fn buffer_size(&self) -> usize {
        self.recv_buffer.len()
    }

    pub fn local_endpoint(&self) -> u32 {
        self.local_endpoint
    }

    pub fn set_local_endpoint(&mut self, endpoint: u32) {
        self.local_endpoint = endpoint;
    }

    pub fn remote_endpoint(&self) -> u32 {
        self.remote_endpoint
    }

    pub fn set_remote_endpoint(&mut self, endpoint: u32) {
        self.remote_endpoint = endpoint;
    }

    pub fn remote_nodeid(&self) -> NodeId {
        self.remote_nodeid
    }

    pub fn set_remote_nodeid(&mut self, id: NodeId) {
        self.remote_nodeid = id;
    }

    pub fn remote_nodename(&self) -> &NameString {
        &self.remote_nodename
    }

    pub fn set_remote_nodename(&mut self, name: NameString) {
        self.remote_nodename = name;
    }

    pub fn mark_connecting(&mut self, role: Role) -> ProtocolResult<()> {
        if self.lifecycle != Lifecycle::Idle {
            return Err(ProtocolError::invalid_operation("connection slot already in use"));
        }
        self.role = role;
        self.lifecycle = Lifecycle::Connecting;
        Ok(())
    }

    /// Socket is up; start the first receive cycle
    pub fn mark_connected(&mut self, role: Role, now: Instant) -> ProtocolResult<()> {
        if !matches!(self.lifecycle, Lifecycle::Idle | Lifecycle::Connecting) {
            return Err(ProtocolError::invalid_operation("connection already connected"));
        }
        self.role = role;
        self.lifecycle = Lifecycle::Connected {
            session: Session::Opened,
            announced: false,
        };
        self.receive = ReceiveState::Requested;
        self.send = SendState::Idle;
        self.recv_pos = 0;
        self.recv_message_len = 0;
        self.last_activity = Some(now);
        self.heartbeat_next_check = self.heartbeat_period.map(|period| now + period);
        Ok(())
    }

    /// Record a completed handshake step
    pub fn set_session(&mut self, session: Session) -> ProtocolResult<()> {
        match &mut self.lifecycle {
            Lifecycle::Connected { session: current, .. } => {
                *current = session;
                Ok(())
            }
            _ => Err(ProtocolError::invalid_operation("connection is not connected")),
        }
    }

    /// Socket has been shut; the slot waits for its closed event
    pub fn mark_closed(&mut self) {
        self.lifecycle = Lifecycle::Closed;
        self.receive = ReceiveState::Inactive;
        self.send = SendState::Idle;
        self.transport_next_wake = None;
    }

    /// Latch `err` as the connection's fault; the first fault wins
    pub fn fail(&mut self, err: ProtocolError) {
        if self.fault == Fault::Clear {
            warn!(error = %err, "connection faulted");
            self.fault = Fault::Faulted(err);
        }
    }

    /// Request close; a no-op on an idle or already closed slot
    pub fn close(&mut self) {
        match self.lifecycle {
            Lifecycle::Idle | Lifecycle::Closed | Lifecycle::CloseRequested => {}
            _ => {
                debug!("connection close requested");
                self.lifecycle = Lifecycle::CloseRequested;
            }
        }
    }

    pub fn close_requested(&self) -> bool {
        self.lifecycle == Lifecycle::CloseRequested
    }

    /// Recycle cycle flags whose completion has already been observed
    ///
    /// The transport calls this once per pass before moving bytes.
    pub fn begin_cycle(&mut self) {
        if self.receive == ReceiveState::Consumed {
            self.recv_pos = 0;
            self.recv_message_len = 0;
            self.receive = if self.lifecycle.is_connected() && self.fault == Fault::Clear {
                ReceiveState::Requested
            } else {
                ReceiveState::Inactive
            };
        }
        if self.send == SendState::SentConsumed {
            self.send = SendState::Idle;
            self.send_pos = 0;
            self.send_message_len = 0;
        }
    }

    /// Check the buffered preamble and latch the declared message length
    ///
    /// Acts only once at least [`PREAMBLE_SIZE`] bytes are buffered and no
    /// length is latched yet. Returns the latched length, 0 while still
    /// waiting for the preamble.
    pub fn verify_preamble(&mut self) -> ProtocolResult<usize> {
        if self.recv_pos >= PREAMBLE_SIZE && self.recv_message_len == 0 {
            if self.recv_buffer[..4] != MESSAGE_MAGIC {
                return Err(self.fail_receive(ProtocolError::connection("bad message magic")));
            }
            let mut len = [0u8; 4];
            len.copy_from_slice(&self.recv_buffer[4..8]);
            self.recv_message_len = u32::from_ne_bytes(len) as usize;

            let version = u16::from_ne_bytes([self.recv_buffer[8], self.recv_buffer[9]]);
            if version != PROTOCOL_VERSION {
                return Err(self.fail_receive(ProtocolError::connection("unsupported message version")));
            }
        }
        Ok(self.recv_message_len)
    }

    fn fail_receive(&mut self, err: ProtocolError) -> ProtocolError {
        self.fail(err);
        self.receive = ReceiveState::Inactive;
        err
    }

    fn recv_limit(&self) -> usize {
        if self.recv_message_len == 0 {
            PREAMBLE_SIZE
        } else {
            self.recv_message_len
        }
    }

    /// Space the transport may read into without passing the current message
    ///
    /// Empty unless a receive is in progress.
    pub fn recv_space(&mut self) -> &mut [u8] {
        if self.receive != ReceiveState::Requested {
            return &mut self.recv_buffer[..0];
        }
        let limit = self.recv_limit();
        &mut self.recv_buffer[self.recv_pos..limit]
    }

    /// Account for `n` bytes the transport placed into [`Connection::recv_space`]
    pub fn commit_received(&mut self, n: usize, now: Instant) -> ProtocolResult<()> {
        if self.receive != ReceiveState::Requested {
            return Err(ProtocolError::invalid_operation("no receive in progress"));
        }
        if n > self.recv_limit() - self.recv_pos {
            return Err(ProtocolError::out_of_range("committed past receive space"));
        }
        self.recv_pos += n;
        if n > 0 {
            self.last_activity = Some(now);
        }

        if self.recv_message_len == 0 {
            if self.recv_pos < PREAMBLE_SIZE {
                return Ok(());
            }
            // zero is out of bounds too
            let declared = self.verify_preamble()?;
            if declared < MIN_MESSAGE_SIZE || declared > self.recv_buffer.len() {
                return Err(
                    self.fail_receive(ProtocolError::connection("declared message length out of bounds"))
                );
            }
        }

        if self.recv_pos == self.recv_message_len {
            debug!(bytes = self.recv_pos, "message received");
            self.receive = ReceiveState::Received;
        }
        Ok(())
    }

    /// Reader over the buffered message
    ///
    /// Repeated calls return the same message until it is consumed.
    pub fn message_receive(&self) -> ProtocolResult<MessageReader<'_>> {
        if self.receive != ReceiveState::Received {
            return Err(ProtocolError::Retry);
        }
        let data = &self.recv_buffer[..self.recv_pos];
        MessageReader::init(ScatterGatherBuffer::single(data), 0, self.recv_pos)
    }

    pub fn message_receive_consume(&mut self) -> ProtocolResult<()> {
        if self.receive != ReceiveState::Received {
            return Err(ProtocolError::invalid_operation("no message received"));
        }
        self.receive = ReceiveState::Consumed;
        Ok(())
    }

    /// Writer over the send buffer for the next outgoing message
    pub fn begin_send_message(&mut self) -> ProtocolResult<MessageWriter<'_, 'static>> {
        if self.fault != Fault::Clear || !self.lifecycle.is_connected() {
            return Err(ProtocolError::invalid_operation("connection cannot send"));
        }
        if self.send.in_flight() || self.send_blocked {
            return Err(ProtocolError::Retry);
        }
        let len = self.send_buffer.len();
        MessageWriter::init(ScatterGatherBufferMut::single(&mut self.send_buffer[..]), 0, len)
    }

    /// Hand `message_len` written bytes to the transport
    pub fn end_send_message(&mut self, message_len: usize) -> ProtocolResult<()> {
        if self.send.in_flight() {
            return Err(ProtocolError::invalid_operation("send already in flight"));
        }
        if message_len == 0 || message_len > self.send_buffer.len() {
            return Err(ProtocolError::invalid_argument("message length outside send buffer"));
        }
        self.send_message_len = message_len;
        self.send_pos = 0;
        self.send = SendState::Requested;
        Ok(())
    }

    /// Drop a message that was begun but not ended
    pub fn abort_send_message(&mut self) -> ProtocolResult<()> {
        Ok(())
    }

    /// Bytes of the outgoing message not yet written to the socket
    pub fn pending_send(&self) -> &[u8] {
        if !self.send.has_pending_bytes() {
            return &[];
        }
        &self.send_buffer[self.send_pos..self.send_message_len]
    }

    pub fn commit_sent(&mut self, n: usize) -> ProtocolResult<()> {
        if !self.send.has_pending_bytes() {
            return Err(ProtocolError::invalid_operation("no send in progress"));
        }
        if n > self.send_message_len - self.send_pos {
            return Err(ProtocolError::out_of_range("committed past pending send"));
        }
        self.send_pos += n;
        self.send = if self.send_pos == self.send_message_len {
            SendState::Sent
        } else {
            SendState::Sending
        };
        Ok(())
    }

    pub fn consume_message_sent(&mut self) -> ProtocolResult<()> {
        if self.send != SendState::Sent {
            return Err(ProtocolError::invalid_operation("no completed send"));
        }
        self.send = SendState::SentConsumed;
        Ok(())
    }

    pub fn block_send(&mut self) {
        self.send_blocked = true;
    }

    pub fn unblock_send(&mut self) {
        self.send_blocked = false;
    }

    pub fn is_send_blocked(&self) -> bool {
        self.send_blocked
    }

    /// Close the connection after `period` without received bytes; zero disables
    pub fn set_heartbeat(&mut self, period: Duration, now: Instant) {
        if period.is_zero() {
            self.heartbeat_period = None;
            self.heartbeat_next_check = None;
            return;
        }
        self.heartbeat_period = Some(period);
        self.heartbeat_next_check = Some(now + period);
        self.last_activity.get_or_insert(now);
    }

    /// Close the connection if its heartbeat expired; returns whether it did
    pub fn check_heartbeat(&mut self, now: Instant) -> bool {
        let (Some(period), Some(next_check)) = (self.heartbeat_period, self.heartbeat_next_check)
        else {
            return false;
        };
        if now < next_check || !self.lifecycle.is_connected() {
            return false;
        }

        let last = self.last_activity.unwrap_or(now);
        if now.saturating_duration_since(last) >= period {
            self.heartbeat_next_check = None;
            self.close();
            return true;
        }
        self.heartbeat_next_check = Some(last + period);
        false
    }

    /// Deadline the transport wants to be woken at, e.g. a connect timeout
    pub fn set_transport_next_wake(&mut self, wake: Option<Instant>) {
        self.transport_next_wake = wake;
    }

    /// Earliest time this connection needs service
    ///
    /// `None` for an idle slot. Work that is already pending yields `now`;
    /// future deadlines are never earlier than `now`.
    pub fn next_wake(&self, now: Instant) -> Option<Instant> {
        match self.lifecycle {
            Lifecycle::Idle => return None,
            Lifecycle::CloseRequested | Lifecycle::Closed => return Some(now),
            Lifecycle::Connected { announced: false, .. } => return Some(now),
            _ => {}
        }
        if self.fault != Fault::Clear
            || matches!(
                self.send,
                SendState::Requested | SendState::Sent | SendState::SentConsumed
            )
            || matches!(self.receive, ReceiveState::Received | ReceiveState::Consumed)
        {
            return Some(now);
        }

        let mut wake = None;
        if let Some(check) = self.heartbeat_next_check {
            if now >= check {
                return Some(now);
            }
            wake = Some(check);
        }
        if let Some(transport) = self.transport_next_wake {
            let transport = transport.max(now);
            wake = Some(wake.map_or(transport, |w: Instant| w.min(transport)));
        }
        wake
    }

    pub fn is_closed_event(&self) -> bool {
        self.lifecycle == Lifecycle::Closed
    }

    pub fn is_error(&self) -> bool {
        self.fault != Fault::Clear
    }

    pub fn is_connected_event(&self) -> bool {
        self.fault == Fault::Clear
            && matches!(self.lifecycle, Lifecycle::Connected { announced: false, .. })
    }

    pub fn is_message_received_event(&self) -> bool {
        self.fault == Fault::Clear
            && self.lifecycle.is_connected()
            && self.receive == ReceiveState::Received
    }

    pub fn consume_connected(&mut self) -> ProtocolResult<()> {
        match &mut self.lifecycle {
            Lifecycle::Connected { announced, .. } => {
                *announced = true;
                Ok(())
            }
            _ => Err(ProtocolError::invalid_operation("connection is not connected")),
        }
    }

    pub fn consume_closed(&mut self) -> ProtocolResult<()> {
        if self.lifecycle != Lifecycle::Closed {
            return Err(ProtocolError::invalid_operation("connection is not closed"));
        }
        self.reset();
        Ok(())
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("lifecycle", &self.lifecycle)
            .field("role", &self.role)
            .field("receive", &self.receive)
            .field("send", &self.send)
            .field("send_blocked", &self.send_blocked)
            .field("fault", &self.fault)
            .field("recv_pos", &self.recv_pos)
            .field("recv_message_len", &self.recv_message_len)
            .field("send_pos", &self.send_pos)
            .field("send_message_len", &self.send_message_len)
            .field("local_endpoint", &self.local_endpoint)
            .field("remote_endpoint", &self.remote_endpoint)
            .field("remote_nodeid", &self.remote_nodeid)
            .finish_non_exhaustive()
    }
}
