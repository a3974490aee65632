//! Connection state axes
//!
//! Each axis moves independently: the lifecycle of the socket, the receive
//! cycle, the send cycle and the sticky fault. Keeping them in separate enums
//! makes combinations such as "received while idle" unrepresentable.
//!
//! ```text
//! Lifecycle:  Idle → Connecting → Connected{session} → CloseRequested → Closed
//! Receive:    Inactive → Requested → Received → Consumed → Requested ...
//! Send:       Idle → Requested → Sending → Sent → SentConsumed → Idle ...
//! Fault:      Clear → Faulted (until reset)
//! ```

use rrlite_codec::ProtocolError;

/// Which side opened the socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    Server,
    Client,
}

/// How far the Robot Raconteur session handshake has progressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Session {
    /// Socket is up, no stream handshake yet
    #[default]
    Opened,
    /// `CreateConnection` stream operation answered
    Established,
    /// `ConnectClient` answered; endpoints are assigned
    ClientEstablished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    /// Slot holds no socket
    #[default]
    Idle,
    /// Outgoing connect in progress
    Connecting,
    Connected {
        session: Session,
        /// The node has reported the `ConnectionConnected` event
        announced: bool,
    },
    /// Close asked for; the transport shuts the socket on its next pass
    CloseRequested,
    /// Socket is gone; the slot is waiting for its closed event to be consumed
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiveState {
    #[default]
    Inactive,
    /// Reading bytes of the next message
    Requested,
    /// A complete message is buffered
    Received,
    /// The buffered message has been handled; the next cycle may start
    Consumed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendState {
    #[default]
    Idle,
    /// A message is written and waiting for the transport
    Requested,
    /// Part of the message has been written to the socket
    Sending,
    Sent,
    /// Completion observed; the slot frees at the next cycle
    SentConsumed,
}

/// Sticky error on a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fault {
    #[default]
    Clear,
    Faulted(ProtocolError),
}

impl Lifecycle {
    pub fn is_connected(&self) -> bool {
        matches!(self, Lifecycle::Connected { .. })
    }

    pub fn session(&self) -> Option<Session> {
        match self {
            Lifecycle::Connected { session, .. } => Some(*session),
            _ => None,
        }
    }
}

impl SendState {
    /// A send occupies the connection until its completion is recycled
    pub fn in_flight(&self) -> bool {
        !matches!(self, SendState::Idle)
    }

    /// Bytes still belong to the transport
    pub fn has_pending_bytes(&self) -> bool {
        matches!(self, SendState::Requested | SendState::Sending)
    }
}
