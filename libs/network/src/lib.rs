//! RRLite Networking
//!
//! Connection state machines, the fixed-size connection pool, the node event
//! cycle and the TCP transport that feeds it. Everything is allocated when the
//! node is built; steady-state message handling works inside the per-connection
//! buffers.
//!
//! ```no_run
//! use rrlite_config::NodeConfig;
//! use rrlite_network::{Event, Handled, Node, TcpTransport};
//! use std::time::Duration;
//!
//! # fn main() -> rrlite_network::Result<()> {
//! let config = NodeConfig::default();
//! let mut node = Node::from_config(&config)?;
//! let mut transport = TcpTransport::for_node(&node)?;
//! transport.listen_config(&config.tcp)?;
//!
//! loop {
//!     transport.run_once(&mut node, Some(Duration::from_millis(config.poll_interval_ms)))?;
//!     loop {
//!         let event = node.next_event();
//!         match &event {
//!             Event::NextCycle => {
//!                 node.consume_event(&event)?;
//!                 break;
//!             }
//!             Event::MessageReceived(message) => {
//!                 if node.handle_special_request(message)? == Handled::Unhandled {
//!                     // service requests are answered here
//!                     node.consume_event(&event)?;
//!                 }
//!             }
//!             _ => node.consume_event(&event)?,
//!         }
//!     }
//! }
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod node;
pub mod pool;
pub mod transports;

pub use connection::{Connection, Lifecycle, ReceiveState, Role, SendState, Session};
pub use error::{Result, TransportError};
pub use node::{Event, Handled, Node, ReceivedEntry, ReceivedHeader, ReceivedMessage};
pub use pool::{ConnectionId, ConnectionPool};
pub use transports::TcpTransport;
