//! Socket transports driving the node's connections

pub mod tcp;

pub use tcp::{TcpTransport, CONNECT_TIMEOUT};
