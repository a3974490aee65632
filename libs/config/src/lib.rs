//! # RRLite Node Configuration
//!
//! Settings a node needs before it can accept connections: its identity, where
//! to listen, how many connection slots to allocate and how large their
//! buffers are, and the heartbeat and poll timing.
//!
//! Values come from three layers, later ones winning:
//! 1. Built-in defaults
//! 2. An optional TOML file
//! 3. `RRLITE_`-prefixed environment variables, with `__` between nested
//!    keys (`RRLITE_POOL__MAX_CONNECTIONS=8`)
//!
//! ## Usage
//!
//! ```rust
//! use rrlite_config::NodeConfig;
//!
//! let config = NodeConfig::default();
//! config.validate().unwrap();
//! assert_eq!(config.pool.buffer_size, 4096);
//! ```

pub mod error;
pub mod node_config;

pub use error::ConfigError;
pub use node_config::{NodeConfig, PoolConfig, TcpConfig, MIN_BUFFER_SIZE};
