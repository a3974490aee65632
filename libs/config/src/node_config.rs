//! Node configuration loading
//!
//! Loads from an optional TOML file with environment overrides.

use crate::error::{ConfigError, Result};
use config::{Config, Environment, File};
use rrlite_types::{NodeId, MAX_NODE_NAME_LEN};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Smallest per-connection buffer a node accepts
pub const MIN_BUFFER_SIZE: usize = 1024;

const ENV_PREFIX: &str = "RRLITE";

/// Top-level node settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Name announced in outgoing message headers
    pub node_name: String,
    /// Fixed node id; a random one is generated when unset
    pub node_id: Option<NodeId>,
    pub tcp: TcpConfig,
    pub pool: PoolConfig,
    /// Close a connection that has been silent this long; 0 disables
    pub heartbeat_period_ms: u64,
    /// Upper bound on one poll wait
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpConfig {
    pub bind_address: String,
    pub backlog: u32,
}

/// Connection slot arena sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_connections: usize,
    /// Size of each of a slot's receive and send buffers
    pub buffer_size: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_name: "rrlite_node".to_string(),
            node_id: None,
            tcp: TcpConfig::default(),
            pool: PoolConfig::default(),
            heartbeat_period_ms: 0,
            poll_interval_ms: 1000,
        }
    }
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:22222".to_string(),
            backlog: 16,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 4,
            buffer_size: 4096,
        }
    }
}

impl NodeConfig {
    /// Load from `path` (if any) with `RRLITE_` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// Same as [`NodeConfig::load`] with a caller-chosen environment prefix
    pub fn load_with_prefix(path: Option<&Path>, prefix: &str) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "loading node configuration");
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: NodeConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        debug!(?config, "node configuration loaded");
        Ok(config)
    }

    /// Reject settings the node cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.pool.max_connections == 0 {
            return Err(ConfigError::invalid(
                "pool.max_connections",
                "must be at least 1",
            ));
        }
        if self.pool.buffer_size < MIN_BUFFER_SIZE {
            return Err(ConfigError::invalid(
                "pool.buffer_size",
                format!("must be at least {MIN_BUFFER_SIZE} bytes"),
            ));
        }
        if self.pool.buffer_size > u32::MAX as usize {
            return Err(ConfigError::invalid(
                "pool.buffer_size",
                "must fit a 32-bit message size",
            ));
        }
        if self.node_name.len() > MAX_NODE_NAME_LEN {
            return Err(ConfigError::invalid(
                "node_name",
                format!("longer than {MAX_NODE_NAME_LEN} bytes"),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("poll_interval_ms", "must be positive"));
        }
        Ok(())
    }

    /// Configured node id, or a fresh random one
    pub fn resolve_node_id(&self) -> NodeId {
        self.node_id.unwrap_or_else(NodeId::random)
    }
}
