//! Simulation configuration
//!
//! [`SimConfig`] gathers the parameters of every layer. Defaults reproduce
//! the classic demo settings: 0.1 s link delay, 10 s receive window, 5 s
//! replenishment poll and a pool cap of 4.

use std::path::Path;
use std::time::Duration;

use qnet_core::ChannelConfig;
use qnet_handshake::HandshakeConfig;
use qnet_routing::{ReplenishConfig, RoutePolicy};
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

/// Default bound on forwarded hops for one transfer
pub const DEFAULT_HOP_LIMIT: usize = 32;

/// Configuration for one simulated network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Transport delay, loss and timeouts
    pub channel: ChannelConfig,
    /// Background resource generation
    pub replenish: ReplenishConfig,
    /// Whole-route or hop-by-hop routing for transfers
    pub policy: RoutePolicy,
    /// Handshake wait window and acks
    pub handshake: HandshakeConfig,
    /// Transfers give up after this many hops
    pub hop_limit: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            replenish: ReplenishConfig::default(),
            policy: RoutePolicy::default(),
            handshake: HandshakeConfig::default(),
            hop_limit: DEFAULT_HOP_LIMIT,
        }
    }
}

impl SimConfig {
    /// Zero delay and fast polling
    pub fn testing() -> Self {
        Self {
            channel: ChannelConfig::testing(),
            replenish: ReplenishConfig::testing(),
            handshake: HandshakeConfig::default().with_wait(Duration::from_secs(2)),
            ..Self::default()
        }
    }

    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_replenish(mut self, replenish: ReplenishConfig) -> Self {
        self.replenish = replenish;
        self
    }

    pub fn with_policy(mut self, policy: RoutePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_handshake(mut self, handshake: HandshakeConfig) -> Self {
        self.handshake = handshake;
        self
    }

    pub fn with_hop_limit(mut self, hop_limit: usize) -> Self {
        self.hop_limit = hop_limit;
        self
    }

    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json(json: &str) -> SimResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| SimError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file
    pub fn load(path: impl AsRef<Path>) -> SimResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> SimResult<()> {
        if !(0.0..=1.0).contains(&self.channel.loss_probability) {
            return Err(SimError::Config(format!(
                "loss_probability {} outside [0, 1]",
                self.channel.loss_probability
            )));
        }
        if self.replenish.poll_interval.is_zero() {
            return Err(SimError::Config("poll_interval must be non-zero".into()));
        }
        if self.replenish.cap > qnet_routing::RESOURCE_CAP {
            return Err(SimError::Config(format!(
                "replenish cap {} above {}",
                self.replenish.cap,
                qnet_routing::RESOURCE_CAP
            )));
        }
        if self.hop_limit == 0 {
            return Err(SimError::Config("hop_limit must be at least 1".into()));
        }
        Ok(())
    }
}
