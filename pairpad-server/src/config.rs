use std::time::Duration;

use pairpad_collab::HubConfig;
use pairpad_exec::ExecConfig;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// How often outdated presence is swept
    pub presence_sweep_interval: Duration,
    pub hub: HubConfig,
    pub exec: ExecConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:1234".to_string(),
            presence_sweep_interval: Duration::from_secs(3),
            hub: HubConfig::default(),
            exec: ExecConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn with_defaults() -> Self {
        Self::default()
    }

    pub fn with_bind_addr(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            ..Self::default()
        }
    }
}
