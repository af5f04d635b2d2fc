use ensemble_core::IceServerConfig;
use ensemble_core::utils::DEFAULT_STUN_ADDR;
use std::time::Duration;

/// Settings for one participant's mesh.
#[derive(Debug, Clone)]
pub struct MeshConfig {
    pub ice_servers: Vec<IceServerConfig>,
    /// A link still negotiating after this long is torn down.
    pub negotiation_timeout: Duration,
    /// How often stale links are looked for.
    pub sweep_interval: Duration,
    pub data_channel_label: String,
    pub command_capacity: usize,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServerConfig {
                urls: vec![DEFAULT_STUN_ADDR.to_owned()],
                username: None,
                credential: None,
            }],
            negotiation_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(1),
            data_channel_label: "data".to_owned(),
            command_capacity: 64,
        }
    }
}

impl MeshConfig {
    /// No ICE servers: host candidates only, for same-machine sessions.
    pub fn local_only() -> Self {
        Self {
            ice_servers: Vec::new(),
            ..Self::default()
        }
    }
}
