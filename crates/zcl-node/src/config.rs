//! Node configuration from the environment and a JSON file

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use zcl_core::cluster::{id, on_off_attrs};
use zcl_core::{DeviceType, ProfileConfig};

/// Process settings read from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub config_path: PathBuf,
    pub tick: Duration,
}

impl Settings {
    #[must_use]
    pub fn from_env() -> Self {
        let config_path = std::env::var("NODE_CONFIG")
            .unwrap_or_else(|_| "./data/node.json".to_string())
            .into();
        let tick_ms = std::env::var("REPORT_TICK_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .unwrap_or(1000);
        Self {
            config_path,
            tick: Duration::from_millis(tick_ms),
        }
    }
}

/// Endpoints hosted by this node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub endpoints: Vec<EndpointConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub id: u8,
    pub device_type: DeviceType,
    /// Omitted cluster configs use HA defaults
    #[serde(default)]
    pub clusters: ProfileConfig,
    #[serde(default)]
    pub reporting: Vec<ReportingConfig>,
}

/// A send-side reporting entry for a server attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportingConfig {
    pub cluster_id: u16,
    pub attr_id: u16,
    pub min_interval: u16,
    pub max_interval: u16,
    /// Reportable change, in the attribute's own units
    #[serde(default)]
    pub delta: Option<i64>,
    #[serde(default)]
    pub dst_short_addr: u16,
    #[serde(default = "default_dst_endpoint")]
    pub dst_endpoint: u8,
}

fn default_dst_endpoint() -> u8 {
    1
}

impl Default for NodeConfig {
    /// A single on/off light on endpoint 1 reporting its state to the
    /// coordinator
    fn default() -> Self {
        Self {
            endpoints: vec![EndpointConfig {
                id: 1,
                device_type: DeviceType::OnOffLight,
                clusters: ProfileConfig::home_automation(DeviceType::OnOffLight),
                reporting: vec![ReportingConfig {
                    cluster_id: id::ON_OFF,
                    attr_id: on_off_attrs::ON_OFF,
                    min_interval: 1,
                    max_interval: 300,
                    delta: None,
                    dst_short_addr: 0x0000,
                    dst_endpoint: 1,
                }],
            }],
        }
    }
}

/// Load the node config, falling back to the default node if the file is
/// missing or malformed
pub async fn load_config(path: &Path) -> NodeConfig {
    match fs::read_to_string(path).await {
        Ok(contents) => match serde_json::from_str::<NodeConfig>(&contents) {
            Ok(config) => {
                tracing::info!(
                    "Loaded {} endpoints from {:?}",
                    config.endpoints.len(),
                    path
                );
                config
            }
            Err(e) => {
                tracing::warn!("Failed to parse node config {:?}: {}", path, e);
                NodeConfig::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!("No node config at {:?}, using a default on/off light", path);
            NodeConfig::default()
        }
        Err(e) => {
            tracing::warn!("Failed to read node config {:?}: {}", path, e);
            NodeConfig::default()
        }
    }
}
