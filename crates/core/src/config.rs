use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::CoreResult;

/// Root application configuration. Loaded from environment variables
/// with the prefix `PLAYER_SEGMENTS__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub segmentation: SegmentationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SegmentationConfig {
    /// Number of player ids fetched per page while materializing membership.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Whether group membership counts players from dev builds.
    #[serde(default = "default_include_dev_players")]
    pub include_dev_players: bool,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_batch_size() -> usize {
    500
}
fn default_include_dev_players() -> bool {
    false
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            include_dev_players: default_include_dev_players(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            segmentation: SegmentationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> CoreResult<Self> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("PLAYER_SEGMENTS")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }
}

/// Read and decode a JSON document (datasets, rule sets).
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> CoreResult<T> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}
