pub mod config;
pub mod error;
pub mod types;

pub use config::{read_json_file, AppConfig, SegmentationConfig};
pub use error::{CoreError, CoreResult};
pub use types::{
    GameId, LeaderboardEntry, Player, PlayerAlias, PlayerId, PlayerProp, PlayerStatValue, Scope,
};
