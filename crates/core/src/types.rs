use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type PlayerId = Uuid;
pub type GameId = Uuid;

/// A player of a game. Timestamps are the directly addressable attributes
/// of the record; everything else hangs off it in side tables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub game_id: GameId,
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set for players created by development builds of the game.
    #[serde(default)]
    pub dev_build: bool,
    #[serde(default)]
    pub props: Vec<PlayerProp>,
}

impl Player {
    pub fn new(game_id: GameId) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            game_id,
            last_seen_at: now,
            created_at: now,
            updated_at: now,
            dev_build: false,
            props: Vec::new(),
        }
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_prop(key, Some(value.into()));
        self
    }

    /// Insert or overwrite a property. A `None` value keeps the row but
    /// leaves it without a value.
    pub fn set_prop(&mut self, key: impl Into<String>, value: Option<String>) {
        let key = key.into();
        match self.props.iter_mut().find(|p| p.key == key) {
            Some(prop) => prop.value = value,
            None => self.props.push(PlayerProp { key, value }),
        }
        self.updated_at = Utc::now();
    }

    pub fn remove_prop(&mut self, key: &str) -> bool {
        let before = self.props.len();
        self.props.retain(|p| p.key != key);
        before != self.props.len()
    }

    pub fn prop(&self, key: &str) -> Option<&PlayerProp> {
        self.props.iter().find(|p| p.key == key)
    }
}

/// Key-value property row. Values are always stored as text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerProp {
    pub key: String,
    pub value: Option<String>,
}

/// Identity of a player on an external service; leaderboard entries are
/// recorded against aliases rather than players.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerAlias {
    pub id: Uuid,
    pub player_id: PlayerId,
    pub service: String,
    pub identifier: String,
}

/// Current value of a game stat for one player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatValue {
    pub player_id: PlayerId,
    pub stat_internal_name: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub id: Uuid,
    pub player_alias_id: Uuid,
    pub leaderboard_internal_name: String,
    pub score: f64,
    #[serde(default)]
    pub hidden: bool,
}

/// Restriction applied to every evaluation: one game, with or without the
/// players created by development builds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub game_id: GameId,
    #[serde(default)]
    pub include_dev_data: bool,
}

impl Scope {
    pub fn new(game_id: GameId, include_dev_data: bool) -> Self {
        Self {
            game_id,
            include_dev_data,
        }
    }

    /// Production-only scope for a game.
    pub fn production(game_id: GameId) -> Self {
        Self::new(game_id, false)
    }

    pub fn admits(&self, player: &Player) -> bool {
        player.game_id == self.game_id && (self.include_dev_data || !player.dev_build)
    }
}
