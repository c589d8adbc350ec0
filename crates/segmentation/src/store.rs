//! Storage seams used by the evaluator and the membership synchronizer.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use player_core::{GameId, PlayerId, Scope};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageError;
use crate::predicates::{PlayerSnapshot, Predicate};
use crate::rule::RuleSet;

/// A compiled predicate bound to the scope it runs in.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentQuery {
    pub predicate: Predicate,
    pub scope: Scope,
}

/// A player group. Membership rows live in the [`GroupStore`] and are only
/// ever written by the synchronizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: Uuid,
    pub game_id: GameId,
    pub name: String,
    pub description: Option<String>,
    pub rule_set: RuleSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Group {
    pub fn new(game_id: GameId, name: impl Into<String>, rule_set: RuleSet) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            game_id,
            name: name.into(),
            description: None,
            rule_set,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn summary(&self) -> GroupSummary {
        GroupSummary {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

/// What a player write reports back about each group the player is in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupSummary {
    pub id: Uuid,
    pub name: String,
}

/// Read access to players and their indirect attributes.
#[async_trait]
pub trait PlayerStore: Send + Sync {
    /// Number of players in the query's scope matching its predicate.
    async fn count_matching(&self, query: &SegmentQuery) -> Result<u64, StorageError>;

    /// Up to `limit` matching player ids greater than `after`, ascending.
    async fn matching_ids_page(
        &self,
        query: &SegmentQuery,
        after: Option<PlayerId>,
        limit: usize,
    ) -> Result<Vec<PlayerId>, StorageError>;

    /// Current attributes of one player, `None` if the player does not exist.
    async fn snapshot(&self, player_id: PlayerId) -> Result<Option<PlayerSnapshot>, StorageError>;
}

/// Groups and their membership rows.
#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn save_group(&self, group: &Group) -> Result<(), StorageError>;

    async fn find_group(&self, group_id: Uuid) -> Result<Option<Group>, StorageError>;

    /// Remove the group and its membership rows. Returns whether it existed.
    async fn delete_group(&self, group_id: Uuid) -> Result<bool, StorageError>;

    async fn groups_in_game(&self, game_id: GameId) -> Result<Vec<Group>, StorageError>;

    async fn members(&self, group_id: Uuid) -> Result<HashSet<PlayerId>, StorageError>;

    async fn is_member(&self, group_id: Uuid, player_id: PlayerId) -> Result<bool, StorageError>;

    /// Atomically replace the full membership of a group.
    async fn replace_members(
        &self,
        group_id: Uuid,
        members: HashSet<PlayerId>,
    ) -> Result<(), StorageError>;

    async fn add_member(&self, group_id: Uuid, player_id: PlayerId) -> Result<(), StorageError>;

    async fn remove_member(&self, group_id: Uuid, player_id: PlayerId) -> Result<(), StorageError>;
}
