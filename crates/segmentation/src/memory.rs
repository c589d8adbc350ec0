//! In-process store backed by DashMap. Evaluates predicates directly against
//! player snapshots; used by the preview CLI and in tests.

use std::collections::{BTreeSet, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use player_core::{
    GameId, LeaderboardEntry, Player, PlayerAlias, PlayerId, PlayerStatValue,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageError;
use crate::predicates::PlayerSnapshot;
use crate::store::{Group, GroupStore, PlayerStore, SegmentQuery};

/// Serialized population loaded into a [`MemoryStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    #[serde(default)]
    pub players: Vec<Player>,
    #[serde(default)]
    pub aliases: Vec<PlayerAlias>,
    #[serde(default)]
    pub stats: Vec<PlayerStatValue>,
    #[serde(default)]
    pub leaderboard_entries: Vec<LeaderboardEntry>,
}

pub struct MemoryStore {
    players: DashMap<PlayerId, Player>,
    /// Player ids in ascending order, for keyset paging.
    player_ids: RwLock<BTreeSet<PlayerId>>,
    aliases: DashMap<Uuid, PlayerAlias>,
    stats: DashMap<PlayerId, Vec<PlayerStatValue>>,
    leaderboard_entries: DashMap<Uuid, LeaderboardEntry>,
    groups: DashMap<Uuid, Group>,
    memberships: DashMap<Uuid, HashSet<PlayerId>>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            players: DashMap::new(),
            player_ids: RwLock::new(BTreeSet::new()),
            aliases: DashMap::new(),
            stats: DashMap::new(),
            leaderboard_entries: DashMap::new(),
            groups: DashMap::new(),
            memberships: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    pub fn from_dataset(dataset: Dataset) -> Self {
        let store = Self::new();
        for player in dataset.players {
            store.upsert_player(player);
        }
        for alias in dataset.aliases {
            store.add_alias(alias);
        }
        for stat in dataset.stats {
            store.set_stat(stat);
        }
        for entry in dataset.leaderboard_entries {
            store.add_leaderboard_entry(entry);
        }
        store
    }

    /// Insert or replace a player record, including its properties.
    pub fn upsert_player(&self, player: Player) {
        let player_id = player.id;
        self.players.insert(player_id, player);
        self.player_ids.write().insert(player_id);
    }

    pub fn player(&self, player_id: PlayerId) -> Option<Player> {
        self.players.get(&player_id).map(|p| p.clone())
    }

    pub fn add_alias(&self, alias: PlayerAlias) {
        self.aliases.insert(alias.id, alias);
    }

    pub fn set_stat(&self, stat: PlayerStatValue) {
        let mut stats = self.stats.entry(stat.player_id).or_default();
        match stats
            .iter_mut()
            .find(|s| s.stat_internal_name == stat.stat_internal_name)
        {
            Some(existing) => existing.value = stat.value,
            None => stats.push(stat),
        }
    }

    pub fn add_leaderboard_entry(&self, entry: LeaderboardEntry) {
        self.leaderboard_entries.insert(entry.id, entry);
    }

    /// Simulate the backing store going away; every call fails until restored.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::new("memory store unavailable"))
        }
    }

    fn snapshot_of(&self, player: &Player) -> PlayerSnapshot {
        let stats = self
            .stats
            .get(&player.id)
            .map(|stats| {
                stats
                    .iter()
                    .map(|s| (s.stat_internal_name.clone(), s.value))
                    .collect()
            })
            .unwrap_or_default();

        let alias_ids: HashSet<Uuid> = self
            .aliases
            .iter()
            .filter(|a| a.player_id == player.id)
            .map(|a| a.id)
            .collect();
        let leaderboard_scores = self
            .leaderboard_entries
            .iter()
            .filter(|e| !e.hidden && alias_ids.contains(&e.player_alias_id))
            .map(|e| (e.leaderboard_internal_name.clone(), e.score))
            .collect();

        PlayerSnapshot {
            player: player.clone(),
            stats,
            leaderboard_scores,
        }
    }

    fn matches(&self, player: &Player, query: &SegmentQuery) -> bool {
        query.scope.admits(player) && query.predicate.matches(&self.snapshot_of(player))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlayerStore for MemoryStore {
    async fn count_matching(&self, query: &SegmentQuery) -> Result<u64, StorageError> {
        self.check_available()?;
        let count = self
            .players
            .iter()
            .filter(|p| self.matches(p.value(), query))
            .count();
        Ok(count as u64)
    }

    async fn matching_ids_page(
        &self,
        query: &SegmentQuery,
        after: Option<PlayerId>,
        limit: usize,
    ) -> Result<Vec<PlayerId>, StorageError> {
        self.check_available()?;
        let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
        let ids = self.player_ids.read();

        let mut page = Vec::new();
        for id in ids.range((lower, Bound::Unbounded)) {
            if page.len() >= limit {
                break;
            }
            let Some(player) = self.player(*id) else {
                continue;
            };
            if self.matches(&player, query) {
                page.push(*id);
            }
        }
        Ok(page)
    }

    async fn snapshot(&self, player_id: PlayerId) -> Result<Option<PlayerSnapshot>, StorageError> {
        self.check_available()?;
        Ok(self.player(player_id).map(|p| self.snapshot_of(&p)))
    }
}

#[async_trait]
impl GroupStore for MemoryStore {
    async fn save_group(&self, group: &Group) -> Result<(), StorageError> {
        self.check_available()?;
        self.groups.insert(group.id, group.clone());
        Ok(())
    }

    async fn find_group(&self, group_id: Uuid) -> Result<Option<Group>, StorageError> {
        self.check_available()?;
        Ok(self.groups.get(&group_id).map(|g| g.clone()))
    }

    async fn delete_group(&self, group_id: Uuid) -> Result<bool, StorageError> {
        self.check_available()?;
        self.memberships.remove(&group_id);
        Ok(self.groups.remove(&group_id).is_some())
    }

    async fn groups_in_game(&self, game_id: GameId) -> Result<Vec<Group>, StorageError> {
        self.check_available()?;
        Ok(self
            .groups
            .iter()
            .filter(|g| g.game_id == game_id)
            .map(|g| g.value().clone())
            .collect())
    }

    async fn members(&self, group_id: Uuid) -> Result<HashSet<PlayerId>, StorageError> {
        self.check_available()?;
        Ok(self
            .memberships
            .get(&group_id)
            .map(|m| m.clone())
            .unwrap_or_default())
    }

    async fn is_member(&self, group_id: Uuid, player_id: PlayerId) -> Result<bool, StorageError> {
        self.check_available()?;
        Ok(self
            .memberships
            .get(&group_id)
            .is_some_and(|m| m.contains(&player_id)))
    }

    async fn replace_members(
        &self,
        group_id: Uuid,
        members: HashSet<PlayerId>,
    ) -> Result<(), StorageError> {
        self.check_available()?;
        self.memberships.insert(group_id, members);
        Ok(())
    }

    async fn add_member(&self, group_id: Uuid, player_id: PlayerId) -> Result<(), StorageError> {
        self.check_available()?;
        self.memberships.entry(group_id).or_default().insert(player_id);
        Ok(())
    }

    async fn remove_member(&self, group_id: Uuid, player_id: PlayerId) -> Result<(), StorageError> {
        self.check_available()?;
        if let Some(mut members) = self.memberships.get_mut(&group_id) {
            members.remove(&player_id);
        }
        Ok(())
    }
}
