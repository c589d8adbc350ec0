//! Membership synchronizer — keeps each group's membership rows equal to the
//! result of its rule set, on rule-set edits (full replace) and on player
//! writes (one player, every group of the game).
//!
//! Both paths go through [`transition`] and both hold the group's lock while
//! they read the rule set and write membership, so a full replace never
//! interleaves with a single-player update of the same group.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use player_core::{GameId, PlayerId, Scope, SegmentationConfig};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::SegmentEvaluator;
use crate::error::{SegmentError, SegmentResult};
use crate::predicates::PlayerSnapshot;
use crate::rule::RuleSet;
use crate::store::{Group, GroupStore, GroupSummary, PlayerStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipState {
    NotMember,
    Member,
}

impl From<bool> for MembershipState {
    fn from(is_member: bool) -> Self {
        if is_member {
            MembershipState::Member
        } else {
            MembershipState::NotMember
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    Join,
    Leave,
    Stay,
}

/// Transition of one (player, group) pair given whether the rule set
/// currently matches the player. Re-applying to an already settled pair
/// yields `Stay`.
pub fn transition(current: MembershipState, matches: bool) -> Transition {
    match (current, matches) {
        (MembershipState::NotMember, true) => Transition::Join,
        (MembershipState::Member, false) => Transition::Leave,
        (MembershipState::Member, true) | (MembershipState::NotMember, false) => Transition::Stay,
    }
}

/// Outcome of a full recomputation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipDiff {
    pub added: Vec<PlayerId>,
    pub removed: Vec<PlayerId>,
    pub total: usize,
}

impl MembershipDiff {
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

pub struct MembershipSynchronizer<S> {
    evaluator: SegmentEvaluator<S>,
    store: Arc<S>,
    include_dev_players: bool,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl<S: PlayerStore + GroupStore + 'static> MembershipSynchronizer<S> {
    pub fn new(store: Arc<S>, config: &SegmentationConfig) -> Self {
        Self {
            evaluator: SegmentEvaluator::new(Arc::clone(&store), config.batch_size),
            store,
            include_dev_players: config.include_dev_players,
            locks: DashMap::new(),
        }
    }

    pub fn evaluator(&self) -> &SegmentEvaluator<S> {
        &self.evaluator
    }

    fn scope_for(&self, group: &Group) -> Scope {
        Scope::new(group.game_id, self.include_dev_players)
    }

    fn group_lock(&self, group_id: Uuid) -> Arc<Mutex<()>> {
        self.locks.entry(group_id).or_default().value().clone()
    }

    /// Create a group and compute its membership before returning.
    pub async fn create_group(
        &self,
        game_id: GameId,
        name: impl Into<String>,
        rule_set: RuleSet,
    ) -> SegmentResult<(Group, MembershipDiff)> {
        let group = Group::new(game_id, name, rule_set);
        self.evaluator.query(&group.rule_set, self.scope_for(&group))?;

        let lock = self.group_lock(group.id);
        let _guard = lock.lock().await;
        let (matching, diff) = self.plan_recompute(&group).await?;
        self.store.save_group(&group).await?;
        self.apply_recompute(&group, matching, &diff).await?;

        info!(
            group_id = %group.id,
            game_id = %group.game_id,
            members = diff.total,
            "group created"
        );
        Ok((group, diff))
    }

    /// Replace a group's rule set and recompute its membership in full.
    pub async fn update_group(
        &self,
        group_id: Uuid,
        rule_set: RuleSet,
    ) -> SegmentResult<(Group, MembershipDiff)> {
        let lock = self.group_lock(group_id);
        let _guard = lock.lock().await;

        let mut group = self
            .store
            .find_group(group_id)
            .await?
            .ok_or(SegmentError::GroupNotFound(group_id))?;
        self.evaluator.query(&rule_set, self.scope_for(&group))?;

        group.rule_set = rule_set;
        group.updated_at = Utc::now();
        // Nothing is written until the new membership has been fully read.
        let (matching, diff) = self.plan_recompute(&group).await?;
        self.store.save_group(&group).await?;
        self.apply_recompute(&group, matching, &diff).await?;

        info!(
            group_id = %group.id,
            added = diff.added.len(),
            removed = diff.removed.len(),
            members = diff.total,
            "group rules updated"
        );
        Ok((group, diff))
    }

    /// Delete a group together with its membership rows.
    pub async fn delete_group(&self, group_id: Uuid) -> SegmentResult<()> {
        let lock = self.group_lock(group_id);
        {
            let _guard = lock.lock().await;
            if !self.store.delete_group(group_id).await? {
                return Err(SegmentError::GroupNotFound(group_id));
            }
        }
        self.locks.remove(&group_id);
        info!(group_id = %group_id, "group deleted");
        Ok(())
    }

    /// Recompute a group's membership from scratch with its current rule set.
    pub async fn recompute_group(&self, group_id: Uuid) -> SegmentResult<MembershipDiff> {
        let lock = self.group_lock(group_id);
        let _guard = lock.lock().await;
        let group = self
            .store
            .find_group(group_id)
            .await?
            .ok_or(SegmentError::GroupNotFound(group_id))?;
        let (matching, diff) = self.plan_recompute(&group).await?;
        self.apply_recompute(&group, matching, &diff).await?;
        Ok(diff)
    }

    /// Full replace, read half: apply the transition to every player that
    /// either matches now or was a member before. Writes nothing. Caller
    /// holds the group lock.
    async fn plan_recompute(
        &self,
        group: &Group,
    ) -> SegmentResult<(HashSet<PlayerId>, MembershipDiff)> {
        let query = self.evaluator.query(&group.rule_set, self.scope_for(group))?;
        let matching = self.evaluator.collect_query(query).await?;
        let current = self.store.members(group.id).await?;

        let mut diff = MembershipDiff {
            total: matching.len(),
            ..Default::default()
        };
        for player_id in current.union(&matching) {
            let state = MembershipState::from(current.contains(player_id));
            match transition(state, matching.contains(player_id)) {
                Transition::Join => diff.added.push(*player_id),
                Transition::Leave => diff.removed.push(*player_id),
                Transition::Stay => {}
            }
        }
        diff.added.sort_unstable();
        diff.removed.sort_unstable();
        Ok((matching, diff))
    }

    async fn apply_recompute(
        &self,
        group: &Group,
        matching: HashSet<PlayerId>,
        diff: &MembershipDiff,
    ) -> SegmentResult<()> {
        self.store.replace_members(group.id, matching).await?;

        metrics::counter!("segmentation.recompute.full").increment(1);
        debug!(
            group_id = %group.id,
            added = diff.added.len(),
            removed = diff.removed.len(),
            "membership recomputed"
        );
        Ok(())
    }

    /// Re-evaluate one player against every group of the player's game after
    /// an attribute write. Returns the groups the player now belongs to.
    pub async fn sync_player(&self, player_id: PlayerId) -> SegmentResult<Vec<GroupSummary>> {
        let snapshot = self
            .store
            .snapshot(player_id)
            .await?
            .ok_or(SegmentError::PlayerNotFound(player_id))?;
        let groups = self.store.groups_in_game(snapshot.player.game_id).await?;

        let mut memberships = Vec::new();
        for group in groups {
            if let Some(summary) = self.sync_player_in_group(group.id, &snapshot).await? {
                memberships.push(summary);
            }
        }
        memberships.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        metrics::counter!("segmentation.recompute.player").increment(1);
        Ok(memberships)
    }

    async fn sync_player_in_group(
        &self,
        group_id: Uuid,
        snapshot: &PlayerSnapshot,
    ) -> SegmentResult<Option<GroupSummary>> {
        let lock = self.group_lock(group_id);
        let _guard = lock.lock().await;

        // The rule set may have been replaced, or the group deleted, while waiting.
        let Some(group) = self.store.find_group(group_id).await? else {
            return Ok(None);
        };
        let query = self.evaluator.query(&group.rule_set, self.scope_for(&group))?;
        let matches = self.evaluator.matches_player(&query, snapshot);
        let player_id = snapshot.id();
        let state = MembershipState::from(self.store.is_member(group.id, player_id).await?);

        match transition(state, matches) {
            Transition::Join => {
                self.store.add_member(group.id, player_id).await?;
                metrics::counter!("segmentation.membership.joined").increment(1);
                info!(group_id = %group.id, player_id = %player_id, "player joined group");
            }
            Transition::Leave => {
                self.store.remove_member(group.id, player_id).await?;
                metrics::counter!("segmentation.membership.left").increment(1);
                info!(group_id = %group.id, player_id = %player_id, "player left group");
            }
            Transition::Stay => {}
        }

        Ok(matches.then(|| group.summary()))
    }

    pub async fn members(&self, group_id: Uuid) -> SegmentResult<HashSet<PlayerId>> {
        Ok(self.store.members(group_id).await?)
    }
}
