//! Segment query evaluator — compiles a rule set once and runs it against a
//! player store, either counting matches or streaming their ids.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use player_core::{GameId, PlayerId, Scope};
use tracing::{debug, warn};

use crate::compiler::compile_rule_set;
use crate::error::{SegmentError, SegmentResult};
use crate::predicates::PlayerSnapshot;
use crate::rule::RuleSet;
use crate::store::{PlayerStore, SegmentQuery};

pub struct SegmentEvaluator<S> {
    store: Arc<S>,
    batch_size: usize,
}

impl<S> Clone for SegmentEvaluator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            batch_size: self.batch_size,
        }
    }
}

impl<S: PlayerStore + 'static> SegmentEvaluator<S> {
    pub fn new(store: Arc<S>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Validate and compile a rule set for the given scope. No query is issued.
    pub fn query(&self, rule_set: &RuleSet, scope: Scope) -> SegmentResult<SegmentQuery> {
        let predicate = compile_rule_set(rule_set).inspect_err(|e| {
            metrics::counter!("segmentation.validation.rejected").increment(1);
            warn!(error = %e, "rule set rejected");
        })?;
        Ok(SegmentQuery { predicate, scope })
    }

    /// Number of players in scope satisfying the rule set.
    pub async fn count(&self, rule_set: &RuleSet, scope: Scope) -> SegmentResult<u64> {
        let query = self.query(rule_set, scope)?;
        let count = self.store.count_matching(&query).await?;
        debug!(game_id = %scope.game_id, count = count, "counted segment");
        Ok(count)
    }

    /// Group size preview for a game, optionally counting dev-build players.
    pub async fn preview_count(
        &self,
        rule_set: &RuleSet,
        game_id: GameId,
        include_dev_data: bool,
    ) -> SegmentResult<u64> {
        self.count(rule_set, Scope::new(game_id, include_dev_data))
            .await
    }

    /// Lazily stream the ids of matching players, one store page at a time.
    /// Every call starts a fresh pass from the beginning.
    pub fn matching_ids(
        &self,
        rule_set: &RuleSet,
        scope: Scope,
    ) -> SegmentResult<BoxStream<'static, SegmentResult<PlayerId>>> {
        let query = self.query(rule_set, scope)?;
        Ok(self.stream_query(query))
    }

    /// Stream the ids matched by an already compiled query.
    pub fn stream_query(&self, query: SegmentQuery) -> BoxStream<'static, SegmentResult<PlayerId>> {
        let state = PageState {
            store: Arc::clone(&self.store),
            query: Arc::new(query),
            after: None,
            exhausted: false,
            batch_size: self.batch_size,
        };
        stream::try_unfold(state, next_page)
            .map_ok(|page| stream::iter(page.into_iter().map(Ok::<PlayerId, SegmentError>)))
            .try_flatten()
            .boxed()
    }

    /// Drain a compiled query into a set.
    pub async fn collect_query(&self, query: SegmentQuery) -> SegmentResult<HashSet<PlayerId>> {
        self.stream_query(query).try_collect().await
    }

    /// Test one player's current attributes against a compiled query.
    pub fn matches_player(&self, query: &SegmentQuery, snapshot: &PlayerSnapshot) -> bool {
        query.scope.admits(&snapshot.player) && query.predicate.matches(snapshot)
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

struct PageState<S> {
    store: Arc<S>,
    query: Arc<SegmentQuery>,
    after: Option<PlayerId>,
    exhausted: bool,
    batch_size: usize,
}

async fn next_page<S: PlayerStore>(
    mut state: PageState<S>,
) -> SegmentResult<Option<(Vec<PlayerId>, PageState<S>)>> {
    if state.exhausted {
        return Ok(None);
    }
    let page = state
        .store
        .matching_ids_page(&state.query, state.after, state.batch_size)
        .await
        .map_err(SegmentError::from)?;
    if page.is_empty() {
        return Ok(None);
    }
    state.exhausted = page.len() < state.batch_size;
    state.after = page.last().copied();
    Ok(Some((page, state)))
}
