//! End-to-end segmentation scenarios against the in-memory store.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use futures::TryStreamExt;
use player_core::{
    LeaderboardEntry, Player, PlayerAlias, PlayerId, PlayerStatValue, Scope, SegmentationConfig,
};
use player_segmentation::{
    CastType, LogicalMode, MembershipSynchronizer, MemoryStore, Rule, RuleSet, RuleSetBuilder,
    SegmentError, SegmentEvaluator,
};
use uuid::Uuid;

fn rule(operator: &str, field: &str, cast_type: &str, operands: &[&str], negate: bool) -> Rule {
    Rule {
        operator: operator.to_string(),
        field: field.to_string(),
        cast_type: cast_type.to_string(),
        operands: operands.iter().map(|o| o.to_string()).collect(),
        negate,
    }
}

async fn matching(
    evaluator: &SegmentEvaluator<MemoryStore>,
    rule_set: &RuleSet,
    scope: Scope,
) -> HashSet<PlayerId> {
    evaluator
        .matching_ids(rule_set, scope)
        .unwrap()
        .try_collect()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_equals_char_on_property() {
    let game_id = Uuid::new_v4();
    let store = Arc::new(MemoryStore::new());
    let a = Player::new(game_id).with_prop("currentLevel", "80");
    let b = Player::new(game_id);
    store.upsert_player(a.clone());
    store.upsert_player(b.clone());
    let evaluator = SegmentEvaluator::new(store, 100);
    let scope = Scope::production(game_id);

    let rules = RuleSet::new(
        LogicalMode::And,
        vec![rule("EQUALS", "props.currentLevel", "CHAR", &["80"], false)],
    );
    assert_eq!(matching(&evaluator, &rules, scope).await, HashSet::from([a.id]));
    assert_eq!(evaluator.count(&rules, scope).await.unwrap(), 1);
}

#[tokio::test]
async fn test_gte_double_and_its_negation() {
    let game_id = Uuid::new_v4();
    let store = Arc::new(MemoryStore::new());
    let a = Player::new(game_id).with_prop("currentLevel", "80");
    let b = Player::new(game_id).with_prop("currentLevel", "70");
    store.upsert_player(a.clone());
    store.upsert_player(b.clone());
    let evaluator = SegmentEvaluator::new(store, 100);
    let scope = Scope::production(game_id);

    let rules = RuleSet::new(
        LogicalMode::And,
        vec![rule("GTE", "props.currentLevel", "DOUBLE", &["70"], false)],
    );
    assert_eq!(
        matching(&evaluator, &rules, scope).await,
        HashSet::from([a.id, b.id])
    );
    assert_eq!(evaluator.count(&rules, scope).await.unwrap(), 2);

    let negated = RuleSet::new(
        LogicalMode::And,
        vec![rule("GTE", "props.currentLevel", "DOUBLE", &["70"], true)],
    );
    assert!(matching(&evaluator, &negated, scope).await.is_empty());
}

#[tokio::test]
async fn test_numeric_cast_orders_around_eighty() {
    let game_id = Uuid::new_v4();
    let store = Arc::new(MemoryStore::new());
    let levels = ["9", "79", "80", "81"];
    let players: Vec<Player> = levels
        .iter()
        .map(|l| Player::new(game_id).with_prop("currentLevel", *l))
        .collect();
    for p in &players {
        store.upsert_player(p.clone());
    }
    let evaluator = SegmentEvaluator::new(store, 100);
    let scope = Scope::production(game_id);
    let ids = |idx: &[usize]| idx.iter().map(|i| players[*i].id).collect::<HashSet<_>>();

    for (operator, expected) in [
        ("GT", vec![3]),
        ("GTE", vec![2, 3]),
        ("LT", vec![0, 1]),
        ("LTE", vec![0, 1, 2]),
    ] {
        let rules = RuleSet::new(
            LogicalMode::And,
            vec![rule(operator, "props.currentLevel", "DOUBLE", &["80"], false)],
        );
        assert_eq!(
            matching(&evaluator, &rules, scope).await,
            ids(&expected),
            "operator {operator}"
        );
    }
}

#[tokio::test]
async fn test_datetime_equals_matches_calendar_day() {
    let game_id = Uuid::new_v4();
    let store = Arc::new(MemoryStore::new());
    let mut morning = Player::new(game_id);
    morning.last_seen_at = Utc.with_ymd_and_hms(2022, 5, 3, 0, 0, 1).unwrap();
    let mut night = Player::new(game_id);
    night.last_seen_at = Utc.with_ymd_and_hms(2022, 5, 3, 23, 59, 59).unwrap();
    let mut next_day = Player::new(game_id);
    next_day.last_seen_at = Utc.with_ymd_and_hms(2022, 5, 4, 0, 0, 0).unwrap();
    for p in [&morning, &night, &next_day] {
        store.upsert_player(p.clone());
    }
    let evaluator = SegmentEvaluator::new(store, 100);
    let scope = Scope::production(game_id);

    let on_day = RuleSet::new(
        LogicalMode::And,
        vec![rule("EQUALS", "lastSeenAt", "DATETIME", &["2022-05-03"], false)],
    );
    let off_day = RuleSet::new(
        LogicalMode::And,
        vec![rule("EQUALS", "lastSeenAt", "DATETIME", &["2022-05-03"], true)],
    );
    assert_eq!(
        matching(&evaluator, &on_day, scope).await,
        HashSet::from([morning.id, night.id])
    );
    assert_eq!(
        matching(&evaluator, &off_day, scope).await,
        HashSet::from([next_day.id])
    );
}

#[tokio::test]
async fn test_negated_set_on_props_means_no_row() {
    let game_id = Uuid::new_v4();
    let store = Arc::new(MemoryStore::new());
    let has_value = Player::new(game_id).with_prop("guild", "red");
    let other_value = Player::new(game_id).with_prop("guild", "blue");
    let mut empty_row = Player::new(game_id);
    empty_row.set_prop("guild", None);
    let no_row = Player::new(game_id);
    for p in [&has_value, &other_value, &empty_row, &no_row] {
        store.upsert_player(p.clone());
    }
    let evaluator = SegmentEvaluator::new(store, 100);
    let scope = Scope::production(game_id);

    let set = RuleSetBuilder::new().is_set("props.guild").build();
    let not_set = RuleSetBuilder::new().not_set("props.guild").build();

    assert_eq!(
        matching(&evaluator, &set, scope).await,
        HashSet::from([has_value.id, other_value.id])
    );
    assert_eq!(
        matching(&evaluator, &not_set, scope).await,
        HashSet::from([no_row.id])
    );
}

#[tokio::test]
async fn test_stats_and_leaderboards_respect_scope() {
    let game_id = Uuid::new_v4();
    let store = Arc::new(MemoryStore::new());
    let prod = Player::new(game_id);
    let mut dev = Player::new(game_id);
    dev.dev_build = true;
    store.upsert_player(prod.clone());
    store.upsert_player(dev.clone());

    for player in [&prod, &dev] {
        let alias = PlayerAlias {
            id: Uuid::new_v4(),
            player_id: player.id,
            service: "username".to_string(),
            identifier: player.id.to_string(),
        };
        store.add_alias(alias.clone());
        store.add_leaderboard_entry(LeaderboardEntry {
            id: Uuid::new_v4(),
            player_alias_id: alias.id,
            leaderboard_internal_name: "weekly".to_string(),
            score: 1000.0,
            hidden: false,
        });
        store.set_stat(PlayerStatValue {
            player_id: player.id,
            stat_internal_name: "gold".to_string(),
            value: 500.0,
        });
    }
    let evaluator = SegmentEvaluator::new(store, 100);

    let rules = RuleSetBuilder::new()
        .gt("leaderboardEntryScore.weekly", CastType::Double, "900")
        .gte("statValue.gold", CastType::Double, "500")
        .build();
    assert_eq!(
        matching(&evaluator, &rules, Scope::production(game_id)).await,
        HashSet::from([prod.id])
    );
    assert_eq!(
        evaluator.preview_count(&rules, game_id, true).await.unwrap(),
        2
    );
}

#[tokio::test]
async fn test_all_rule_errors_are_reported_together() {
    let evaluator = SegmentEvaluator::new(Arc::new(MemoryStore::new()), 100);
    let rules = RuleSet::new(
        LogicalMode::Or,
        vec![
            rule("EQUALS", "props.currentLevel", "CHAR", &["80"], false),
            rule("CONTAINS", "props.name", "CHAR", &["a"], false),
            rule("GT", "statValue.gold", "DOUBLE", &["rich"], false),
            rule("LT", "favouriteColour", "DOUBLE", &["1", "2"], false),
        ],
    );

    let err = evaluator
        .count(&rules, Scope::production(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, SegmentError::Validation(_)));
    let mut reported: Vec<(usize, &str)> = err
        .violations()
        .iter()
        .map(|v| (v.rule_index, v.field.as_str()))
        .collect();
    reported.dedup();
    assert_eq!(
        reported,
        vec![(1, "props.name"), (2, "statValue.gold"), (3, "favouriteColour")]
    );
    assert_eq!(err.violations().len(), 4);
}

#[tokio::test]
async fn test_full_recompute_is_idempotent() {
    let game_id = Uuid::new_v4();
    let store = Arc::new(MemoryStore::new());
    for level in ["5", "15", "25"] {
        store.upsert_player(Player::new(game_id).with_prop("currentLevel", level));
    }
    let sync = MembershipSynchronizer::new(Arc::clone(&store), &SegmentationConfig::default());
    let (group, created) = sync
        .create_group(
            game_id,
            "Mid game",
            RuleSetBuilder::new()
                .gte("props.currentLevel", CastType::Double, "10")
                .build(),
        )
        .await
        .unwrap();

    let first = sync.members(group.id).await.unwrap();
    assert!(sync.recompute_group(group.id).await.unwrap().is_unchanged());
    let second = sync.members(group.id).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(created.total, 2);
}

#[tokio::test]
async fn test_property_patch_removes_player_from_group() {
    let game_id = Uuid::new_v4();
    let store = Arc::new(MemoryStore::new());
    let mut player = Player::new(game_id).with_prop("currentLevel", "59");
    store.upsert_player(player.clone());
    let sync = MembershipSynchronizer::new(Arc::clone(&store), &SegmentationConfig::default());

    let (group, _) = sync
        .create_group(
            game_id,
            "Below sixty",
            RuleSetBuilder::new()
                .lte("props.currentLevel", CastType::Double, "59")
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(
        sync.members(group.id).await.unwrap(),
        HashSet::from([player.id])
    );

    player.set_prop("currentLevel", Some("60".to_string()));
    store.upsert_player(player.clone());
    let groups = sync.sync_player(player.id).await.unwrap();

    assert!(groups.is_empty());
    assert!(sync.members(group.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_player_write_reports_current_groups() {
    let game_id = Uuid::new_v4();
    let store = Arc::new(MemoryStore::new());
    let mut player = Player::new(game_id);
    store.upsert_player(player.clone());
    let sync = MembershipSynchronizer::new(Arc::clone(&store), &SegmentationConfig::default());

    let (everyone, _) = sync
        .create_group(game_id, "Everyone", RuleSet::default())
        .await
        .unwrap();
    let (whales, _) = sync
        .create_group(
            game_id,
            "Whales",
            RuleSetBuilder::new()
                .gt("props.spend", CastType::Double, "100")
                .build(),
        )
        .await
        .unwrap();
    sync.create_group(Uuid::new_v4(), "Other game", RuleSet::default())
        .await
        .unwrap();

    player.set_prop("spend", Some("250.5".to_string()));
    store.upsert_player(player.clone());
    let groups = sync.sync_player(player.id).await.unwrap();

    assert_eq!(groups, vec![everyone.summary(), whales.summary()]);
}

#[tokio::test]
async fn test_storage_failure_is_surfaced_not_retried() {
    let game_id = Uuid::new_v4();
    let store = Arc::new(MemoryStore::new());
    let player = Player::new(game_id);
    store.upsert_player(player.clone());
    let sync = MembershipSynchronizer::new(Arc::clone(&store), &SegmentationConfig::default());
    let (group, _) = sync
        .create_group(game_id, "Everyone", RuleSet::default())
        .await
        .unwrap();

    store.set_available(false);
    assert!(matches!(
        sync.recompute_group(group.id).await,
        Err(SegmentError::Storage(_))
    ));
    assert!(matches!(
        sync.sync_player(player.id).await,
        Err(SegmentError::Storage(_))
    ));

    store.set_available(true);
    assert_eq!(
        sync.members(group.id).await.unwrap(),
        HashSet::from([player.id])
    );
}
