//! Compiled predicate tree and its evaluation against one player's attributes.

use chrono::{DateTime, Utc};
use player_core::{Player, PlayerId};
use serde::{Deserialize, Serialize};

use crate::cast::{CastType, ComparableValue, RawValue};
use crate::field::{DirectField, IndirectSource, Namespace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Value is present.
    NotNull,
}

impl CompareOp {
    pub fn sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::NotNull => "IS NOT NULL",
        }
    }
}

/// Base comparison of a rule: stored value and operand both pass through
/// the same cast before being compared.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub op: CompareOp,
    pub cast: CastType,
    pub operand: Option<ComparableValue>,
}

impl Comparison {
    pub fn test(&self, raw: Option<RawValue<'_>>) -> bool {
        let Some(raw) = raw else {
            return false;
        };
        if self.op == CompareOp::NotNull {
            return true;
        }
        let (Some(value), Some(operand)) = (self.cast.coerce(raw), self.operand.as_ref()) else {
            return false;
        };
        match self.op {
            CompareOp::Eq => value == *operand,
            CompareOp::Gt => value > *operand,
            CompareOp::Gte => value >= *operand,
            CompareOp::Lt => value < *operand,
            CompareOp::Lte => value <= *operand,
            CompareOp::NotNull => true,
        }
    }
}

/// Storage-agnostic predicate over players.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every player in scope.
    All,
    /// Comparison applied straight to a player attribute.
    Direct {
        field: DirectField,
        comparison: Comparison,
    },
    /// `player.id IN (ids with a row for the key satisfying the comparison)`.
    InSubquery {
        source: IndirectSource,
        comparison: Comparison,
    },
    /// `player.id NOT IN (ids with any row for the key)`.
    NotInSubquery { source: IndirectSource },
    Not(Box<Predicate>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

/// Everything a predicate may read about one player.
#[derive(Debug, Clone)]
pub struct PlayerSnapshot {
    pub player: Player,
    pub stats: Vec<(String, f64)>,
    /// Scores of non-hidden leaderboard entries across all the player's aliases.
    pub leaderboard_scores: Vec<(String, f64)>,
}

impl PlayerSnapshot {
    pub fn new(player: Player) -> Self {
        Self {
            player,
            stats: Vec::new(),
            leaderboard_scores: Vec::new(),
        }
    }

    pub fn id(&self) -> PlayerId {
        self.player.id
    }

    fn timestamp(&self, field: DirectField) -> DateTime<Utc> {
        match field {
            DirectField::LastSeenAt => self.player.last_seen_at,
            DirectField::CreatedAt => self.player.created_at,
            DirectField::UpdatedAt => self.player.updated_at,
        }
    }

    /// Raw values of every row of `source` matching its key.
    fn rows<'a>(&'a self, source: &'a IndirectSource) -> Vec<Option<RawValue<'a>>> {
        match source.namespace {
            Namespace::Props => self
                .player
                .props
                .iter()
                .filter(|p| p.key == source.key)
                .map(|p| p.value.as_deref().map(RawValue::Text))
                .collect(),
            Namespace::StatValue => self
                .stats
                .iter()
                .filter(|(name, _)| *name == source.key)
                .map(|(_, value)| Some(RawValue::Number(*value)))
                .collect(),
            Namespace::LeaderboardEntryScore => self
                .leaderboard_scores
                .iter()
                .filter(|(name, _)| *name == source.key)
                .map(|(_, score)| Some(RawValue::Number(*score)))
                .collect(),
        }
    }
}

impl Predicate {
    pub fn matches(&self, snapshot: &PlayerSnapshot) -> bool {
        match self {
            Predicate::All => true,
            Predicate::Direct { field, comparison } => {
                comparison.test(Some(RawValue::Timestamp(snapshot.timestamp(*field))))
            }
            Predicate::InSubquery { source, comparison } => snapshot
                .rows(source)
                .into_iter()
                .any(|raw| comparison.test(raw)),
            Predicate::NotInSubquery { source } => snapshot.rows(source).is_empty(),
            Predicate::Not(inner) => !inner.matches(snapshot),
            Predicate::And(preds) => preds.iter().all(|p| p.matches(snapshot)),
            Predicate::Or(preds) => preds.iter().any(|p| p.matches(snapshot)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn level_source() -> IndirectSource {
        IndirectSource {
            namespace: Namespace::Props,
            key: "currentLevel".to_string(),
        }
    }

    fn double(op: CompareOp, operand: f64) -> Comparison {
        Comparison {
            op,
            cast: CastType::Double,
            operand: Some(ComparableValue::Number(operand)),
        }
    }

    #[test]
    fn test_in_subquery_uses_cast_comparison() {
        let snapshot =
            PlayerSnapshot::new(Player::new(Uuid::new_v4()).with_prop("currentLevel", "9"));
        let gt = Predicate::InSubquery {
            source: level_source(),
            comparison: double(CompareOp::Lt, 80.0),
        };
        assert!(gt.matches(&snapshot));
    }

    #[test]
    fn test_null_property_value_is_not_set_but_not_absent() {
        let mut player = Player::new(Uuid::new_v4());
        player.set_prop("currentLevel", None);
        let snapshot = PlayerSnapshot::new(player);

        let set = Predicate::InSubquery {
            source: level_source(),
            comparison: Comparison {
                op: CompareOp::NotNull,
                cast: CastType::Char,
                operand: None,
            },
        };
        let absent = Predicate::NotInSubquery {
            source: level_source(),
        };

        assert!(!set.matches(&snapshot));
        assert!(!absent.matches(&snapshot));
        assert!(Predicate::Not(Box::new(set)).matches(&snapshot));
    }

    #[test]
    fn test_stats_and_leaderboard_rows() {
        let mut snapshot = PlayerSnapshot::new(Player::new(Uuid::new_v4()));
        snapshot.stats.push(("gold".to_string(), 120.0));
        snapshot.leaderboard_scores.push(("weekly".to_string(), 3.0));
        snapshot.leaderboard_scores.push(("weekly".to_string(), 900.0));

        let stat = Predicate::InSubquery {
            source: IndirectSource {
                namespace: Namespace::StatValue,
                key: "gold".to_string(),
            },
            comparison: double(CompareOp::Gte, 100.0),
        };
        let score = Predicate::InSubquery {
            source: IndirectSource {
                namespace: Namespace::LeaderboardEntryScore,
                key: "weekly".to_string(),
            },
            comparison: double(CompareOp::Gt, 500.0),
        };

        assert!(Predicate::And(vec![stat.clone(), score]).matches(&snapshot));
        assert!(!Predicate::Not(Box::new(stat)).matches(&snapshot));
        assert!(Predicate::And(vec![]).matches(&snapshot));
        assert!(!Predicate::Or(vec![]).matches(&snapshot));
    }
}
