//! Rule compiler — turns validated rules into predicates and rule sets into
//! a single combined predicate.

use crate::error::{SegmentError, SegmentResult};
use crate::field::{FieldRef, IndirectSource, Namespace};
use crate::predicates::{CompareOp, Comparison, Predicate};
use crate::rule::{LogicalMode, Operator, ParsedRule, Rule, RuleSet};

/// Compile one validated rule.
pub fn compile_rule(rule: &ParsedRule) -> Predicate {
    let op = match rule.operator {
        Operator::Equals => CompareOp::Eq,
        Operator::Set => CompareOp::NotNull,
        Operator::Gt => CompareOp::Gt,
        Operator::Gte => CompareOp::Gte,
        Operator::Lt => CompareOp::Lt,
        Operator::Lte => CompareOp::Lte,
    };
    let comparison = Comparison {
        op,
        cast: rule.cast,
        operand: rule.operand.clone(),
    };

    let base = match &rule.field {
        FieldRef::Direct(field) => Predicate::Direct {
            field: *field,
            comparison,
        },
        FieldRef::Indirect(source) => Predicate::InSubquery {
            source: source.clone(),
            comparison,
        },
    };

    if rule.negate {
        negate(rule.operator, &rule.field, base)
    } else {
        base
    }
}

/// Negation wrapper. A negated `SET` on a property means the player has no
/// row for the key at all, not that no row carries a value.
fn negate(operator: Operator, field: &FieldRef, base: Predicate) -> Predicate {
    match (operator, field) {
        (Operator::Set, FieldRef::Indirect(source)) => match source.namespace {
            Namespace::Props => Predicate::NotInSubquery {
                source: IndirectSource {
                    namespace: Namespace::Props,
                    key: source.key.clone(),
                },
            },
            // TODO: confirm whether stats and leaderboard scores want the same
            // absence semantics as props.
            Namespace::StatValue | Namespace::LeaderboardEntryScore => {
                Predicate::Not(Box::new(base))
            }
        },
        (
            Operator::Set
            | Operator::Equals
            | Operator::Gt
            | Operator::Gte
            | Operator::Lt
            | Operator::Lte,
            _,
        ) => Predicate::Not(Box::new(base)),
    }
}

/// Validate and compile a whole rule set. All violations of all rules are
/// reported together; nothing is compiled if any rule is malformed.
pub fn compile_rule_set(rule_set: &RuleSet) -> SegmentResult<Predicate> {
    let parsed = rule_set.parse().map_err(SegmentError::Validation)?;
    Ok(combine(rule_set.mode, parsed.iter().map(compile_rule).collect()))
}

/// Compile a single wire rule, reporting its violations as rule 0.
pub fn compile(rule: &Rule) -> SegmentResult<Predicate> {
    compile_rule_set(&RuleSet::new(LogicalMode::And, vec![rule.clone()]))
}

fn combine(mode: LogicalMode, mut predicates: Vec<Predicate>) -> Predicate {
    match predicates.len() {
        0 => Predicate::All,
        1 => predicates.remove(0),
        _ => match mode {
            LogicalMode::And => Predicate::And(predicates),
            LogicalMode::Or => Predicate::Or(predicates),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cast::{CastType, ComparableValue};
    use crate::error::RuleError;
    use crate::field::DirectField;

    fn rule(operator: &str, field: &str, cast_type: &str, operands: &[&str], negate: bool) -> Rule {
        Rule {
            operator: operator.to_string(),
            field: field.to_string(),
            cast_type: cast_type.to_string(),
            operands: operands.iter().map(|o| o.to_string()).collect(),
            negate,
        }
    }

    fn props(key: &str) -> IndirectSource {
        IndirectSource {
            namespace: Namespace::Props,
            key: key.to_string(),
        }
    }

    #[test]
    fn test_direct_field_compiles_to_direct_comparison() {
        let predicate = compile(&rule("EQUALS", "lastSeenAt", "DATETIME", &["2022-05-03"], false))
            .unwrap();
        match predicate {
            Predicate::Direct { field, comparison } => {
                assert_eq!(field, DirectField::LastSeenAt);
                assert_eq!(comparison.op, CompareOp::Eq);
                assert_eq!(comparison.cast, CastType::Datetime);
            }
            other => panic!("expected direct predicate, got {other:?}"),
        }
    }

    #[test]
    fn test_indirect_field_compiles_to_subquery() {
        let predicate =
            compile(&rule("GTE", "props.currentLevel", "DOUBLE", &["70"], false)).unwrap();
        assert_eq!(
            predicate,
            Predicate::InSubquery {
                source: props("currentLevel"),
                comparison: Comparison {
                    op: CompareOp::Gte,
                    cast: CastType::Double,
                    operand: Some(ComparableValue::Number(70.0)),
                },
            }
        );
    }

    #[test]
    fn test_negated_set_on_props_means_absence() {
        let predicate = compile(&rule("SET", "props.guild", "CHAR", &[], true)).unwrap();
        assert_eq!(
            predicate,
            Predicate::NotInSubquery {
                source: props("guild")
            }
        );
    }

    #[test]
    fn test_negated_set_on_stats_wraps_in_not() {
        let predicate = compile(&rule("SET", "statValue.gold", "DOUBLE", &[], true)).unwrap();
        assert!(matches!(predicate, Predicate::Not(inner) if matches!(*inner, Predicate::InSubquery { .. })));
    }

    #[test]
    fn test_negated_comparison_wraps_in_not() {
        let predicate =
            compile(&rule("EQUALS", "props.currentLevel", "CHAR", &["80"], true)).unwrap();
        assert!(matches!(predicate, Predicate::Not(_)));
    }

    #[test]
    fn test_rule_set_combination() {
        let empty = RuleSet::default();
        assert_eq!(compile_rule_set(&empty).unwrap(), Predicate::All);

        let set = RuleSet::new(
            LogicalMode::Or,
            vec![
                rule("SET", "props.a", "CHAR", &[], false),
                rule("SET", "props.b", "CHAR", &[], false),
            ],
        );
        assert!(matches!(compile_rule_set(&set).unwrap(), Predicate::Or(p) if p.len() == 2));
    }

    #[test]
    fn test_malformed_rule_set_is_rejected_whole() {
        let set = RuleSet::new(
            LogicalMode::And,
            vec![
                rule("EQUALS", "props.a", "CHAR", &["x"], false),
                rule("GT", "props.b", "DOUBLE", &["x"], false),
                rule("SET", "props.c", "CHAR", &["extra"], false),
            ],
        );
        let err = compile_rule_set(&set).unwrap_err();
        let violations = err.violations();
        assert_eq!(violations.len(), 2);
        assert!(matches!(violations[0].error, RuleError::InvalidCast { .. }));
        assert!(matches!(
            violations[1].error,
            RuleError::InvalidOperandCount { .. }
        ));
    }
}
