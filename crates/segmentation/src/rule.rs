//! Rule and rule-set wire types, and their validation into typed rules.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cast::{CastType, ComparableValue};
use crate::error::{RuleError, RuleViolation};
use crate::field::FieldRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Equals,
    Set,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Operator {
    pub fn name(&self) -> &'static str {
        match self {
            Operator::Equals => "EQUALS",
            Operator::Set => "SET",
            Operator::Gt => "GT",
            Operator::Gte => "GTE",
            Operator::Lt => "LT",
            Operator::Lte => "LTE",
        }
    }

    /// Number of operands the operator takes.
    pub fn arity(&self) -> usize {
        match self {
            Operator::Set => 0,
            Operator::Equals | Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => 1,
        }
    }

    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte
        )
    }
}

impl FromStr for Operator {
    type Err = RuleError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_uppercase().as_str() {
            "EQUALS" => Ok(Operator::Equals),
            "SET" => Ok(Operator::Set),
            "GT" => Ok(Operator::Gt),
            "GTE" => Ok(Operator::Gte),
            "LT" => Ok(Operator::Lt),
            "LTE" => Ok(Operator::Lte),
            _ => Err(RuleError::InvalidOperator {
                operator: raw.to_string(),
            }),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the rules of a set combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LogicalMode {
    #[default]
    #[serde(rename = "$and", alias = "AND", alias = "and")]
    And,
    #[serde(rename = "$or", alias = "OR", alias = "or")]
    Or,
}

/// One rule as submitted by a caller. Operator and cast type stay textual
/// here so unknown values surface as validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub operator: String,
    pub field: String,
    pub cast_type: String,
    #[serde(default)]
    pub operands: Vec<String>,
    #[serde(default)]
    pub negate: bool,
}

/// A group's segmentation definition. Replaced wholesale on edit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub mode: LogicalMode,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(mode: LogicalMode, rules: Vec<Rule>) -> Self {
        Self { mode, rules }
    }

    /// Validate every rule, collecting all violations across the set.
    pub fn parse(&self) -> Result<Vec<ParsedRule>, Vec<RuleViolation>> {
        let mut parsed = Vec::with_capacity(self.rules.len());
        let mut violations = Vec::new();

        for (rule_index, rule) in self.rules.iter().enumerate() {
            match rule.parse() {
                Ok(rule) => parsed.push(rule),
                Err(errors) => violations.extend(errors.into_iter().map(|error| RuleViolation {
                    rule_index,
                    field: rule.field.clone(),
                    error,
                })),
            }
        }

        if violations.is_empty() {
            Ok(parsed)
        } else {
            Err(violations)
        }
    }
}

/// A rule whose operator, field, cast and operand have all been checked.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRule {
    pub operator: Operator,
    pub field: FieldRef,
    pub cast: CastType,
    /// Coerced operand; `None` exactly when the operator takes no operands.
    pub operand: Option<ComparableValue>,
    pub negate: bool,
}

impl Rule {
    /// Validate the rule, reporting every problem found rather than the first.
    pub fn parse(&self) -> Result<ParsedRule, Vec<RuleError>> {
        let mut errors = Vec::new();

        let operator = self
            .operator
            .parse::<Operator>()
            .map_err(|e| errors.push(e))
            .ok();
        let field = self.field.parse::<FieldRef>().map_err(|e| errors.push(e)).ok();
        let cast = self
            .cast_type
            .parse::<CastType>()
            .map_err(|e| errors.push(e))
            .ok();

        let mut operand = None;
        match (operator, cast) {
            (Some(operator), _) if self.operands.len() != operator.arity() => {
                errors.push(RuleError::InvalidOperandCount {
                    operator: operator.name().to_string(),
                    expected: operator.arity(),
                    actual: self.operands.len(),
                });
            }
            (Some(operator), Some(cast)) if operator.is_ordering() && !cast.is_orderable() => {
                errors.push(RuleError::InvalidCast {
                    cast_type: cast.name().to_string(),
                    reason: format!("{operator} needs an orderable cast"),
                });
            }
            (Some(_), Some(cast)) => {
                if let Some(raw) = self.operands.first() {
                    match cast.coerce_operand(raw) {
                        Ok(value) => operand = Some(value),
                        Err(e) => errors.push(e),
                    }
                }
            }
            // Arity is unknown without an operator; still check each operand.
            (None, Some(cast)) => {
                errors.extend(
                    self.operands
                        .iter()
                        .filter_map(|raw| cast.coerce_operand(raw).err()),
                );
            }
            (_, None) => {}
        }

        match (operator, field, cast) {
            (Some(operator), Some(field), Some(cast)) if errors.is_empty() => Ok(ParsedRule {
                operator,
                field,
                cast,
                operand,
                negate: self.negate,
            }),
            _ => Err(errors),
        }
    }
}
