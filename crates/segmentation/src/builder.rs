//! Rule-set builder — fluent API for constructing segment rule sets.

use crate::cast::CastType;
use crate::rule::{LogicalMode, Operator, Rule, RuleSet};

#[derive(Debug, Default)]
pub struct RuleSetBuilder {
    mode: LogicalMode,
    rules: Vec<Rule>,
}

impl RuleSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_or(mut self) -> Self {
        self.mode = LogicalMode::Or;
        self
    }

    pub fn rule(
        mut self,
        operator: Operator,
        field: impl Into<String>,
        cast: CastType,
        operands: &[&str],
    ) -> Self {
        self.rules.push(Rule {
            operator: operator.name().to_string(),
            field: field.into(),
            cast_type: cast.name().to_string(),
            operands: operands.iter().map(|o| o.to_string()).collect(),
            negate: false,
        });
        self
    }

    pub fn equals(self, field: impl Into<String>, cast: CastType, operand: &str) -> Self {
        self.rule(Operator::Equals, field, cast, &[operand])
    }

    pub fn gt(self, field: impl Into<String>, cast: CastType, operand: &str) -> Self {
        self.rule(Operator::Gt, field, cast, &[operand])
    }

    pub fn gte(self, field: impl Into<String>, cast: CastType, operand: &str) -> Self {
        self.rule(Operator::Gte, field, cast, &[operand])
    }

    pub fn lt(self, field: impl Into<String>, cast: CastType, operand: &str) -> Self {
        self.rule(Operator::Lt, field, cast, &[operand])
    }

    pub fn lte(self, field: impl Into<String>, cast: CastType, operand: &str) -> Self {
        self.rule(Operator::Lte, field, cast, &[operand])
    }

    pub fn is_set(self, field: impl Into<String>) -> Self {
        self.rule(Operator::Set, field, CastType::Char, &[])
    }

    pub fn not_set(self, field: impl Into<String>) -> Self {
        self.is_set(field).negated()
    }

    /// Negate the most recently added rule.
    pub fn negated(mut self) -> Self {
        if let Some(last) = self.rules.last_mut() {
            last.negate = !last.negate;
        }
        self
    }

    pub fn build(self) -> RuleSet {
        RuleSet::new(self.mode, self.rules)
    }
}
