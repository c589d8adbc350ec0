//! Field resolution — maps a rule's field reference onto the player record
//! or onto one of the indirect attribute tables.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RuleError;

/// Timestamp attributes stored on the player row itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DirectField {
    LastSeenAt,
    CreatedAt,
    UpdatedAt,
}

impl DirectField {
    pub fn name(&self) -> &'static str {
        match self {
            DirectField::LastSeenAt => "lastSeenAt",
            DirectField::CreatedAt => "createdAt",
            DirectField::UpdatedAt => "updatedAt",
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            DirectField::LastSeenAt => "last_seen_at",
            DirectField::CreatedAt => "created_at",
            DirectField::UpdatedAt => "updated_at",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "lastSeenAt" => Some(DirectField::LastSeenAt),
            "createdAt" => Some(DirectField::CreatedAt),
            "updatedAt" => Some(DirectField::UpdatedAt),
            _ => None,
        }
    }
}

/// Families of indirect attributes, addressed as `<namespace>.<key>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Namespace {
    /// Key-value properties; key is the property key.
    Props,
    /// Game stats; key is the stat internal name.
    StatValue,
    /// Leaderboard scores; key is the leaderboard internal name.
    LeaderboardEntryScore,
}

impl Namespace {
    pub fn prefix(&self) -> &'static str {
        match self {
            Namespace::Props => "props",
            Namespace::StatValue => "statValue",
            Namespace::LeaderboardEntryScore => "leaderboardEntryScore",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "props" => Some(Namespace::Props),
            "statValue" => Some(Namespace::StatValue),
            "leaderboardEntryScore" => Some(Namespace::LeaderboardEntryScore),
            _ => None,
        }
    }
}

/// An indirect source filtered down to one key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndirectSource {
    pub namespace: Namespace,
    pub key: String,
}

impl fmt::Display for IndirectSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace.prefix(), self.key)
    }
}

/// Resolved field reference: the access path a comparison takes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldRef {
    Direct(DirectField),
    Indirect(IndirectSource),
}

impl FieldRef {
    pub fn namespace(&self) -> Option<Namespace> {
        match self {
            FieldRef::Direct(_) => None,
            FieldRef::Indirect(source) => Some(source.namespace),
        }
    }
}

impl FromStr for FieldRef {
    type Err = RuleError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| RuleError::InvalidField {
            field: raw.to_string(),
            reason: reason.to_string(),
        };

        // Keys may themselves contain dots, only the first one separates the namespace.
        match raw.split_once('.') {
            Some((prefix, key)) => {
                let namespace = Namespace::from_prefix(prefix)
                    .ok_or_else(|| invalid(&format!("unknown namespace '{prefix}'")))?;
                if key.trim().is_empty() {
                    return Err(invalid("missing key after namespace"));
                }
                Ok(FieldRef::Indirect(IndirectSource {
                    namespace,
                    key: key.to_string(),
                }))
            }
            None => DirectField::from_name(raw)
                .map(FieldRef::Direct)
                .ok_or_else(|| invalid("unknown player attribute")),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRef::Direct(field) => f.write_str(field.name()),
            FieldRef::Indirect(source) => source.fmt(f),
        }
    }
}
