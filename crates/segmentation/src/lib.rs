//! Player segmentation engine — compiles declarative group rules into
//! predicates, evaluates them against a player store, and keeps group
//! membership in sync with rule edits and player writes.

pub mod builder;
pub mod cast;
pub mod compiler;
pub mod engine;
pub mod error;
pub mod field;
pub mod memory;
pub mod predicates;
pub mod rule;
pub mod sql;
pub mod store;
pub mod sync;

pub use builder::RuleSetBuilder;
pub use cast::CastType;
pub use compiler::{compile, compile_rule_set};
pub use engine::SegmentEvaluator;
pub use error::{RuleError, RuleViolation, SegmentError, SegmentResult, StorageError};
pub use memory::{Dataset, MemoryStore};
pub use rule::{LogicalMode, Operator, Rule, RuleSet};
pub use store::{Group, GroupStore, GroupSummary, PlayerStore, SegmentQuery};
pub use sync::{MembershipDiff, MembershipSynchronizer};
