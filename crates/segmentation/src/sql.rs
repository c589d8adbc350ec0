//! SQL rendering of compiled predicates (MySQL dialect) for SQL-backed stores.
//!
//! Every value travels as a bound parameter; only identifiers and operators
//! are written into the statement text.

use player_core::{PlayerId, Scope};

use crate::cast::CastType;
use crate::field::{IndirectSource, Namespace};
use crate::predicates::{CompareOp, Comparison, Predicate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<String>,
}

/// Storage type of a compared column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stored {
    Text,
    Number,
    Timestamp,
}

#[derive(Default)]
struct SqlWriter {
    sql: String,
    params: Vec<String>,
}

impl SqlWriter {
    fn bind(&mut self, value: impl ToString) {
        self.sql.push('?');
        self.params.push(value.to_string());
    }

    fn comparison(&mut self, column: &str, stored: Stored, comparison: &Comparison) {
        if comparison.op == CompareOp::NotNull {
            self.sql.push_str(&format!("{column} IS NOT NULL"));
            return;
        }
        let cast = comparison.cast;
        if stored == Stored::Text {
            if let Some(pattern) = cast.text_guard_pattern() {
                self.sql.push_str(&format!("{column} REGEXP "));
                self.bind(pattern);
                self.sql.push_str(" AND ");
            }
        }
        let ty = cast.sql_type();
        let value = match (stored, cast) {
            (Stored::Timestamp, CastType::Double) => format!("UNIX_TIMESTAMP({column})"),
            (Stored::Number, CastType::Datetime) => "NULL".to_string(),
            _ => format!("CAST({column} AS {ty})"),
        };
        self.sql
            .push_str(&format!("{value} {} CAST(", comparison.op.sql()));
        match &comparison.operand {
            Some(operand) => self.bind(operand),
            None => self.sql.push_str("NULL"),
        }
        self.sql.push_str(&format!(" AS {ty})"));
    }

    /// Opens `SELECT <player id> FROM ... WHERE <key filter>` for a source,
    /// returning the column holding the compared value.
    fn subquery_head(&mut self, source: &IndirectSource) -> (&'static str, Stored) {
        match source.namespace {
            Namespace::Props => {
                self.sql
                    .push_str("SELECT pp.player_id FROM player_props pp WHERE pp.key = ");
                self.bind(&source.key);
                ("pp.value", Stored::Text)
            }
            Namespace::StatValue => {
                self.sql.push_str(
                    "SELECT ps.player_id FROM player_game_stats ps \
                     JOIN game_stats gs ON gs.id = ps.stat_id WHERE gs.internal_name = ",
                );
                self.bind(&source.key);
                ("ps.value", Stored::Number)
            }
            Namespace::LeaderboardEntryScore => {
                self.sql.push_str(
                    "SELECT pa.player_id FROM leaderboard_entries le \
                     JOIN leaderboards lb ON lb.id = le.leaderboard_id \
                     JOIN player_aliases pa ON pa.id = le.player_alias_id \
                     WHERE lb.internal_name = ",
                );
                self.bind(&source.key);
                self.sql.push_str(" AND le.hidden = 0");
                ("le.score", Stored::Number)
            }
        }
    }

    fn predicate(&mut self, predicate: &Predicate) {
        match predicate {
            Predicate::All => self.sql.push_str("1 = 1"),
            Predicate::Direct { field, comparison } => {
                self.comparison(&format!("p.{}", field.column()), Stored::Timestamp, comparison)
            }
            Predicate::InSubquery { source, comparison } => {
                self.sql.push_str("p.id IN (");
                let (column, stored) = self.subquery_head(source);
                self.sql.push_str(" AND ");
                self.comparison(column, stored, comparison);
                self.sql.push(')');
            }
            Predicate::NotInSubquery { source } => {
                self.sql.push_str("p.id NOT IN (");
                self.subquery_head(source);
                self.sql.push(')');
            }
            Predicate::Not(inner) => {
                self.sql.push_str("NOT (");
                self.predicate(inner);
                self.sql.push(')');
            }
            Predicate::And(preds) => self.join(preds, " AND ", "1 = 1"),
            Predicate::Or(preds) => self.join(preds, " OR ", "1 = 0"),
        }
    }

    fn join(&mut self, preds: &[Predicate], separator: &str, empty: &str) {
        if preds.is_empty() {
            self.sql.push_str(empty);
            return;
        }
        for (i, pred) in preds.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(separator);
            }
            self.sql.push('(');
            self.predicate(pred);
            self.sql.push(')');
        }
    }

    fn scoped_where(&mut self, predicate: &Predicate, scope: &Scope) {
        self.sql.push_str(" WHERE p.game_id = ");
        self.bind(scope.game_id);
        if !scope.include_dev_data {
            self.sql.push_str(" AND p.dev_build = 0");
        }
        self.sql.push_str(" AND (");
        self.predicate(predicate);
        self.sql.push(')');
    }

    fn finish(self) -> SqlQuery {
        SqlQuery {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// `SELECT COUNT(*)` of players in scope matching the predicate.
pub fn render_count(predicate: &Predicate, scope: &Scope) -> SqlQuery {
    let mut w = SqlWriter::default();
    w.sql.push_str("SELECT COUNT(*) FROM players p");
    w.scoped_where(predicate, scope);
    w.finish()
}

/// One keyset page of matching player ids, ordered by id.
pub fn render_matching_ids(
    predicate: &Predicate,
    scope: &Scope,
    after: Option<PlayerId>,
    limit: usize,
) -> SqlQuery {
    let mut w = SqlWriter::default();
    w.sql.push_str("SELECT p.id FROM players p");
    w.scoped_where(predicate, scope);
    if let Some(after) = after {
        w.sql.push_str(" AND p.id > ");
        w.bind(after);
    }
    w.sql.push_str(" ORDER BY p.id LIMIT ");
    w.bind(limit);
    w.finish()
}
