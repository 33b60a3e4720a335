//! The tidy pass: reconciles heterogeneous record batches into one table schema.

pub mod policies;

pub use policies::{PolicyRegistry, TidyPolicy};

use tracing::debug;

use crate::domain::{RawRecord, Table};
use crate::observability::metrics;

/// True when `column` contains any of `patterns` as a substring.
pub fn matches_any(column: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| column.contains(p.as_str()))
}

/// Applies [`TidyPolicy`] instructions in their fixed order:
/// keep, noise, rename, merge, select.
#[derive(Debug, Clone, Default)]
pub struct ColumnNormalizer;

impl ColumnNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Builds a table from records (kind under `kind_column`) and tidies it.
    pub fn tidy_records(
        &self,
        records: &[RawRecord],
        kind_column: &str,
        policy: &TidyPolicy,
    ) -> Option<Table> {
        if records.is_empty() {
            metrics::normalize::empty_input();
            return None;
        }
        self.tidy(Table::from_records(records, kind_column), policy)
    }

    /// `None` for an empty input, so callers can tell "nothing to process"
    /// from "processed to zero rows".
    pub fn tidy(&self, mut table: Table, policy: &TidyPolicy) -> Option<Table> {
        if table.is_empty() {
            metrics::normalize::empty_input();
            return None;
        }
        let before = table.columns().len();

        for column in &policy.keep {
            table.ensure_column(column);
        }

        // noise goes before rename so a dropped column is never renamed back in
        table.retain_columns(|c| !matches_any(c, &policy.noise));

        rename_columns(&mut table, policy);
        merge_columns(&mut table, &policy.merge);

        if !policy.wanted.is_empty() {
            table.retain_columns(|c| matches_any(c, &policy.wanted));
        }

        let after = table.columns().len();
        debug!(before, after, rows = table.len(), "Table tidied");
        metrics::normalize::table_processed();
        metrics::normalize::columns_dropped(before.saturating_sub(after) as u64);
        Some(table)
    }
}

/// Renames per the policy map. The destination always exists afterwards; when
/// it already existed, its empty cells are filled from the source.
fn rename_columns(table: &mut Table, policy: &TidyPolicy) {
    for (from, to) in &policy.rename {
        if from == to || !table.has_column(from) {
            table.ensure_column(to);
        } else if table.has_column(to) {
            table.fill_empty_from(to, from);
            table.drop_column(from);
        } else {
            table.rename_column(from, to);
        }
    }
}

/// Collapses, for each aggregate, every column whose name contains it into the
/// first candidate in sorted order. Earlier candidates win on conflicts.
///
/// A column named after another aggregate is never absorbed, so a second
/// pass leaves the table unchanged.
pub fn merge_columns(table: &mut Table, aggregates: &[String]) {
    let mut aggregates: Vec<&String> = aggregates.iter().collect();
    aggregates.sort();
    aggregates.dedup();

    for &aggregate in &aggregates {
        let mut candidates: Vec<String> = table
            .columns()
            .iter()
            .filter(|c| c.contains(aggregate.as_str()))
            .filter(|c| *c == aggregate || !aggregates.iter().any(|a| *a == *c))
            .cloned()
            .collect();
        candidates.push(aggregate.clone());
        candidates.sort();
        candidates.dedup();

        let canonical = candidates[0].clone();
        table.ensure_column(&canonical);
        for other in &candidates[1..] {
            table.fill_empty_from(&canonical, other);
            table.drop_column(other);
        }
    }
}
