use std::collections::BTreeSet;
use tracing::debug;

use crate::common::constants::YEAR_COLUMN;
use crate::domain::Table;
use crate::observability::metrics;

/// Keeps rows whose year is one of the years under evaluation.
#[derive(Debug, Clone)]
pub struct PeriodFilter {
    years: BTreeSet<String>,
    column: String,
}

impl PeriodFilter {
    pub fn new(years: BTreeSet<String>) -> Self {
        Self {
            years,
            column: YEAR_COLUMN.to_string(),
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    pub fn years(&self) -> &BTreeSet<String> {
        &self.years
    }

    /// Exact string membership; rows with a missing year are dropped.
    pub fn apply(&self, table: &mut Table) {
        let before = table.len();
        let column = self.column.as_str();
        table.retain_rows(|t, row| {
            let year = t.get(row, column);
            !year.is_empty() && self.years.contains(year)
        });
        let kept = table.len();
        debug!(kept, dropped = before - kept, "Period filter applied");
        metrics::filter::rows(kept as u64, (before - kept) as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn years(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn table_of(values: &[&str]) -> Table {
        let mut table = Table::new(vec![YEAR_COLUMN.to_string()]);
        for v in values {
            table.push_row(vec![v.to_string()]);
        }
        table
    }

    #[test]
    fn excludes_year_outside_set() {
        let filter = PeriodFilter::new(years(&["2017", "2018", "2019", "2020"]));
        let mut table = table_of(&["2016", "2018"]);
        filter.apply(&mut table);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(0, YEAR_COLUMN), "2018");
    }

    #[test]
    fn includes_year_when_configured() {
        let filter = PeriodFilter::new(years(&["2016"]));
        let mut table = table_of(&["2016", "", " 2016"]);
        filter.apply(&mut table);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn missing_column_drops_everything() {
        let filter = PeriodFilter::new(years(&["2020"])).with_column("ANO-DE-CONCLUSAO");
        let mut table = table_of(&["2020"]);
        filter.apply(&mut table);
        assert!(table.is_empty());
    }
}
