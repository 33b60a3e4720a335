use serde::{Deserialize, Serialize};

use super::RawRecord;

/// Rectangular table of string cells. An empty cell means "missing".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Builds a table from records; columns appear in first-seen order,
    /// starting with the kind column.
    pub fn from_records(records: &[RawRecord], kind_column: &str) -> Self {
        let mut table = Table::new(vec![kind_column.to_string()]);
        for record in records {
            for key in record.fields.keys() {
                table.ensure_column(key);
            }
        }
        for record in records {
            let row = table
                .columns
                .iter()
                .map(|column| {
                    if column == kind_column {
                        record.kind.clone()
                    } else {
                        record.fields.get(column).cloned().unwrap_or_default()
                    }
                })
                .collect();
            table.rows.push(row);
        }
        table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    /// Cell value, or "" when the row or column does not exist.
    pub fn get(&self, row: usize, column: &str) -> &str {
        self.column_index(column)
            .and_then(|idx| self.rows.get(row).and_then(|r| r.get(idx)))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn set(&mut self, row: usize, column: &str, value: impl Into<String>) {
        let idx = self.ensure_column(column);
        if let Some(r) = self.rows.get_mut(row) {
            r[idx] = value.into();
        }
    }

    pub fn push_row(&mut self, values: Vec<String>) {
        let mut values = values;
        values.resize(self.columns.len(), String::new());
        self.rows.push(values);
    }

    /// Adds an all-empty column if absent and returns its index.
    pub fn ensure_column(&mut self, column: &str) -> usize {
        if let Some(idx) = self.column_index(column) {
            return idx;
        }
        self.columns.push(column.to_string());
        for row in &mut self.rows {
            row.push(String::new());
        }
        self.columns.len() - 1
    }

    pub fn drop_column(&mut self, column: &str) {
        if let Some(idx) = self.column_index(column) {
            self.columns.remove(idx);
            for row in &mut self.rows {
                row.remove(idx);
            }
        }
    }

    /// Keeps only the columns for which `keep` returns true, preserving order.
    pub fn retain_columns<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        let mask: Vec<bool> = self.columns.iter().map(|c| keep(c)).collect();
        let mut i = 0;
        self.columns.retain(|_| {
            let k = mask[i];
            i += 1;
            k
        });
        for row in &mut self.rows {
            let mut i = 0;
            row.retain(|_| {
                let k = mask[i];
                i += 1;
                k
            });
        }
    }

    pub fn rename_column(&mut self, from: &str, to: &str) {
        if let Some(idx) = self.column_index(from) {
            self.columns[idx] = to.to_string();
        }
    }

    /// Fills the empty cells of `target` from `source`, row by row.
    pub fn fill_empty_from(&mut self, target: &str, source: &str) {
        let (Some(t), Some(s)) = (self.column_index(target), self.column_index(source)) else {
            return;
        };
        for row in &mut self.rows {
            if row[t].is_empty() && !row[s].is_empty() {
                row[t] = row[s].clone();
            }
        }
    }

    /// Keeps only the rows for which `keep` returns true.
    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(&Table, usize) -> bool,
    {
        let mask: Vec<bool> = (0..self.rows.len()).map(|i| keep(self, i)).collect();
        let mut i = 0;
        self.rows.retain(|_| {
            let k = mask[i];
            i += 1;
            k
        });
    }

    /// Row-wise concatenation; columns unknown to `self` are appended.
    pub fn append(&mut self, other: &Table) {
        for column in &other.columns {
            self.ensure_column(column);
        }
        for row in 0..other.len() {
            let values = self
                .columns
                .iter()
                .map(|c| other.get(row, c).to_string())
                .collect();
            self.rows.push(values);
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &[String]> {
        self.rows.iter().map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: &str, fields: &[(&str, &str)]) -> RawRecord {
        let mut r = RawRecord::new(kind);
        for (k, v) in fields {
            r.fields.insert(k.to_string(), v.to_string());
        }
        r
    }

    #[test]
    fn from_records_unions_columns() {
        let table = Table::from_records(
            &[
                record("ARTIGO", &[("ANO", "2020")]),
                record("LIVRO", &[("ISBN", "123")]),
            ],
            "PRODUCAO",
        );
        assert_eq!(table.columns(), ["PRODUCAO", "ANO", "ISBN"]);
        assert_eq!(table.get(0, "ISBN"), "");
        assert_eq!(table.get(1, "PRODUCAO"), "LIVRO");
    }

    #[test]
    fn fill_and_drop() {
        let mut table = Table::new(vec!["A".into(), "B".into()]);
        table.push_row(vec!["".into(), "x".into()]);
        table.push_row(vec!["y".into(), "z".into()]);
        table.fill_empty_from("A", "B");
        table.drop_column("B");
        assert_eq!(table.columns(), ["A"]);
        assert_eq!(table.get(0, "A"), "x");
        assert_eq!(table.get(1, "A"), "y");
    }

    #[test]
    fn retain_rows_by_value() {
        let mut table = Table::new(vec!["ANO".into()]);
        for year in ["2019", "2020", ""] {
            table.push_row(vec![year.into()]);
        }
        table.retain_rows(|t, i| t.get(i, "ANO") == "2020");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn append_aligns_columns() {
        let mut a = Table::new(vec!["X".into()]);
        a.push_row(vec!["1".into()]);
        let mut b = Table::new(vec!["Y".into()]);
        b.push_row(vec!["2".into()]);
        a.append(&b);
        assert_eq!(a.columns(), ["X", "Y"]);
        assert_eq!(a.get(0, "Y"), "");
        assert_eq!(a.get(1, "Y"), "2");
    }
}
