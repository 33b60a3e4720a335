//! External reference tables, loaded once per batch and read-only afterwards.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{info, warn};

use crate::common::error::{Result, ScoringError};
use crate::config::{ReferenceColumns, ScoringConfig};
use crate::domain::{decode_text, normalize_tax_id, OriginFlag, ScoreKey, ScoringRule};

/// Registration number and unit of one staff member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonnelRecord {
    pub registration: String,
    pub unit: String,
}

/// Everything the scorer looks up, keyed for direct access.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    pub rules: BTreeMap<ScoreKey, ScoringRule>,
    /// Keyed by normalized tax id; `None` when the registry is not configured
    pub personnel: Option<BTreeMap<String, PersonnelRecord>>,
    /// Evaluation count keyed by normalized tax id
    pub external: Option<BTreeMap<String, f64>>,
    pub evaluation_years: BTreeSet<String>,
}

impl ReferenceData {
    /// Loads every configured table. A missing or unreadable rule table is
    /// fatal; an unreadable optional table is disabled with a warning.
    pub fn load(config: &ScoringConfig) -> Result<Self> {
        let refs = &config.references;
        let columns = &refs.columns;

        let rules = load_rules(&refs.scoring_rules, columns).map_err(|e| {
            ScoringError::config(format!(
                "scoring rules table {} could not be loaded: {}",
                refs.scoring_rules.display(),
                e
            ))
        })?;

        let personnel = refs
            .personnel
            .as_deref()
            .and_then(|path| optional("personnel registry", path, load_personnel(path, columns)));
        let external = refs.external_evaluation.as_deref().and_then(|path| {
            optional("external evaluation", path, load_external(path, columns))
        });

        info!(
            rules = rules.len(),
            personnel = personnel.as_ref().map(BTreeMap::len),
            external = external.as_ref().map(BTreeMap::len),
            "Reference tables loaded"
        );

        Ok(Self {
            rules,
            personnel,
            external,
            evaluation_years: config.evaluation_year_set(),
        })
    }

    pub fn rule(&self, key: &ScoreKey) -> Option<&ScoringRule> {
        self.rules.get(key)
    }

    pub fn personnel_for(&self, tax_id: &str) -> Option<&PersonnelRecord> {
        self.personnel.as_ref()?.get(&normalize_tax_id(tax_id))
    }

    /// Evaluation count, `None` when the table is absent or the researcher is not in it.
    pub fn evaluations_for(&self, tax_id: &str) -> Option<f64> {
        self.external.as_ref()?.get(&normalize_tax_id(tax_id)).copied()
    }
}

fn optional<T>(label: &str, path: &Path, loaded: Result<T>) -> Option<T> {
    match loaded {
        Ok(table) => Some(table),
        Err(e) => {
            warn!(table = label, path = %path.display(), error = %e, "Optional reference table disabled");
            None
        }
    }
}

/// A CSV file read into trimmed string cells with its header row.
struct CsvTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CsvTable {
    fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let text = decode_text(&bytes);
        let text = text.trim_start_matches('\u{feff}');
        let delimiter = sniff_delimiter(text);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.iter().map(str::to_string).collect());
        }
        Ok(Self { headers, rows })
    }

    fn column(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ScoringError::MissingField(name.to_string()))
    }
}

fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(String::as_str).unwrap_or("")
}

/// Semicolon when the header line uses it and has no commas, else comma.
fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or("");
    if header.contains(';') && !header.contains(',') {
        b';'
    } else {
        b','
    }
}

/// Accepts `2,5` as well as `2.5`.
fn parse_number(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<f64>()
        .ok()
        .or_else(|| raw.replace(',', ".").parse::<f64>().ok())
}

/// Loads the rule table. Rows repeating a key keep the highest points and cap.
pub fn load_rules(path: &Path, columns: &ReferenceColumns) -> Result<BTreeMap<ScoreKey, ScoringRule>> {
    let table = CsvTable::read(path)?;
    let kind = table.column(&columns.rule_kind)?;
    let nature = table.column(&columns.rule_nature)?;
    let origin = table.column(&columns.rule_origin)?;
    let points = table.column(&columns.rule_points)?;
    let cap = table.column(&columns.rule_cap)?;
    let category = table.column(&columns.rule_category).ok();

    let mut rules: BTreeMap<ScoreKey, ScoringRule> = BTreeMap::new();
    for (line, row) in table.rows.iter().enumerate() {
        let origin_flag = match cell(row, origin).parse::<OriginFlag>() {
            Ok(flag) => flag,
            Err(e) => {
                warn!(line = line + 2, error = %e, "Skipping rule row");
                continue;
            }
        };
        let Some(points_per_item) = parse_number(cell(row, points)) else {
            warn!(line = line + 2, "Skipping rule row without points");
            continue;
        };
        let key = ScoreKey::new(cell(row, kind), cell(row, nature), origin_flag);
        let rule = ScoringRule {
            category: category.map(|c| cell(row, c).to_string()).unwrap_or_default(),
            points_per_item,
            cap: parse_number(cell(row, cap)),
        };

        rules
            .entry(key)
            .and_modify(|existing| {
                existing.points_per_item = existing.points_per_item.max(rule.points_per_item);
                existing.cap = match (existing.cap, rule.cap) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                };
                if existing.category.is_empty() {
                    existing.category = rule.category.clone();
                }
            })
            .or_insert(rule);
    }
    Ok(rules)
}

pub fn load_personnel(
    path: &Path,
    columns: &ReferenceColumns,
) -> Result<BTreeMap<String, PersonnelRecord>> {
    let table = CsvTable::read(path)?;
    let tax_id = table.column(&columns.personnel_tax_id)?;
    let registration = table.column(&columns.personnel_registration)?;
    let unit = table.column(&columns.personnel_unit)?;

    let mut personnel = BTreeMap::new();
    for row in &table.rows {
        let key = normalize_tax_id(cell(row, tax_id));
        if key.is_empty() {
            continue;
        }
        personnel.entry(key).or_insert_with(|| PersonnelRecord {
            registration: cell(row, registration).to_string(),
            unit: cell(row, unit).to_string(),
        });
    }
    Ok(personnel)
}

pub fn load_external(path: &Path, columns: &ReferenceColumns) -> Result<BTreeMap<String, f64>> {
    let table = CsvTable::read(path)?;
    let tax_id = table.column(&columns.evaluation_tax_id)?;
    let count = table.column(&columns.evaluation_count)?;

    let mut external: BTreeMap<String, f64> = BTreeMap::new();
    for row in &table.rows {
        let key = normalize_tax_id(cell(row, tax_id));
        if key.is_empty() {
            continue;
        }
        let evaluations = parse_number(cell(row, count)).unwrap_or(0.0);
        external
            .entry(key)
            .and_modify(|v| *v = v.max(evaluations))
            .or_insert(evaluations);
    }
    Ok(external)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_rules_keep_max_on_duplicates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rules.csv");
        fs::write(
            &path,
            "LATTES,PRODUCAO,NATUREZA,flag_Nacional,PONTOS,MAX\n\
             A1,ARTIGO-PUBLICADO,COMPLETO,Nacional,10,50\n\
             A1,ARTIGO-PUBLICADO,COMPLETO,Nacional,12,40\n\
             B,LIVRO,,Internacional,\"2,5\",\n",
        )
        .unwrap();

        let rules = load_rules(&path, &ReferenceColumns::default()).unwrap();
        let article = rules
            .get(&ScoreKey::new("ARTIGO-PUBLICADO", "COMPLETO", OriginFlag::Domestic))
            .unwrap();
        assert_eq!(article.points_per_item, 12.0);
        assert_eq!(article.cap, Some(50.0));
        assert_eq!(article.category, "A1");

        let book = rules
            .get(&ScoreKey::new("LIVRO", "VAZIO", OriginFlag::Foreign))
            .unwrap();
        assert_eq!(book.points_per_item, 2.5);
        assert_eq!(book.cap, None);
    }

    #[test]
    fn test_semicolon_latin1_personnel() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("servidores.csv");
        let mut bytes = b"CPF;Matr".to_vec();
        bytes.push(0xED); // i-acute
        bytes.extend_from_slice(b"cula;Lota");
        bytes.push(0xE7); // c-cedilla
        bytes.push(0xE3); // a-tilde
        bytes.extend_from_slice(b"o\n012.345.678-90;123456;DEPT FISICA\n");
        fs::write(&path, bytes).unwrap();

        let personnel = load_personnel(&path, &ReferenceColumns::default()).unwrap();
        let record = personnel.get("1234567890").unwrap();
        assert_eq!(record.registration, "123456");
        assert_eq!(record.unit, "DEPT FISICA");
    }

    #[test]
    fn test_missing_header_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("saap.csv");
        fs::write(&path, "CPF,TOTAL\n1,2\n").unwrap();
        let err = load_external(&path, &ReferenceColumns::default()).unwrap_err();
        assert!(matches!(err, ScoringError::MissingField(ref f) if f == "CPF_NUMERO"));
    }

    #[test]
    fn test_lookups_normalize_tax_ids() {
        let mut data = ReferenceData::default();
        data.external = Some([("1234".to_string(), 4.0)].into_iter().collect());
        assert_eq!(data.evaluations_for("0001234"), Some(4.0));
        assert_eq!(data.evaluations_for("999"), None);
        assert!(data.personnel_for("1234").is_none());
    }
}
