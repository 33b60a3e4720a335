use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::common::constants::{REGISTRATION_COLUMN, UNIT_COLUMN};
use crate::domain::{OriginFlag, ProductionItem, ProfileData, ScoreKey, ScoringRule, Table};
use crate::observability::metrics;
use crate::pipeline::reference::ReferenceData;

/// A production item with its scoring key and the rule it matched, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleMatch {
    pub item: ProductionItem,
    pub key: ScoreKey,
    /// `None` when the rule table has no row for the key
    pub rule: Option<ScoringRule>,
}

/// Left-joins records against the read-only reference tables.
#[derive(Debug, Clone)]
pub struct ReferenceJoiner {
    references: Arc<ReferenceData>,
    home_country: String,
}

impl ReferenceJoiner {
    pub fn new(references: Arc<ReferenceData>, home_country: impl Into<String>) -> Self {
        Self {
            references,
            home_country: home_country.into(),
        }
    }

    pub fn origin(&self, country: &str) -> OriginFlag {
        OriginFlag::classify(country, &self.home_country)
    }

    /// Adds registration and unit columns from the personnel registry, keyed
    /// on `tax_id_column`. Unmatched rows keep empty values.
    pub fn join_personnel(&self, table: &mut Table, tax_id_column: &str) {
        table.ensure_column(REGISTRATION_COLUMN);
        table.ensure_column(UNIT_COLUMN);
        for row in 0..table.len() {
            let tax_id = table.get(row, tax_id_column).to_string();
            match self.references.personnel_for(&tax_id) {
                Some(record) => {
                    table.set(row, REGISTRATION_COLUMN, record.registration.clone());
                    table.set(row, UNIT_COLUMN, record.unit.clone());
                    metrics::enrich::personnel(true);
                }
                None => metrics::enrich::personnel(false),
            }
        }
    }

    /// Fills the profile's registration and unit from the personnel registry.
    pub fn enrich_profile(&self, profile: &mut ProfileData) {
        let record = self.references.personnel_for(&profile.tax_id);
        metrics::enrich::personnel(record.is_some());
        profile.registration = record.map(|r| r.registration.clone());
        profile.unit = record.map(|r| r.unit.clone());
    }

    /// Keys each item by (kind, nature, origin) and looks up its rule.
    pub fn join_rules(&self, items: Vec<ProductionItem>) -> Vec<RuleMatch> {
        let matches: Vec<RuleMatch> = items
            .into_iter()
            .map(|item| {
                let key = ScoreKey::new(&item.kind, &item.nature, self.origin(&item.country));
                let rule = self.references.rule(&key).cloned();
                RuleMatch { item, key, rule }
            })
            .collect();

        let misses = matches.iter().filter(|m| m.rule.is_none()).count();
        if misses > 0 {
            debug!(misses, total = matches.len(), "Items without a scoring rule");
        }
        metrics::enrich::rule_misses(misses as u64);
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ScoreSource;
    use crate::pipeline::reference::PersonnelRecord;
    use std::collections::BTreeMap;

    fn references() -> Arc<ReferenceData> {
        let mut rules = BTreeMap::new();
        rules.insert(
            ScoreKey::new("ARTIGO", "COMPLETO", OriginFlag::Domestic),
            ScoringRule {
                category: "A".to_string(),
                points_per_item: 10.0,
                cap: Some(50.0),
            },
        );
        let personnel = [(
            "111".to_string(),
            PersonnelRecord {
                registration: "999".to_string(),
                unit: "UAF".to_string(),
            },
        )]
        .into_iter()
        .collect();
        Arc::new(ReferenceData {
            rules,
            personnel: Some(personnel),
            ..ReferenceData::default()
        })
    }

    fn item(kind: &str, nature: &str, country: &str) -> ProductionItem {
        ProductionItem {
            source: ScoreSource::Bibliographic,
            kind: kind.to_string(),
            nature: nature.to_string(),
            subtype: String::new(),
            year: "2020".to_string(),
            country: country.to_string(),
            sequence: "1".to_string(),
            title: String::new(),
            extras: BTreeMap::new(),
        }
    }

    #[test]
    fn test_rule_join_uses_origin_flag() {
        let joiner = ReferenceJoiner::new(references(), "Brasil");
        let matches = joiner.join_rules(vec![
            item("ARTIGO", "COMPLETO", "Brasil"),
            item("ARTIGO", "COMPLETO", "Chile"),
            item("ARTIGO", "COMPLETO", ""),
        ]);
        assert!(matches[0].rule.is_some());
        assert_eq!(matches[1].key.origin, OriginFlag::Foreign);
        assert!(matches[1].rule.is_none());
        assert_eq!(matches[2].key.origin, OriginFlag::Unspecified);
    }

    #[test]
    fn test_personnel_join_keeps_unmatched_rows() {
        let joiner = ReferenceJoiner::new(references(), "Brasil");
        let mut table = Table::new(vec!["CPF".to_string()]);
        table.push_row(vec!["00111".to_string()]);
        table.push_row(vec!["222".to_string()]);
        joiner.join_personnel(&mut table, "CPF");
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, REGISTRATION_COLUMN), "999");
        assert_eq!(table.get(0, UNIT_COLUMN), "UAF");
        assert_eq!(table.get(1, REGISTRATION_COLUMN), "");
    }

    #[test]
    fn test_profile_enrichment_without_registry() {
        let joiner = ReferenceJoiner::new(Arc::new(ReferenceData::default()), "Brasil");
        let mut profile = ProfileData {
            tax_id: "111".to_string(),
            ..ProfileData::default()
        };
        joiner.enrich_profile(&mut profile);
        assert_eq!(profile.registration, None);
        assert_eq!(profile.unit, None);
    }
}
