use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::common::constants::*;

/// Five ordered column instructions for one section table.
///
/// All name matching except `rename` is substring containment and
/// case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TidyPolicy {
    /// Columns that must exist, created empty when missing
    pub keep: Vec<String>,
    /// Columns whose name contains any of these are dropped
    pub noise: Vec<String>,
    /// Exact old name to new name
    pub rename: BTreeMap<String, String>,
    /// Aggregate names whose near-duplicate columns collapse into one
    pub merge: Vec<String>,
    /// Final selection; empty keeps everything
    pub wanted: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

const NOISE: &[&str] = &["INGLES", "CODIGO", "FLAG", "HOME", "CIDADE", "PAGINA"];

impl TidyPolicy {
    pub fn degrees() -> Self {
        Self {
            keep: Vec::new(),
            noise: strings(&["INGLES", "CODIGO", "FLAG", "ORIENTADOR", "OUTRA", "TITULO"]),
            rename: BTreeMap::new(),
            merge: strings(&["TIPO", DEGREE_INSTITUTION_COLUMN]),
            wanted: Vec::new(),
        }
    }

    pub fn bibliographic() -> Self {
        let rename = [
            ("TITULO-DO-PERIODICO-OU-REVISTA", "REVISTA"),
            ("TITULO-DOS-ANAIS-OU-PROCEEDINGS", "REVISTA-PROC"),
            ("TITULO-DO-JORNAL-OU-REVISTA", "REVISTA-JORNAL"),
            ("ISBN", "ISSN-ISBN-1"),
            ("ISSN", "ISSN-ISBN-2"),
        ]
        .into_iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect();

        Self {
            keep: strings(&[
                KIND_COLUMN, "TIPO", NATURE_COLUMN, TITLE_COLUMN, YEAR_COLUMN, COUNTRY_COLUMN,
                "MEIO", "DOI", "REVISTA", "CLASSIFICACAO", "NOME", "EDITORA", "ISSN-ISBN",
                "ISSN", "ISBN",
            ]),
            noise: strings(NOISE),
            rename,
            merge: strings(&[YEAR_COLUMN, TITLE_COLUMN, COUNTRY_COLUMN, "REVISTA", "MEIO", "ISSN-ISBN"]),
            wanted: strings(&[
                SEQUENCE_COLUMN, KIND_COLUMN, NATURE_COLUMN, "CLASSIFICACAO", "TIPO",
                TITLE_COLUMN, YEAR_COLUMN, COUNTRY_COLUMN, "REVISTA", "DOI", "ISBN", "NOME",
            ]),
        }
    }

    /// Typed walk of the technical section.
    pub fn technical() -> Self {
        let columns = strings(&[
            YEAR_COLUMN, KIND_COLUMN, SEQUENCE_COLUMN, TECHNICAL_TYPE_COLUMN, NATURE_COLUMN,
            COUNTRY_COLUMN, "IDIOMA", "DOI", "FINALIDADE", FUNDING_ATTR, TITLE_COLUMN,
            "NOME-COMPLETO-DO-AUTOR", "CATEGORIA", "TIPO-PRODUTO",
        ]);
        let mut wanted = columns.clone();
        wanted.push(FUNDING_COLUMN.to_string());

        Self {
            keep: columns,
            noise: strings(NOISE),
            rename: [(FUNDING_ATTR.to_string(), FUNDING_COLUMN.to_string())].into_iter().collect(),
            merge: strings(&[YEAR_COLUMN, TITLE_COLUMN, COUNTRY_COLUMN]),
            wanted,
        }
    }

    /// Generic walk of the technical section, and other production.
    pub fn presentations() -> Self {
        Self {
            keep: strings(&[
                KIND_COLUMN, SEQUENCE_COLUMN, NATURE_COLUMN, TITLE_COLUMN, YEAR_COLUMN,
                COUNTRY_COLUMN, "IDIOMA", "DOI", "TIPO-DE-ORIENTACAO", "NOME-DO-ORIENTANDO",
                "NOME-DA-AGENCIA",
            ]),
            noise: strings(NOISE),
            rename: BTreeMap::new(),
            merge: strings(&[YEAR_COLUMN, TITLE_COLUMN, COUNTRY_COLUMN]),
            wanted: strings(&[
                SEQUENCE_COLUMN, KIND_COLUMN, "TIPO", NATURE_COLUMN, TITLE_COLUMN, YEAR_COLUMN,
                COUNTRY_COLUMN, "IDIOMA", "DOI",
            ]),
        }
    }

    pub fn other() -> Self {
        Self::presentations()
    }

    pub fn complementary() -> Self {
        Self {
            keep: strings(&[
                KIND_COLUMN, SEQUENCE_COLUMN, NATURE_COLUMN, TITLE_COLUMN, YEAR_COLUMN,
                COUNTRY_COLUMN, "IDIOMA", "TIPO-PARTICIPACAO",
            ]),
            ..Self::presentations()
        }
    }
}

/// Tidy policies by table name, seeded with the built-in ones.
#[derive(Debug, Clone)]
pub struct PolicyRegistry {
    policies: BTreeMap<String, TidyPolicy>,
}

pub const DEGREES_POLICY: &str = "degrees";

impl PolicyRegistry {
    pub fn new() -> Self {
        let mut policies = BTreeMap::new();
        policies.insert(DEGREES_POLICY.to_string(), TidyPolicy::degrees());
        policies.insert("bibliographic".to_string(), TidyPolicy::bibliographic());
        policies.insert("presentations".to_string(), TidyPolicy::presentations());
        policies.insert("technical".to_string(), TidyPolicy::technical());
        policies.insert("other".to_string(), TidyPolicy::other());
        policies.insert("complementary".to_string(), TidyPolicy::complementary());
        Self { policies }
    }

    /// Built-ins overlaid with configured overrides.
    pub fn with_overrides(overrides: &BTreeMap<String, TidyPolicy>) -> Self {
        let mut registry = Self::new();
        for (name, policy) in overrides {
            registry.register(name.clone(), policy.clone());
        }
        registry
    }

    pub fn register(&mut self, name: String, policy: TidyPolicy) {
        self.policies.insert(name, policy);
    }

    /// Unknown names fall back to an all-pass policy.
    pub fn get(&self, name: &str) -> TidyPolicy {
        self.policies.get(name).cloned().unwrap_or_default()
    }

    pub fn names(&self) -> Vec<&str> {
        self.policies.keys().map(String::as_str).collect()
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_built_in_policies() {
        let registry = PolicyRegistry::new();
        let names = registry.names();
        for name in ["degrees", "bibliographic", "presentations", "technical", "other", "complementary"] {
            assert!(names.contains(&name), "missing {name}");
        }
    }

    #[test]
    fn test_overrides_replace_built_ins() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "bibliographic".to_string(),
            TidyPolicy {
                wanted: vec!["ANO".to_string()],
                ..TidyPolicy::default()
            },
        );
        let registry = PolicyRegistry::with_overrides(&overrides);
        assert_eq!(registry.get("bibliographic").wanted, vec!["ANO".to_string()]);
        assert_eq!(registry.get("degrees"), TidyPolicy::degrees());
    }

    #[test]
    fn test_policy_parses_from_toml() {
        let policy: TidyPolicy = toml::from_str(
            r#"
            noise = ["INGLES"]
            merge = ["ANO"]
            [rename]
            ISSN = "ISSN-ISBN-2"
            "#,
        )
        .unwrap();
        assert!(policy.keep.is_empty());
        assert_eq!(policy.rename.get("ISSN").map(String::as_str), Some("ISSN-ISBN-2"));
    }
}
