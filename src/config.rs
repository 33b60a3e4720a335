use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::common::constants::DEFAULT_HOME_COUNTRY;
use crate::common::error::{Result, ScoringError};
use crate::pipeline::processing::normalize::TidyPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "lattes_scorer.toml";
pub const CONFIG_ENV_VAR: &str = "LATTES_SCORER_CONFIG";

/// Run configuration, loaded once per batch and shared read-only by every stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Base for every relative path; defaults to the config file's directory
    #[serde(default)]
    pub base_path: Option<PathBuf>,
    #[serde(default = "default_documents_dir")]
    pub documents_dir: PathBuf,
    #[serde(default = "default_extension")]
    pub document_extension: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_home_country")]
    pub home_country: String,
    /// Year the doctorate recency bonus is measured against
    #[serde(default = "default_reference_year")]
    pub reference_year: i32,
    #[serde(default)]
    pub evaluation_years: Vec<String>,
    /// Whitespace- or comma-separated years, merged with `evaluation_years`
    #[serde(default)]
    pub evaluation_years_file: Option<PathBuf>,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_timeout")]
    pub document_timeout_secs: u64,
    pub references: ReferencePaths,
    /// Overrides of the built-in tidy policies, keyed by table name
    #[serde(default)]
    pub policies: BTreeMap<String, TidyPolicy>,
}

/// Locations of the external reference tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferencePaths {
    pub scoring_rules: PathBuf,
    #[serde(default)]
    pub personnel: Option<PathBuf>,
    #[serde(default)]
    pub external_evaluation: Option<PathBuf>,
    #[serde(default)]
    pub name_index: Option<PathBuf>,
    #[serde(default)]
    pub columns: ReferenceColumns,
}

/// Header names in the institutional spreadsheets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceColumns {
    pub personnel_tax_id: String,
    pub personnel_registration: String,
    pub personnel_unit: String,
    pub evaluation_tax_id: String,
    pub evaluation_count: String,
    pub rule_kind: String,
    pub rule_nature: String,
    pub rule_origin: String,
    pub rule_points: String,
    pub rule_cap: String,
    pub rule_category: String,
}

impl Default for ReferenceColumns {
    fn default() -> Self {
        Self {
            personnel_tax_id: "CPF".to_string(),
            personnel_registration: "Matrícula".to_string(),
            personnel_unit: "Lotação".to_string(),
            evaluation_tax_id: "CPF_NUMERO".to_string(),
            evaluation_count: "AVALIACOES".to_string(),
            rule_kind: "PRODUCAO".to_string(),
            rule_nature: "NATUREZA".to_string(),
            rule_origin: "flag_Nacional".to_string(),
            rule_points: "PONTOS".to_string(),
            rule_cap: "MAX".to_string(),
            rule_category: "LATTES".to_string(),
        }
    }
}

fn default_documents_dir() -> PathBuf {
    PathBuf::from("CVs")
}

fn default_extension() -> String {
    "xml".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_home_country() -> String {
    DEFAULT_HOME_COUNTRY.to_string()
}

fn default_reference_year() -> i32 {
    chrono::Local::now().year()
}

fn default_workers() -> usize {
    4
}

fn default_timeout() -> u64 {
    30
}

impl ScoringConfig {
    /// Chooses the config file: explicit path, then the environment, then the default name.
    pub fn locate(explicit: Option<&Path>) -> PathBuf {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Reads, resolves and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ScoringError::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let mut config: ScoringConfig = toml::from_str(&content)?;

        if config.base_path.is_none() {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            config.base_path = Some(dir);
        }
        config.resolve_paths();
        config.load_year_file()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str, base: &Path) -> Result<Self> {
        let mut config: ScoringConfig = toml::from_str(content)?;
        if config.base_path.is_none() {
            config.base_path = Some(base.to_path_buf());
        }
        config.resolve_paths();
        config.load_year_file()?;
        config.validate()?;
        Ok(config)
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_path {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn resolve_paths(&mut self) {
        self.documents_dir = self.resolve(&self.documents_dir);
        self.output_dir = self.resolve(&self.output_dir);
        self.evaluation_years_file = self.evaluation_years_file.as_deref().map(|p| self.resolve(p));
        let refs = &self.references;
        let resolved = ReferencePaths {
            scoring_rules: self.resolve(&refs.scoring_rules),
            personnel: refs.personnel.as_deref().map(|p| self.resolve(p)),
            external_evaluation: refs.external_evaluation.as_deref().map(|p| self.resolve(p)),
            name_index: refs.name_index.as_deref().map(|p| self.resolve(p)),
            columns: refs.columns.clone(),
        };
        self.references = resolved;
    }

    fn load_year_file(&mut self) -> Result<()> {
        let Some(path) = &self.evaluation_years_file else {
            return Ok(());
        };
        let content = fs::read_to_string(path).map_err(|e| {
            ScoringError::config(format!(
                "Failed to read evaluation years file '{}': {}",
                path.display(),
                e
            ))
        })?;
        self.evaluation_years.extend(
            content
                .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.evaluation_years.is_empty() {
            return Err(ScoringError::config("at least one evaluation year is required"));
        }
        if self.workers == 0 {
            return Err(ScoringError::config("workers must be at least 1"));
        }
        if self.document_timeout_secs == 0 {
            return Err(ScoringError::config("document_timeout_secs must be at least 1"));
        }
        if !self.references.scoring_rules.is_file() {
            return Err(ScoringError::config(format!(
                "scoring rules table not found: {}",
                self.references.scoring_rules.display()
            )));
        }
        Ok(())
    }

    pub fn evaluation_year_set(&self) -> BTreeSet<String> {
        self.evaluation_years
            .iter()
            .map(|y| y.trim().to_string())
            .filter(|y| !y.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_rules(dir: &Path) {
        fs::write(
            dir.join("rules.csv"),
            "LATTES,PRODUCAO,NATUREZA,flag_Nacional,PONTOS,MAX\n",
        )
        .unwrap();
    }

    #[test]
    fn test_load_applies_defaults_and_resolves_paths() {
        let dir = TempDir::new().unwrap();
        write_rules(dir.path());
        let path = dir.path().join("lattes_scorer.toml");
        fs::write(
            &path,
            r#"
evaluation_years = ["2019", "2020"]
reference_year = 2020

[references]
scoring_rules = "rules.csv"
personnel = "servidores.csv"
"#,
        )
        .unwrap();

        let config = ScoringConfig::load(&path).unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.document_timeout_secs, 30);
        assert_eq!(config.home_country, "Brasil");
        assert_eq!(config.document_extension, "xml");
        assert_eq!(config.documents_dir, dir.path().join("CVs"));
        assert_eq!(config.references.scoring_rules, dir.path().join("rules.csv"));
        assert_eq!(config.references.personnel, Some(dir.path().join("servidores.csv")));
        assert_eq!(config.references.columns.personnel_unit, "Lotação");
        assert_eq!(config.evaluation_year_set().len(), 2);
    }

    #[test]
    fn test_missing_rules_table_is_fatal() {
        let dir = TempDir::new().unwrap();
        let result = ScoringConfig::from_toml_str(
            r#"
evaluation_years = ["2020"]
[references]
scoring_rules = "absent.csv"
"#,
            dir.path(),
        );
        assert!(matches!(result, Err(ScoringError::Configuration(_))));
    }

    #[test]
    fn test_years_file_is_merged() {
        let dir = TempDir::new().unwrap();
        write_rules(dir.path());
        fs::write(dir.path().join("years.txt"), "2017, 2018\n2019\n").unwrap();
        let config = ScoringConfig::from_toml_str(
            r#"
evaluation_years_file = "years.txt"
[references]
scoring_rules = "rules.csv"
"#,
            dir.path(),
        )
        .unwrap();
        let years: Vec<_> = config.evaluation_year_set().into_iter().collect();
        assert_eq!(years, ["2017", "2018", "2019"]);
    }

    #[test]
    fn test_no_years_is_rejected() {
        let dir = TempDir::new().unwrap();
        write_rules(dir.path());
        let result = ScoringConfig::from_toml_str(
            "[references]\nscoring_rules = \"rules.csv\"\n",
            dir.path(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_policy_overrides_parse() {
        let dir = TempDir::new().unwrap();
        write_rules(dir.path());
        let config = ScoringConfig::from_toml_str(
            r#"
evaluation_years = ["2020"]
workers = 2
[references]
scoring_rules = "rules.csv"
[policies.bibliographic]
wanted = ["ANO", "PRODUCAO"]
"#,
            dir.path(),
        )
        .unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.policies["bibliographic"].wanted.len(), 2);
    }
}
