//! Domain data shapes shared by every pipeline stage.

pub mod table;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::common::constants::*;
use crate::common::error::ScoringError;

pub use table::Table;

/// The fixed set of curriculum sections the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SectionKind {
    GeneralData,
    Degrees,
    Bibliographic,
    Technical,
    OtherProduction,
    Complementary,
}

impl SectionKind {
    pub const ALL: [SectionKind; 6] = [
        SectionKind::GeneralData,
        SectionKind::Degrees,
        SectionKind::Bibliographic,
        SectionKind::Technical,
        SectionKind::OtherProduction,
        SectionKind::Complementary,
    ];

    /// Element name of the section in the export.
    pub fn tag(&self) -> &'static str {
        match self {
            SectionKind::GeneralData => GENERAL_DATA_TAG,
            SectionKind::Degrees => DEGREES_TAG,
            SectionKind::Bibliographic => BIBLIOGRAPHIC_TAG,
            SectionKind::Technical => TECHNICAL_TAG,
            SectionKind::OtherProduction => OTHER_PRODUCTION_TAG,
            SectionKind::Complementary => COMPLEMENTARY_TAG,
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for SectionKind {
    type Err = ScoringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SectionKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.tag() == s)
            .ok_or_else(|| ScoringError::InvalidSectionKind(s.to_string()))
    }
}

/// The production tables that feed the score, each with its own walk and tidy policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    Bibliographic,
    /// Generic walk of the technical section (presentations and similar items)
    Presentations,
    /// Typed walk of the technical section
    Technical,
    Other,
    Complementary,
}

impl ScoreSource {
    pub const ALL: [ScoreSource; 5] = [
        ScoreSource::Bibliographic,
        ScoreSource::Presentations,
        ScoreSource::Technical,
        ScoreSource::Other,
        ScoreSource::Complementary,
    ];

    pub fn section(&self) -> SectionKind {
        match self {
            ScoreSource::Bibliographic => SectionKind::Bibliographic,
            ScoreSource::Presentations | ScoreSource::Technical => SectionKind::Technical,
            ScoreSource::Other => SectionKind::OtherProduction,
            ScoreSource::Complementary => SectionKind::Complementary,
        }
    }

    /// Column holding the item subtype, when the source has one.
    pub fn subtype_column(&self) -> Option<&'static str> {
        match self {
            ScoreSource::Bibliographic => Some(EVENT_CLASSIFICATION_COLUMN),
            ScoreSource::Technical => Some(TECHNICAL_TYPE_COLUMN),
            ScoreSource::Other => Some(SUPERVISION_TYPE_COLUMN),
            ScoreSource::Presentations | ScoreSource::Complementary => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScoreSource::Bibliographic => "bibliographic",
            ScoreSource::Presentations => "presentations",
            ScoreSource::Technical => "technical",
            ScoreSource::Other => "other",
            ScoreSource::Complementary => "complementary",
        }
    }
}

/// Domestic/foreign/unspecified classification of an item's country.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OriginFlag {
    #[serde(rename = "Nacional")]
    Domestic,
    #[serde(rename = "Internacional")]
    Foreign,
    #[serde(rename = "VAZIO")]
    Unspecified,
}

impl OriginFlag {
    /// Exact textual comparison against the home country; an empty country is unspecified.
    pub fn classify(country: &str, home_country: &str) -> Self {
        if country.is_empty() {
            OriginFlag::Unspecified
        } else if country == home_country {
            OriginFlag::Domestic
        } else {
            OriginFlag::Foreign
        }
    }

    /// Label used in rule tables and outputs.
    pub fn label(&self) -> &'static str {
        match self {
            OriginFlag::Domestic => "Nacional",
            OriginFlag::Foreign => "Internacional",
            OriginFlag::Unspecified => EMPTY_PLACEHOLDER,
        }
    }
}

impl fmt::Display for OriginFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for OriginFlag {
    type Err = ScoringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nacional" | "domestic" => Ok(OriginFlag::Domestic),
            "internacional" | "foreign" => Ok(OriginFlag::Foreign),
            "vazio" | "unspecified" | "" => Ok(OriginFlag::Unspecified),
            other => Err(ScoringError::config(format!("unknown origin flag '{}'", other))),
        }
    }
}

/// One flat record emitted by the extractor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Production or section type the record came from (the item tag)
    pub kind: String,
    /// Within-kind ordinal, when the item carries one
    pub sequence: Option<String>,
    pub fields: BTreeMap<String, String>,
}

impl RawRecord {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    /// Later inserts overwrite earlier ones, so deeper nodes win.
    pub fn extend_attributes<'a, I>(&mut self, attributes: I)
    where
        I: IntoIterator<Item = &'a (String, String)>,
    {
        for (key, value) in attributes {
            self.fields.insert(key.clone(), value.clone());
        }
        if let Some(seq) = self.fields.get(SEQUENCE_COLUMN) {
            self.sequence = Some(seq.clone());
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}

/// A normalized production row turned into a typed item for scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionItem {
    pub source: ScoreSource,
    pub kind: String,
    pub nature: String,
    pub subtype: String,
    pub year: String,
    pub country: String,
    pub sequence: String,
    pub title: String,
    /// Any other column that survived the tidy pass
    pub extras: BTreeMap<String, String>,
}

impl ProductionItem {
    const TYPED_COLUMNS: [&'static str; 6] = [
        KIND_COLUMN,
        NATURE_COLUMN,
        YEAR_COLUMN,
        COUNTRY_COLUMN,
        SEQUENCE_COLUMN,
        TITLE_COLUMN,
    ];

    pub fn from_row(source: ScoreSource, table: &Table, row: usize) -> Self {
        let subtype_column = source.subtype_column();
        let extras = table
            .columns()
            .iter()
            .filter(|c| !Self::TYPED_COLUMNS.contains(&c.as_str()) && Some(c.as_str()) != subtype_column)
            .map(|c| (c.clone(), table.get(row, c).to_string()))
            .filter(|(_, v)| !v.is_empty())
            .collect();

        Self {
            source,
            kind: table.get(row, KIND_COLUMN).to_string(),
            nature: table.get(row, NATURE_COLUMN).to_string(),
            subtype: subtype_column.map(|c| table.get(row, c).to_string()).unwrap_or_default(),
            year: table.get(row, YEAR_COLUMN).to_string(),
            country: table.get(row, COUNTRY_COLUMN).to_string(),
            sequence: table.get(row, SEQUENCE_COLUMN).to_string(),
            title: table.get(row, TITLE_COLUMN).to_string(),
            extras,
        }
    }

    pub fn from_table(source: ScoreSource, table: &Table) -> Vec<Self> {
        (0..table.len()).map(|row| Self::from_row(source, table, row)).collect()
    }
}

/// One academic degree of the researcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegreeEntry {
    pub level: String,
    pub kind: String,
    pub start_year: Option<i32>,
    pub completion_year: Option<i32>,
    pub institution: String,
    pub course: String,
    pub status: String,
}

impl DegreeEntry {
    pub fn from_row(table: &Table, row: usize) -> Self {
        Self {
            level: table.get(row, DEGREE_COLUMN).to_string(),
            kind: table.get(row, "TIPO").to_string(),
            start_year: parse_year(table.get(row, START_YEAR_COLUMN)),
            completion_year: parse_year(table.get(row, COMPLETION_YEAR_COLUMN)),
            institution: table.get(row, DEGREE_INSTITUTION_COLUMN).to_string(),
            course: table.get(row, COURSE_COLUMN).to_string(),
            status: table.get(row, COURSE_STATUS_COLUMN).to_string(),
        }
    }

    pub fn from_table(table: &Table) -> Vec<Self> {
        (0..table.len()).map(|row| Self::from_row(table, row)).collect()
    }

    pub fn is_doctorate(&self) -> bool {
        self.level == DOCTORATE
    }
}

/// Latest doctorate completion year among the degrees, if any.
pub fn doctorate_year(degrees: &[DegreeEntry]) -> Option<i32> {
    degrees
        .iter()
        .filter(|d| d.is_doctorate())
        .filter_map(|d| d.completion_year)
        .max()
}

/// Personal and institutional data of the researcher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileData {
    pub identifier: String,
    pub name: String,
    pub tax_id: String,
    pub last_update: Option<NaiveDate>,
    pub institution: String,
    pub registration: Option<String>,
    pub unit: Option<String>,
    pub areas: Vec<String>,
    pub birth_country: String,
    pub birth_state: String,
    pub birth_date: String,
    pub sex: String,
    pub race: String,
}

/// Submission metadata carried by the document path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionInfo {
    /// File stem after the first '-'
    pub project_id: String,
    /// Parent directory name up to its first '-'
    pub call: String,
}

impl SubmissionInfo {
    pub fn from_path(path: &Path) -> Self {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let project_id = stem.split_once('-').map(|(_, rest)| rest.to_string()).unwrap_or_default();
        let call = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|s| s.to_str())
            .and_then(|name| name.split('-').next())
            .unwrap_or_default()
            .to_string();
        Self { project_id, call }
    }
}

static LEADING_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+").expect("valid regex"));

/// Tax id encoded in a submission file name such as `01234567890-PROJ.xml`.
pub fn tax_id_from_file_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    LEADING_DIGITS.find(name).map(|m| m.as_str().to_string())
}

/// Digits only, leading zeros stripped, so spreadsheet exports still match.
pub fn normalize_tax_id(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() && !digits.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Trimmed, upper-cased, accent-free form used to compare researcher names.
pub fn canonical_name(name: &str) -> String {
    deunicode::deunicode(name.trim()).to_uppercase()
}

/// Input files are either UTF-8 or ISO-8859-1; anything that is not valid
/// UTF-8 is read byte-per-char as Latin-1.
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

pub fn parse_year(raw: &str) -> Option<i32> {
    raw.trim().parse::<i32>().ok()
}

/// Key of a scoring rule and of a score group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScoreKey {
    pub kind: String,
    pub nature: String,
    pub origin: OriginFlag,
}

impl ScoreKey {
    /// Empty kind or nature become the placeholder so rule tables can key on them.
    pub fn new(kind: &str, nature: &str, origin: OriginFlag) -> Self {
        let fill = |v: &str| {
            if v.is_empty() {
                EMPTY_PLACEHOLDER.to_string()
            } else {
                v.to_string()
            }
        };
        Self {
            kind: fill(kind),
            nature: fill(nature),
            origin,
        }
    }
}

/// Points and cap for one (kind, nature, origin) combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRule {
    /// Institutional category label of the rule
    pub category: String,
    pub points_per_item: f64,
    /// None means uncapped
    pub cap: Option<f64>,
}

/// One output row per researcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeScore {
    pub area: String,
    pub identifier: String,
    pub tax_id: String,
    pub name: String,
    pub doctorate_year: Option<i32>,
    pub raw_production_score: f64,
    pub production_score: f64,
    pub external_evaluation_bonus: f64,
    pub composite_score: f64,
}

/// A document excluded from scoring, with whatever identifiers could be recovered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemDocument {
    pub path: String,
    pub identifier: Option<String>,
    pub tax_id: Option<String>,
    pub name: Option<String>,
    pub reason: String,
}

impl ProblemDocument {
    pub fn bare(path: &Path, reason: impl Into<String>) -> Self {
        Self {
            path: path.display().to_string(),
            identifier: None,
            tax_id: None,
            name: None,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn section_kind_round_trips_through_tag() {
        for kind in SectionKind::ALL {
            assert_eq!(kind.tag().parse::<SectionKind>().unwrap(), kind);
        }
        assert!(matches!(
            "PRODUCAO-ARTISTICA".parse::<SectionKind>(),
            Err(ScoringError::InvalidSectionKind(_))
        ));
    }

    #[test]
    fn origin_flag_is_three_way() {
        assert_eq!(OriginFlag::classify("Brasil", "Brasil"), OriginFlag::Domestic);
        assert_eq!(OriginFlag::classify("Portugal", "Brasil"), OriginFlag::Foreign);
        assert_eq!(OriginFlag::classify("", "Brasil"), OriginFlag::Unspecified);
        // textual equality, no case folding
        assert_eq!(OriginFlag::classify("BRASIL", "Brasil"), OriginFlag::Foreign);
    }

    #[test]
    fn origin_flag_parses_labels() {
        assert_eq!("Nacional".parse::<OriginFlag>().unwrap(), OriginFlag::Domestic);
        assert_eq!("foreign".parse::<OriginFlag>().unwrap(), OriginFlag::Foreign);
        assert_eq!("VAZIO".parse::<OriginFlag>().unwrap(), OriginFlag::Unspecified);
        assert!("sideways".parse::<OriginFlag>().is_err());
    }

    #[test]
    fn tax_ids_compare_without_formatting() {
        assert_eq!(normalize_tax_id("012.345.678-90"), "1234567890");
        assert_eq!(normalize_tax_id("1234567890"), "1234567890");
        assert_eq!(normalize_tax_id(""), "");
        assert_eq!(normalize_tax_id("000"), "0");
    }

    #[test]
    fn canonical_name_folds_accents() {
        assert_eq!(canonical_name("  João Conceição "), "JOAO CONCEICAO");
    }

    #[test]
    fn submission_info_reads_path_parts() {
        let path = PathBuf::from("/data/EDITAL12-2020/01234567890-PROJ7.xml");
        let info = SubmissionInfo::from_path(&path);
        assert_eq!(info.project_id, "PROJ7");
        assert_eq!(info.call, "EDITAL12");
        assert_eq!(tax_id_from_file_name(&path).as_deref(), Some("01234567890"));
    }

    #[test]
    fn score_key_fills_empty_parts() {
        let key = ScoreKey::new("ARTIGO-PUBLICADO", "", OriginFlag::Domestic);
        assert_eq!(key.nature, EMPTY_PLACEHOLDER);
    }

    #[test]
    fn doctorate_year_takes_latest_completed() {
        let degree = |level: &str, year: Option<i32>| DegreeEntry {
            level: level.to_string(),
            kind: String::new(),
            start_year: None,
            completion_year: year,
            institution: String::new(),
            course: String::new(),
            status: String::new(),
        };
        let degrees = vec![
            degree("MESTRADO", Some(2010)),
            degree(DOCTORATE, Some(2014)),
            degree(DOCTORATE, None),
            degree(DOCTORATE, Some(2016)),
        ];
        assert_eq!(doctorate_year(&degrees), Some(2016));
        assert_eq!(doctorate_year(&degrees[..1]), None);
    }
}
