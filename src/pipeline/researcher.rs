//! One researcher, end to end: extract, tidy, filter, join and score.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

use crate::common::constants::*;
use crate::config::ScoringConfig;
use crate::domain::{
    canonical_name, CompositeScore, DegreeEntry, ProblemDocument, ProductionItem, ProfileData,
    ScoreSource, SectionKind, SubmissionInfo, Table,
};
use crate::observability::metrics;
use crate::pipeline::ingestion::CurriculumDocument;
use crate::pipeline::processing::normalize::policies::DEGREES_POLICY;
use crate::pipeline::processing::{
    ColumnNormalizer, PeriodFilter, PolicyRegistry, RecordExtractor, ReferenceJoiner,
    ScoreAggregator, ScoreCard,
};
use crate::pipeline::reference::ReferenceData;

/// Full result for one scored researcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearcherReport {
    pub path: String,
    pub score: CompositeScore,
    pub card: ScoreCard,
    pub profile: ProfileData,
    pub degrees: Vec<DegreeEntry>,
    pub submission: SubmissionInfo,
    /// In-period items per score source
    pub item_counts: Vec<(ScoreSource, usize)>,
}

/// What processing one document produced.
#[derive(Debug, Clone)]
pub enum DocumentOutcome {
    Scored(Box<ResearcherReport>),
    Problem(ProblemDocument),
}

/// Runs every stage for one document against shared read-only references.
#[derive(Debug, Clone)]
pub struct ResearcherPipeline {
    extractor: RecordExtractor,
    normalizer: ColumnNormalizer,
    policies: PolicyRegistry,
    filter: PeriodFilter,
    joiner: ReferenceJoiner,
    aggregator: ScoreAggregator,
    references: Arc<ReferenceData>,
}

impl ResearcherPipeline {
    pub fn new(config: &ScoringConfig, references: Arc<ReferenceData>) -> Self {
        Self {
            extractor: RecordExtractor::new(),
            normalizer: ColumnNormalizer::new(),
            policies: PolicyRegistry::with_overrides(&config.policies),
            filter: PeriodFilter::new(references.evaluation_years.clone()),
            joiner: ReferenceJoiner::new(references.clone(), config.home_country.clone()),
            aggregator: ScoreAggregator::new(config.reference_year),
            references,
        }
    }

    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub fn process_path(&self, path: &Path) -> DocumentOutcome {
        match CurriculumDocument::load(path) {
            Ok(doc) => self.process_document(&doc),
            Err(e) => {
                warn!(error = %e, "Document could not be read");
                metrics::parser::document_invalid();
                DocumentOutcome::Problem(ProblemDocument::bare(path, e.to_string()))
            }
        }
    }

    pub fn process_document(&self, doc: &CurriculumDocument) -> DocumentOutcome {
        let start = Instant::now();
        if !doc.is_valid() {
            metrics::parser::document_invalid();
            return DocumentOutcome::Problem(doc.to_problem());
        }
        metrics::parser::document_parsed();

        let profile = self.profile(doc);
        let degrees = self.degrees(doc);

        let mut items = Vec::new();
        let mut item_counts = Vec::new();
        for source in ScoreSource::ALL {
            let source_items = self
                .production_table(doc, source)
                .map(|table| ProductionItem::from_table(source, &table))
                .unwrap_or_default();
            item_counts.push((source, source_items.len()));
            items.extend(source_items);
        }

        let matches = self.joiner.join_rules(items);
        let evaluations = self.references.evaluations_for(&profile.tax_id);
        let card = self.aggregator.aggregate(&matches, &degrees, evaluations);
        metrics::parser::duration(start.elapsed().as_secs_f64());
        metrics::score::researcher_scored(card.composite_score);

        let score = CompositeScore {
            area: profile.areas.join(" "),
            identifier: profile.identifier.clone(),
            tax_id: profile.tax_id.clone(),
            name: canonical_name(&profile.name),
            doctorate_year: card.doctorate_year,
            raw_production_score: card.raw_production_score,
            production_score: card.production_score,
            external_evaluation_bonus: card.external_evaluation_bonus,
            composite_score: card.composite_score,
        };
        debug!(identifier = %score.identifier, composite = score.composite_score, "Researcher scored");

        DocumentOutcome::Scored(Box::new(ResearcherReport {
            path: doc.path.display().to_string(),
            score,
            card,
            profile,
            degrees,
            submission: doc.submission.clone(),
            item_counts,
        }))
    }

    /// Tidied and period-filtered table of one score source; `None` when the
    /// source produced nothing.
    pub fn production_table(&self, doc: &CurriculumDocument, source: ScoreSource) -> Option<Table> {
        let records = match source {
            ScoreSource::Technical => self.extractor.extract_typed(
                doc,
                SectionKind::Technical,
                TECHNICAL_PRODUCT_MARKERS,
            )?,
            _ => self.extractor.extract(doc, source.section())?.into_records(),
        };
        let policy = self.policies.get(source.label());
        let mut table = self.normalizer.tidy_records(&records, KIND_COLUMN, &policy)?;
        self.filter.apply(&mut table);
        Some(table)
    }

    /// Extracted and tidied section by tag, without period filtering.
    pub fn section_table(&self, doc: &CurriculumDocument, tag: &str) -> Option<Table> {
        let records = self.extractor.extract_tag(doc, tag)?.into_records();
        let (kind_column, policy_name) = match tag.parse::<SectionKind>().ok()? {
            SectionKind::GeneralData => (KIND_COLUMN, ""),
            SectionKind::Degrees => (DEGREE_COLUMN, DEGREES_POLICY),
            SectionKind::Bibliographic => (KIND_COLUMN, ScoreSource::Bibliographic.label()),
            SectionKind::Technical => (KIND_COLUMN, ScoreSource::Presentations.label()),
            SectionKind::OtherProduction => (KIND_COLUMN, ScoreSource::Other.label()),
            SectionKind::Complementary => (KIND_COLUMN, ScoreSource::Complementary.label()),
        };
        self.normalizer
            .tidy_records(&records, kind_column, &self.policies.get(policy_name))
    }

    pub fn degrees(&self, doc: &CurriculumDocument) -> Vec<DegreeEntry> {
        self.extractor
            .extract(doc, SectionKind::Degrees)
            .and_then(|extraction| {
                self.normalizer.tidy_records(
                    &extraction.basic,
                    DEGREE_COLUMN,
                    &self.policies.get(DEGREES_POLICY),
                )
            })
            .map(|table| DegreeEntry::from_table(&table))
            .unwrap_or_default()
    }

    pub fn profile(&self, doc: &CurriculumDocument) -> ProfileData {
        let general = self
            .extractor
            .extract(doc, SectionKind::GeneralData)
            .and_then(|e| e.basic.into_iter().next())
            .unwrap_or_default();
        let field = |name: &str| general.get(name).unwrap_or_default().to_string();

        let mut profile = ProfileData {
            identifier: doc.header.identifier.clone().unwrap_or_default(),
            name: doc.header.name.clone().unwrap_or_default(),
            tax_id: doc.header.tax_id.clone().unwrap_or_default(),
            last_update: doc.header.last_update,
            institution: INSTITUTION_NOT_FOUND.to_string(),
            registration: None,
            unit: None,
            areas: Vec::new(),
            birth_country: field("PAIS-DE-NASCIMENTO"),
            birth_state: field("UF-NASCIMENTO"),
            birth_date: field("DATA-NASCIMENTO"),
            sex: field("SEXO"),
            race: field("RACA-OU-COR"),
        };

        if let Some(root) = doc.root() {
            let areas_path = format!("{}/{}", GENERAL_DATA_TAG, AREAS_TAG);
            if let Some(areas) = root.find_path(&areas_path) {
                for area in areas.children.iter().filter_map(|a| a.attr(AREA_NAME_ATTR)) {
                    let area = area.trim().to_uppercase();
                    if !area.is_empty() && !profile.areas.contains(&area) {
                        profile.areas.push(area);
                    }
                }
            }
            let address_path = format!(
                "{}/{}/{}",
                GENERAL_DATA_TAG, ADDRESS_TAG, PROFESSIONAL_ADDRESS_TAG
            );
            if let Some(institution) = root
                .find_path(&address_path)
                .and_then(|a| a.attr(INSTITUTION_ATTR))
            {
                profile.institution = institution.to_string();
            }
        }

        self.joiner.enrich_profile(&mut profile);
        profile
    }
}
