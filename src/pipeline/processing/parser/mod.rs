use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::common::constants::*;
use crate::domain::{RawRecord, SectionKind};
use crate::observability::metrics;
use crate::pipeline::ingestion::{CurriculumDocument, XmlElement};

/// Records pulled out of one section of one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub basic: Vec<RawRecord>,
    pub detail: Vec<RawRecord>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.basic.is_empty() && self.detail.is_empty()
    }

    pub fn len(&self) -> usize {
        self.basic.len() + self.detail.len()
    }

    /// Basic records followed by detail records.
    pub fn into_records(self) -> Vec<RawRecord> {
        let mut records = self.basic;
        records.extend(self.detail);
        records
    }
}

/// Flattens curriculum sections into attribute-keyed records.
#[derive(Debug, Clone, Default)]
pub struct RecordExtractor;

impl RecordExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extracts one section. `None` means the document is invalid and nothing
    /// from it can be trusted; an absent section gives an empty extraction.
    pub fn extract(&self, doc: &CurriculumDocument, kind: SectionKind) -> Option<Extraction> {
        let root = doc.root()?;
        let extraction = match kind {
            SectionKind::GeneralData => Extraction {
                basic: general_data(root),
                detail: Vec::new(),
            },
            SectionKind::Degrees => Extraction {
                basic: degrees(root),
                detail: Vec::new(),
            },
            SectionKind::Bibliographic | SectionKind::OtherProduction => Extraction {
                basic: production_walk(root, kind.tag(), BASIC_MARKER),
                detail: production_walk(root, kind.tag(), DETAIL_MARKER),
            },
            SectionKind::Technical => Extraction {
                basic: production_walk(root, kind.tag(), BASIC_MARKER),
                detail: funding_walk(root, kind.tag()),
            },
            SectionKind::Complementary => Extraction {
                basic: production_walk(root, kind.tag(), BASIC_MARKER),
                detail: Vec::new(),
            },
        };

        debug!(
            section = %kind,
            basic = extraction.basic.len(),
            detail = extraction.detail.len(),
            "Section extracted"
        );
        metrics::parser::records_extracted(kind.tag(), extraction.len() as u64);
        Some(extraction)
    }

    /// Extracts a section named by its tag. An unknown tag is logged and gives
    /// an empty extraction rather than an error.
    pub fn extract_tag(&self, doc: &CurriculumDocument, tag: &str) -> Option<Extraction> {
        match tag.parse::<SectionKind>() {
            Ok(kind) => self.extract(doc, kind),
            Err(e) => {
                error!(tag, path = %doc.path.display(), "{}", e);
                metrics::parser::invalid_section();
                doc.root().map(|_| Extraction::default())
            }
        }
    }

    /// Typed walk: section, item, then parts whose tag contains one of `markers`.
    /// The part tag is recorded under the technical type column.
    pub fn extract_typed(
        &self,
        doc: &CurriculumDocument,
        kind: SectionKind,
        markers: &[&str],
    ) -> Option<Vec<RawRecord>> {
        let root = doc.root()?;
        let mut records = Vec::new();
        for section in root.children_named(kind.tag()) {
            for item in &section.children {
                for part in &item.children {
                    if !markers.iter().any(|m| part.tag.contains(m)) {
                        continue;
                    }
                    let mut record = RawRecord::new(&item.tag);
                    record.extend_attributes(&item.attributes);
                    record
                        .fields
                        .insert(TECHNICAL_TYPE_COLUMN.to_string(), part.tag.clone());
                    record.extend_attributes(&part.attributes);
                    records.push(record);
                }
            }
        }
        metrics::parser::records_extracted(TECHNICAL_TYPE_COLUMN, records.len() as u64);
        Some(records)
    }
}

fn general_data(root: &XmlElement) -> Vec<RawRecord> {
    root.children_named(GENERAL_DATA_TAG)
        .map(|node| {
            let mut record = RawRecord::new(&node.tag);
            record.extend_attributes(&node.attributes);
            record
        })
        .collect()
}

fn degrees(root: &XmlElement) -> Vec<RawRecord> {
    root.children_named(GENERAL_DATA_TAG)
        .flat_map(|general| general.children_named(DEGREES_TAG))
        .flat_map(|block| block.children.iter())
        .map(|degree| {
            let mut record = RawRecord::new(&degree.tag);
            record.extend_attributes(&degree.attributes);
            record
        })
        .collect()
}

/// Section, group, item, part. Parts whose tag contains `marker` yield one
/// record of item attributes overlaid with part attributes.
fn production_walk(root: &XmlElement, section: &str, marker: &str) -> Vec<RawRecord> {
    let mut records = Vec::new();
    for top in root.children_named(section) {
        for group in &top.children {
            for item in &group.children {
                for part in item.children.iter().filter(|p| p.tag.contains(marker)) {
                    let mut record = RawRecord::new(&item.tag);
                    record.extend_attributes(&item.attributes);
                    record.extend_attributes(&part.attributes);
                    records.push(record);
                }
            }
        }
    }
    records
}

/// Detail parts carrying a funding institution yield the item attributes plus
/// the funding value under its renamed column.
fn funding_walk(root: &XmlElement, section: &str) -> Vec<RawRecord> {
    let mut records = Vec::new();
    for top in root.children_named(section) {
        for group in &top.children {
            for item in &group.children {
                for part in item.children.iter().filter(|p| p.tag.contains(DETAIL_MARKER)) {
                    if let Some(funding) = part.attr(FUNDING_ATTR) {
                        let mut record = RawRecord::new(&item.tag);
                        record.extend_attributes(&item.attributes);
                        record
                            .fields
                            .insert(FUNDING_COLUMN.to_string(), funding.to_string());
                        records.push(record);
                    }
                }
            }
        }
    }
    records
}
