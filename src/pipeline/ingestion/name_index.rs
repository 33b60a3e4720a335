use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use crate::common::error::{Result, ScoringError};
use crate::domain::{canonical_name, ProblemDocument};
use crate::pipeline::ingestion::document::CurriculumDocument;

/// One researcher in the name index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameIndexEntry {
    pub file: String,
    pub identifier: String,
    pub tax_id: String,
    /// Canonical form: trimmed, upper-cased, accents removed
    pub name: String,
}

/// Researcher name to document path lookup, built from a document directory.
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    pub entries: Vec<NameIndexEntry>,
    pub problems: Vec<ProblemDocument>,
}

impl NameIndex {
    /// Reads the header of every document. Paths are processed in the given
    /// order and the first document for a name wins.
    #[instrument(skip(paths), fields(documents = paths.len()))]
    pub fn build(paths: &[PathBuf]) -> Self {
        let mut index = NameIndex::default();
        let mut seen = BTreeSet::new();

        for path in paths {
            let doc = match CurriculumDocument::load(path) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Unreadable document");
                    index.problems.push(ProblemDocument::bare(path, e.to_string()));
                    continue;
                }
            };

            let header = &doc.header;
            match (&header.identifier, &header.tax_id, &header.name) {
                (Some(identifier), Some(tax_id), Some(name)) if doc.is_valid() => {
                    let name = canonical_name(name);
                    if seen.insert(name.clone()) {
                        index.entries.push(NameIndexEntry {
                            file: path.display().to_string(),
                            identifier: identifier.clone(),
                            tax_id: tax_id.clone(),
                            name,
                        });
                    }
                }
                _ => {
                    let mut problem = doc.to_problem();
                    if doc.is_valid() {
                        problem.reason = "missing tax id".to_string();
                    }
                    index.problems.push(problem);
                }
            }
        }

        info!(
            entries = index.entries.len(),
            problems = index.problems.len(),
            "Name index built"
        );
        index
    }

    /// Resolves a researcher name, canonicalized the same way as the index.
    pub fn lookup(&self, name: &str) -> Result<PathBuf> {
        let wanted = canonical_name(name);
        self.entries
            .iter()
            .find(|e| e.name == wanted)
            .map(|e| PathBuf::from(&e.file))
            .ok_or(ScoringError::UnknownResearcher(wanted))
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for entry in &self.entries {
            writer.serialize(entry)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn load_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)?;
        let entries = reader
            .deserialize::<NameIndexEntry>()
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            entries,
            problems: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn cv(identifier: &str, name: &str, cpf: &str) -> String {
        format!(
            r#"<CURRICULO-VITAE NUMERO-IDENTIFICADOR="{identifier}"><DADOS-GERAIS NOME-COMPLETO="{name}" CPF="{cpf}"/></CURRICULO-VITAE>"#
        )
    }

    #[test]
    fn builds_deduplicated_index() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.xml");
        let b = dir.path().join("b.xml");
        let c = dir.path().join("c.xml");
        fs::write(&a, cv("1", "José Souza", "111")).unwrap();
        fs::write(&b, cv("2", "jose souza", "222")).unwrap();
        fs::write(&c, "<broken").unwrap();

        let index = NameIndex::build(&[a.clone(), b, c]);
        assert_eq!(index.entries.len(), 1);
        assert_eq!(index.entries[0].name, "JOSE SOUZA");
        assert_eq!(index.entries[0].identifier, "1");
        assert_eq!(index.problems.len(), 1);

        assert_eq!(index.lookup(" José Souza").unwrap(), a);
        assert!(matches!(
            index.lookup("Ninguem"),
            Err(ScoringError::UnknownResearcher(_))
        ));
    }

    #[test]
    fn csv_round_trip_keeps_lookup() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("a.xml");
        fs::write(&doc, cv("7", "Ana Lima", "333")).unwrap();
        let index = NameIndex::build(&[doc.clone()]);

        let out = dir.path().join("index.csv");
        index.write_csv(&out).unwrap();
        let loaded = NameIndex::load_csv(&out).unwrap();
        assert_eq!(loaded.lookup("ana lima").unwrap(), doc);
    }
}
