use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::common::constants::*;
use crate::common::error::{Result, ScoringError};
use crate::domain::{decode_text, tax_id_from_file_name, ProblemDocument, SubmissionInfo};

/// Owned element of a parsed curriculum tree.
///
/// Attributes keep document order so that merged records see them the way
/// they were written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XmlElement {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    fn from_node(node: roxmltree::Node<'_, '_>) -> Self {
        Self {
            tag: node.tag_name().name().to_string(),
            attributes: node
                .attributes()
                .map(|a| (a.name().to_string(), a.value().to_string()))
                .collect(),
            children: node
                .children()
                .filter(|c| c.is_element())
                .map(XmlElement::from_node)
                .collect(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    /// Direct children with the exact tag.
    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    pub fn child(&self, tag: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// Follows a `/`-separated path of child tags, taking the first match at each step.
    pub fn find_path(&self, path: &str) -> Option<&XmlElement> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .try_fold(self, |node, tag| node.child(tag))
    }
}

/// Identifying attributes recovered from a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentHeader {
    pub identifier: Option<String>,
    pub name: Option<String>,
    pub tax_id: Option<String>,
    pub last_update: Option<NaiveDate>,
    /// `DATA-ATUALIZACAO` as written, kept when it is not a valid `ddmmyyyy` date
    pub last_update_raw: Option<String>,
}

/// One curriculum file after parsing.
///
/// A document is valid only when it parsed and carries both an identifier and
/// a name; every extraction from an invalid document yields nothing.
#[derive(Debug, Clone)]
pub struct CurriculumDocument {
    pub path: PathBuf,
    root: Option<XmlElement>,
    pub header: DocumentHeader,
    pub submission: SubmissionInfo,
    parse_error: Option<String>,
}

impl CurriculumDocument {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(Self::from_bytes(path, &bytes))
    }

    /// Parses raw bytes. Malformed markup never fails this call; it produces an
    /// invalid document that carries the parse error.
    pub fn from_bytes(path: &Path, bytes: &[u8]) -> Self {
        let text = decode_text(bytes);
        let options = roxmltree::ParsingOptions {
            allow_dtd: true,
            ..roxmltree::ParsingOptions::default()
        };

        let (root, parse_error) = match roxmltree::Document::parse_with_options(&text, options) {
            Ok(doc) => (Some(XmlElement::from_node(doc.root_element())), None),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Document could not be parsed");
                (None, Some(e.to_string()))
            }
        };

        let header = root
            .as_ref()
            .map(|r| read_header(r, path))
            .unwrap_or_else(|| DocumentHeader {
                tax_id: tax_id_from_file_name(path),
                ..DocumentHeader::default()
            });

        debug!(
            path = %path.display(),
            identifier = ?header.identifier,
            "Document loaded"
        );

        Self {
            path: path.to_path_buf(),
            root,
            header,
            submission: SubmissionInfo::from_path(path),
            parse_error,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.root.is_some() && self.header.identifier.is_some() && self.header.name.is_some()
    }

    /// The root element, only for valid documents.
    pub fn root(&self) -> Option<&XmlElement> {
        if self.is_valid() {
            self.root.as_ref()
        } else {
            None
        }
    }

    /// Why the document is invalid, if it is.
    pub fn invalid_reason(&self) -> Option<String> {
        if let Some(err) = &self.parse_error {
            return Some(format!("parse error: {}", err));
        }
        match (&self.header.identifier, &self.header.name) {
            (None, _) => Some(format!("missing {}", IDENTIFIER_ATTR)),
            (_, None) => Some(format!("missing {}", FULL_NAME_ATTR)),
            _ => None,
        }
    }

    /// Problem entry with whatever identifiers were recovered.
    pub fn to_problem(&self) -> ProblemDocument {
        ProblemDocument {
            path: self.path.display().to_string(),
            identifier: self.header.identifier.clone(),
            tax_id: self.header.tax_id.clone(),
            name: self.header.name.clone(),
            reason: self.invalid_reason().unwrap_or_else(|| "unknown".to_string()),
        }
    }

    pub fn require_valid(&self) -> Result<&XmlElement> {
        self.root().ok_or_else(|| ScoringError::DocumentParse {
            path: self.path.clone(),
            reason: self.invalid_reason().unwrap_or_default(),
        })
    }
}

fn read_header(root: &XmlElement, path: &Path) -> DocumentHeader {
    let identifier = non_empty(root.attr(IDENTIFIER_ATTR));
    let last_update_raw = non_empty(root.attr(LAST_UPDATE_ATTR));
    let last_update = last_update_raw
        .as_deref()
        .and_then(|raw| NaiveDate::parse_from_str(raw, "%d%m%Y").ok());
    let name = root.children.first().and_then(|c| non_empty(c.attr(FULL_NAME_ATTR)));
    let tax_id = root
        .child(GENERAL_DATA_TAG)
        .and_then(|g| non_empty(g.attr(TAX_ID_ATTR)))
        .or_else(|| tax_id_from_file_name(path));

    DocumentHeader {
        identifier,
        name,
        tax_id,
        last_update,
        last_update_raw,
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<CURRICULO-VITAE NUMERO-IDENTIFICADOR="123" DATA-ATUALIZACAO="15032021">
  <DADOS-GERAIS NOME-COMPLETO="Maria Silva" CPF="01234567890">
    <AREAS-DE-ATUACAO>
      <AREA-DE-ATUACAO NOME-DA-AREA-DO-CONHECIMENTO="Fisica"/>
    </AREAS-DE-ATUACAO>
  </DADOS-GERAIS>
</CURRICULO-VITAE>"#;

    #[test]
    fn reads_header() {
        let doc = CurriculumDocument::from_bytes(Path::new("x.xml"), MINIMAL.as_bytes());
        assert!(doc.is_valid());
        assert_eq!(doc.header.identifier.as_deref(), Some("123"));
        assert_eq!(doc.header.name.as_deref(), Some("Maria Silva"));
        assert_eq!(doc.header.tax_id.as_deref(), Some("01234567890"));
        assert_eq!(doc.header.last_update, NaiveDate::from_ymd_opt(2021, 3, 15));
    }

    #[test]
    fn malformed_document_is_invalid_with_file_name_tax_id() {
        let doc = CurriculumDocument::from_bytes(
            Path::new("/cv/98765-P1.xml"),
            b"<CURRICULO-VITAE><DADOS-GERAIS>",
        );
        assert!(!doc.is_valid());
        assert!(doc.root().is_none());
        let problem = doc.to_problem();
        assert_eq!(problem.tax_id.as_deref(), Some("98765"));
        assert!(problem.reason.starts_with("parse error"));
    }

    #[test]
    fn missing_name_invalidates() {
        let xml = r#"<CURRICULO-VITAE NUMERO-IDENTIFICADOR="9"><DADOS-GERAIS/></CURRICULO-VITAE>"#;
        let doc = CurriculumDocument::from_bytes(Path::new("a.xml"), xml.as_bytes());
        assert!(!doc.is_valid());
        assert_eq!(doc.to_problem().identifier.as_deref(), Some("9"));
        assert!(doc.require_valid().is_err());
    }

    #[test]
    fn latin1_bytes_are_decoded() {
        let mut bytes = br#"<CURRICULO-VITAE NUMERO-IDENTIFICADOR="1"><DADOS-GERAIS NOME-COMPLETO="Jo"#.to_vec();
        bytes.push(0xE3); // a-tilde in ISO-8859-1
        bytes.extend_from_slice(br#"o"/></CURRICULO-VITAE>"#);
        let doc = CurriculumDocument::from_bytes(Path::new("a.xml"), &bytes);
        assert_eq!(doc.header.name.as_deref(), Some("Jo\u{e3}o"));
    }

    #[test]
    fn find_path_walks_children() {
        let doc = CurriculumDocument::from_bytes(Path::new("x.xml"), MINIMAL.as_bytes());
        let root = doc.root().unwrap();
        let areas = root.find_path("DADOS-GERAIS/AREAS-DE-ATUACAO").unwrap();
        assert_eq!(areas.children.len(), 1);
        assert!(root.find_path("DADOS-GERAIS/ENDERECO").is_none());
    }
}
