// Pipeline ingestion: document discovery, parsing, and the researcher name index

pub mod discovery;
pub mod document;
pub mod name_index;

pub use discovery::discover_documents;
pub use document::{CurriculumDocument, DocumentHeader, XmlElement};
pub use name_index::{NameIndex, NameIndexEntry};
