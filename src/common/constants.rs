/// Element and attribute names of the Lattes curriculum export.
/// Kept in one place so the extractor, the tidy policies and the scorer agree.

// Section tags (children of the CURRICULO-VITAE root)
pub const GENERAL_DATA_TAG: &str = "DADOS-GERAIS";
pub const DEGREES_TAG: &str = "FORMACAO-ACADEMICA-TITULACAO";
pub const BIBLIOGRAPHIC_TAG: &str = "PRODUCAO-BIBLIOGRAFICA";
pub const TECHNICAL_TAG: &str = "PRODUCAO-TECNICA";
pub const OTHER_PRODUCTION_TAG: &str = "OUTRA-PRODUCAO";
pub const COMPLEMENTARY_TAG: &str = "DADOS-COMPLEMENTARES";

// Walk markers
pub const BASIC_MARKER: &str = "DADOS";
pub const DETAIL_MARKER: &str = "DETALHAMENTO";

// Root / header attributes
pub const IDENTIFIER_ATTR: &str = "NUMERO-IDENTIFICADOR";
pub const LAST_UPDATE_ATTR: &str = "DATA-ATUALIZACAO";
pub const FULL_NAME_ATTR: &str = "NOME-COMPLETO";
pub const TAX_ID_ATTR: &str = "CPF";

// Profile paths
pub const AREAS_TAG: &str = "AREAS-DE-ATUACAO";
pub const AREA_NAME_ATTR: &str = "NOME-DA-AREA-DO-CONHECIMENTO";
pub const ADDRESS_TAG: &str = "ENDERECO";
pub const PROFESSIONAL_ADDRESS_TAG: &str = "ENDERECO-PROFISSIONAL";
pub const INSTITUTION_ATTR: &str = "NOME-INSTITUICAO-EMPRESA";
pub const INSTITUTION_NOT_FOUND: &str = "NAO ENCONTRADO";

// Column names produced by the walks
pub const KIND_COLUMN: &str = "PRODUCAO";
pub const SEQUENCE_COLUMN: &str = "SEQUENCIA-PRODUCAO";
pub const NATURE_COLUMN: &str = "NATUREZA";
pub const YEAR_COLUMN: &str = "ANO";
pub const COUNTRY_COLUMN: &str = "PAIS";
pub const TITLE_COLUMN: &str = "TITULO";
pub const DEGREE_COLUMN: &str = "TITULACAO";
pub const TECHNICAL_TYPE_COLUMN: &str = "TIPO-PRODUCAO";
pub const FUNDING_ATTR: &str = "INSTITUICAO-FINANCIADORA";
pub const FUNDING_COLUMN: &str = "FOMENTO";
pub const EVENT_CLASSIFICATION_COLUMN: &str = "CLASSIFICACAO-DO-EVENTO";
pub const SUPERVISION_TYPE_COLUMN: &str = "TIPO-DE-ORIENTACAO-CONCLUIDA";

// Degree columns
pub const COMPLETION_YEAR_COLUMN: &str = "ANO-DE-CONCLUSAO";
pub const START_YEAR_COLUMN: &str = "ANO-DE-INICIO";
pub const DEGREE_INSTITUTION_COLUMN: &str = "NOME-INSTITUICAO";
pub const COURSE_COLUMN: &str = "NOME-CURSO";
pub const COURSE_STATUS_COLUMN: &str = "STATUS-DO-CURSO";
pub const DOCTORATE: &str = "DOUTORADO";

// Columns added by the personnel join
pub const REGISTRATION_COLUMN: &str = "MATRICULA";
pub const UNIT_COLUMN: &str = "LOTACAO";

/// Placeholder used for empty join keys, so rule tables can key on "no value".
pub const EMPTY_PLACEHOLDER: &str = "VAZIO";

pub const DEFAULT_HOME_COUNTRY: &str = "Brasil";

/// Part tags of the typed technical walk.
pub const TECHNICAL_PRODUCT_MARKERS: &[&str] = &[
    "DADOS-BASICOS-DO-SOFTWARE",
    "DADOS-BASICOS-DA-PATENTE",
    "APRESENTACAO-DE-TRABALHO",
    "ORGANIZACAO-DE-EVENTO",
    "DADOS-BASICOS-DO-TRABALHO-TECNICO",
    "CURSO-DE-CURTA-DURACAO-MINISTRADO",
    "PROGRAMA-DE-RADIO-OU-TV",
    "RELATORIO-DE-PESQUISA",
    "OUTRA-PRODUCAO-TECNICA",
    "EDITORACAO",
    "DADOS-BASICOS-DO-PROCESSOS-OU-TECNICAS",
    "DADOS-BASICOS-DO-PRODUTO-TECNOLOGICO",
    "DESENVOLVIMENTO-DE-MATERIAL-DIDATICO-OU-INSTRUCIONAL",
    "MIDIA-SOCIAL-WEBSITE-BLOG",
    "DADOS-BASICOS-DA-MARCA",
    "CARTA-MAPA-OU-SIMILAR",
    "MAQUETE",
];
