#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use lattes_scorer::config::ScoringConfig;

/// A curriculum export with bibliographic articles `(sequence, year)` published in Brasil.
pub fn cv_xml(identifier: &str, name: &str, articles: &[(&str, &str)], doctorate: Option<i32>) -> String {
    let degrees = doctorate
        .map(|year| {
            format!(
                r#"<FORMACAO-ACADEMICA-TITULACAO><DOUTORADO TIPO="ACADEMICO" ANO-DE-CONCLUSAO="{}" NOME-INSTITUICAO="UFPB"/></FORMACAO-ACADEMICA-TITULACAO>"#,
                year
            )
        })
        .unwrap_or_default();
    let items: String = articles
        .iter()
        .map(|(sequence, year)| {
            format!(
                r#"<ARTIGO-PUBLICADO SEQUENCIA-PRODUCAO="{seq}">
  <DADOS-BASICOS-DO-ARTIGO NATUREZA="COMPLETO" TITULO-DO-ARTIGO="Artigo {seq}" ANO-DO-ARTIGO="{year}" PAIS-DE-PUBLICACAO="Brasil"/>
  <DETALHAMENTO-DO-ARTIGO TITULO-DO-PERIODICO-OU-REVISTA="Revista"/>
  <AUTORES NOME-COMPLETO-DO-AUTOR="{name}"/>
</ARTIGO-PUBLICADO>"#,
                seq = sequence,
                year = year,
                name = name
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<CURRICULO-VITAE NUMERO-IDENTIFICADOR="{identifier}" DATA-ATUALIZACAO="10022021">
  <DADOS-GERAIS NOME-COMPLETO="{name}" CPF="0123456789">
    <AREAS-DE-ATUACAO><AREA-DE-ATUACAO NOME-DA-AREA-DO-CONHECIMENTO="Fisica"/></AREAS-DE-ATUACAO>
    {degrees}
  </DADOS-GERAIS>
  <PRODUCAO-BIBLIOGRAFICA><ARTIGOS-PUBLICADOS>{items}</ARTIGOS-PUBLICADOS></PRODUCAO-BIBLIOGRAFICA>
</CURRICULO-VITAE>"#,
    )
}

/// A scratch directory holding a config, a rule table and documents.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new(article_cap: &str) -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("rules.csv"),
            format!(
                "LATTES,PRODUCAO,NATUREZA,flag_Nacional,PONTOS,MAX\nA,ARTIGO-PUBLICADO,COMPLETO,Nacional,10,{}\n",
                article_cap
            ),
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("CVs")).unwrap();
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_document(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join("CVs").join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    pub fn config(&self) -> ScoringConfig {
        ScoringConfig::from_toml_str(
            r#"
evaluation_years = ["2017", "2018", "2019", "2020"]
reference_year = 2020
workers = 2
document_timeout_secs = 10

[references]
scoring_rules = "rules.csv"
"#,
            self.dir.path(),
        )
        .unwrap()
    }
}
