//! CSV tables written at the end of a batch.

use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::common::error::Result;
use crate::domain::{OriginFlag, ProblemDocument, Table};
use crate::pipeline::orchestrator::BatchReport;
use crate::pipeline::researcher::ResearcherReport;

pub const SCORES_FILE: &str = "scores.csv";
pub const SUMMARY_FILE: &str = "summary.csv";
pub const PROBLEMS_FILE: &str = "problems.csv";
pub const BREAKDOWN_FILE: &str = "breakdown.csv";

#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    run_id: String,
    file: &'a str,
    project_id: &'a str,
    call: &'a str,
    identifier: &'a str,
    tax_id: &'a str,
    name: &'a str,
    registration: Option<&'a str>,
    unit: Option<&'a str>,
    institution: &'a str,
    last_update: Option<String>,
    doctorate_year: Option<i32>,
    doctorate_bonus: f64,
    raw_production_score: f64,
    production_score: f64,
    external_evaluation_bonus: f64,
    composite_score: f64,
}

#[derive(Debug, Serialize)]
struct BreakdownRow<'a> {
    identifier: &'a str,
    kind: &'a str,
    nature: &'a str,
    origin: OriginFlag,
    category: &'a str,
    count: usize,
    points_per_item: f64,
    cap: Option<f64>,
    raw_score: f64,
    capped_score: f64,
    rule_found: bool,
}

/// Paths of the tables one batch wrote.
#[derive(Debug, Clone)]
pub struct OutputFiles {
    pub scores: PathBuf,
    pub summary: PathBuf,
    pub problems: PathBuf,
    pub breakdown: PathBuf,
}

/// Writes all four tables under `dir`, creating it when needed.
pub fn write_batch(report: &BatchReport, dir: &Path) -> Result<OutputFiles> {
    fs::create_dir_all(dir)?;
    let files = OutputFiles {
        scores: dir.join(SCORES_FILE),
        summary: dir.join(SUMMARY_FILE),
        problems: dir.join(PROBLEMS_FILE),
        breakdown: dir.join(BREAKDOWN_FILE),
    };

    write_scores(&report.reports, fs::File::create(&files.scores)?)?;
    write_summary(&report.run_id.to_string(), &report.reports, fs::File::create(&files.summary)?)?;
    write_problems(&report.problems, fs::File::create(&files.problems)?)?;
    write_breakdown(&report.reports, fs::File::create(&files.breakdown)?)?;

    info!(
        dir = %dir.display(),
        researchers = report.reports.len(),
        problems = report.problems.len(),
        "Output tables written"
    );
    Ok(files)
}

pub fn write_scores<W: Write>(reports: &[ResearcherReport], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for report in reports {
        writer.serialize(&report.score)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_summary<W: Write>(run_id: &str, reports: &[ResearcherReport], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for report in reports {
        let profile = &report.profile;
        writer.serialize(SummaryRow {
            run_id: run_id.to_string(),
            file: &report.path,
            project_id: &report.submission.project_id,
            call: &report.submission.call,
            identifier: &report.score.identifier,
            tax_id: &report.score.tax_id,
            name: &report.score.name,
            registration: profile.registration.as_deref(),
            unit: profile.unit.as_deref(),
            institution: &profile.institution,
            last_update: profile.last_update.map(|d| d.format("%Y-%m-%d").to_string()),
            doctorate_year: report.card.doctorate_year,
            doctorate_bonus: report.card.doctorate_bonus,
            raw_production_score: report.card.raw_production_score,
            production_score: report.card.production_score,
            external_evaluation_bonus: report.card.external_evaluation_bonus,
            composite_score: report.card.composite_score,
        })?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_problems<W: Write>(problems: &[ProblemDocument], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for problem in problems {
        writer.serialize(problem)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_breakdown<W: Write>(reports: &[ResearcherReport], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for report in reports {
        for group in &report.card.groups {
            writer.serialize(BreakdownRow {
                identifier: &report.score.identifier,
                kind: &group.kind,
                nature: &group.nature,
                origin: group.origin,
                category: &group.category,
                count: group.count,
                points_per_item: group.points_per_item,
                cap: group.cap,
                raw_score: group.raw_score,
                capped_score: group.capped_score,
                rule_found: group.rule_found,
            })?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Any tidied table, header first.
pub fn write_table<W: Write>(table: &Table, out: W) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(out);
    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}
