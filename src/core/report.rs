//! Per-file report printed at the end of every code-output turn.

use std::path::{Path, PathBuf};

use anyhow::Result;
use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::{Table, Tabled};

use crate::cli::AppContext;
use crate::core::materialize::{MaterializationResult, Outcome, Tally};
use crate::core::reply::{Anomaly, ParsedReply};

/// Terminal colours used for status text.
#[derive(Debug, Clone, Copy)]
pub enum Tint {
    Green,
    Yellow,
    Red,
}

/// Colour `text` unless `--no-color` is set.
pub fn tint(text: &str, tint: Tint, ctx: &AppContext) -> String {
    if ctx.no_color {
        return text.to_string();
    }
    match tint {
        Tint::Green => text.green().to_string(),
        Tint::Yellow => text.yellow().to_string(),
        Tint::Red => text.red().to_string(),
    }
}

/// Everything a finished turn reports, in reply order.
#[derive(Debug, Serialize)]
pub struct TurnReport<'a> {
    pub output_root: &'a Path,
    pub raw_artifact: &'a Path,
    pub ambiguous: bool,
    pub tally: Tally,
    pub results: &'a [MaterializationResult],
    pub unattributed_bytes: usize,
    pub anomalies: &'a [Anomaly],
    pub dry_run: bool,
}

impl<'a> TurnReport<'a> {
    pub fn new(
        output_root: &'a Path,
        raw_artifact: &'a Path,
        parsed: &'a ParsedReply,
        results: &'a [MaterializationResult],
        dry_run: bool,
    ) -> Self {
        Self {
            output_root,
            raw_artifact,
            ambiguous: parsed.is_ambiguous(),
            tally: Tally::of(results),
            results,
            unattributed_bytes: parsed.fragments.iter().map(|f| f.text.len()).sum(),
            anomalies: &parsed.anomalies,
            dry_run,
        }
    }
}

#[derive(Tabled)]
struct Row {
    #[tabled(rename = "#")]
    index: usize,
    file: String,
    result: String,
    detail: String,
}

fn display_rel(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .map(PathBuf::from)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

/// The results as a table, one row per block in reply order.
pub fn render_table(results: &[MaterializationResult], output_root: &Path, ctx: &AppContext) -> String {
    let rows: Vec<Row> = results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let (result, mut detail) = match &r.outcome {
                Outcome::Written { path } => {
                    (tint("written", Tint::Green, ctx), display_rel(path, output_root))
                }
                Outcome::SkippedExists { path } => (
                    tint("skipped-exists", Tint::Yellow, ctx),
                    format!("{} exists (use --force)", display_rel(path, output_root)),
                ),
                Outcome::SkippedInvalidPath { reason } => {
                    (tint("skipped-invalid-path", Tint::Red, ctx), reason.clone())
                }
                Outcome::FailedIo { error, .. } => (tint("failed-io", Tint::Red, ctx), error.clone()),
            };
            if let Some(prev) = r.duplicate_of {
                detail.push_str(&format!(" (same target as #{})", prev + 1));
            }
            Row { index: i + 1, file: r.asserted.clone(), result, detail }
        })
        .collect();

    Table::new(rows).to_string()
}

/// Print the report: table to stdout, summary and raw-artifact pointer
/// to stderr, or a single JSON object with `--json`.
pub fn print(report: &TurnReport<'_>, ctx: &AppContext, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
        return Ok(());
    }
    if ctx.quiet {
        return Ok(());
    }

    if report.dry_run {
        println!("{}", tint("DRY RUN: nothing was written", Tint::Yellow, ctx));
    }

    if report.results.is_empty() {
        println!("{}", tint("No file blocks found in the reply.", Tint::Yellow, ctx));
    } else {
        println!("{}", render_table(report.results, report.output_root, ctx));
    }

    let t = &report.tally;
    println!(
        "{} written, {} skipped (exists), {} rejected, {} failed",
        t.written, t.skipped_exists, t.skipped_invalid, t.failed
    );

    if report.ambiguous {
        let mut why = Vec::new();
        if report.unattributed_bytes > 0 {
            why.push(format!("{} bytes outside file blocks", report.unattributed_bytes));
        }
        if !report.anomalies.is_empty() {
            why.push(format!("{} tag-like fragments left as text", report.anomalies.len()));
        }
        let suffix = if why.is_empty() { String::new() } else { format!(" ({})", why.join(", ")) };
        println!(
            "{} the reply did not parse cleanly{}; the full reply is saved at {}",
            tint("note:", Tint::Yellow, ctx),
            suffix,
            report.raw_artifact.display()
        );
    }

    Ok(())
}
