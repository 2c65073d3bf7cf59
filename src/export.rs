//! CSV export of a ranked preference list.
//!
//! The category column keeps its canonical header and carries the cutoff, so
//! an exported file loads back through the cutoff loader unchanged.

use crate::loader::{COLLEGE_COLUMN, PROGRAM_COLUMN};
use crate::models::{Category, EligibleEntry};
use anyhow::{Context, Result};
use csv::Writer;
use std::fs;
use std::path::{Path, PathBuf};

pub const RANK_COLUMN: &str = "Rank";
pub const MARGIN_COLUMN: &str = "Marks Above Cutoff";

pub fn export(entries: &[EligibleEntry], category: Category) -> Result<Vec<u8>> {
    let mut writer = Writer::from_writer(Vec::new());

    writer.write_record([
        RANK_COLUMN,
        COLLEGE_COLUMN,
        PROGRAM_COLUMN,
        category.column_key(),
        MARGIN_COLUMN,
    ])?;

    for entry in entries {
        let rank = entry.rank.to_string();
        let cutoff = entry.cutoff.to_string();
        let margin = entry.margin.to_string();
        writer.write_record([
            rank.as_str(),
            entry.college.as_str(),
            entry.program.as_str(),
            cutoff.as_str(),
            margin.as_str(),
        ])?;
    }

    Ok(writer.into_inner().map_err(|e| e.into_error())?)
}

/// Descriptive file name, e.g. `Preferences_B_Sc_Physics_UR_Girls.csv`.
pub fn export_file_name(program: &str, category: Category, girls_only: bool) -> String {
    let mut safe_program = String::new();
    for c in program.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '-' {
            safe_program.push(c);
        } else if !safe_program.ends_with('_') {
            safe_program.push('_');
        }
    }
    let safe_program = safe_program.trim_matches('_');

    format!(
        "Preferences_{}_{}{}.csv",
        if safe_program.is_empty() { "program" } else { safe_program },
        category.column_key(),
        if girls_only { "_Girls" } else { "" }
    )
}

pub fn write_export(
    output_dir: &Path,
    entries: &[EligibleEntry],
    program: &str,
    category: Category,
    girls_only: bool,
) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

    let path = output_dir.join(export_file_name(program, category, girls_only));
    let bytes = export(entries, category)?;
    fs::write(&path, bytes).with_context(|| format!("Failed to write export: {}", path.display()))?;

    tracing::info!(path = %path.display(), entries = entries.len(), "exported preference list");
    Ok(path)
}
