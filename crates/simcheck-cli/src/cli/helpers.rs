use super::CliError;
use anyhow::Context;
use serde::Serialize;
use simcheck_core::domain::CheckError;
use simcheck_core::profiling::{ProfileTable, RowId};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

pub(super) fn compute_error(error: impl Into<CheckError>) -> CliError {
    CliError::Compute(error.into())
}

pub(super) fn to_pretty_json(value: &impl Serialize) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(value).context("failed to serialize report")?)
}

/// Writes `value` as pretty JSON, creating parent directories as needed.
pub(super) fn write_json_report(path: &Path, value: &impl Serialize) -> Result<(), CliError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create report directory '{}'", parent.display()))?;
    }
    let json = to_pretty_json(value)?;
    fs::write(path, json)
        .with_context(|| format!("failed to write report '{}'", path.display()))?;
    Ok(())
}

/// One line per row, children indented by two spaces under their parent.
pub(super) fn render_profile_tree(table: &ProfileTable) -> String {
    let mut output = String::new();
    for root in table.roots() {
        render_row(table, root, 0, &mut output);
    }
    output
}

fn render_row(table: &ProfileTable, id: RowId, depth: usize, output: &mut String) {
    let row = table.row(id);
    let values = row
        .values
        .iter()
        .map(|(column, value)| format!("{column}={value}"))
        .collect::<Vec<_>>()
        .join(" ");
    let _ = writeln!(output, "{}{} {values}", "  ".repeat(depth), row.name);
    for child in row.children() {
        render_row(table, *child, depth + 1, output);
    }
}
