use anyhow::{Context, Result};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::report::{BurndownReport, Cell};

/// Output encodings for a burndown report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Yaml,
    Markdown,
    Tsv,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Json => write!(f, "json"),
            ExportFormat::Yaml => write!(f, "yaml"),
            ExportFormat::Markdown => write!(f, "markdown"),
            ExportFormat::Tsv => write!(f, "tsv"),
        }
    }
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "yaml" | "yml" => Some(ExportFormat::Yaml),
            "markdown" | "md" => Some(ExportFormat::Markdown),
            "tsv" => Some(ExportFormat::Tsv),
            _ => None,
        }
    }
}

/// Renders the report in the requested format
pub fn render(report: &BurndownReport, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        ExportFormat::Yaml => Ok(serde_yaml::to_string(report)?),
        ExportFormat::Markdown => Ok(render_markdown(report)),
        ExportFormat::Tsv => Ok(render_tsv(report)),
    }
}

/// Header-first tab-separated table, the shape a spreadsheet range expects
pub fn render_tsv(report: &BurndownReport) -> String {
    let mut output = String::new();
    for row in report.to_table() {
        output.push_str(&join_cells(&row, "\t"));
        output.push('\n');
    }
    output
}

pub fn render_markdown(report: &BurndownReport) -> String {
    let mut output = String::new();

    output.push_str(&format!("# Burndown: {}\n\n", report.backlog));
    output.push_str(&format!(
        "**Total points:** {} | **Sprints:** {} | **Forecast sprints:** {}\n\n",
        Cell::Number(report.total_points),
        report.rows.len(),
        report.forecast_rows().count()
    ));

    let table = report.to_table();
    if let Some((header, rows)) = table.split_first() {
        output.push_str(&format!("| {} |\n", join_cells(header, " | ")));
        output.push_str(&format!("|{}\n", "---|".repeat(header.len())));
        for row in rows {
            output.push_str(&format!("| {} |\n", join_cells(row, " | ")));
        }
    }

    output
}

fn join_cells(cells: &[Cell], separator: &str) -> String {
    cells
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(separator)
}

/// Writes the rendered report to a file
pub fn export_report(report: &BurndownReport, format: ExportFormat, output_path: &Path) -> Result<()> {
    let content = render(report, format)?;
    fs::write(output_path, content)
        .with_context(|| format!("Failed to write report to {:?}", output_path))?;

    log::info!(
        "Exported {} report for {} to {}",
        format,
        report.backlog,
        output_path.display()
    );
    Ok(())
}
