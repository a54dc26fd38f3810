//! Markdown run summary
//!
//! This module renders a [`RunReport`] as a short markdown document.

use crate::output::traits::OutputResult;
use crate::run::RunReport;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes a markdown summary of a run
///
/// # Arguments
///
/// * `report` - The finished run's report
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(OutputError)` - Failed to write summary
pub fn generate_markdown_summary(report: &RunReport, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(report);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a run report as markdown
pub fn format_markdown_summary(report: &RunReport) -> String {
    let mut md = String::new();

    md.push_str("# Search-Trawl Run Summary\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Outcome**: {}\n", report.outcome));
    md.push_str(&format!(
        "- **Started**: {}\n",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    md.push_str(&format!(
        "- **Finished**: {}\n",
        report.finished_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    md.push_str(&format!(
        "- **Duration**: {} seconds\n",
        report.duration_seconds()
    ));
    md.push_str(&format!("- **Last Account**: {}\n\n", report.last_account));

    md.push_str("## Results\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("|--------|-------|\n");
    md.push_str(&format!(
        "| Windows completed | {} |\n",
        report.windows_completed
    ));
    md.push_str(&format!(
        "| Windows abandoned | {} |\n",
        report.windows_abandoned
    ));
    md.push_str(&format!(
        "| Posts collected | {} |\n",
        report.posts_collected
    ));
    md.push_str(&format!("| Rows in output | {} |\n\n", report.rows_written));

    md.push_str("## Output\n\n");
    md.push_str(&format!(
        "- **Destination**: `{}`\n",
        report.destination.display()
    ));
    if !report.persisted {
        md.push_str("- **Warning**: the final save failed; rows may be missing\n");
    }
    md.push('\n');

    md.push_str("## Resume Point\n\n");
    match &report.final_checkpoint {
        Some(checkpoint) => md.push_str(&format!("{}\n", checkpoint)),
        None => md.push_str("No checkpoint recorded.\n"),
    }

    md
}
