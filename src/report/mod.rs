pub mod types;

pub use types::RunSummary;

use colored::Colorize;

/// Print the outcome of a successful run to the terminal.
pub fn print_summary(summary: &RunSummary) {
    println!();
    println!("{}", "═══ GitHub ETL complete ═══".green().bold());
    println!(
        "Repositories: {} | Chunks: {} | Pull requests: {}",
        summary.repositories, summary.chunks, summary.pull_requests
    );
    println!("{}", format_rows(summary));
    println!();
}

fn format_rows(summary: &RunSummary) -> String {
    let rows = &summary.rows;
    format!(
        "Rows loaded: pull_requests {} | commits {} | reviewers {} | comments {}",
        rows.pull_requests, rows.commits, rows.reviewers, rows.comments
    )
}
