use crate::load::TableCounts;

/// Progress counters for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Repositories fully processed
    pub repositories: usize,
    /// Chunks transformed and loaded
    pub chunks: usize,
    /// Pull requests loaded
    pub pull_requests: usize,
    /// Rows written per table
    pub rows: TableCounts,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} repositories, {} chunks, {} pull requests, {} rows",
            self.repositories,
            self.chunks,
            self.pull_requests,
            self.rows.total()
        )
    }
}
