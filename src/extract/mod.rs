pub mod fetchers;
pub mod walker;

pub use walker::PageWalker;

/// Upper bound GitHub accepts for `per_page`.
pub const MAX_CHUNK_SIZE: u32 = 100;

/// Extraction strategy shared by the page walker and the entity fetchers.
///
/// Differences between pipeline deployments (page size, whether the
/// per-commit file diffs are fetched) are expressed here rather than in
/// separate code paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractProfile {
    /// Pull requests requested per page; one page becomes one chunk.
    pub chunk_size: u32,
    /// Fetch `/commits/{sha}` for every commit to obtain file-level stats.
    /// When off, commits carry no files and produce no commit rows.
    pub commit_files: bool,
}

impl Default for ExtractProfile {
    fn default() -> Self {
        Self {
            chunk_size: MAX_CHUNK_SIZE,
            commit_files: true,
        }
    }
}
