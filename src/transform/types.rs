use serde::Serialize;

/// Row of the `pull_requests` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PullRequestRow {
    pub pull_request_id: u64,
    pub current_status: Option<String>,
    pub date_created: Option<String>,
    pub date_modified: Option<String>,
    pub target_repository: String,
    /// Bug number parsed from the title.
    pub bug_id: Option<u64>,
    pub date_landed: Option<String>,
    /// Earliest approving review.
    pub date_approved: Option<String>,
    pub labels: Vec<String>,
}

/// Row of the `commits` table: one per file per commit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitRow {
    pub pull_request_id: u64,
    pub target_repository: String,
    pub commit_sha: Option<String>,
    pub date_created: Option<String>,
    pub author_username: Option<String>,
    pub author_email: Option<String>,
    pub filename: Option<String>,
    pub lines_removed: Option<u64>,
    pub lines_added: Option<u64>,
}

/// Row of the `reviewers` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewerRow {
    pub pull_request_id: u64,
    pub target_repository: String,
    pub date_reviewed: Option<String>,
    /// Not exposed by the API; always null.
    pub reviewer_email: Option<String>,
    pub reviewer_username: Option<String>,
    pub status: Option<String>,
}

/// Row of the `comments` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentRow {
    pub pull_request_id: u64,
    pub target_repository: String,
    pub comment_id: Option<u64>,
    pub date_created: Option<String>,
    /// Not exposed by the API; always null.
    pub author_email: Option<String>,
    pub author_username: Option<String>,
    pub character_count: usize,
    /// State of the review this comment belongs to, if any.
    pub status: Option<String>,
}

/// The four row-sets produced from one chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformedData {
    pub pull_requests: Vec<PullRequestRow>,
    pub commits: Vec<CommitRow>,
    pub reviewers: Vec<ReviewerRow>,
    pub comments: Vec<CommentRow>,
}

impl TransformedData {
    pub fn is_empty(&self) -> bool {
        self.pull_requests.is_empty()
            && self.commits.is_empty()
            && self.reviewers.is_empty()
            && self.comments.is_empty()
    }
}
