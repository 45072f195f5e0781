use serde::{Deserialize, Serialize};

/// A pull request as listed by `GET /repos/{repo}/pulls`.
///
/// Only the fields the transform consumes are decoded; everything else in
/// the payload is ignored. The three `*_data` collections are filled in by
/// the page walker before the record leaves the extract stage.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PullRequest {
    /// Repository-scoped PR number. Records without one cannot be enriched.
    pub number: Option<u64>,
    pub state: Option<String>,
    pub title: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub merged_at: Option<String>,
    #[serde(default)]
    pub labels: Vec<Label>,

    #[serde(skip)]
    pub commit_data: Vec<Commit>,
    #[serde(skip)]
    pub reviewer_data: Reviews,
    #[serde(skip)]
    pub comment_data: Vec<Comment>,
}

impl PullRequest {
    /// The PR number, if the record carries a usable one.
    pub fn id(&self) -> Option<u64> {
        self.number.filter(|&n| n > 0)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Label {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct User {
    pub login: Option<String>,
}

/// A commit from `GET /repos/{repo}/pulls/{n}/commits`, with `files`
/// merged in from the per-commit detail endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Commit {
    pub sha: Option<String>,
    #[serde(default)]
    pub commit: CommitDetails,
    #[serde(default)]
    pub files: Vec<FileChange>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommitDetails {
    #[serde(default)]
    pub author: Option<CommitAuthor>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommitAuthor {
    pub name: Option<String>,
    pub email: Option<String>,
    pub date: Option<String>,
}

/// The subset of `GET /repos/{repo}/commits/{sha}` used to read file stats.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommitDiff {
    #[serde(default)]
    pub files: Vec<FileChange>,
}

/// A single file touched by a commit. Missing line counts stay `None`
/// rather than reading as zero.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileChange {
    pub filename: Option<String>,
    pub additions: Option<u64>,
    pub deletions: Option<u64>,
}

/// Outcome of a review.
///
/// Unknown states are kept verbatim so nothing reported upstream is lost
/// on its way to the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Commented,
    Dismissed,
    Other(String),
}

impl ReviewState {
    pub fn as_str(&self) -> &str {
        match self {
            ReviewState::Approved => "APPROVED",
            ReviewState::ChangesRequested => "CHANGES_REQUESTED",
            ReviewState::Commented => "COMMENTED",
            ReviewState::Dismissed => "DISMISSED",
            ReviewState::Other(raw) => raw,
        }
    }
}

impl From<String> for ReviewState {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "APPROVED" => ReviewState::Approved,
            "CHANGES_REQUESTED" => ReviewState::ChangesRequested,
            "COMMENTED" => ReviewState::Commented,
            "DISMISSED" => ReviewState::Dismissed,
            _ => ReviewState::Other(raw),
        }
    }
}

impl<'de> Deserialize<'de> for ReviewState {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(ReviewState::from)
    }
}

impl Serialize for ReviewState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl std::fmt::Display for ReviewState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A review from `GET /repos/{repo}/pulls/{n}/reviews`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Review {
    pub id: Option<u64>,
    #[serde(default)]
    pub user: Option<User>,
    pub state: Option<ReviewState>,
    pub submitted_at: Option<String>,
}

/// Reviews of one pull request, split by whether they carry a decision.
///
/// `decisions` feed the reviewer rows. Comment-only reviews produce no row
/// but their ids may still be referenced by comments.
#[derive(Debug, Clone, Default)]
pub struct Reviews {
    pub decisions: Vec<Review>,
    pub comment_only: Vec<Review>,
}

impl Reviews {
    pub fn partition(reviews: Vec<Review>) -> Self {
        let (comment_only, decisions): (Vec<Review>, Vec<Review>) = reviews
            .into_iter()
            .partition(|r| r.state == Some(ReviewState::Commented));
        Reviews {
            decisions,
            comment_only,
        }
    }

    /// Every fetched review, decisions first.
    pub fn all(&self) -> impl Iterator<Item = &Review> {
        self.decisions.iter().chain(self.comment_only.iter())
    }
}

/// An issue comment from `GET /repos/{repo}/issues/{n}/comments`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Comment {
    pub id: Option<u64>,
    #[serde(default)]
    pub user: Option<User>,
    pub body: Option<String>,
    pub created_at: Option<String>,
    pub pull_request_review_id: Option<u64>,
}
