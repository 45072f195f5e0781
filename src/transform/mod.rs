pub mod types;

pub use types::TransformedData;

use types::{CommentRow, CommitRow, PullRequestRow, ReviewerRow};

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, instrument};

use crate::github::types::{Review, ReviewState};
use crate::github::PullRequest;

static BUG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:bug|b=)\s*#?(\d+)\b").expect("bug id pattern is valid")
});

/// Anything at or above this is not a bug number (hashes, phone numbers, ...).
const MAX_BUG_ID: u64 = 100_000_000;

/// Flatten one chunk of enriched pull requests into warehouse rows.
///
/// Pure: no I/O. Row order follows the input order.
#[instrument(skip(chunk), fields(repo = %repo, prs = chunk.len()))]
pub fn transform(chunk: &[PullRequest], repo: &str) -> TransformedData {
    let mut data = TransformedData::default();

    for pr in chunk {
        let Some(pr_id) = pr.id() else {
            debug!("pull request without number reached transform, skipping");
            continue;
        };

        data.pull_requests.push(PullRequestRow {
            pull_request_id: pr_id,
            current_status: pr.state.clone(),
            date_created: pr.created_at.clone(),
            date_modified: pr.updated_at.clone(),
            target_repository: repo.to_string(),
            bug_id: pr.title.as_deref().and_then(parse_bug_id),
            date_landed: pr.merged_at.clone(),
            date_approved: approval_date(&pr.reviewer_data.decisions),
            labels: pr.labels.iter().filter_map(|l| l.name.clone()).collect(),
        });

        for commit in &pr.commit_data {
            let author = commit.commit.author.as_ref();
            for file in &commit.files {
                data.commits.push(CommitRow {
                    pull_request_id: pr_id,
                    target_repository: repo.to_string(),
                    commit_sha: commit.sha.clone(),
                    date_created: author.and_then(|a| a.date.clone()),
                    author_username: author.and_then(|a| a.name.clone()),
                    author_email: author.and_then(|a| a.email.clone()),
                    filename: file.filename.clone(),
                    lines_removed: file.deletions,
                    lines_added: file.additions,
                });
            }
        }

        for review in &pr.reviewer_data.decisions {
            data.reviewers.push(ReviewerRow {
                pull_request_id: pr_id,
                target_repository: repo.to_string(),
                date_reviewed: review.submitted_at.clone(),
                reviewer_email: None,
                reviewer_username: review.user.as_ref().and_then(|u| u.login.clone()),
                status: review.state.as_ref().map(ToString::to_string),
            });
        }

        // Comment-only reviews produce no reviewer row, but comments may
        // still point at them.
        let review_states: HashMap<u64, &ReviewState> = pr
            .reviewer_data
            .all()
            .filter_map(|r| Some((r.id?, r.state.as_ref()?)))
            .collect();

        for comment in &pr.comment_data {
            data.comments.push(CommentRow {
                pull_request_id: pr_id,
                target_repository: repo.to_string(),
                comment_id: comment.id,
                date_created: comment.created_at.clone(),
                author_email: None,
                author_username: comment.user.as_ref().and_then(|u| u.login.clone()),
                character_count: character_count(comment.body.as_deref()),
                status: comment
                    .pull_request_review_id
                    .and_then(|id| review_states.get(&id))
                    .map(|state| state.to_string()),
            });
        }
    }

    info!(
        pull_requests = data.pull_requests.len(),
        commits = data.commits.len(),
        reviewers = data.reviewers.len(),
        comments = data.comments.len(),
        "transformed chunk"
    );
    data
}

/// Bug number referenced by a PR title (`Bug 123`, `bug #123`, `b=123`).
///
/// Only the first reference counts; an out-of-range first reference yields
/// `None` rather than falling through to a later one.
pub fn parse_bug_id(title: &str) -> Option<u64> {
    let captures = BUG_RE.captures(title)?;
    let id: u64 = captures.get(1)?.as_str().parse().ok()?;
    (id < MAX_BUG_ID).then_some(id)
}

/// Earliest submission time among approving reviews.
///
/// Timestamps are fixed-width ISO-8601, so string order is time order.
pub fn approval_date(reviews: &[Review]) -> Option<String> {
    reviews
        .iter()
        .filter(|r| r.state == Some(ReviewState::Approved))
        .filter_map(|r| r.submitted_at.as_deref())
        .min()
        .map(str::to_string)
}

/// Length of a comment body in characters; 0 for a missing body.
pub fn character_count(body: Option<&str>) -> usize {
    body.map_or(0, |b| b.chars().count())
}
