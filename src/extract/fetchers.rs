//! Sub-resource fetchers: one paged listing (plus per-commit detail calls) per PR.

use tracing::{debug, info, instrument};

use super::ExtractProfile;
use crate::github::{
    Comment, Commit, CommitDiff, GitHubClient, GitHubError, Retry, Review, Reviews,
};

/// List the commits of a pull request and attach each commit's changed files.
///
/// This is one paged list read plus one detail call per commit when the
/// profile asks for file stats.
#[instrument(skip(client, profile), fields(repo = %repo, pr = pr_number))]
pub async fn fetch_commits(
    client: &GitHubClient,
    repo: &str,
    pr_number: u64,
    profile: &ExtractProfile,
) -> Result<Vec<Commit>, GitHubError> {
    let mut commits: Vec<Commit> = client
        .get_all(&format!("/repos/{repo}/pulls/{pr_number}/commits"), Retry::Once)
        .await?;

    if profile.commit_files {
        for commit in &mut commits {
            let Some(sha) = commit.sha.as_deref() else {
                debug!("commit without sha, skipping file lookup");
                continue;
            };
            let diff: CommitDiff = client
                .get_json(&format!("/repos/{repo}/commits/{sha}"), Retry::Once)
                .await?;
            commit.files = diff.files;
        }
    }

    info!(commits = commits.len(), "extracted commits");
    Ok(commits)
}

/// List the reviews of a pull request, split into decisions and
/// comment-only reviews.
#[instrument(skip(client), fields(repo = %repo, pr = pr_number))]
pub async fn fetch_reviews(
    client: &GitHubClient,
    repo: &str,
    pr_number: u64,
) -> Result<Reviews, GitHubError> {
    let reviews: Vec<Review> = client
        .get_all(&format!("/repos/{repo}/pulls/{pr_number}/reviews"), Retry::Once)
        .await?;
    let reviews = Reviews::partition(reviews);

    info!(
        reviews = reviews.decisions.len(),
        comment_only = reviews.comment_only.len(),
        "extracted reviews"
    );
    Ok(reviews)
}

/// List the conversation comments of a pull request.
///
/// PR conversation comments live under the issue resource, not under
/// `/pulls/{n}/comments` (which holds inline review comments).
#[instrument(skip(client), fields(repo = %repo, pr = pr_number))]
pub async fn fetch_comments(
    client: &GitHubClient,
    repo: &str,
    pr_number: u64,
) -> Result<Vec<Comment>, GitHubError> {
    let comments: Vec<Comment> = client
        .get_all(&format!("/repos/{repo}/issues/{pr_number}/comments"), Retry::Once)
        .await?;

    info!(comments = comments.len(), "extracted comments");
    Ok(comments)
}
