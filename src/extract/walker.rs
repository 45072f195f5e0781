use tracing::{debug, info, instrument, warn};

use super::fetchers::{fetch_comments, fetch_commits, fetch_reviews};
use super::ExtractProfile;
use crate::github::pagination::{next_page, NextPage};
use crate::github::{decode, GitHubClient, GitHubError, PullRequest, Retry};

/// One page of enriched pull requests.
pub type Chunk = Vec<PullRequest>;

/// Walks the pull request listing of one repository page by page.
///
/// The listing is requested with `state=all`, sorted by creation date
/// ascending. Each call to [`next_chunk`](Self::next_chunk) fetches one page,
/// enriches every record with its commits, reviews and comments, and hands
/// the page back. Nothing is fetched ahead of the consumer.
pub struct PageWalker<'a> {
    client: &'a GitHubClient,
    repo: &'a str,
    profile: ExtractProfile,
    /// `page` parameter of the next request; `None` before the first page.
    page: Option<u32>,
    done: bool,
    pages: u32,
    total: usize,
}

impl<'a> PageWalker<'a> {
    pub fn new(client: &'a GitHubClient, repo: &'a str, profile: ExtractProfile) -> Self {
        info!(repo = %repo, "starting pull request extraction");
        Self {
            client,
            repo,
            profile,
            page: None,
            done: false,
            pages: 0,
            total: 0,
        }
    }

    /// Pages fetched so far.
    pub fn pages(&self) -> u32 {
        self.pages
    }

    /// Fetch and enrich the next page. `Ok(None)` once the listing is done.
    #[instrument(skip(self), fields(repo = %self.repo, page = ?self.page))]
    pub async fn next_chunk(&mut self) -> Result<Option<Chunk>, GitHubError> {
        while !self.done {
            let (batch, next) = self.fetch_page().await?;
            self.pages += 1;
            self.total += batch.len();

            if batch.is_empty() {
                self.finish();
                break;
            }
            info!(
                page = self.pages,
                prs = batch.len(),
                total = self.total,
                "extracted page"
            );

            match next {
                NextPage::Page(page) => self.page = Some(page),
                NextPage::End => self.finish(),
                NextPage::Malformed(reason) => {
                    warn!(%reason, "unusable next link, stopping pagination");
                    self.finish();
                }
            }

            let chunk = self.enrich(batch).await?;
            if !chunk.is_empty() {
                return Ok(Some(chunk));
            }
        }
        Ok(None)
    }

    async fn fetch_page(&self) -> Result<(Vec<PullRequest>, NextPage), GitHubError> {
        let mut query = vec![
            ("state", "all".to_string()),
            ("per_page", self.profile.chunk_size.to_string()),
            ("sort", "created".to_string()),
            ("direction", "asc".to_string()),
        ];
        if let Some(page) = self.page {
            query.push(("page", page.to_string()));
        }

        let response = self
            .client
            .get(
                &format!("/repos/{}/pulls", self.repo),
                &query,
                Retry::UntilAvailable,
            )
            .await?;
        let next = next_page(response.headers());
        let batch = decode(response).await?;
        Ok((batch, next))
    }

    async fn enrich(&self, batch: Vec<PullRequest>) -> Result<Chunk, GitHubError> {
        let mut chunk = Vec::with_capacity(batch.len());
        for mut pr in batch {
            let Some(number) = pr.id() else {
                debug!(title = ?pr.title, "pull request without number, skipping");
                continue;
            };
            pr.commit_data = fetch_commits(self.client, self.repo, number, &self.profile).await?;
            pr.reviewer_data = fetch_reviews(self.client, self.repo, number).await?;
            pr.comment_data = fetch_comments(self.client, self.repo, number).await?;
            chunk.push(pr);
        }
        Ok(chunk)
    }

    fn finish(&mut self) {
        if !self.done {
            self.done = true;
            info!(
                repo = %self.repo,
                total = self.total,
                pages = self.pages,
                "pull request extraction completed"
            );
        }
    }
}
