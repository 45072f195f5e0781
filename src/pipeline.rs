//! Drives extract → transform → load, one chunk at a time.

use thiserror::Error;
use tracing::{info, info_span, Instrument};

use crate::extract::{ExtractProfile, PageWalker};
use crate::github::{GitHubClient, GitHubError};
use crate::load::{LoadError, Loader, Warehouse};
use crate::report::RunSummary;
use crate::transform;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    GitHub(#[from] GitHubError),

    #[error(transparent)]
    Load(#[from] LoadError),
}

pub struct Pipeline<W> {
    github: GitHubClient,
    loader: Loader<W>,
    profile: ExtractProfile,
}

impl<W: Warehouse> Pipeline<W> {
    pub fn new(github: GitHubClient, loader: Loader<W>, profile: ExtractProfile) -> Self {
        Self {
            github,
            loader,
            profile,
        }
    }

    /// Process every repository in order. The first error aborts the run;
    /// chunks loaded before it stay loaded.
    pub async fn run(&self, repos: &[String]) -> Result<RunSummary, PipelineError> {
        info!(repos = repos.len(), "starting GitHub ETL with chunked processing");
        let mut summary = RunSummary::default();

        for repo in repos {
            self.run_repository(repo, &mut summary)
                .instrument(info_span!("repository", repo = %repo))
                .await?;
            summary.repositories += 1;
        }

        info!(
            pull_requests = summary.pull_requests,
            chunks = summary.chunks,
            "GitHub ETL completed"
        );
        Ok(summary)
    }

    async fn run_repository(
        &self,
        repo: &str,
        summary: &mut RunSummary,
    ) -> Result<(), PipelineError> {
        let mut walker = PageWalker::new(&self.github, repo, self.profile);
        let mut chunk_number = 0usize;

        while let Some(chunk) = walker.next_chunk().await? {
            chunk_number += 1;
            info!(chunk = chunk_number, prs = chunk.len(), "processing chunk");

            let data = transform::transform(&chunk, repo);
            let rows = self.loader.load(&data).await?;

            summary.chunks += 1;
            summary.pull_requests += chunk.len();
            summary.rows.add(rows);
            info!(
                chunk = chunk_number,
                total_prs = summary.pull_requests,
                "completed chunk"
            );
        }
        info!(chunks = chunk_number, pages = walker.pages(), "repository done");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::RateLimitGovernor;
    use crate::load::testing::RecordingWarehouse;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn day_one() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn day_two() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 2).unwrap()
    }

    async fn mount(server: &MockServer, at: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    /// One repository with two PRs: #1 fully populated, #2 bare.
    async fn mount_firefox(server: &MockServer) {
        mount(
            server,
            "/repos/mozilla/firefox/pulls",
            json!([
                {
                    "number": 1,
                    "title": "Bug 1234567 - Fix crash",
                    "state": "closed",
                    "created_at": "2024-01-01T00:00:00Z",
                    "updated_at": "2024-01-03T00:00:00Z",
                    "merged_at": "2024-01-03T00:00:00Z",
                    "labels": [{"name": "bug"}]
                },
                {"number": 2, "title": "Docs", "state": "open"}
            ]),
        )
        .await;
        mount(
            server,
            "/repos/mozilla/firefox/pulls/1/commits",
            json!([{"sha": "abc", "commit": {"author": {"name": "Dev", "email": "dev@example.com", "date": "2024-01-01T01:00:00Z"}}}]),
        )
        .await;
        mount(
            server,
            "/repos/mozilla/firefox/commits/abc",
            json!({"files": [
                {"filename": "a.cpp", "additions": 10, "deletions": 2},
                {"filename": "b.h", "additions": 1, "deletions": 0}
            ]}),
        )
        .await;
        mount(
            server,
            "/repos/mozilla/firefox/pulls/1/reviews",
            json!([
                {"id": 100, "state": "APPROVED", "user": {"login": "rev"}, "submitted_at": "2024-01-02T00:00:00Z"},
                {"id": 101, "state": "COMMENTED", "user": {"login": "rev2"}, "submitted_at": "2024-01-02T01:00:00Z"}
            ]),
        )
        .await;
        mount(
            server,
            "/repos/mozilla/firefox/issues/1/comments",
            json!([{"id": 7, "body": "LGTM", "user": {"login": "rev"}, "pull_request_review_id": 100}]),
        )
        .await;
        for sub in ["pulls/2/commits", "pulls/2/reviews", "issues/2/comments"] {
            mount(server, &format!("/repos/mozilla/firefox/{sub}"), json!([])).await;
        }
    }

    fn pipeline<W: Warehouse>(server: &MockServer, warehouse: W, today: fn() -> NaiveDate) -> Pipeline<W> {
        let github = GitHubClient::new(Some("token"), Some(&server.uri()))
            .unwrap()
            .with_governor(RateLimitGovernor::with_clock(|| 0));
        let loader = Loader::new(warehouse, "proj", "github_etl").with_snapshot_clock(today);
        Pipeline::new(github, loader, ExtractProfile::default())
    }

    #[tokio::test]
    async fn test_single_repository_end_to_end() {
        let server = MockServer::start().await;
        mount_firefox(&server).await;

        let pipeline = pipeline(&server, RecordingWarehouse::default(), day_one);
        let summary = pipeline
            .run(&["mozilla/firefox".to_string()])
            .await
            .unwrap();

        assert_eq!(summary.repositories, 1);
        assert_eq!(summary.chunks, 1);
        assert_eq!(summary.pull_requests, 2);
        assert_eq!(summary.rows.pull_requests, 2);
        assert_eq!(summary.rows.commits, 2);
        assert_eq!(summary.rows.reviewers, 1);
        assert_eq!(summary.rows.comments, 1);

        let warehouse = pipeline.loader.warehouse();
        let prs = warehouse.rows("pull_requests");
        assert_eq!(prs[0]["bug_id"], 1234567);
        assert_eq!(prs[0]["date_approved"], "2024-01-02T00:00:00Z");
        assert_eq!(prs[0]["labels"], json!(["bug"]));
        assert_eq!(prs[1]["bug_id"], serde_json::Value::Null);

        let comments = warehouse.rows("comments");
        assert_eq!(comments[0]["status"], "APPROVED");
        assert_eq!(comments[0]["character_count"], 4);

        let commits = warehouse.rows("commits");
        assert_eq!(commits[0]["filename"], "a.cpp");
        assert_eq!(commits[1]["filename"], "b.h");
        assert!(commits.iter().all(|c| c["snapshot_date"] == "2024-06-01"));
        assert!(commits.iter().all(|c| c["target_repository"] == "mozilla/firefox"));
    }

    #[tokio::test]
    async fn test_repositories_processed_in_order() {
        let server = MockServer::start().await;
        mount_firefox(&server).await;
        mount(
            &server,
            "/repos/mozilla/gecko-dev/pulls",
            json!([{"number": 9, "title": "b=42 tweak"}]),
        )
        .await;
        for sub in ["pulls/9/commits", "pulls/9/reviews", "issues/9/comments"] {
            mount(&server, &format!("/repos/mozilla/gecko-dev/{sub}"), json!([])).await;
        }

        let pipeline = pipeline(&server, RecordingWarehouse::default(), day_one);
        let summary = pipeline
            .run(&["mozilla/firefox".to_string(), "mozilla/gecko-dev".to_string()])
            .await
            .unwrap();

        assert_eq!(summary.repositories, 2);
        assert_eq!(summary.chunks, 2);
        let prs = pipeline.loader.warehouse().rows("pull_requests");
        let repos: Vec<_> = prs
            .iter()
            .map(|r| r["target_repository"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(repos, vec!["mozilla/firefox", "mozilla/firefox", "mozilla/gecko-dev"]);
        assert_eq!(prs[2]["bug_id"], 42);
    }

    #[tokio::test]
    async fn test_rerun_appends_duplicates_with_new_snapshot_date() {
        // Reruns are not idempotent: unchanged upstream data is appended
        // again under the new snapshot date.
        let server = MockServer::start().await;
        mount_firefox(&server).await;
        let warehouse = Arc::new(RecordingWarehouse::default());
        let repos = ["mozilla/firefox".to_string()];

        pipeline(&server, Arc::clone(&warehouse), day_one)
            .run(&repos)
            .await
            .unwrap();
        pipeline(&server, Arc::clone(&warehouse), day_two)
            .run(&repos)
            .await
            .unwrap();

        let prs = warehouse.rows("pull_requests");
        assert_eq!(prs.len(), 4);
        let dates: Vec<_> = prs.iter().map(|r| r["snapshot_date"].clone()).collect();
        assert_eq!(
            dates,
            vec![json!("2024-06-01"), json!("2024-06-01"), json!("2024-06-02"), json!("2024-06-02")]
        );

        let strip = |mut row: serde_json::Value| {
            row.as_object_mut().unwrap().remove("snapshot_date");
            row
        };
        assert_eq!(strip(prs[0].clone()), strip(prs[2].clone()));
        assert_eq!(warehouse.rows("commits").len(), 4);
    }

    #[tokio::test]
    async fn test_upstream_error_aborts_run_after_loaded_chunks() {
        let server = MockServer::start().await;
        mount_firefox(&server).await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/repos/mozilla/broken/"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
            .mount(&server)
            .await;

        let pipeline = pipeline(&server, RecordingWarehouse::default(), day_one);
        let err = pipeline
            .run(&["mozilla/firefox".to_string(), "mozilla/broken".to_string()])
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::GitHub(GitHubError::Api { .. })));
        assert!(err.to_string().contains("500"));
        // The first repository's chunk was already written.
        assert_eq!(pipeline.loader.warehouse().rows("pull_requests").len(), 2);
    }

    #[tokio::test]
    async fn test_insert_errors_abort_run() {
        let server = MockServer::start().await;
        mount_firefox(&server).await;

        let pipeline = pipeline(&server, RecordingWarehouse::rejecting("commits"), day_one);
        let err = pipeline
            .run(&["mozilla/firefox".to_string()])
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Load(LoadError::InsertErrors { ref table, .. }) if table == "commits"));
        assert_eq!(
            pipeline.loader.warehouse().tables_written(),
            vec!["pull_requests"]
        );
    }

    #[tokio::test]
    async fn test_repository_without_pull_requests() {
        let server = MockServer::start().await;
        mount(&server, "/repos/mozilla/empty/pulls", json!([])).await;

        let pipeline = pipeline(&server, RecordingWarehouse::default(), day_one);
        let summary = pipeline.run(&["mozilla/empty".to_string()]).await.unwrap();

        assert_eq!(summary.repositories, 1);
        assert_eq!(summary.chunks, 0);
        assert!(pipeline.loader.warehouse().tables_written().is_empty());
    }
}
