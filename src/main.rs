mod config;
mod extract;
mod github;
mod load;
mod pipeline;
mod report;
mod transform;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// pr-etl: extracts pull requests, commits, reviews and comments from
/// GitHub and appends them to BigQuery as a dated snapshot.
#[derive(Parser, Debug)]
#[command(name = "pr-etl", version, about)]
struct Cli {
    /// Path to a TOML config file (defaults to ./.pr-etl.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Comma-separated repositories to crawl, overriding GITHUB_REPOS
    #[arg(short, long, value_delimiter = ',')]
    repos: Option<Vec<String>>,

    /// Pull requests per page and per load chunk (1-100)
    #[arg(long)]
    chunk_size: Option<u32>,

    /// Skip per-commit file lookups (no commit rows are produced)
    #[arg(long)]
    no_commit_files: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(summary) => {
            report::print_summary(&summary);
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "GitHub ETL failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<report::RunSummary, Box<dyn std::error::Error>> {
    info!("loading configuration");
    let mut config = config::Config::load(cli.config.as_deref())?;
    if let Some(repos) = cli.repos {
        config.github.repos = repos;
    }
    if cli.chunk_size.is_some() {
        config.github.chunk_size = cli.chunk_size;
    }
    if cli.no_commit_files {
        config.github.commit_files = Some(false);
    }
    let settings = config.validate()?;

    if settings.github_token.is_none() {
        warn!("no GitHub token provided: rate limits will be very low and private repositories won't work");
    }
    if let Some(url) = &settings.github_api_url {
        info!(%url, "using custom GitHub API URL");
    }
    if let Some(endpoint) = &settings.bigquery_endpoint {
        info!(%endpoint, "using BigQuery emulator");
    }

    let github = github::GitHubClient::new(
        settings.github_token.as_deref(),
        settings.github_api_url.as_deref(),
    )?;
    let credentials = load::bigquery::resolve_credentials(
        settings.bigquery_endpoint.as_deref(),
        settings.bigquery_access_token.clone(),
    )
    .await?;
    let warehouse =
        load::BigQueryClient::new(settings.bigquery_endpoint.as_deref(), credentials)?;
    info!(
        github = github.api_url(),
        bigquery = warehouse.endpoint(),
        project = %settings.bigquery_project,
        dataset = %settings.bigquery_dataset,
        "clients ready"
    );
    let loader = load::Loader::new(
        warehouse,
        settings.bigquery_project.as_str(),
        settings.bigquery_dataset.as_str(),
    );

    let pipeline = pipeline::Pipeline::new(github, loader, settings.profile);
    let summary = pipeline.run(&settings.repos).await?;
    info!(%summary, "done");
    Ok(summary)
}
