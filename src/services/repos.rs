//! Repository head polling via the GitHub REST API.

use reqwest::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::Observation;

#[derive(Debug, Deserialize)]
struct CommitInfo {
    sha: String,
}

/// SHA of the first commit in a `/commits` listing.
pub fn latest_sha(body: &str) -> Result<Option<String>> {
    let commits: Vec<CommitInfo> = serde_json::from_str(body)?;
    Ok(commits.into_iter().next().map(|c| c.sha))
}

fn commits_url(api_base: &str, repo: &str) -> String {
    format!(
        "{}/repos/{}/commits?per_page=1",
        api_base.trim_end_matches('/'),
        repo
    )
}

/// Observe a repository's latest commit.
pub async fn observe_repo(
    client: &Client,
    api_base: &str,
    token: Option<&str>,
    repo: &str,
) -> Result<Observation> {
    let mut request = client
        .get(commits_url(api_base, repo))
        .header(ACCEPT, "application/vnd.github+json");
    if let Some(token) = token {
        request = request.header(AUTHORIZATION, format!("Bearer {token}"));
    }

    let body = request.send().await?.error_for_status()?.text().await?;
    let sha = latest_sha(&body)?
        .ok_or_else(|| AppError::validation(format!("repository {repo} has no commits")))?;

    Ok(Observation::repo_state(repo, sha))
}
