use super::error::{ErrorBody, GitHubError};
use super::rate_limit::{RateLimitMonitor, RateLimitSnapshot};
use super::types::*;
use crate::retry::{with_retry_if, RetryConfig};
use anyhow::Context;
use chrono::DateTime;
use reqwest::header::ACCEPT;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("translation-sync/", env!("CARGO_PKG_VERSION"));
const PAGE_SIZE: usize = 100;

/// GitHub REST client bound to one credential.
///
/// Every call goes through [`with_retry_if`]: 5xx responses, timeouts and dropped
/// connections are retried with exponential backoff, 4xx responses fail on the
/// first attempt. Response headers feed the [`RateLimitMonitor`].
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
    retry: RetryConfig,
    rate_limit: RateLimitMonitor,
}

type GhResult<T> = Result<T, GitHubError>;

impl GitHubClient {
    /// Build a client with a bounded per-request timeout.
    pub fn new(api_url: &str, token: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to build GitHub HTTP client")?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            retry: RetryConfig::github_api(),
            rate_limit: RateLimitMonitor::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_rate_limit_monitor(mut self, monitor: RateLimitMonitor) -> Self {
        self.rate_limit = monitor;
        self
    }

    /// Same connection pool and policies, different credential.
    pub fn with_token(&self, token: &str) -> Self {
        Self {
            token: token.to_string(),
            ..self.clone()
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    // ---------------------------------------------------------------------
    // Transport
    // ---------------------------------------------------------------------

    async fn send_once(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> GhResult<String> {
        let url = format!("{}{}", self.api_url, path);

        let mut request = self
            .http
            .request(method, &url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");

        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GitHubError::from_transport(path, e))?;

        let rate_limit = self.rate_limit.observe(response.headers());
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GitHubError::from_transport(path, e))?;

        if status.is_success() {
            return Ok(text);
        }

        Err(GitHubError::Status {
            status: status.as_u16(),
            path: path.to_string(),
            body: ErrorBody::from_text(&text),
            rate_limit,
        })
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> GhResult<String> {
        let operation = format!("GitHub {} {}", method, path);
        with_retry_if(
            &self.retry,
            &operation,
            || self.send_once(method.clone(), path, query, body),
            GitHubError::is_retryable,
        )
        .await
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> GhResult<T> {
        let text = self.execute(method, path, query, body).await?;
        serde_json::from_str(&text).map_err(|e| GitHubError::decode(path, e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> GhResult<T> {
        self.call(Method::GET, path, query, None).await
    }

    /// GET that maps 404 to `None`.
    async fn get_optional<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> GhResult<Option<T>> {
        match self.get(path, query).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    // ---------------------------------------------------------------------
    // Repositories and forks
    // ---------------------------------------------------------------------

    pub async fn get_repo(&self, owner: &str, repo: &str) -> GhResult<Repository> {
        self.get(&format!("/repos/{}/{}", owner, repo), &[]).await
    }

    /// Like [`Self::get_repo`] but a missing repository is `None`.
    pub async fn find_repo(&self, owner: &str, repo: &str) -> GhResult<Option<Repository>> {
        self.get_optional(&format!("/repos/{}/{}", owner, repo), &[])
            .await
    }

    /// Ask GitHub to fork `owner/repo` into the authenticated account.
    /// Provisioning continues asynchronously after this returns.
    pub async fn create_fork(&self, owner: &str, repo: &str) -> GhResult<Repository> {
        let body = json!({ "default_branch_only": false });
        self.call(
            Method::POST,
            &format!("/repos/{}/{}/forks", owner, repo),
            &[],
            Some(&body),
        )
        .await
    }

    // ---------------------------------------------------------------------
    // Branches
    // ---------------------------------------------------------------------

    /// Tip of `branch`, or `None` if the branch does not exist.
    pub async fn get_branch(&self, owner: &str, repo: &str, branch: &str) -> GhResult<Option<GitRef>> {
        self.get_optional(
            &format!("/repos/{}/{}/git/ref/heads/{}", owner, repo, branch),
            &[],
        )
        .await
    }

    /// Create `refs/heads/{branch}` at `sha`. GitHub answers 422 if it already exists.
    pub async fn create_branch(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        sha: &str,
    ) -> GhResult<GitRef> {
        let body = json!({
            "ref": format!("refs/heads/{}", branch),
            "sha": sha,
        });
        self.call(
            Method::POST,
            &format!("/repos/{}/{}/git/refs", owner, repo),
            &[],
            Some(&body),
        )
        .await
    }

    pub async fn list_branches(&self, owner: &str, repo: &str) -> GhResult<Vec<Branch>> {
        let path = format!("/repos/{}/{}/branches", owner, repo);
        let mut branches = Vec::new();
        let mut page = 1;

        loop {
            let batch: Vec<Branch> = self
                .get(
                    &path,
                    &[
                        ("per_page", PAGE_SIZE.to_string()),
                        ("page", page.to_string()),
                    ],
                )
                .await?;
            let done = batch.len() < PAGE_SIZE;
            branches.extend(batch);
            if done {
                break;
            }
            page += 1;
        }

        Ok(branches)
    }

    // ---------------------------------------------------------------------
    // Contents
    // ---------------------------------------------------------------------

    /// File at `path` on `git_ref`, or `None` if it does not exist there.
    pub async fn get_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> GhResult<Option<FileContent>> {
        self.get_optional(
            &contents_path(owner, repo, path),
            &[("ref", git_ref.to_string())],
        )
        .await
    }

    /// Decoded text of a file, or `None` if it does not exist.
    pub async fn get_file_text(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> GhResult<Option<String>> {
        match self.get_file(owner, repo, path, git_ref).await? {
            Some(file) => file
                .decoded()
                .map(Some)
                .map_err(|message| GitHubError::decode(path, message)),
            None => Ok(None),
        }
    }

    /// Blob sha of a file, used as the expected sha for the next write.
    pub async fn get_file_sha(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> GhResult<Option<String>> {
        Ok(self
            .get_file(owner, repo, path, git_ref)
            .await?
            .map(|file| file.sha))
    }

    /// Create or replace a file. With `request.sha` set, GitHub rejects the write if
    /// the file has changed since that sha was read.
    pub async fn put_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        request: &PutFileRequest,
    ) -> GhResult<PutFileResponse> {
        let body = serde_json::to_value(request)
            .map_err(|e| GitHubError::decode(path, e.to_string()))?;
        debug!(
            "Writing {} to {}/{}@{}",
            path, owner, repo, request.branch
        );
        self.call(Method::PUT, &contents_path(owner, repo, path), &[], Some(&body))
            .await
    }

    pub async fn delete_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        message: &str,
        sha: &str,
        branch: &str,
    ) -> GhResult<()> {
        let body = json!({
            "message": message,
            "sha": sha,
            "branch": branch,
        });
        self.execute(
            Method::DELETE,
            &contents_path(owner, repo, path),
            &[],
            Some(&body),
        )
        .await
        .map(|_| ())
    }

    pub async fn list_directory(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> GhResult<Vec<DirectoryEntry>> {
        self.get(
            &contents_path(owner, repo, path),
            &[("ref", git_ref.to_string())],
        )
        .await
    }

    // ---------------------------------------------------------------------
    // Synchronization
    // ---------------------------------------------------------------------

    /// Compare two refs of `owner/repo`. Refs may be qualified as `owner:branch`
    /// to compare across a fork network.
    pub async fn compare(&self, owner: &str, repo: &str, base: &str, head: &str) -> GhResult<Comparison> {
        self.get(
            &format!("/repos/{}/{}/compare/{}...{}", owner, repo, base, head),
            &[],
        )
        .await
    }

    /// Merge the upstream branch of the same name into the fork's `branch`.
    /// A conflicting merge is answered with 409.
    pub async fn merge_upstream(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> GhResult<MergeUpstreamResponse> {
        let body = json!({ "branch": branch });
        self.call(
            Method::POST,
            &format!("/repos/{}/{}/merge-upstream", owner, repo),
            &[],
            Some(&body),
        )
        .await
    }

    // ---------------------------------------------------------------------
    // Pull requests
    // ---------------------------------------------------------------------

    pub async fn create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        request: &NewPullRequest,
    ) -> GhResult<PullRequest> {
        let body = serde_json::to_value(request)
            .map_err(|e| GitHubError::decode("pulls", e.to_string()))?;
        self.call(
            Method::POST,
            &format!("/repos/{}/{}/pulls", owner, repo),
            &[],
            Some(&body),
        )
        .await
    }

    /// Open pull requests, optionally filtered by `owner:branch` head.
    pub async fn list_pull_requests(
        &self,
        owner: &str,
        repo: &str,
        head: Option<&str>,
    ) -> GhResult<Vec<PullRequest>> {
        let mut query = vec![
            ("state", "open".to_string()),
            ("per_page", PAGE_SIZE.to_string()),
        ];
        if let Some(head) = head {
            query.push(("head", head.to_string()));
        }
        self.get(&format!("/repos/{}/{}/pulls", owner, repo), &query)
            .await
    }

    // ---------------------------------------------------------------------
    // Identity and quota
    // ---------------------------------------------------------------------

    pub async fn get_authenticated_user(&self) -> GhResult<AuthenticatedUser> {
        self.get("/user", &[]).await
    }

    /// Core REST quota for this credential.
    pub async fn get_rate_limit(&self) -> GhResult<RateLimitSnapshot> {
        let response: RateLimitResponse = self.get("/rate_limit", &[]).await?;
        let core = response.resources.core;
        Ok(RateLimitSnapshot {
            limit: Some(core.limit),
            remaining: core.remaining,
            reset_at: DateTime::from_timestamp(core.reset, 0),
        })
    }
}

/// `/repos/{owner}/{repo}/contents/{path}` with each path segment percent-encoded.
fn contents_path(owner: &str, repo: &str, path: &str) -> String {
    let encoded: Vec<String> = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!("/repos/{}/{}/contents/{}", owner, repo, encoded.join("/"))
}
