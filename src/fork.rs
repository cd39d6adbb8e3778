//! Per-user forks and their translation branches.
//!
//! Every contributor works in a fork of the upstream repository, on the same
//! `translations/{lang}` branch that exists upstream. This module makes sure that
//! workspace exists, measures how far it has drifted from upstream, and merges
//! upstream changes back in. Merge conflicts are reported, never resolved here.

use crate::error::Result;
use crate::github::{CommitSummary, GitHubClient, NewPullRequest, PullRequest};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

/// Where a contributor's working copy lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkInfo {
    pub owner: String,
    pub repo: String,
    pub html_url: String,
    pub branch: String,
    /// False when upstream has no translation branch yet to branch from
    pub has_branch: bool,
    /// The fork was created by this call
    pub created: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Behind,
    Ahead,
    Diverged,
    Identical,
}

/// Classify a fork branch by its commit deltas against upstream.
pub fn classify_sync(behind_by: u64, ahead_by: u64) -> SyncStatus {
    match (behind_by, ahead_by) {
        (0, 0) => SyncStatus::Identical,
        (_, 0) => SyncStatus::Behind,
        (0, _) => SyncStatus::Ahead,
        _ => SyncStatus::Diverged,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCommit {
    pub sha: String,
    pub message: String,
    pub author: Option<String>,
    pub url: Option<String>,
}

impl From<CommitSummary> for SyncCommit {
    fn from(commit: CommitSummary) -> Self {
        Self {
            sha: commit.sha,
            message: commit.commit.message,
            author: commit.commit.author.map(|a| a.name),
            url: commit.html_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusResponse {
    pub status: SyncStatus,
    pub behind_by: u64,
    pub ahead_by: u64,
    /// Upstream commits the fork does not have yet
    pub commits: Vec<SyncCommit>,
    pub compare_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    pub conflicts: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_url: Option<String>,
}

/// Summary for the contributor's sync panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkStatus {
    pub has_fork: bool,
    pub has_branch: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fork_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncStatusResponse>,
}

/// Fork operations performed with the contributor's own credential.
#[derive(Debug, Clone)]
pub struct ForkManager {
    client: GitHubClient,
    web_url: String,
    settle_delay: Duration,
}

impl ForkManager {
    pub fn new(client: GitHubClient, web_url: &str, settle_delay: Duration) -> Self {
        Self {
            client,
            web_url: web_url.trim_end_matches('/').to_string(),
            settle_delay,
        }
    }

    /// Make sure `user` has a fork of `upstream_owner/upstream_repo` with the
    /// translation branch for `lang`. A missing upstream branch is not an error:
    /// the result carries `has_branch = false`.
    pub async fn ensure_fork(
        &self,
        user: &str,
        upstream_owner: &str,
        upstream_repo: &str,
        lang: &str,
    ) -> Result<ForkInfo> {
        let branch = format!("translations/{}", lang);

        let (fork, created) = match self.client.find_repo(user, upstream_repo).await? {
            Some(repo) => (repo, false),
            None => {
                info!("Creating fork of {}/{} for {}", upstream_owner, upstream_repo, user);
                let repo = self.client.create_fork(upstream_owner, upstream_repo).await?;
                // Forks are provisioned asynchronously
                tokio::time::sleep(self.settle_delay).await;
                (repo, true)
            }
        };

        let fork_owner = fork.owner.login.clone();
        let fork_repo = fork.name.clone();

        let has_branch = if self
            .client
            .get_branch(&fork_owner, &fork_repo, &branch)
            .await?
            .is_some()
        {
            true
        } else {
            self.branch_from_upstream(&fork_owner, &fork_repo, upstream_owner, upstream_repo, &branch)
                .await?
        };

        Ok(ForkInfo {
            owner: fork_owner,
            repo: fork_repo,
            html_url: fork.html_url,
            branch,
            has_branch,
            created,
        })
    }

    /// Create `branch` in the fork at the upstream branch tip. Returns false when
    /// upstream has no such branch.
    async fn branch_from_upstream(
        &self,
        fork_owner: &str,
        fork_repo: &str,
        upstream_owner: &str,
        upstream_repo: &str,
        branch: &str,
    ) -> Result<bool> {
        let Some(tip) = self
            .client
            .get_branch(upstream_owner, upstream_repo, branch)
            .await?
        else {
            warn!(
                "Upstream {}/{} has no {} branch yet; language not initialized",
                upstream_owner, upstream_repo, branch
            );
            return Ok(false);
        };

        match self
            .client
            .create_branch(fork_owner, fork_repo, branch, &tip.object.sha)
            .await
        {
            Ok(_) => {
                info!("Created {} in {}/{} at {}", branch, fork_owner, fork_repo, tip.object.sha);
                Ok(true)
            }
            // Someone else created it between our check and now
            Err(e) if e.is_unprocessable() => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    /// Compare the fork branch (base) against the upstream branch (head).
    pub async fn check_fork_sync_status(
        &self,
        user: &str,
        upstream_owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<SyncStatusResponse> {
        let base = format!("{}:{}", user, branch);
        let head = format!("{}:{}", upstream_owner, branch);
        let comparison = self.client.compare(upstream_owner, repo, &base, &head).await?;

        // Upstream's lead over the fork is the fork's lag
        let behind_by = comparison.ahead_by;
        let ahead_by = comparison.behind_by;

        Ok(SyncStatusResponse {
            status: classify_sync(behind_by, ahead_by),
            behind_by,
            ahead_by,
            commits: comparison.commits.into_iter().map(SyncCommit::from).collect(),
            compare_url: self.compare_url(user, upstream_owner, repo, branch),
        })
    }

    /// Merge upstream into the fork branch. A conflicting merge comes back as an
    /// unsuccessful result with a URL for resolving it by hand.
    pub async fn sync_fork_with_upstream(
        &self,
        user: &str,
        upstream_owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<SyncResult> {
        match self.client.merge_upstream(user, repo, branch).await {
            Ok(response) => {
                info!("Synced {}/{}@{}: {}", user, repo, branch, response.message);
                Ok(SyncResult {
                    success: true,
                    conflicts: false,
                    message: response.message,
                    conflict_url: None,
                })
            }
            Err(e) if e.is_conflict() => {
                warn!("Merge conflict syncing {}/{}@{}", user, repo, branch);
                Ok(SyncResult {
                    success: false,
                    conflicts: true,
                    message: "Your branch has conflicts with upstream that must be resolved manually"
                        .to_string(),
                    conflict_url: Some(self.compare_url(user, upstream_owner, repo, branch)),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_fork_status(
        &self,
        user: &str,
        upstream_owner: &str,
        repo: &str,
        lang: &str,
    ) -> Result<ForkStatus> {
        let branch = format!("translations/{}", lang);

        let Some(fork) = self.client.find_repo(user, repo).await? else {
            return Ok(ForkStatus {
                has_fork: false,
                has_branch: false,
                fork_url: None,
                sync: None,
            });
        };

        let has_branch = self.client.get_branch(user, repo, &branch).await?.is_some();
        let sync = if has_branch {
            Some(
                self.check_fork_sync_status(user, upstream_owner, repo, &branch)
                    .await?,
            )
        } else {
            None
        };

        Ok(ForkStatus {
            has_fork: true,
            has_branch,
            fork_url: Some(fork.html_url),
            sync,
        })
    }

    /// Open a PR from `user:branch` into the upstream branch of the same name.
    pub async fn create_pull_request(
        &self,
        user: &str,
        upstream_owner: &str,
        repo: &str,
        branch: &str,
        title: &str,
        body: &str,
    ) -> Result<PullRequest> {
        let request = NewPullRequest {
            title: title.to_string(),
            body: body.to_string(),
            head: format!("{}:{}", user, branch),
            base: branch.to_string(),
            maintainer_can_modify: true,
        };
        let pr = self
            .client
            .create_pull_request(upstream_owner, repo, &request)
            .await?;
        info!("Opened PR #{} from {}:{}", pr.number, user, branch);
        Ok(pr)
    }

    /// Open PR from this user's branch, if any.
    pub async fn get_existing_pr(
        &self,
        user: &str,
        upstream_owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<Option<PullRequest>> {
        let head = format!("{}:{}", user, branch);
        let prs = self
            .client
            .list_pull_requests(upstream_owner, repo, Some(&head))
            .await?;

        Ok(prs.into_iter().find(|pr| {
            pr.head.ref_name == branch && pr.user.login.eq_ignore_ascii_case(user)
        }))
    }

    fn compare_url(&self, user: &str, upstream_owner: &str, repo: &str, branch: &str) -> String {
        format!(
            "{}/{}/{}/compare/{}...{}:{}",
            self.web_url, user, repo, branch, upstream_owner, branch
        )
    }
}
