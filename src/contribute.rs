//! Save-draft and submit, the two write paths of a contributor.
//!
//! Content goes to the contributor's fork with their own credential. The canonical
//! metadata document upstream is then updated with the elevated credential; that
//! bookkeeping is best-effort and never fails the save.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::fork::{ForkInfo, ForkManager};
use crate::github::{GitHubClient, PullRequest, PutFileRequest};
use crate::metadata::MetadataStore;
use crate::registry::{LanguageConfig, ProjectConfig};
use crate::sanitize::{sanitize_filename, validate_commit_message, validate_content};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftResult {
    pub filename: String,
    pub commit_sha: String,
    pub fork: ForkInfo,
    /// False if the metadata update failed; the content itself was saved
    pub metadata_updated: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResult {
    pub filename: String,
    pub commit_sha: String,
    pub pr_number: u64,
    pub pr_url: String,
    /// False when an already-open pull request was reused
    pub pr_created: bool,
    pub metadata_updated: bool,
}

pub struct ContributionWorkflow<'a> {
    client: GitHubClient,
    forks: ForkManager,
    metadata: &'a MetadataStore,
    max_content_bytes: usize,
}

impl<'a> ContributionWorkflow<'a> {
    /// `user_client` must carry the contributor's own token.
    pub fn new(user_client: GitHubClient, metadata: &'a MetadataStore, config: &Config) -> Self {
        let forks = ForkManager::new(
            user_client.clone(),
            &config.github_web_url,
            config.fork_settle_delay(),
        );
        Self {
            client: user_client,
            forks,
            metadata,
            max_content_bytes: config.max_content_bytes,
        }
    }

    pub async fn save_draft(
        &self,
        user: &str,
        project: &ProjectConfig,
        lang: &str,
        filename: &str,
        content: &str,
    ) -> Result<DraftResult> {
        let filename = sanitize_filename(filename, project)?;
        validate_content(content, self.max_content_bytes)?;

        let message = format!("Update {} translation of {}", lang, filename);
        let (fork, commit_sha) = self
            .write_translation(user, project, lang, filename, content, &message)
            .await?;

        let metadata_updated = match self
            .metadata
            .mark_file_in_progress(project, lang, filename, user, &commit_sha)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    "Draft of {} saved but metadata update failed: {}",
                    filename, e
                );
                false
            }
        };

        Ok(DraftResult {
            filename: filename.to_string(),
            commit_sha,
            fork,
            metadata_updated,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn submit(
        &self,
        user: &str,
        project: &ProjectConfig,
        lang: &str,
        language: &LanguageConfig,
        filename: &str,
        content: &str,
        message: Option<&str>,
    ) -> Result<SubmitResult> {
        let filename = sanitize_filename(filename, project)?;
        validate_content(content, self.max_content_bytes)?;
        let note = match message {
            Some(m) => validate_commit_message(m)?,
            None => String::new(),
        };

        let commit_message = if note.is_empty() {
            format!("Translate {} to {}", filename, language.name)
        } else {
            note.clone()
        };
        let (fork, commit_sha) = self
            .write_translation(user, project, lang, filename, content, &commit_message)
            .await?;

        let (pr, pr_created) = self
            .open_or_reuse_pr(user, project, &fork, language, filename, &note)
            .await?;

        let metadata_updated = match self
            .metadata
            .mark_file_complete(
                project,
                lang,
                filename,
                user,
                &commit_sha,
                pr.number,
                &pr.html_url,
            )
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    "PR #{} for {} is open but metadata update failed: {}",
                    pr.number, filename, e
                );
                false
            }
        };

        Ok(SubmitResult {
            filename: filename.to_string(),
            commit_sha,
            pr_number: pr.number,
            pr_url: pr.html_url,
            pr_created,
            metadata_updated,
        })
    }

    /// Write `content` to the translation path in the user's fork, using the
    /// current blob sha so a concurrent edit surfaces as a conflict.
    async fn write_translation(
        &self,
        user: &str,
        project: &ProjectConfig,
        lang: &str,
        filename: &str,
        content: &str,
        message: &str,
    ) -> Result<(ForkInfo, String)> {
        let fork = self
            .forks
            .ensure_fork(user, &project.owner, &project.repo, lang)
            .await?;
        if !fork.has_branch {
            return Err(AppError::not_found(
                "Translation branch",
                format!(
                    "{}/{}@{}",
                    project.owner,
                    project.repo,
                    project.translation_branch(lang)
                ),
            ));
        }

        let path = project.translation_path(lang, filename);
        let sha = self
            .client
            .get_file_sha(&fork.owner, &fork.repo, &path, &fork.branch)
            .await?;
        let request = PutFileRequest::new(message, content, &fork.branch, sha);
        let response = self
            .client
            .put_file(&fork.owner, &fork.repo, &path, &request)
            .await?;

        info!(
            "{} saved {} to {}/{}@{} ({})",
            user, path, fork.owner, fork.repo, fork.branch, response.commit.sha
        );
        Ok((fork, response.commit.sha))
    }

    async fn open_or_reuse_pr(
        &self,
        user: &str,
        project: &ProjectConfig,
        fork: &ForkInfo,
        language: &LanguageConfig,
        filename: &str,
        note: &str,
    ) -> Result<(PullRequest, bool)> {
        if let Some(pr) = self
            .forks
            .get_existing_pr(user, &project.owner, &project.repo, &fork.branch)
            .await?
        {
            info!("Reusing PR #{} for {}", pr.number, user);
            return Ok((pr, false));
        }

        let title = format!("{} translation updates from @{}", language.name, user);
        let body = pull_request_body(user, language, filename, note);
        let pr = self
            .forks
            .create_pull_request(
                user,
                &project.owner,
                &project.repo,
                &fork.branch,
                &title,
                &body,
            )
            .await?;
        Ok((pr, true))
    }
}

fn pull_request_body(user: &str, language: &LanguageConfig, filename: &str, note: &str) -> String {
    let mut body = format!(
        "## {} translation\n\nSubmitted by @{} from the translation dashboard.\n\n**File:** `{}`\n",
        language.name, user, filename
    );
    if !note.is_empty() {
        body.push_str(&format!("\n**Notes:**\n\n{}\n", note));
    }
    body.push_str(
        "\nFurther submissions from this branch are added to this pull request.\n",
    );
    body
}
