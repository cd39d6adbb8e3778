//! One-time setup of a language: branch, machine translation, metadata.
//!
//! Files are processed one after another so ordering stays deterministic and the
//! translation quota is consumed at a steady pace. A file that fails is recorded and
//! skipped; the branch is never rolled back.

use crate::error::{AppError, Result};
use crate::github::{EntryKind, GitHubClient, PutFileRequest};
use crate::markdown::word_count;
use crate::metadata::{FileMetadata, MetadataStore, TranslationMetadata};
use crate::registry::{LanguageConfig, ProjectConfig};
use crate::translation::{translate_markdown, TranslationService};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Capacity for progress channels handed to [`LanguageInitializer::with_progress`].
pub const PROGRESS_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    Pending,
    Translating,
    Complete,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub file: String,
    /// 1-based position in processing order
    pub index: usize,
    pub total: usize,
    pub state: FileState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileError {
    pub file: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializationResult {
    /// True only if every file was translated and written
    pub success: bool,
    pub files_processed: usize,
    pub total_files: usize,
    pub errors: Vec<FileError>,
    pub branch_url: String,
    pub source_commit: String,
    /// Timestamp written to the metadata document
    pub initialized_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Initialize against this commit instead of the default branch tip
    pub commit: Option<String>,
    /// Recorded as the language coordinator
    pub coordinator: Option<String>,
}

/// Runs the initialization pipeline against the upstream repository.
pub struct LanguageInitializer<'a, T: TranslationService> {
    client: &'a GitHubClient,
    translator: &'a T,
    metadata: &'a MetadataStore,
    web_url: &'a str,
    progress: Option<mpsc::Sender<ProgressEvent>>,
}

impl<'a, T: TranslationService> LanguageInitializer<'a, T> {
    pub fn new(
        client: &'a GitHubClient,
        translator: &'a T,
        metadata: &'a MetadataStore,
        web_url: &'a str,
    ) -> Self {
        Self {
            client,
            translator,
            metadata,
            web_url: web_url.trim_end_matches('/'),
            progress: None,
        }
    }

    /// Report per-file progress on `sender`. Sends wait for capacity, so the
    /// receiver must be drained concurrently.
    pub fn with_progress(mut self, sender: mpsc::Sender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    pub async fn run(
        &self,
        project: &ProjectConfig,
        lang: &str,
        language: &LanguageConfig,
        options: &InitOptions,
    ) -> Result<InitializationResult> {
        let branch = project.translation_branch(lang);
        info!(
            "Initializing {}/{} ({}) on {}",
            project.slug, lang, language.name, branch
        );

        self.check_quota().await?;

        // Step 1: source commit
        let source_commit = self.resolve_source_commit(project, options).await?;
        info!("Source commit: {}", source_commit);

        // Step 2: translation branch, idempotent
        self.create_translation_branch(project, &branch, &source_commit)
            .await?;

        // Step 3: enumerate
        let files = self.enumerate_source_files(project, &source_commit).await?;
        let total = files.len();
        info!("Found {} source files matching '{}'", total, project.file_pattern);

        for (i, file) in files.iter().enumerate() {
            self.emit(file, i + 1, total, FileState::Pending, None).await;
        }

        // Step 4: translate and write, one file at a time
        let mut sources: HashMap<String, String> = HashMap::new();
        let mut errors = Vec::new();

        for (i, file) in files.iter().enumerate() {
            self.emit(file, i + 1, total, FileState::Translating, None)
                .await;

            match self
                .process_file(project, lang, &branch, &source_commit, file, &mut sources)
                .await
            {
                Ok(()) => {
                    info!("✓ [{}/{}] {}", i + 1, total, file);
                    self.emit(file, i + 1, total, FileState::Complete, None)
                        .await;
                }
                Err(e) => {
                    error!("✗ [{}/{}] {}: {}", i + 1, total, file, e);
                    self.emit(file, i + 1, total, FileState::Error, Some(e.to_string()))
                        .await;
                    errors.push(FileError {
                        file: file.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        // Step 5: metadata with word counts
        let now = Utc::now();
        let mut entries = BTreeMap::new();
        for file in &files {
            let words = match sources.get(file) {
                Some(text) => word_count(text),
                None => self
                    .fetch_word_count(project, &source_commit, file)
                    .await
                    .unwrap_or_else(|e| {
                        warn!("Word count unavailable for {}: {}", file, e);
                        0
                    }),
            };
            // Failed files are still machine-translation candidates
            entries.insert(
                file.clone(),
                FileMetadata {
                    word_count: words,
                    machine_translated: true,
                    ..FileMetadata::not_started(now)
                },
            );
        }

        let mut metadata = TranslationMetadata::new(project, lang, language, entries, now);
        metadata.coordinator = options.coordinator.clone();
        metadata.translation_service = Some(self.translator.name().to_string());
        metadata.source_commit = Some(source_commit.clone());

        // Step 6: persist
        self.metadata
            .save(
                project,
                lang,
                &metadata,
                &branch,
                &format!("Initialize {} translation metadata", language.name),
            )
            .await?;

        let processed = total - errors.len();
        if errors.is_empty() {
            info!("✓ Initialized {}/{}: {} files", project.slug, lang, processed);
        } else {
            warn!(
                "Initialized {}/{} with {} of {} files failing",
                project.slug,
                lang,
                errors.len(),
                total
            );
        }

        Ok(InitializationResult {
            success: errors.is_empty(),
            files_processed: processed,
            total_files: total,
            errors,
            branch_url: format!(
                "{}/{}/{}/tree/{}",
                self.web_url, project.owner, project.repo, branch
            ),
            source_commit,
            initialized_at: now,
        })
    }

    /// Refuse to start when the translation quota is already spent. An
    /// unreachable usage endpoint is not fatal; translation errors surface per file.
    async fn check_quota(&self) -> Result<()> {
        match self.translator.usage().await {
            Ok(usage) if usage.remaining() == 0 => Err(AppError::Quota {
                message: format!(
                    "Translation quota spent ({} of {} characters)",
                    usage.character_count, usage.character_limit
                ),
                reset_at: None,
            }),
            Ok(usage) => {
                info!("Translation quota: {} characters remaining", usage.remaining());
                Ok(())
            }
            Err(e) => {
                warn!("Could not read translation usage: {}", e);
                Ok(())
            }
        }
    }

    async fn resolve_source_commit(
        &self,
        project: &ProjectConfig,
        options: &InitOptions,
    ) -> Result<String> {
        if let Some(commit) = &options.commit {
            return Ok(commit.clone());
        }
        let tip = self
            .client
            .get_branch(&project.owner, &project.repo, &project.default_branch)
            .await?
            .ok_or_else(|| {
                AppError::not_found(
                    "Branch",
                    format!("{}/{}@{}", project.owner, project.repo, project.default_branch),
                )
            })?;
        Ok(tip.object.sha)
    }

    async fn create_translation_branch(
        &self,
        project: &ProjectConfig,
        branch: &str,
        sha: &str,
    ) -> Result<()> {
        match self
            .client
            .create_branch(&project.owner, &project.repo, branch, sha)
            .await
        {
            Ok(_) => {
                info!("Created branch {} at {}", branch, sha);
                Ok(())
            }
            Err(e) if e.is_unprocessable() => {
                info!("Branch {} already exists, reusing it", branch);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn enumerate_source_files(
        &self,
        project: &ProjectConfig,
        git_ref: &str,
    ) -> Result<Vec<String>> {
        let entries = self
            .client
            .list_directory(&project.owner, &project.repo, &project.source_folder, git_ref)
            .await?;

        let mut names: Vec<String> = entries
            .into_iter()
            .filter(|e| e.kind == EntryKind::File && project.matches_pattern(&e.name))
            .map(|e| e.name)
            .collect();
        project.sort_files(&mut names);
        Ok(names)
    }

    async fn process_file(
        &self,
        project: &ProjectConfig,
        lang: &str,
        branch: &str,
        source_commit: &str,
        file: &str,
        sources: &mut HashMap<String, String>,
    ) -> Result<()> {
        let source_path = project.source_path(file);
        let source = self
            .client
            .get_file_text(&project.owner, &project.repo, &source_path, source_commit)
            .await?
            .ok_or_else(|| AppError::not_found("Source file", source_path.clone()))?;
        sources.insert(file.to_string(), source.clone());

        let translated = translate_markdown(self.translator, &source, lang).await?;

        let message = format!("Machine translation of {} ({})", file, lang);
        self.write(project, branch, &project.translation_path(lang, file), &translated, &message)
            .await?;
        self.write(
            project,
            branch,
            &project.backup_path(lang, file),
            &translated,
            &format!("Machine translation backup of {} ({})", file, lang),
        )
        .await?;
        Ok(())
    }

    /// Create or overwrite `path` on `branch`.
    async fn write(
        &self,
        project: &ProjectConfig,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<()> {
        let sha = self
            .client
            .get_file_sha(&project.owner, &project.repo, path, branch)
            .await?;
        let request = PutFileRequest::new(message, content, branch, sha);
        self.client
            .put_file(&project.owner, &project.repo, path, &request)
            .await?;
        Ok(())
    }

    async fn fetch_word_count(
        &self,
        project: &ProjectConfig,
        source_commit: &str,
        file: &str,
    ) -> Result<u64> {
        let text = self
            .client
            .get_file_text(
                &project.owner,
                &project.repo,
                &project.source_path(file),
                source_commit,
            )
            .await?
            .unwrap_or_default();
        Ok(word_count(&text))
    }

    async fn emit(
        &self,
        file: &str,
        index: usize,
        total: usize,
        state: FileState,
        message: Option<String>,
    ) {
        let Some(sender) = &self.progress else {
            return;
        };
        let event = ProgressEvent {
            file: file.to_string(),
            index,
            total,
            state,
            message,
        };
        if sender.send(event).await.is_err() {
            debug!("Progress receiver dropped");
        }
    }
}
