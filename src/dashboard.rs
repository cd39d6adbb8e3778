//! Read-only views for the translation dashboard and the editor.

use crate::error::{AppError, Result};
use crate::github::GitHubClient;
use crate::metadata::{FileMetadata, FileStatus, MetadataStore, TranslationMetadata, TranslationStats};
use crate::registry::{ProjectConfig, TextDirection};
use crate::sanitize::sanitize_filename;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// What the caller personally has done in this language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributorStats {
    pub files_contributed: usize,
    pub files_completed: usize,
    pub files_in_progress: usize,
    pub words_translated: u64,
}

pub fn contributor_stats(metadata: &TranslationMetadata, user: &str) -> ContributorStats {
    let mut stats = ContributorStats::default();
    let mine = metadata.files.values().filter(|f| {
        f.last_contributor
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(user))
    });

    for file in mine {
        stats.files_contributed += 1;
        match file.status {
            FileStatus::Complete => {
                stats.files_completed += 1;
                stats.words_translated += file.word_count;
            }
            FileStatus::InProgress => stats.files_in_progress += 1,
            FileStatus::NotStarted => {}
        }
    }
    stats
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardFile {
    pub name: String,
    pub priority: bool,
    #[serde(flatten)]
    pub metadata: FileMetadata,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub project: String,
    pub language: String,
    pub language_name: String,
    pub direction: TextDirection,
    pub last_updated: DateTime<Utc>,
    pub files: Vec<DashboardFile>,
    pub stats: TranslationStats,
    pub my_stats: ContributorStats,
}

/// Source, working translation and machine backup of one file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileView {
    pub filename: String,
    pub source: String,
    pub translation: Option<String>,
    pub machine_translation: Option<String>,
    pub metadata: Option<FileMetadata>,
}

pub struct DashboardService<'a> {
    admin: &'a GitHubClient,
    metadata: &'a MetadataStore,
}

impl<'a> DashboardService<'a> {
    pub fn new(admin: &'a GitHubClient, metadata: &'a MetadataStore) -> Self {
        Self { admin, metadata }
    }

    async fn load_metadata(&self, project: &ProjectConfig, lang: &str) -> Result<TranslationMetadata> {
        let branch = project.translation_branch(lang);
        self.metadata
            .load(project, lang, &branch)
            .await?
            .map(|stored| stored.metadata)
            .ok_or_else(|| {
                AppError::not_found("Translation metadata", format!("{}/{}", project.slug, lang))
            })
    }

    pub async fn get_dashboard(
        &self,
        user: &str,
        project: &ProjectConfig,
        lang: &str,
    ) -> Result<DashboardView> {
        let metadata = self.load_metadata(project, lang).await?;

        let mut names: Vec<String> = metadata.files.keys().cloned().collect();
        project.sort_files(&mut names);
        let files = names
            .into_iter()
            .filter_map(|name| {
                let entry = metadata.files.get(&name)?.clone();
                Some(DashboardFile {
                    priority: project.is_priority(&name),
                    name,
                    metadata: entry,
                })
            })
            .collect();

        Ok(DashboardView {
            project: metadata.project.clone(),
            language: metadata.language.clone(),
            language_name: metadata.language_name.clone(),
            direction: metadata.direction,
            last_updated: metadata.last_updated,
            my_stats: contributor_stats(&metadata, user),
            stats: metadata.stats,
            files,
        })
    }

    /// The working translation comes from the caller's fork when it has one, and
    /// from the upstream translation branch otherwise.
    pub async fn get_file(
        &self,
        user_client: &GitHubClient,
        user: &str,
        project: &ProjectConfig,
        lang: &str,
        filename: &str,
    ) -> Result<FileView> {
        let filename = sanitize_filename(filename, project)?;
        let branch = project.translation_branch(lang);
        let translation_path = project.translation_path(lang, filename);

        let source = async {
            let path = project.source_path(filename);
            self.admin
                .get_file_text(&project.owner, &project.repo, &path, &project.default_branch)
                .await?
                .ok_or_else(|| AppError::not_found("Source file", path))
        };
        let translation = async {
            let from_fork = user_client
                .get_file_text(user, &project.repo, &translation_path, &branch)
                .await?;
            match from_fork {
                Some(text) => Ok::<_, AppError>(Some(text)),
                None => Ok(self
                    .admin
                    .get_file_text(&project.owner, &project.repo, &translation_path, &branch)
                    .await?),
            }
        };
        let backup = async {
            self.admin
                .get_file_text(
                    &project.owner,
                    &project.repo,
                    &project.backup_path(lang, filename),
                    &branch,
                )
                .await
                .map_err(AppError::from)
        };
        let metadata = async {
            Ok::<_, AppError>(
                self.metadata
                    .load(project, lang, &branch)
                    .await?
                    .and_then(|stored| stored.metadata.files.get(filename).cloned()),
            )
        };

        let (source, translation, machine_translation, metadata) =
            futures::try_join!(source, translation, backup, metadata)?;

        Ok(FileView {
            filename: filename.to_string(),
            source,
            translation,
            machine_translation,
            metadata,
        })
    }
}
