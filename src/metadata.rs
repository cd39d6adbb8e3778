//! Per-language translation state document.
//!
//! One JSON file per project + language lives on the upstream translation branch.
//! `stats` is always recomputed from `files`; nothing edits it directly. Writes are
//! whole-document replacements, so concurrent updates go through
//! [`MetadataStore::update`], which retries the read-modify-write cycle when the
//! document's sha moved underneath it.

use crate::error::{AppError, Result};
use crate::github::{GitHubClient, PutFileRequest};
use crate::registry::{LanguageConfig, ProjectConfig, TextDirection};
use crate::retry::{with_retry_if, RetryConfig};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

pub const SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileStatus {
    #[default]
    NotStarted,
    InProgress,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub status: FileStatus,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub last_contributor: Option<String>,
    #[serde(default)]
    pub last_commit_sha: Option<String>,
    #[serde(default)]
    pub pr_number: Option<u64>,
    #[serde(default)]
    pub pr_url: Option<String>,
    #[serde(default)]
    pub word_count: u64,
    /// Provenance flags, independent of `status` and of each other
    #[serde(default)]
    pub machine_translated: bool,
    #[serde(default)]
    pub human_reviewed: bool,
}

impl FileMetadata {
    /// Entry for a file nobody has touched yet.
    pub fn not_started(now: DateTime<Utc>) -> Self {
        Self {
            status: FileStatus::NotStarted,
            last_updated: now,
            last_contributor: None,
            last_commit_sha: None,
            pr_number: None,
            pr_url: None,
            word_count: 0,
            machine_translated: false,
            human_reviewed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationStats {
    pub total_files: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub not_started: usize,
    pub percent_complete: u32,
    pub total_words: u64,
    pub translated_words: u64,
    /// Distinct contributors, sorted
    pub contributors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationMetadata {
    pub version: String,
    pub language: String,
    pub language_name: String,
    pub direction: TextDirection,
    pub project: String,
    #[serde(default)]
    pub coordinator: Option<String>,
    pub initialized: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub files: BTreeMap<String, FileMetadata>,
    pub stats: TranslationStats,
    #[serde(default)]
    pub translation_service: Option<String>,
    #[serde(default)]
    pub source_commit: Option<String>,
}

impl TranslationMetadata {
    /// Fresh document for a newly initialized language. Every file starts out
    /// `not-started`.
    pub fn new(
        project: &ProjectConfig,
        lang: &str,
        language: &LanguageConfig,
        files: BTreeMap<String, FileMetadata>,
        now: DateTime<Utc>,
    ) -> Self {
        let stats = calculate_stats(&files);
        Self {
            version: SCHEMA_VERSION.to_string(),
            language: lang.to_string(),
            language_name: language.name.clone(),
            direction: language.direction,
            project: project.slug.clone(),
            coordinator: None,
            initialized: now,
            last_updated: now,
            files,
            stats,
            translation_service: None,
            source_commit: None,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }
}

/// Partial update merged into a [`FileMetadata`]. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileUpdate {
    pub status: Option<FileStatus>,
    pub last_contributor: Option<String>,
    pub last_commit_sha: Option<String>,
    pub pr_number: Option<u64>,
    pub pr_url: Option<String>,
    pub word_count: Option<u64>,
    pub machine_translated: Option<bool>,
    pub human_reviewed: Option<bool>,
}

impl FileUpdate {
    fn apply(&self, entry: &mut FileMetadata) {
        if let Some(status) = self.status {
            entry.status = status;
        }
        if let Some(contributor) = &self.last_contributor {
            entry.last_contributor = Some(contributor.clone());
        }
        if let Some(sha) = &self.last_commit_sha {
            entry.last_commit_sha = Some(sha.clone());
        }
        if let Some(number) = self.pr_number {
            entry.pr_number = Some(number);
        }
        if let Some(url) = &self.pr_url {
            entry.pr_url = Some(url.clone());
        }
        if let Some(words) = self.word_count {
            entry.word_count = words;
        }
        if let Some(flag) = self.machine_translated {
            entry.machine_translated = flag;
        }
        if let Some(flag) = self.human_reviewed {
            entry.human_reviewed = flag;
        }
    }
}

/// Aggregate the per-file entries. `percent_complete` rounds half up and is 0 for
/// an empty set.
pub fn calculate_stats(files: &BTreeMap<String, FileMetadata>) -> TranslationStats {
    let mut stats = TranslationStats {
        total_files: files.len(),
        ..Default::default()
    };
    let mut contributors = BTreeSet::new();

    for file in files.values() {
        match file.status {
            FileStatus::Complete => {
                stats.completed += 1;
                stats.translated_words += file.word_count;
            }
            FileStatus::InProgress => stats.in_progress += 1,
            FileStatus::NotStarted => stats.not_started += 1,
        }
        stats.total_words += file.word_count;
        if let Some(contributor) = &file.last_contributor {
            contributors.insert(contributor.clone());
        }
    }

    if stats.total_files > 0 {
        let total = stats.total_files as u64;
        let completed = stats.completed as u64;
        stats.percent_complete = ((completed * 200 + total) / (total * 2)) as u32;
    }
    stats.contributors = contributors.into_iter().collect();
    stats
}

/// Merge `update` into the entry for `filename` (synthesizing a `not-started`
/// entry if absent), stamp timestamps, and recompute `stats`.
pub fn update_file(
    mut metadata: TranslationMetadata,
    filename: &str,
    update: &FileUpdate,
) -> TranslationMetadata {
    let previous = metadata
        .files
        .get(filename)
        .map_or(metadata.last_updated, |f| f.last_updated.max(metadata.last_updated));
    let now = next_timestamp(previous);

    let entry = metadata
        .files
        .entry(filename.to_string())
        .or_insert_with(|| FileMetadata::not_started(now));
    update.apply(entry);
    entry.last_updated = now;

    metadata.stats = calculate_stats(&metadata.files);
    metadata.last_updated = now;
    metadata
}

/// Current time, forced past `previous` so timestamps never repeat.
fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(previous + Duration::milliseconds(1))
}

/// A loaded document together with the blob sha it was read at.
#[derive(Debug, Clone)]
pub struct StoredMetadata {
    pub metadata: TranslationMetadata,
    pub sha: String,
}

/// Reads and writes metadata documents through an elevated GitHub credential.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    client: GitHubClient,
    cas_retry: RetryConfig,
}

impl MetadataStore {
    pub fn new(client: GitHubClient, write_attempts: u32) -> Self {
        Self {
            client,
            cas_retry: RetryConfig::metadata_write(write_attempts),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.cas_retry = retry;
        self
    }

    /// `None` means the language has not been initialized on `branch`.
    pub async fn load(
        &self,
        project: &ProjectConfig,
        lang: &str,
        branch: &str,
    ) -> Result<Option<StoredMetadata>> {
        let path = project.metadata_path(lang);
        let Some(file) = self
            .client
            .get_file(&project.owner, &project.repo, &path, branch)
            .await?
        else {
            debug!("No metadata at {}@{}", path, branch);
            return Ok(None);
        };

        let text = file
            .decoded()
            .map_err(|e| AppError::internal(format!("Unreadable metadata: {}", e)))?;
        let metadata = serde_json::from_str(&text)?;
        Ok(Some(StoredMetadata {
            metadata,
            sha: file.sha,
        }))
    }

    /// Write the whole document, using whatever sha is current on the branch as the
    /// expected sha. Returns the commit sha.
    pub async fn save(
        &self,
        project: &ProjectConfig,
        lang: &str,
        metadata: &TranslationMetadata,
        branch: &str,
        message: &str,
    ) -> Result<String> {
        let current_sha = self
            .client
            .get_file_sha(&project.owner, &project.repo, &project.metadata_path(lang), branch)
            .await?;
        self.write(project, lang, metadata, branch, message, current_sha)
            .await
    }

    async fn write(
        &self,
        project: &ProjectConfig,
        lang: &str,
        metadata: &TranslationMetadata,
        branch: &str,
        message: &str,
        expected_sha: Option<String>,
    ) -> Result<String> {
        let path = project.metadata_path(lang);
        let request = PutFileRequest::new(message, &metadata.to_json()?, branch, expected_sha);
        let response = self
            .client
            .put_file(&project.owner, &project.repo, &path, &request)
            .await?;
        Ok(response.commit.sha)
    }

    /// Compare-and-swap update of the canonical document: load, apply `mutate`,
    /// write with the loaded sha as the expected sha. A stale-sha conflict reloads
    /// and reapplies, up to the configured number of attempts.
    pub async fn update<F>(
        &self,
        project: &ProjectConfig,
        lang: &str,
        message: &str,
        mutate: F,
    ) -> Result<TranslationMetadata>
    where
        F: Fn(TranslationMetadata) -> TranslationMetadata + Sync,
    {
        let branch = project.translation_branch(lang);
        let operation = format!("Metadata update {}", project.metadata_path(lang));

        with_retry_if(
            &self.cas_retry,
            &operation,
            || self.try_update(project, lang, &branch, message, &mutate),
            AppError::is_conflict,
        )
        .await
    }

    async fn try_update<F>(
        &self,
        project: &ProjectConfig,
        lang: &str,
        branch: &str,
        message: &str,
        mutate: &F,
    ) -> Result<TranslationMetadata>
    where
        F: Fn(TranslationMetadata) -> TranslationMetadata + Sync,
    {
        let stored = self
            .load(project, lang, branch)
            .await?
            .ok_or_else(|| {
                AppError::not_found("Translation metadata", format!("{}/{}", project.slug, lang))
            })?;

        let updated = mutate(stored.metadata);
        self.write(project, lang, &updated, branch, message, Some(stored.sha))
            .await?;
        Ok(updated)
    }

    pub async fn mark_file_in_progress(
        &self,
        project: &ProjectConfig,
        lang: &str,
        filename: &str,
        user: &str,
        commit_sha: &str,
    ) -> Result<TranslationMetadata> {
        let update = FileUpdate {
            status: Some(FileStatus::InProgress),
            last_contributor: Some(user.to_string()),
            last_commit_sha: Some(commit_sha.to_string()),
            ..Default::default()
        };
        let message = format!("Mark {} as in progress ({})", filename, lang);

        let metadata = self
            .update(project, lang, &message, |m| update_file(m, filename, &update))
            .await?;
        info!("{}/{}: {} in progress by {}", project.slug, lang, filename, user);
        Ok(metadata)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn mark_file_complete(
        &self,
        project: &ProjectConfig,
        lang: &str,
        filename: &str,
        user: &str,
        commit_sha: &str,
        pr_number: u64,
        pr_url: &str,
    ) -> Result<TranslationMetadata> {
        let update = FileUpdate {
            status: Some(FileStatus::Complete),
            last_contributor: Some(user.to_string()),
            last_commit_sha: Some(commit_sha.to_string()),
            pr_number: Some(pr_number),
            pr_url: Some(pr_url.to_string()),
            ..Default::default()
        };
        let message = format!("Mark {} as complete ({}, PR #{})", filename, lang, pr_number);

        let metadata = self
            .update(project, lang, &message, |m| update_file(m, filename, &update))
            .await?;
        info!(
            "{}/{}: {} complete by {} (PR #{})",
            project.slug, lang, filename, user, pr_number
        );
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::testing::{file_json, put_response, test_client};
    use crate::registry::ProjectRegistry;
    use proptest::prelude::*;
    use std::time::Duration as StdDuration;
    use wiremock::{
        matchers::{body_partial_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    const METADATA_PATH: &str = "/repos/upstream-org/docs/contents/i18n/es/translation.json";

    fn test_project() -> ProjectConfig {
        let registry = ProjectRegistry::from_json(
            r#"{
                "projects": {
                    "docs": {
                        "name": "Docs",
                        "owner": "upstream-org",
                        "repo": "docs",
                        "sourceFolder": "docs",
                        "translationFolder": "i18n",
                        "languages": { "es": { "name": "Español" } }
                    }
                }
            }"#,
        )
        .unwrap();
        registry.project("docs").unwrap().clone()
    }

    fn entry(status: FileStatus, words: u64, contributor: Option<&str>) -> FileMetadata {
        FileMetadata {
            status,
            word_count: words,
            last_contributor: contributor.map(String::from),
            ..FileMetadata::not_started(Utc::now())
        }
    }

    fn sample_metadata(names: &[&str]) -> TranslationMetadata {
        let project = test_project();
        let now = Utc::now();
        let files = names
            .iter()
            .map(|n| (n.to_string(), FileMetadata::not_started(now)))
            .collect();
        TranslationMetadata::new(&project, "es", project.language("es").unwrap(), files, now)
    }

    fn test_store(server: &MockServer) -> MetadataStore {
        MetadataStore::new(test_client(server, "admin-token"), 3)
            .with_retry(RetryConfig::new(3, StdDuration::from_millis(5)))
    }

    // ==================== Statistics ====================

    #[test]
    fn test_calculate_stats_example() {
        let files: BTreeMap<_, _> = [
            ("a.md".to_string(), entry(FileStatus::Complete, 100, Some("alice"))),
            ("b.md".to_string(), entry(FileStatus::InProgress, 50, Some("bob"))),
            ("c.md".to_string(), entry(FileStatus::NotStarted, 25, Some("alice"))),
        ]
        .into_iter()
        .collect();

        let stats = calculate_stats(&files);

        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.in_progress, 1);
        assert_eq!(stats.not_started, 1);
        assert_eq!(stats.percent_complete, 33);
        assert_eq!(stats.total_words, 175);
        assert_eq!(stats.translated_words, 100);
        assert_eq!(stats.contributors, vec!["alice", "bob"]);
    }

    #[test]
    fn test_calculate_stats_empty() {
        let stats = calculate_stats(&BTreeMap::new());
        assert_eq!(stats, TranslationStats::default());
        assert_eq!(stats.percent_complete, 0);
    }

    #[test]
    fn test_percent_rounds_half_up() {
        let files: BTreeMap<_, _> = (0..8)
            .map(|i| {
                let status = if i == 0 { FileStatus::Complete } else { FileStatus::NotStarted };
                (format!("{}.md", i), entry(status, 0, None))
            })
            .collect();
        // 1/8 = 12.5%
        assert_eq!(calculate_stats(&files).percent_complete, 13);
    }

    fn arb_status() -> impl Strategy<Value = FileStatus> {
        prop_oneof![
            Just(FileStatus::NotStarted),
            Just(FileStatus::InProgress),
            Just(FileStatus::Complete),
        ]
    }

    fn arb_files() -> impl Strategy<Value = BTreeMap<String, FileMetadata>> {
        prop::collection::btree_map(
            "[a-z]{1,8}\\.md",
            (arb_status(), 0u64..5000, prop::option::of("[a-c]")),
            0..40,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .map(|(name, (status, words, who))| (name, entry(status, words, who.as_deref())))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_counts_partition_total(files in arb_files()) {
            let stats = calculate_stats(&files);
            prop_assert_eq!(stats.total_files, files.len());
            prop_assert_eq!(stats.completed + stats.in_progress + stats.not_started, stats.total_files);
        }

        #[test]
        fn prop_percent_is_rounded_ratio(files in arb_files()) {
            let stats = calculate_stats(&files);
            if files.is_empty() {
                prop_assert_eq!(stats.percent_complete, 0);
            } else {
                // percent = floor(completed / total * 100 + 1/2), in integers
                let total = files.len() as u64;
                let doubled = stats.completed as u64 * 200 + total;
                let percent = stats.percent_complete as u64;
                prop_assert!(percent * total * 2 <= doubled);
                prop_assert!(doubled < (percent + 1) * total * 2);
            }
        }

        #[test]
        fn prop_word_sums(files in arb_files()) {
            let stats = calculate_stats(&files);
            let total: u64 = files.values().map(|f| f.word_count).sum();
            let translated: u64 = files
                .values()
                .filter(|f| f.status == FileStatus::Complete)
                .map(|f| f.word_count)
                .sum();
            prop_assert_eq!(stats.total_words, total);
            prop_assert_eq!(stats.translated_words, translated);
        }

        #[test]
        fn prop_contributors_are_distinct_set(files in arb_files()) {
            let stats = calculate_stats(&files);
            let expected: BTreeSet<String> =
                files.values().filter_map(|f| f.last_contributor.clone()).collect();
            prop_assert_eq!(stats.contributors.len(), expected.len());
            prop_assert_eq!(stats.contributors.into_iter().collect::<BTreeSet<_>>(), expected);
        }
    }

    // ==================== update_file ====================

    #[test]
    fn test_update_file_recomputes_stats() {
        let metadata = sample_metadata(&["a.md", "b.md"]);
        let update = FileUpdate {
            status: Some(FileStatus::Complete),
            last_contributor: Some("alice".to_string()),
            ..Default::default()
        };

        let updated = update_file(metadata, "a.md", &update);

        assert_eq!(updated.files["a.md"].status, FileStatus::Complete);
        assert_eq!(updated.stats, calculate_stats(&updated.files));
        assert_eq!(updated.stats.percent_complete, 50);
        assert_eq!(updated.stats.contributors, vec!["alice"]);
    }

    #[test]
    fn test_update_file_synthesizes_missing_entry() {
        let metadata = sample_metadata(&["a.md"]);
        let update = FileUpdate {
            status: Some(FileStatus::InProgress),
            ..Default::default()
        };

        let updated = update_file(metadata, "new.md", &update);

        let entry = &updated.files["new.md"];
        assert_eq!(entry.status, FileStatus::InProgress);
        assert_eq!(entry.word_count, 0);
        assert!(!entry.machine_translated);
        assert_eq!(updated.stats.total_files, 2);
    }

    #[test]
    fn test_update_file_twice_only_advances_timestamps() {
        let metadata = sample_metadata(&["a.md"]);
        let update = FileUpdate {
            status: Some(FileStatus::InProgress),
            last_contributor: Some("bob".to_string()),
            last_commit_sha: Some("abc".to_string()),
            ..Default::default()
        };

        let once = update_file(metadata, "a.md", &update);
        let twice = update_file(once.clone(), "a.md", &update);

        assert!(twice.last_updated > once.last_updated);
        assert!(twice.files["a.md"].last_updated > once.files["a.md"].last_updated);

        let mut normalized = twice.clone();
        normalized.last_updated = once.last_updated;
        normalized.files.get_mut("a.md").unwrap().last_updated = once.files["a.md"].last_updated;
        assert_eq!(normalized, once);
    }

    #[test]
    fn test_provenance_flags_independent_of_status() {
        let metadata = sample_metadata(&["a.md"]);
        let update = FileUpdate {
            machine_translated: Some(true),
            human_reviewed: Some(true),
            ..Default::default()
        };

        let updated = update_file(metadata, "a.md", &update);
        let entry = &updated.files["a.md"];
        assert!(entry.machine_translated && entry.human_reviewed);
        assert_eq!(entry.status, FileStatus::NotStarted);
    }

    #[test]
    fn test_json_field_names() {
        let metadata = update_file(
            sample_metadata(&["a.md"]),
            "a.md",
            &FileUpdate {
                status: Some(FileStatus::InProgress),
                ..Default::default()
            },
        );
        let value: serde_json::Value = serde_json::from_str(&metadata.to_json().unwrap()).unwrap();

        assert_eq!(value["languageName"], "Español");
        assert_eq!(value["direction"], "ltr");
        assert_eq!(value["files"]["a.md"]["status"], "in-progress");
        assert_eq!(value["files"]["a.md"]["machineTranslated"], false);
        assert_eq!(value["stats"]["percentComplete"], 0);
        assert_eq!(value["stats"]["inProgress"], 1);
    }

    // ==================== MetadataStore ====================

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(METADATA_PATH))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({"message": "Not Found"})))
            .expect(1)
            .mount(&server)
            .await;

        let loaded = test_store(&server)
            .load(&test_project(), "es", "translations/es")
            .await
            .unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_save_of_load_round_trips() {
        let server = MockServer::start().await;
        let original = sample_metadata(&["a.md", "b.md"]);
        let json = original.to_json().unwrap();

        Mock::given(method("GET"))
            .and(path(METADATA_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(file_json(
                "i18n/es/translation.json",
                &json,
                "meta-sha",
            )))
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path(METADATA_PATH))
            .and(body_partial_json(serde_json::json!({
                "sha": "meta-sha",
                "branch": "translations/es"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(put_response(
                "i18n/es/translation.json",
                "meta-sha-2",
                "commit-1",
            )))
            .expect(1)
            .mount(&server)
            .await;

        let store = test_store(&server);
        let project = test_project();
        let loaded = store
            .load(&project, "es", "translations/es")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.metadata, original);

        let commit = store
            .save(&project, "es", &loaded.metadata, "translations/es", "Round trip")
            .await
            .unwrap();
        assert_eq!(commit, "commit-1");

        let requests = server.received_requests().await.unwrap();
        let put = requests.iter().find(|r| r.method.as_str() == "PUT").unwrap();
        let written = crate::github::testing::decode_put_content(&put.body);
        assert_eq!(written, json);
    }

    #[tokio::test]
    async fn test_update_retries_after_stale_sha() {
        let server = MockServer::start().await;
        let project = test_project();
        let first = sample_metadata(&["a.md", "b.md"]);
        // A competing writer marked b.md complete between our load and our write
        let second = update_file(
            first.clone(),
            "b.md",
            &FileUpdate {
                status: Some(FileStatus::Complete),
                last_contributor: Some("carol".to_string()),
                ..Default::default()
            },
        );

        Mock::given(method("GET"))
            .and(path(METADATA_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(file_json(
                "i18n/es/translation.json",
                &first.to_json().unwrap(),
                "sha-1",
            )))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(METADATA_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(file_json(
                "i18n/es/translation.json",
                &second.to_json().unwrap(),
                "sha-2",
            )))
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path(METADATA_PATH))
            .and(body_partial_json(serde_json::json!({ "sha": "sha-1" })))
            .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
                "message": "i18n/es/translation.json does not match sha-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path(METADATA_PATH))
            .and(body_partial_json(serde_json::json!({ "sha": "sha-2" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(put_response(
                "i18n/es/translation.json",
                "sha-3",
                "commit-2",
            )))
            .expect(1)
            .mount(&server)
            .await;

        let updated = test_store(&server)
            .mark_file_in_progress(&project, "es", "a.md", "alice", "c0ffee")
            .await
            .unwrap();

        // Both writers' changes survive
        assert_eq!(updated.files["a.md"].status, FileStatus::InProgress);
        assert_eq!(updated.files["b.md"].status, FileStatus::Complete);
        assert_eq!(updated.stats.contributors, vec!["alice", "carol"]);
    }

    #[tokio::test]
    async fn test_update_gives_up_with_conflict() {
        let server = MockServer::start().await;
        let metadata = sample_metadata(&["a.md"]);

        Mock::given(method("GET"))
            .and(path(METADATA_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(file_json(
                "i18n/es/translation.json",
                &metadata.to_json().unwrap(),
                "sha-1",
            )))
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path(METADATA_PATH))
            .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
                "message": "does not match"
            })))
            .expect(3)
            .mount(&server)
            .await;

        let err = test_store(&server)
            .mark_file_in_progress(&test_project(), "es", "a.md", "alice", "c0ffee")
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_update_without_document_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(METADATA_PATH))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({"message": "Not Found"})))
            .mount(&server)
            .await;

        let err = test_store(&server)
            .mark_file_in_progress(&test_project(), "es", "a.md", "alice", "c0ffee")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_mark_file_complete_links_pr() {
        let server = MockServer::start().await;
        let metadata = sample_metadata(&["a.md"]);

        Mock::given(method("GET"))
            .and(path(METADATA_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(file_json(
                "i18n/es/translation.json",
                &metadata.to_json().unwrap(),
                "sha-1",
            )))
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path(METADATA_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(put_response(
                "i18n/es/translation.json",
                "sha-2",
                "commit-3",
            )))
            .expect(1)
            .mount(&server)
            .await;

        let updated = test_store(&server)
            .mark_file_complete(&test_project(), "es", "a.md", "alice", "c0ffee", 42, "https://github.com/pr/42")
            .await
            .unwrap();

        let entry = &updated.files["a.md"];
        assert_eq!(entry.status, FileStatus::Complete);
        assert_eq!(entry.pr_number, Some(42));
        assert_eq!(updated.stats.percent_complete, 100);
    }
}
