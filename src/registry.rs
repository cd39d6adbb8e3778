//! Project registry: maps a project + language pair to repository coordinates
//! and folder layout.
//!
//! The registry is loaded once from a JSON file and handed to whoever needs it.
//! It is read-only at runtime apart from language status changes.

use crate::error::{AppError, Result};
use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;

const DEFAULT_TEMP_FOLDER: &str = "{translationFolder}/{lang}/tmp";
const METADATA_FILE: &str = "translation.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextDirection {
    #[default]
    Ltr,
    Rtl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageStatus {
    #[default]
    Active,
    Inactive,
    Archived,
}

/// Settings for one target language of a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageConfig {
    /// Display name (e.g., "Español")
    pub name: String,
    #[serde(default)]
    pub direction: TextDirection,
    #[serde(default)]
    pub status: LanguageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initialized_at: Option<DateTime<Utc>>,
}

/// Repository coordinates and layout of a documentation project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    /// Filled from the registry key on load
    #[serde(default, skip_serializing)]
    pub slug: String,
    #[serde(default)]
    pub name: String,
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_branch")]
    pub default_branch: String,
    pub source_folder: String,
    pub translation_folder: String,
    /// Backup folder pattern; `{translationFolder}` and `{lang}` are substituted
    #[serde(default = "default_temp_folder")]
    pub temp_folder: String,
    #[serde(default = "default_file_pattern")]
    pub file_pattern: String,
    #[serde(default)]
    pub priority_files: Vec<String>,
    #[serde(default)]
    pub languages: BTreeMap<String, LanguageConfig>,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_temp_folder() -> String {
    DEFAULT_TEMP_FOLDER.to_string()
}

fn default_file_pattern() -> String {
    "*.md".to_string()
}

impl ProjectConfig {
    /// Branch carrying the translation work, in upstream and in every fork.
    pub fn translation_branch(&self, lang: &str) -> String {
        format!("translations/{}", lang)
    }

    pub fn source_path(&self, file: &str) -> String {
        join_path(&self.source_folder, file)
    }

    pub fn language_folder(&self, lang: &str) -> String {
        join_path(&self.translation_folder, lang)
    }

    pub fn translation_path(&self, lang: &str, file: &str) -> String {
        join_path(&self.language_folder(lang), file)
    }

    pub fn backup_folder(&self, lang: &str) -> String {
        self.temp_folder
            .replace("{translationFolder}", self.translation_folder.trim_end_matches('/'))
            .replace("{lang}", lang)
    }

    pub fn backup_path(&self, lang: &str, file: &str) -> String {
        join_path(&self.backup_folder(lang), file)
    }

    pub fn metadata_path(&self, lang: &str) -> String {
        join_path(&self.language_folder(lang), METADATA_FILE)
    }

    /// Whether `name` matches the configured file glob.
    pub fn matches_pattern(&self, name: &str) -> bool {
        glob_match(&self.file_pattern, name)
    }

    pub fn is_priority(&self, name: &str) -> bool {
        self.priority_files.iter().any(|p| p == name)
    }

    /// Priority files first, then the rest; each tier in lexicographic order.
    pub fn sort_files(&self, names: &mut [String]) {
        names.sort_by(|a, b| {
            self.is_priority(b)
                .cmp(&self.is_priority(a))
                .then_with(|| a.cmp(b))
        });
    }

    pub fn language(&self, code: &str) -> Result<&LanguageConfig> {
        self.languages
            .get(code)
            .ok_or_else(|| AppError::not_found("Language", format!("{}/{}", self.slug, code)))
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.owner.trim().is_empty() || self.repo.trim().is_empty() {
            bail!("project '{}' must name an owner and repo", self.slug);
        }
        if self.file_pattern.contains('/') || self.file_pattern.contains('\\') {
            bail!(
                "project '{}' file pattern '{}' must not contain path separators",
                self.slug,
                self.file_pattern
            );
        }
        let mut seen = HashSet::new();
        for file in &self.priority_files {
            if !seen.insert(file) {
                bail!("project '{}' lists priority file '{}' twice", self.slug, file);
            }
        }
        for code in self.languages.keys() {
            if !is_language_code(code) {
                bail!("project '{}' has invalid language code '{}'", self.slug, code);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RegistryFile {
    projects: BTreeMap<String, ProjectConfig>,
}

/// All configured projects, keyed by slug.
#[derive(Debug, Clone, Default)]
pub struct ProjectRegistry {
    projects: BTreeMap<String, ProjectConfig>,
}

impl ProjectRegistry {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read project registry {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Invalid project registry {}", path.display()))
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let file: RegistryFile =
            serde_json::from_str(json).context("Failed to parse project registry JSON")?;

        let mut projects = BTreeMap::new();
        for (slug, mut project) in file.projects {
            project.slug = slug.clone();
            if project.name.is_empty() {
                project.name = slug.clone();
            }
            project.validate()?;
            projects.insert(slug, project);
        }

        Ok(Self { projects })
    }

    pub fn project(&self, slug: &str) -> Result<&ProjectConfig> {
        self.projects
            .get(slug)
            .ok_or_else(|| AppError::not_found("Project", slug))
    }

    pub fn projects(&self) -> impl Iterator<Item = &ProjectConfig> {
        self.projects.values()
    }

    pub fn language(&self, slug: &str, code: &str) -> Result<(&ProjectConfig, &LanguageConfig)> {
        let project = self.project(slug)?;
        let language = project.language(code)?;
        Ok((project, language))
    }

    /// Language that accepts contributions.
    pub fn active_language(
        &self,
        slug: &str,
        code: &str,
    ) -> Result<(&ProjectConfig, &LanguageConfig)> {
        let (project, language) = self.language(slug, code)?;
        if language.status != LanguageStatus::Active {
            return Err(AppError::validation(format!(
                "Language '{}' of project '{}' is not accepting contributions",
                code, slug
            )));
        }
        Ok((project, language))
    }

    /// Language that may be (re)initialized: anything but archived.
    pub fn initializable_language(
        &self,
        slug: &str,
        code: &str,
    ) -> Result<(&ProjectConfig, &LanguageConfig)> {
        let (project, language) = self.language(slug, code)?;
        if language.status == LanguageStatus::Archived {
            return Err(AppError::validation(format!(
                "Language '{}' of project '{}' is archived",
                code, slug
            )));
        }
        Ok((project, language))
    }

    /// Write the registry back out in the file format `from_file` reads.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let file = RegistryFile {
            projects: self.projects.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(path, json + "\n")
            .with_context(|| format!("Failed to write project registry {}", path.display()))
    }

    /// Stamp the first initialization time of a language and open an inactive
    /// language for contributions. Returns the recorded timestamp.
    pub fn record_initialization(
        &mut self,
        slug: &str,
        code: &str,
        at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let status = self.language(slug, code)?.1.status;
        if status == LanguageStatus::Archived {
            return Err(AppError::validation(format!(
                "Language '{}' of project '{}' is archived",
                code, slug
            )));
        }
        if status == LanguageStatus::Inactive {
            self.set_language_status(slug, code, LanguageStatus::Active)?;
        }
        let language = self.language_mut(slug, code)?;
        Ok(*language.initialized_at.get_or_insert(at))
    }

    fn language_mut(&mut self, slug: &str, code: &str) -> Result<&mut LanguageConfig> {
        self.projects
            .get_mut(slug)
            .ok_or_else(|| AppError::not_found("Project", slug))?
            .languages
            .get_mut(code)
            .ok_or_else(|| AppError::not_found("Language", format!("{}/{}", slug, code)))
    }

    pub fn set_language_status(
        &mut self,
        slug: &str,
        code: &str,
        status: LanguageStatus,
    ) -> Result<()> {
        self.language_mut(slug, code)?.status = status;
        Ok(())
    }
}

fn join_path(folder: &str, name: &str) -> String {
    let folder = folder.trim_end_matches('/');
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", folder, name)
    }
}

static LANGUAGE_CODE_REGEX: OnceLock<Regex> = OnceLock::new();

/// ISO 639-1/639-2 code with an optional region or script (e.g., "es", "pt-BR", "zh-Hans").
pub fn is_language_code(code: &str) -> bool {
    let regex = LANGUAGE_CODE_REGEX.get_or_init(|| {
        Regex::new(r"^[a-z]{2,3}(-[A-Za-z]{2,4})?$").expect("language code regex is valid")
    });
    regex.is_match(code)
}

/// Shell-style wildcard match supporting `*` and `?`.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();

    let (mut p, mut n) = (0, 0);
    let mut star: Option<usize> = None;
    let mut star_n = 0;

    while n < name.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == name[n]) {
            p += 1;
            n += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            star_n = n;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            star_n += 1;
            n = star_n;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}
