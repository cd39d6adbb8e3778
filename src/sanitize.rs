//! Input checks for user-supplied filenames, content and commit messages.
//!
//! Filenames are rejected outright when suspicious; nothing is stripped or rewritten
//! into a "safe" variant.

use crate::error::{AppError, Result};
use crate::registry::ProjectConfig;

const MAX_FILENAME_BYTES: usize = 255;
const MAX_COMMIT_MESSAGE_CHARS: usize = 500;

/// Accept `name` only if it is a plain file name matching the project glob.
pub fn sanitize_filename<'a>(name: &'a str, project: &ProjectConfig) -> Result<&'a str> {
    if name.trim().is_empty() {
        return Err(AppError::validation("Filename is empty"));
    }
    if name.len() > MAX_FILENAME_BYTES {
        return Err(AppError::validation(format!(
            "Filename is longer than {} bytes",
            MAX_FILENAME_BYTES
        )));
    }
    if name.contains("..") {
        return Err(AppError::validation(format!(
            "Path traversal detected in filename '{}'",
            name
        )));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(AppError::validation(format!(
            "Filename '{}' must not contain path separators",
            name
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(AppError::validation("Filename contains control characters"));
    }
    if name.starts_with('.') {
        return Err(AppError::validation(format!(
            "Hidden file '{}' is not translatable",
            name
        )));
    }
    if !project.matches_pattern(name) {
        return Err(AppError::validation(format!(
            "'{}' does not match the project file pattern '{}'",
            name, project.file_pattern
        )));
    }
    Ok(name)
}

pub fn validate_content(content: &str, max_bytes: usize) -> Result<()> {
    if content.len() > max_bytes {
        return Err(AppError::validation(format!(
            "Content is {} bytes; the limit is {}",
            content.len(),
            max_bytes
        )));
    }
    if content.contains('\0') {
        return Err(AppError::validation("Content contains NUL bytes"));
    }
    Ok(())
}

/// Trimmed commit message. Newlines and tabs are allowed, other control
/// characters are not.
pub fn validate_commit_message(message: &str) -> Result<String> {
    let trimmed = message.trim();
    if trimmed
        .chars()
        .any(|c| c.is_control() && c != '\n' && c != '\t' && c != '\r')
    {
        return Err(AppError::validation(
            "Commit message contains control characters",
        ));
    }
    if trimmed.chars().count() > MAX_COMMIT_MESSAGE_CHARS {
        return Err(AppError::validation(format!(
            "Commit message is longer than {} characters",
            MAX_COMMIT_MESSAGE_CHARS
        )));
    }
    Ok(trimmed.to_string())
}
