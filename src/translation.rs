use crate::error::{AppError, Result};
use crate::markdown::{self, SegmentKind};
use crate::retry::{with_retry_if, RetryConfig};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use regex::Regex;
use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

/// Character quota reported by the translation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationUsage {
    pub character_count: u64,
    pub character_limit: u64,
}

impl TranslationUsage {
    pub fn remaining(&self) -> u64 {
        self.character_limit.saturating_sub(self.character_count)
    }
}

/// Text-to-text machine translation.
///
/// Source text is always English; `target_lang` is a registry language code.
pub trait TranslationService: Send + Sync {
    /// Recorded in the metadata document as provenance.
    fn name(&self) -> &str;

    fn translate(
        &self,
        text: &str,
        target_lang: &str,
    ) -> impl Future<Output = Result<String>> + Send;

    fn usage(&self) -> impl Future<Output = Result<TranslationUsage>> + Send;
}

/// DeepL request body
#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    text: Vec<&'a str>,
    source_lang: &'static str,
    target_lang: String,
    preserve_formatting: bool,
    tag_handling: &'static str,
    /// Elements DeepL copies through untranslated
    ignore_tags: Vec<&'static str>,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    text: String,
}

/// DeepL API client.
#[derive(Debug, Clone)]
pub struct DeepLTranslator {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    retry: RetryConfig,
}

impl DeepLTranslator {
    pub fn new(api_url: &str, api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build DeepL HTTP client")?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            retry: RetryConfig::translation_api(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn translate_once(&self, request: &TranslateRequest<'_>) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/v2/translate", self.api_url))
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
            return Err(api_error(status, &body));
        }

        let parsed: TranslateResponse = response
            .json()
            .await
            .map_err(|e| AppError::internal(format!("Failed to parse DeepL response: {}", e)))?;

        parsed
            .translations
            .into_iter()
            .next()
            .map(|t| t.text)
            .ok_or_else(|| AppError::internal("DeepL response contained no translations"))
    }

    async fn usage_once(&self) -> Result<TranslationUsage> {
        let response = self
            .client
            .get(format!("{}/v2/usage", self.api_url))
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::internal(format!("Failed to parse DeepL usage: {}", e)))
    }
}

impl TranslationService for DeepLTranslator {
    fn name(&self) -> &str {
        "deepl"
    }

    async fn translate(&self, text: &str, target_lang: &str) -> Result<String> {
        let escaped = xml_escape(text);
        let request = TranslateRequest {
            text: vec![&escaped],
            source_lang: "EN",
            target_lang: deepl_target_code(target_lang),
            preserve_formatting: true,
            tag_handling: "xml",
            ignore_tags: vec![PLACEHOLDER_TAG],
        };

        let translated = with_retry_if(
            &self.retry,
            &format!("Translation to {}", target_lang),
            || self.translate_once(&request),
            AppError::is_retryable,
        )
        .await?;
        Ok(xml_unescape(&translated))
    }

    async fn usage(&self) -> Result<TranslationUsage> {
        with_retry_if(
            &self.retry,
            "DeepL usage",
            || self.usage_once(),
            AppError::is_retryable,
        )
        .await
    }
}

/// DeepL wants upper-case codes and a regional variant for English and Portuguese.
fn deepl_target_code(lang: &str) -> String {
    match lang {
        "en" => "EN-US".to_string(),
        "pt" => "PT-PT".to_string(),
        other => other.to_uppercase(),
    }
}

fn transport_error(e: reqwest::Error) -> AppError {
    AppError::Transient(format!("DeepL request failed: {}", e))
}

static ESCAPED_PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();

/// Escape text for XML tag handling, leaving placeholder elements intact.
fn xml_escape(text: &str) -> String {
    let escaped = text
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    ESCAPED_PLACEHOLDER_REGEX
        .get_or_init(|| {
            Regex::new(r#"&lt;x id="(\d+)"/&gt;"#).expect("escaped placeholder regex")
        })
        .replace_all(&escaped, r#"<x id="$1"/>"#)
        .into_owned()
}

fn xml_unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// 429 and 5xx are transient; 456 means the character quota is spent.
fn api_error(status: u16, body: &str) -> AppError {
    match status {
        429 => AppError::Transient(format!("DeepL rate limited (429): {}", body)),
        s if s >= 500 => AppError::Transient(format!("DeepL API error ({}): {}", s, body)),
        456 => AppError::Quota {
            message: "Translation character quota exceeded".to_string(),
            reset_at: None,
        },
        403 => AppError::internal(format!("DeepL rejected the API key (403): {}", body)),
        s => AppError::validation(format!("DeepL API error ({}): {}", s, body)),
    }
}

/// Translate a markdown document segment by segment.
///
/// Code blocks, blank lines and skippable segments are copied verbatim. Heading
/// markers, surrounding whitespace and URLs inside prose are kept out of the text
/// sent to the service and restored afterwards.
pub async fn translate_markdown<S: TranslationService>(
    service: &S,
    markdown: &str,
    target_lang: &str,
) -> Result<String> {
    let mut out = String::with_capacity(markdown.len() + markdown.len() / 4);

    for segment in markdown::segment(markdown) {
        if !segment.is_translatable() {
            out.push_str(segment.text);
            continue;
        }

        let (marker, body) = match segment.kind {
            SegmentKind::Heading => markdown::split_heading(segment.text),
            _ => ("", segment.text),
        };
        let core = body.trim();
        let leading = &body[..body.len() - body.trim_start().len()];
        let trailing = &body[body.trim_end().len()..];

        let (protected, urls) = protect_urls(core);
        let translated = service.translate(&protected, target_lang).await?;
        let restored = restore_urls(&translated, &urls)?;

        out.push_str(marker);
        out.push_str(leading);
        out.push_str(&restored);
        out.push_str(trailing);
    }

    Ok(out)
}

/// Element name of URL placeholders. The DeepL client asks for it to be ignored.
const PLACEHOLDER_TAG: &str = "x";

fn placeholder(index: usize) -> String {
    format!(r#"<{} id="{}"/>"#, PLACEHOLDER_TAG, index)
}

fn protect_urls(text: &str) -> (String, Vec<String>) {
    let mut urls = Vec::new();
    let protected = markdown::url_regex().replace_all(text, |caps: &regex::Captures<'_>| {
        urls.push(caps[0].to_string());
        placeholder(urls.len() - 1)
    });
    (protected.into_owned(), urls)
}

/// Put URLs back. A placeholder the service lost fails the segment, since the
/// link would otherwise vanish from the translation.
fn restore_urls(text: &str, urls: &[String]) -> Result<String> {
    let mut restored = text.to_string();
    for (index, url) in urls.iter().enumerate() {
        let token = placeholder(index);
        if !restored.contains(&token) {
            return Err(AppError::internal(format!(
                "Translation dropped the placeholder for {}",
                url
            )));
        }
        restored = restored.replace(&token, url);
    }
    Ok(restored)
}


/// In-process translator for pipeline and server tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::{TranslationService, TranslationUsage};
    use crate::error::{AppError, Result};
    use std::sync::Mutex;

    /// Tags each segment with the target language and records what it was sent.
    /// Any segment containing `FAIL` is rejected.
    pub struct TaggingTranslator {
        pub calls: Mutex<Vec<String>>,
        usage: TranslationUsage,
    }

    impl TaggingTranslator {
        pub fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                usage: TranslationUsage {
                    character_count: 0,
                    character_limit: 500_000,
                },
            }
        }

        /// A translator whose character quota is already spent.
        pub fn exhausted() -> Self {
            Self {
                usage: TranslationUsage {
                    character_count: 500_000,
                    character_limit: 500_000,
                },
                ..Self::new()
            }
        }
    }

    impl TranslationService for TaggingTranslator {
        fn name(&self) -> &str {
            "tagging"
        }

        async fn translate(&self, text: &str, target_lang: &str) -> Result<String> {
            self.calls.lock().unwrap().push(text.to_string());
            if text.contains("FAIL") {
                return Err(AppError::Transient("translation backend unavailable".to_string()));
            }
            Ok(format!("[{}] {}", target_lang, text))
        }

        async fn usage(&self) -> Result<TranslationUsage> {
            Ok(self.usage)
        }
    }
}
