//! Markdown segmentation and plain-text extraction.
//!
//! Documents are cut at blank lines, heading lines and code-fence boundaries so
//! that each prose block can be translated on its own while code blocks, blank
//! lines and other untranslatable runs pass through byte-for-byte. Concatenating
//! the segments of a document always reproduces the original text.

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// A whitespace-only line
    Blank,
    /// A single ATX heading line (`# Title`)
    Heading,
    /// A fenced code block including its fences
    CodeBlock,
    /// Consecutive prose lines
    Paragraph,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub kind: SegmentKind,
    pub text: &'a str,
}

impl Segment<'_> {
    /// Whether this segment should go to the translation service.
    pub fn is_translatable(&self) -> bool {
        match self.kind {
            SegmentKind::Blank | SegmentKind::CodeBlock => false,
            SegmentKind::Heading | SegmentKind::Paragraph => !is_skippable(self.text),
        }
    }
}

struct Fence {
    marker: char,
    len: usize,
    indent: usize,
    start: usize,
}

/// An indented code block in progress: lines at or beyond `min_indent`.
struct IndentedCode {
    min_indent: usize,
    start: usize,
}

/// Split a markdown document into segments.
///
/// Fences are recognized at any indent so that code nested under list items
/// stays whole. A line indented four columns past the enclosing list item's
/// content (or past the margin outside a list) that follows a blank line starts
/// an indented code block.
pub fn segment(markdown: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut paragraph_start: Option<usize> = None;
    let mut fence: Option<Fence> = None;
    let mut indented: Option<IndentedCode> = None;
    let mut list_content: Option<usize> = None;
    let mut after_blank = true;
    let mut pos = 0;

    for line in markdown.split_inclusive('\n') {
        let line_start = pos;
        pos += line.len();
        let content = line.trim_end_matches(['\n', '\r']);
        let blank = content.trim().is_empty();
        let indent = indent_width(content);

        if let Some(open) = &fence {
            if closes_fence(content, open) {
                segments.push(Segment {
                    kind: SegmentKind::CodeBlock,
                    text: &markdown[open.start..pos],
                });
                fence = None;
                after_blank = false;
            }
            continue;
        }

        if let Some(code) = &indented {
            if blank || indent >= code.min_indent {
                continue;
            }
            push_indented_code(markdown, &mut segments, &mut indented, line_start);
        }

        let code_indent = list_content.unwrap_or(0) + 4;
        if let Some((marker, len)) = opens_fence(content) {
            flush_paragraph(markdown, &mut segments, &mut paragraph_start, line_start);
            fence = Some(Fence {
                marker,
                len,
                indent,
                start: line_start,
            });
        } else if blank {
            flush_paragraph(markdown, &mut segments, &mut paragraph_start, line_start);
            segments.push(Segment {
                kind: SegmentKind::Blank,
                text: line,
            });
            after_blank = true;
            continue;
        } else if after_blank && paragraph_start.is_none() && indent >= code_indent {
            indented = Some(IndentedCode {
                min_indent: code_indent,
                start: line_start,
            });
        } else if is_heading(content) {
            flush_paragraph(markdown, &mut segments, &mut paragraph_start, line_start);
            segments.push(Segment {
                kind: SegmentKind::Heading,
                text: line,
            });
            list_content = None;
        } else {
            if let Some(column) = list_item_content(content) {
                list_content = Some(column);
            } else if indent == 0 {
                list_content = None;
            }
            if paragraph_start.is_none() {
                paragraph_start = Some(line_start);
            }
        }
        after_blank = false;
    }

    // An unterminated fence runs to the end of the document
    if let Some(open) = fence {
        segments.push(Segment {
            kind: SegmentKind::CodeBlock,
            text: &markdown[open.start..],
        });
    }
    push_indented_code(markdown, &mut segments, &mut indented, markdown.len());
    flush_paragraph(markdown, &mut segments, &mut paragraph_start, markdown.len());

    segments
}

fn flush_paragraph<'a>(
    markdown: &'a str,
    segments: &mut Vec<Segment<'a>>,
    start: &mut Option<usize>,
    end: usize,
) {
    if let Some(s) = start.take() {
        segments.push(Segment {
            kind: SegmentKind::Paragraph,
            text: &markdown[s..end],
        });
    }
}

fn push_indented_code<'a>(
    markdown: &'a str,
    segments: &mut Vec<Segment<'a>>,
    code: &mut Option<IndentedCode>,
    end: usize,
) {
    if let Some(c) = code.take() {
        segments.push(Segment {
            kind: SegmentKind::CodeBlock,
            text: &markdown[c.start..end],
        });
    }
}

/// Leading whitespace in columns; a tab advances to the next multiple of four.
fn indent_width(line: &str) -> usize {
    let mut width = 0;
    for c in line.chars() {
        match c {
            ' ' => width += 1,
            '\t' => width += 4 - width % 4,
            _ => break,
        }
    }
    width
}

/// Column where the content of a list item line starts (`- x` is 2, `10. x` is 4).
fn list_item_content(line: &str) -> Option<usize> {
    let indent = indent_width(line);
    let rest = line.trim_start_matches([' ', '\t']);
    let marker_len = match rest.chars().next()? {
        '-' | '*' | '+' => 1,
        c if c.is_ascii_digit() => {
            let digits = rest.chars().take_while(char::is_ascii_digit).count();
            match rest[digits..].chars().next() {
                Some('.') | Some(')') if digits <= 9 => digits + 1,
                _ => return None,
            }
        }
        _ => return None,
    };
    let after = &rest[marker_len..];
    let spaces = after.len() - after.trim_start_matches(' ').len();
    if spaces == 0 || after.trim().is_empty() {
        return None;
    }
    // Five or more spaces after the marker means the content is itself indented code
    let gap = if spaces > 4 { 1 } else { spaces };
    Some(indent + marker_len + gap)
}

/// Fence opener: any indent, then three or more backticks or tildes.
fn opens_fence(line: &str) -> Option<(char, usize)> {
    let rest = line.trim_start_matches([' ', '\t']);
    let marker = rest.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = rest.chars().take_while(|c| *c == marker).count();
    if len < 3 {
        return None;
    }
    // Backtick fences may not carry backticks in their info string
    if marker == '`' && rest[len..].contains('`') {
        return None;
    }
    Some((marker, len))
}

/// Closer: at least as long as the opener, indented no more than three columns
/// past it.
fn closes_fence(line: &str, open: &Fence) -> bool {
    if indent_width(line) > open.indent + 3 {
        return false;
    }
    let trimmed = line.trim_start_matches([' ', '\t']);
    let len = trimmed.chars().take_while(|c| *c == open.marker).count();
    len >= open.len && trimmed[len * open.marker.len_utf8()..].trim().is_empty()
}

fn is_heading(line: &str) -> bool {
    let trimmed = line.trim_start_matches(' ');
    if line.len() - trimmed.len() > 3 {
        return false;
    }
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    (1..=6).contains(&hashes)
        && trimmed[hashes..]
            .chars()
            .next()
            .map_or(true, char::is_whitespace)
}

/// Split a heading line into its `## ` marker and title text.
pub fn split_heading(line: &str) -> (&str, &str) {
    let hashes_end = line
        .char_indices()
        .find(|(_, c)| *c != '#' && *c != ' ')
        .map(|(i, _)| i)
        .unwrap_or(line.len());
    line.split_at(hashes_end)
}

static URL_REGEX: OnceLock<Regex> = OnceLock::new();
static LETTER_RUN_REGEX: OnceLock<Regex> = OnceLock::new();
static INLINE_CODE_REGEX: OnceLock<Regex> = OnceLock::new();
static IMAGE_REGEX: OnceLock<Regex> = OnceLock::new();
static LINK_REGEX: OnceLock<Regex> = OnceLock::new();
static HTML_TAG_REGEX: OnceLock<Regex> = OnceLock::new();

pub(crate) fn url_regex() -> &'static Regex {
    URL_REGEX.get_or_init(|| Regex::new(r#"https?://[^\s<>()\[\]"']+"#).expect("url regex"))
}

/// Empty, punctuation-only, bare URLs, and text without a run of three letters
/// are left untranslated.
pub fn is_skippable(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() || !trimmed.chars().any(char::is_alphanumeric) {
        return true;
    }
    if url_regex()
        .find(trimmed)
        .is_some_and(|m| m.start() == 0 && m.end() == trimmed.len())
    {
        return true;
    }
    let letters = LETTER_RUN_REGEX.get_or_init(|| Regex::new(r"\p{L}{3,}").expect("letter regex"));
    !letters.is_match(trimmed)
}

/// Strip code, markup, link targets and URLs, leaving the prose.
pub fn plain_text(markdown: &str) -> String {
    let body = strip_front_matter(markdown);

    let inline_code = INLINE_CODE_REGEX.get_or_init(|| Regex::new(r"`[^`\n]*`").expect("code regex"));
    let image = IMAGE_REGEX.get_or_init(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").expect("image regex"));
    let link = LINK_REGEX.get_or_init(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("link regex"));
    let html = HTML_TAG_REGEX.get_or_init(|| Regex::new(r"</?[A-Za-z][^>]*>").expect("html regex"));

    let mut out = String::with_capacity(body.len());
    for seg in segment(body) {
        if seg.kind == SegmentKind::CodeBlock {
            out.push('\n');
            continue;
        }
        let text = inline_code.replace_all(seg.text, " ");
        let text = image.replace_all(&text, "$1");
        let text = link.replace_all(&text, "$1");
        let text = html.replace_all(&text, " ");
        let text = url_regex().replace_all(&text, " ");
        out.extend(text.chars().map(|c| match c {
            '#' | '*' | '_' | '>' | '|' | '~' | '`' | '[' | ']' => ' ',
            other => other,
        }));
    }
    out
}

/// Number of words in the prose of a markdown document.
pub fn word_count(markdown: &str) -> u64 {
    plain_text(markdown)
        .split_whitespace()
        .filter(|w| w.chars().any(char::is_alphanumeric))
        .count() as u64
}

/// Drop a leading `---` YAML block.
fn strip_front_matter(markdown: &str) -> &str {
    let Some(rest) = markdown.strip_prefix("---\n") else {
        return markdown;
    };
    match rest.find("\n---\n") {
        Some(end) => &rest[end + 5..],
        None => markdown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejoin(segments: &[Segment<'_>]) -> String {
        segments.iter().map(|s| s.text).collect()
    }

    fn kinds(segments: &[Segment<'_>]) -> Vec<SegmentKind> {
        segments.iter().map(|s| s.kind).collect()
    }

    const DOC: &str = "# Getting Started\n\nInstall the tool first.\nThen run it.\n\n```bash\ncargo install tool\n\n# not a heading\n```\n\n## Next steps\nRead the guide.\n";

    #[test]
    fn test_segments_rejoin_to_original() {
        let segments = segment(DOC);
        assert_eq!(rejoin(&segments), DOC);
    }

    #[test]
    fn test_segment_kinds() {
        let segments = segment(DOC);
        assert_eq!(
            kinds(&segments),
            vec![
                SegmentKind::Heading,
                SegmentKind::Blank,
                SegmentKind::Paragraph,
                SegmentKind::Blank,
                SegmentKind::CodeBlock,
                SegmentKind::Blank,
                SegmentKind::Heading,
                SegmentKind::Paragraph,
            ]
        );
    }

    #[test]
    fn test_code_block_kept_whole() {
        let segments = segment(DOC);
        let code = segments
            .iter()
            .find(|s| s.kind == SegmentKind::CodeBlock)
            .unwrap();
        assert_eq!(code.text, "```bash\ncargo install tool\n\n# not a heading\n```\n");
        assert!(!code.is_translatable());
    }

    #[test]
    fn test_tilde_fence_and_longer_closer() {
        let doc = "~~~\ncode ``` inside\n~~~~\nafter\n";
        let segments = segment(doc);
        assert_eq!(kinds(&segments), vec![SegmentKind::CodeBlock, SegmentKind::Paragraph]);
        assert_eq!(segments[0].text, "~~~\ncode ``` inside\n~~~~\n");
    }

    #[test]
    fn test_unterminated_fence_runs_to_end() {
        let doc = "Intro text here\n```\nlet x = 1;\n";
        let segments = segment(doc);
        assert_eq!(kinds(&segments), vec![SegmentKind::Paragraph, SegmentKind::CodeBlock]);
        assert_eq!(rejoin(&segments), doc);
    }

    #[test]
    fn test_fence_nested_under_list_item() {
        let doc = "1. Install the tool:\n\n    ```bash\n    npm install my-tool\n    ```\n\n2. Run it.\n";
        let segments = segment(doc);
        assert_eq!(rejoin(&segments), doc);
        assert_eq!(
            kinds(&segments),
            vec![
                SegmentKind::Paragraph,
                SegmentKind::Blank,
                SegmentKind::CodeBlock,
                SegmentKind::Blank,
                SegmentKind::Paragraph,
            ]
        );
        assert_eq!(
            segments[2].text,
            "    ```bash\n    npm install my-tool\n    ```\n"
        );
    }

    #[test]
    fn test_indented_code_block() {
        let doc = "Compute it:\n\n    let total = compute_sum(values);\n    println!(\"{}\", total);\n\nThat is all.\n";
        let segments = segment(doc);
        assert_eq!(rejoin(&segments), doc);
        let code = segments
            .iter()
            .find(|s| s.kind == SegmentKind::CodeBlock)
            .unwrap();
        assert!(code.text.starts_with("    let total = compute_sum(values);\n"));
        assert!(!code.is_translatable());
        assert_eq!(segments.last().unwrap().text, "That is all.\n");
    }

    #[test]
    fn test_list_continuation_is_prose_not_code() {
        let doc = "- First item\n\n    More about the first item.\n";
        let segments = segment(doc);
        assert_eq!(
            kinds(&segments),
            vec![SegmentKind::Paragraph, SegmentKind::Blank, SegmentKind::Paragraph]
        );
    }

    #[test]
    fn test_indented_lines_inside_paragraph_stay_prose() {
        let doc = "A sentence that wraps\n    onto an indented line.\n";
        assert_eq!(kinds(&segment(doc)), vec![SegmentKind::Paragraph]);
    }

    #[test]
    fn test_list_item_content_column() {
        assert_eq!(list_item_content("- item"), Some(2));
        assert_eq!(list_item_content("10. item"), Some(4));
        assert_eq!(list_item_content("  * item"), Some(4));
        assert_eq!(list_item_content("*emphasis* here"), None);
        assert_eq!(list_item_content("---"), None);
        assert_eq!(list_item_content("2024 was a year"), None);
    }

    #[test]
    fn test_no_trailing_newline_and_crlf() {
        let doc = "# Title\r\n\r\nBody without newline";
        let segments = segment(doc);
        assert_eq!(rejoin(&segments), doc);
        assert_eq!(segments.last().unwrap().text, "Body without newline");
    }

    #[test]
    fn test_hash_without_space_is_not_heading() {
        assert!(!is_heading("#hashtag text"));
        assert!(is_heading("### Section"));
        assert!(is_heading("#"));
        assert!(!is_heading("####### seven"));
        assert!(!is_heading("    # indented code"));
    }

    #[test]
    fn test_split_heading() {
        assert_eq!(split_heading("## Next steps\n"), ("## ", "Next steps\n"));
        assert_eq!(split_heading("#"), ("#", ""));
    }

    #[test]
    fn test_skippable_segments() {
        assert!(is_skippable(""));
        assert!(is_skippable("   \n"));
        assert!(is_skippable("---"));
        assert!(is_skippable("* * *"));
        assert!(is_skippable("https://example.com/docs?x=1"));
        assert!(is_skippable("v1.2 ok"));
        assert!(!is_skippable("Read the guide."));
        assert!(!is_skippable("See https://example.com for more"));
    }

    #[test]
    fn test_plain_text_strips_markup() {
        let doc = "---\ntitle: Intro\n---\n# Hello *world*\n\nUse `cargo` with [the docs](https://x.dev) and ![logo](l.png).\n\n```\nignored code words\n```\n<br/>Visit https://example.com now\n";
        let text = plain_text(doc);

        assert!(text.contains("Hello"));
        assert!(text.contains("the docs"));
        assert!(text.contains("logo"));
        assert!(!text.contains("title:"));
        assert!(!text.contains("cargo"));
        assert!(!text.contains("ignored"));
        assert!(!text.contains("https://"));
        assert!(!text.contains("<br/>"));
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("# Hello world\n\nThis is a test.\n"), 6);
        assert_eq!(word_count("```\nlots of code here\n```\n"), 0);
        assert_eq!(word_count("- item one\n- item two\n"), 4);
        assert_eq!(word_count(""), 0);
    }
}
