//! Line-oriented grammar for `.yml` localization bundles.
//!
//! These files are not YAML despite the extension: the game wants a UTF-8
//! BOM, a `l_<language>:` header, and one ` key:version "value"` entry per
//! line. The parser is total and byte-position accurate so keys can be
//! indexed and navigated like any other symbol.

use jomini_base::{codes, Diagnostic, Span};

/// One localization entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LocEntry {
    pub key: String,
    pub key_span: Span,
    /// The numeric revision between key and value, when present.
    pub version: Option<u32>,
    pub value: String,
}

/// A parsed localization file.
#[derive(Debug, Default)]
pub struct LocFile {
    /// `l_english`, `l_french`, ... from the header line.
    pub language: Option<String>,
    pub entries: Vec<LocEntry>,
    pub diagnostics: Vec<Diagnostic>,
}

const BOM: &str = "\u{feff}";

/// Parses a localization bundle.
pub fn parse_localization(source: &str) -> LocFile {
    let mut file = LocFile::default();

    let body = match source.strip_prefix(BOM) {
        Some(rest) => rest,
        None => {
            file.diagnostics.push(Diagnostic::warning(
                codes::LOC_MISSING_BOM,
                Span::new(0, 0),
                "localization files must start with a UTF-8 byte-order mark",
            ));
            source
        }
    };
    let base = source.len() - body.len();

    let mut offset = base;
    let mut header_seen = false;
    for line in body.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let content = line.trim_end_matches(['\n', '\r']);
        let trimmed = content.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if !header_seen {
            header_seen = true;
            if content.starts_with("l_") && content.trim_end().ends_with(':') {
                file.language = Some(content.trim_end().trim_end_matches(':').to_string());
                continue;
            }
            file.diagnostics.push(Diagnostic::error(
                codes::LOC_MISSING_LANGUAGE,
                Span::new(line_start, line_start + content.len()),
                "expected a `l_<language>:` header as the first entry",
            ));
            // Fall through: the line may still be a key.
        }

        let indent = content.len() - trimmed.len();
        match parse_entry_line(trimmed, line_start + indent) {
            Some(entry) => file.entries.push(entry),
            None => file.diagnostics.push(Diagnostic::warning(
                codes::LOC_MALFORMED_LINE,
                Span::new(line_start + indent, line_start + content.len()),
                "expected `key:version \"text\"`",
            )),
        }
    }

    file
}

/// ` key:version? "value"` after indentation has been stripped.
fn parse_entry_line(line: &str, start: usize) -> Option<LocEntry> {
    let colon = line.find(':')?;
    let key = &line[..colon];
    if key.is_empty()
        || !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return None;
    }

    let rest = &line[colon + 1..];
    let digits_len = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    let version = if digits_len > 0 {
        rest[..digits_len].parse().ok()
    } else {
        None
    };
    let after_version = rest[digits_len..].trim_start();
    let value = after_version
        .strip_prefix('"')
        .and_then(|v| v.rfind('"').map(|end| &v[..end]))?;

    Some(LocEntry {
        key: key.to_string(),
        key_span: Span::new(start, start + key.len()),
        version,
        value: value.to_string(),
    })
}

/// Namespace of a localization key: everything before the last dot-segment
/// run that distinguishes siblings (`my_event.0001.t` → `my_event.0001`).
pub fn key_namespace(key: &str) -> &str {
    match key.rfind('.') {
        Some(dot) => &key[..dot],
        None => key,
    }
}
