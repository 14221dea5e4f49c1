//! Filename extraction and sanitization for destination paths.
//!
//! Names arrive from untrusted places (Content-Disposition headers, provider
//! JSON, URL path segments, user input) and all pass through
//! [`sanitize_filename`] before touching the filesystem.

use std::path::PathBuf;

use url::Url;

/// Longest file name most filesystems accept, in UTF-8 bytes.
pub const MAX_FILENAME_BYTES: usize = 255;

/// Device names Windows refuses as file stems.
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Parses a Content-Disposition header value and returns the filename.
///
/// Handles:
/// - `attachment; filename="example.zip"`
/// - `attachment; filename=example.zip`
/// - `attachment; filename*=UTF-8''example%20file.zip` (RFC 5987, preferred when present)
#[must_use]
pub fn parse_content_disposition(header: &str) -> Option<String> {
    let lower = header.to_ascii_lowercase();

    if let Some(pos) = lower.find("filename*=") {
        let value = header[pos + "filename*=".len()..].trim();
        let value = value.split(';').next().unwrap_or("").trim().trim_matches('"');
        // charset'language'percent-encoded
        let encoded = value.rsplit_once('\'').map_or(value, |(_, rest)| rest);
        if let Ok(decoded) = urlencoding::decode(encoded) {
            let decoded = decoded.trim();
            if !decoded.is_empty() {
                return Some(decoded.to_string());
            }
        }
    }

    // `filename*=` never contains `filename=`, so this finds the plain parameter.
    let pos = lower.find("filename=")?;
    let value = header[pos + "filename=".len()..].trim_start();
    let name = if let Some(quoted) = value.strip_prefix('"') {
        quoted.split('"').next().unwrap_or("")
    } else {
        value.split(';').next().unwrap_or("").trim()
    };
    (!name.is_empty()).then(|| name.to_string())
}

/// Makes a single path component safe to create on any common filesystem.
///
/// - strips `\ / : * ? " < > |` and control characters
/// - trims whitespace and trailing dots (a name made only of dots is kept, prefixed with `_`)
/// - prefixes reserved device names (`CON`, `NUL`, `COM1`, ...) with `_`
/// - caps the length at [`MAX_FILENAME_BYTES`], keeping the extension
/// - returns `_` for an empty result
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let stripped: String = name
        .chars()
        .filter(|c| {
            !matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|') && !c.is_control()
        })
        .collect();
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        return "_".to_string();
    }

    let mut cleaned = trimmed
        .trim_end_matches(|c: char| c == '.' || c.is_whitespace())
        .to_string();
    if cleaned.is_empty() {
        cleaned = format!("_{trimmed}");
    }

    let stem = cleaned.split('.').next().unwrap_or("");
    if RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(stem))
    {
        cleaned.insert(0, '_');
    }

    cap_length(&cleaned)
}

fn cap_length(name: &str) -> String {
    if name.len() <= MAX_FILENAME_BYTES {
        return name.to_string();
    }

    let extension = match name.rfind('.') {
        Some(dot) if dot > 0 => &name[dot..],
        _ => "",
    };
    if extension.is_empty() || extension.len() >= MAX_FILENAME_BYTES {
        return truncate_to_boundary(name, MAX_FILENAME_BYTES).to_string();
    }

    let stem = &name[..name.len() - extension.len()];
    let stem = truncate_to_boundary(stem, MAX_FILENAME_BYTES - extension.len());
    format!("{stem}{extension}")
}

/// Longest prefix of `value` that fits in `max_bytes` without splitting a char.
fn truncate_to_boundary(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Sanitizes every component of a `/`-separated relative path.
///
/// Empty and `.` components are dropped; `..` becomes `_..` so the result
/// always stays under the directory it is joined to.
#[must_use]
pub fn sanitize_relative_path(relative: &str) -> PathBuf {
    let components: Vec<String> = relative
        .split(['/', '\\'])
        .map(str::trim)
        .filter(|part| !part.is_empty() && *part != ".")
        .map(sanitize_filename)
        .collect();

    if components.is_empty() {
        return PathBuf::from("_");
    }
    components.iter().collect()
}

/// Returns the decoded last path segment of `url`, if it has one.
#[must_use]
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.rfind(|segment| !segment.is_empty())?;
    let decoded = urlencoding::decode(last).map_or_else(|_| last.to_string(), |d| d.into_owned());
    (!decoded.trim().is_empty()).then_some(decoded)
}
