//! Exposition-format line parser.
//!
//! Parses a single non-comment line of Prometheus text exposition output:
//!
//! ```text
//! line   := name [ "{" label ("," SPACE* label)* "}" ] SPACE+ value
//! label  := labelname "=" '"' labelvalue '"'
//! ```
//!
//! Filtering `#` comment lines is the caller's job (see [`crate::ingest`]).
//! Both parse failures are per-line and non-fatal: the caller skips the line
//! and keeps going.

use crate::error::ParseError;
use crate::metric::{Label, MetricKey, RawSample};

/// Parses one exposition line into a [`RawSample`].
///
/// # Errors
///
/// - [`ParseError::InvalidLine`] if the line matches neither the bracketed
///   nor the bare form (unterminated label block, missing value, stray
///   tokens, illegal characters in names).
/// - [`ParseError::InvalidValue`] if the line is well-formed but the value
///   token is not a floating-point literal.
///
/// # Examples
///
/// ```rust
/// use proq::parse::parse_line;
///
/// let sample = parse_line(r#"http_requests_total{method="get", status="200"} 12345"#)?;
/// assert_eq!(sample.key.name, "http_requests_total");
/// assert_eq!(sample.key.find("status"), Some("200"));
/// assert_eq!(sample.value, 12345.0);
///
/// assert!(parse_line(r#"foo{bar="1""#).is_err());
/// # Ok::<(), proq::error::ParseError>(())
/// ```
pub fn parse_line(line: &str) -> Result<RawSample, ParseError> {
    let text = line.trim();
    if text.is_empty() {
        return Err(invalid(line, "empty line"));
    }

    let (key, rest) = scan_key(line, text)?;

    if rest.is_empty() {
        return Err(invalid(line, "missing value"));
    }
    if !rest.starts_with(is_space) {
        return Err(invalid(line, "expected whitespace before value"));
    }

    let value_str = rest.trim_start_matches(is_space);
    if value_str.contains(is_space) {
        return Err(invalid(line, "unexpected token after value"));
    }

    let value = value_str.parse::<f64>().map_err(|_| ParseError::InvalidValue {
        line: line.to_string(),
        value: value_str.to_string(),
    })?;

    Ok(RawSample::new(key, value))
}

/// Parses a bare series key: `name` or `name{label="value", ...}` with no
/// value token.
pub(crate) fn parse_key(s: &str) -> Result<MetricKey, ParseError> {
    let text = s.trim();
    if text.is_empty() {
        return Err(invalid(s, "empty key"));
    }
    let (key, rest) = scan_key(s, text)?;
    if !rest.trim().is_empty() {
        return Err(invalid(s, "unexpected input after key"));
    }
    Ok(key)
}

/// Scans the metric name and optional label block off the front of `text`.
///
/// Returns the key and whatever follows it. `line` is only used for error
/// reporting.
fn scan_key<'a>(line: &str, text: &'a str) -> Result<(MetricKey, &'a str), ParseError> {
    let end = text.find(|c: char| !is_name_char(c)).unwrap_or(text.len());
    let name = &text[..end];
    if name.is_empty() {
        return Err(invalid(line, "missing metric name"));
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(invalid(line, "metric name starts with a digit"));
    }

    let rest = &text[end..];
    if let Some(block) = rest.strip_prefix('{') {
        let (labels, rest) = scan_labels(line, block)?;
        return Ok((MetricKey::new(name, labels), rest));
    }

    if !rest.is_empty() && !rest.starts_with(is_space) {
        return Err(invalid(line, "invalid character in metric name"));
    }
    Ok((MetricKey::bare(name), rest))
}

/// Scans labels up to and including the closing `}`. `s` starts just after
/// the opening `{`.
fn scan_labels<'a>(line: &str, s: &'a str) -> Result<(Vec<Label>, &'a str), ParseError> {
    let mut labels = Vec::new();
    let mut rest = s.trim_start_matches(is_space);

    loop {
        if rest.is_empty() {
            return Err(invalid(line, "unterminated label block"));
        }
        // `{}` and a trailing comma before `}` are both accepted.
        if let Some(after) = rest.strip_prefix('}') {
            return Ok((labels, after));
        }

        let end = rest.find(|c: char| !is_label_char(c)).unwrap_or(rest.len());
        let name = &rest[..end];
        if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(invalid(line, "expected label name"));
        }

        rest = rest[end..]
            .strip_prefix('=')
            .ok_or_else(|| invalid(line, "expected '=' after label name"))?;
        rest = rest
            .strip_prefix('"')
            .ok_or_else(|| invalid(line, "expected '\"' to open label value"))?;

        let (value, after) = scan_quoted(line, rest)?;
        labels.push(Label::new(name, value));

        rest = after.trim_start_matches(is_space);
        if let Some(after) = rest.strip_prefix(',') {
            rest = after.trim_start_matches(is_space);
        } else if let Some(after) = rest.strip_prefix('}') {
            return Ok((labels, after));
        } else if rest.is_empty() {
            return Err(invalid(line, "unterminated label block"));
        } else {
            return Err(invalid(line, "expected ',' or '}' after label value"));
        }
    }
}

/// Reads a quoted label value, decoding `\\`, `\"` and `\n`. `s` starts just
/// after the opening quote; the returned remainder starts after the closing
/// quote.
fn scan_quoted<'a>(line: &str, s: &'a str) -> Result<(String, &'a str), ParseError> {
    let mut value = String::new();
    let mut chars = s.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((value, &s[i + 1..])),
            '\\' => match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, '\\')) => value.push('\\'),
                Some((_, '"')) => value.push('"'),
                Some((_, other)) => {
                    value.push('\\');
                    value.push(other);
                }
                None => break,
            },
            c => value.push(c),
        }
    }

    Err(invalid(line, "unterminated label value"))
}

#[inline]
fn is_space(c: char) -> bool {
    c == ' ' || c == '\t'
}

#[inline]
fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':'
}

#[inline]
fn is_label_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn invalid(line: &str, reason: &str) -> ParseError {
    ParseError::InvalidLine {
        line: line.to_string(),
        reason: reason.to_string(),
    }
}
