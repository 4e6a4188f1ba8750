//! Tolerant parsing of model output into a [`GeneratedEmail`].
//!
//! This is the boundary against non-compliant model output: it never fails.
//! Order of attempts:
//! 1. first balanced `{...}` substring parsed as JSON
//! 2. `subject:` / `body:` line extraction
//! 3. default subject with the raw content as body

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::outreach::types::GeneratedEmail;

/// Subject used whenever the model did not provide one.
pub const DEFAULT_SUBJECT: &str = "Quick question";

static SUBJECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?im)^\s*\**\s*subject\s*\**\s*:\s*(.+?)\s*$"#).expect("static regex")
});

static BODY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)\bbody\s*\**\s*:\s*(.+)$"#).expect("static regex"));

/// Parse raw model output into an email. Never fails.
pub fn parse_email_response(raw: &str) -> GeneratedEmail {
    if let Some(candidate) = first_balanced_object(raw) {
        match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Object(map)) => {
                let subject = map
                    .get("subject")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .unwrap_or(DEFAULT_SUBJECT)
                    .to_string();
                let body = map
                    .get("body")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| raw.to_string());
                return GeneratedEmail { subject, body };
            }
            Ok(_) => debug!("JSON candidate was not an object"),
            Err(e) => debug!(error = %e, "JSON candidate failed to parse"),
        }
    }

    if let Some(email) = extract_labeled_fields(raw) {
        debug!("Recovered email from labeled subject/body lines");
        return email;
    }

    warn!(
        raw_len = raw.len(),
        "Model output had no recognizable structure, using raw content as body"
    );
    GeneratedEmail {
        subject: DEFAULT_SUBJECT.to_string(),
        body: raw.to_string(),
    }
}

/// Find the first balanced `{...}` substring, skipping braces inside JSON strings.
pub fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Pull `Subject:` and `Body:` labels out of free text. Both must be present.
fn extract_labeled_fields(raw: &str) -> Option<GeneratedEmail> {
    let subject = SUBJECT_RE
        .captures(raw)?
        .get(1)?
        .as_str()
        .trim_matches(|c: char| c == '"' || c == '*')
        .trim()
        .to_string();
    let body = BODY_RE.captures(raw)?.get(1)?.as_str().trim().to_string();

    if subject.is_empty() || body.is_empty() {
        return None;
    }
    Some(GeneratedEmail { subject, body })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_with_surrounding_text() {
        let email = parse_email_response(r#"Here you go: {"subject":"Hi","body":"Test"}"#);
        assert_eq!(email.subject, "Hi");
        assert_eq!(email.body, "Test");
    }

    #[test]
    fn no_json_falls_back_to_raw_body() {
        let email = parse_email_response("no json here at all");
        assert_eq!(email.subject, "Quick question");
        assert_eq!(email.body, "no json here at all");
    }

    #[test]
    fn missing_subject_defaults() {
        let email = parse_email_response(r#"{"body":"Just the body"}"#);
        assert_eq!(email.subject, DEFAULT_SUBJECT);
        assert_eq!(email.body, "Just the body");
    }

    #[test]
    fn missing_body_defaults_to_raw_content() {
        let raw = r#"{"subject":"Only subject"}"#;
        let email = parse_email_response(raw);
        assert_eq!(email.subject, "Only subject");
        assert_eq!(email.body, raw);
    }

    #[test]
    fn markdown_fenced_json() {
        let raw = "```json\n{\"subject\": \"quick idea\", \"body\": \"Hi {{name}},\\nshort note.\"}\n```";
        let email = parse_email_response(raw);
        assert_eq!(email.subject, "quick idea");
        assert_eq!(email.body, "Hi {{name}},\nshort note.");
    }

    #[test]
    fn braces_inside_strings_do_not_break_matching() {
        let raw = r#"{"subject":"a } b","body":"x { y"} trailing {junk}"#;
        let email = parse_email_response(raw);
        assert_eq!(email.subject, "a } b");
        assert_eq!(email.body, "x { y");
    }

    #[test]
    fn first_object_wins() {
        let raw = r#"{"subject":"one","body":"first"} {"subject":"two","body":"second"}"#;
        assert_eq!(parse_email_response(raw).subject, "one");
    }

    #[test]
    fn invalid_json_uses_labeled_lines() {
        let raw = "Subject: checking in\nBody: Hi there,\nwanted to follow up.";
        let email = parse_email_response(raw);
        assert_eq!(email.subject, "checking in");
        assert_eq!(email.body, "Hi there,\nwanted to follow up.");
    }

    #[test]
    fn broken_json_with_labels_recovers() {
        let raw = "{subject: oops\nSubject: real subject\nBody: real body";
        let email = parse_email_response(raw);
        assert_eq!(email.subject, "real subject");
        assert_eq!(email.body, "real body");
    }

    #[test]
    fn unbalanced_brace_falls_back() {
        let raw = "{ never closed";
        let email = parse_email_response(raw);
        assert_eq!(email.subject, DEFAULT_SUBJECT);
        assert_eq!(email.body, raw);
    }

    #[test]
    fn object_inside_unclosed_array_is_used() {
        let raw = r#"[{"subject":"x"}"#;
        assert_eq!(parse_email_response(raw).subject, "x");
    }

    #[test]
    fn empty_input_is_safe() {
        let email = parse_email_response("");
        assert_eq!(email.subject, DEFAULT_SUBJECT);
        assert_eq!(email.body, "");
    }

    #[test]
    fn balanced_object_extraction() {
        assert_eq!(first_balanced_object("x {\"a\":{\"b\":1}} y"), Some("{\"a\":{\"b\":1}}"));
        assert_eq!(first_balanced_object("nothing"), None);
    }
}
