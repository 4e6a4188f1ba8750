//! Rule-based quality checks for generated emails.
//!
//! Every rule runs on every email; violations accumulate in rule order so the
//! caller sees the full list, not just the first problem.

use tracing::debug;

use crate::outreach::prompts::{FORBIDDEN_WORDS, MAX_BODY_WORDS, MAX_SUBJECT_CHARS};
use crate::outreach::types::{GeneratedEmail, ValidationResult};

/// A single content rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentRule {
    BodyWordLimit,
    NoExclamationMarks,
    NoForbiddenWords,
    SubjectLengthLimit,
}

impl ContentRule {
    /// The fixed rule set, in evaluation order.
    pub const ALL: [ContentRule; 4] = [
        ContentRule::BodyWordLimit,
        ContentRule::NoExclamationMarks,
        ContentRule::NoForbiddenWords,
        ContentRule::SubjectLengthLimit,
    ];

    /// Append this rule's violations (if any) to `errors`.
    fn check(&self, email: &GeneratedEmail, errors: &mut Vec<String>) {
        match self {
            ContentRule::BodyWordLimit => {
                let words = email.body.split_whitespace().count();
                if words > MAX_BODY_WORDS {
                    errors.push(format!(
                        "Body has {words} words (exceeds {MAX_BODY_WORDS} words)"
                    ));
                }
            }
            ContentRule::NoExclamationMarks => {
                if email.subject.contains('!') {
                    errors.push("Subject contains exclamation marks".to_string());
                }
                if email.body.contains('!') {
                    errors.push("Body contains exclamation marks".to_string());
                }
            }
            ContentRule::NoForbiddenWords => {
                let subject = email.subject.to_lowercase();
                let body = email.body.to_lowercase();
                for word in FORBIDDEN_WORDS {
                    if subject.contains(word) || body.contains(word) {
                        errors.push(format!("Contains forbidden word: \"{word}\""));
                    }
                }
            }
            ContentRule::SubjectLengthLimit => {
                let chars = email.subject.chars().count();
                if chars > MAX_SUBJECT_CHARS {
                    errors.push(format!(
                        "Subject is {chars} characters (exceeds {MAX_SUBJECT_CHARS} characters)"
                    ));
                }
            }
        }
    }
}

/// Validate an email against the fixed rule set.
pub fn validate_email(email: &GeneratedEmail) -> ValidationResult {
    let mut errors = Vec::new();
    for rule in ContentRule::ALL {
        rule.check(email, &mut errors);
    }

    if !errors.is_empty() {
        debug!(violations = errors.len(), "Email failed content validation");
    }

    ValidationResult {
        is_valid: errors.is_empty(),
        errors,
    }
}
