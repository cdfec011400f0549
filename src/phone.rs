//! phone.rs — E.164 normalization and validation for the SMS channel.
//!
//! Providers reject anything that is not strict E.164, so numbers are
//! normalized (formatting characters stripped, `00` international prefix
//! rewritten to `+`) and validated before any send is attempted. Raw numbers
//! never reach the logs; use [`mask`] when logging.

use once_cell::sync::Lazy;
use regex::Regex;

/// Strict E.164: leading `+`, 7–15 digits total, first digit 1–9.
static E164: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+[1-9]\d{6,14}$").expect("e164 regex"));

/// Strip common formatting (spaces, dashes, parens, dots) and normalize a
/// leading `00` international prefix to `+`.
pub fn normalize(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();

    if let Some(rest) = stripped.strip_prefix("00") {
        format!("+{rest}")
    } else {
        stripped
    }
}

/// Normalize and validate; returns the E.164 form or `None`.
pub fn to_e164(raw: &str) -> Option<String> {
    let normalized = normalize(raw);
    E164.is_match(&normalized).then_some(normalized)
}

pub fn is_valid_e164(raw: &str) -> bool {
    to_e164(raw).is_some()
}

/// Redact a number for logging: keep the `+` and the leading country-code
/// digits, drop the subscriber part.
pub fn mask(number: &str) -> String {
    let digits: String = number.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return "***".to_string();
    }
    let cc_len = digits.len().min(2);
    format!("+{}***", &digits[..cc_len])
}
