//! Cleanup and value-level checks for collected answers.
//!
//! Key patterns decide which answers are case-folded and which shape checks
//! apply, so indexed keys such as `package_2_weight_unit` are covered
//! without per-item rules.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use thiserror::Error;

use crate::path;
use crate::rules::{CollectedAnswers, Constraint, FieldKind, MissingField};

lazy_static! {
    // =========================================================================
    // KEY PATTERNS
    // =========================================================================

    /// Answers under these keys are upper-cased.
    static ref UPPERCASE_KEY: Regex = Regex::new(
        r"(_country_code|_origin_country|_state|_weight_unit|_unit_code|_currency_code)$"
    ).unwrap();

    static ref WEIGHT_KEY: Regex = Regex::new(r"_weight$").unwrap();

    static ref COUNTRY_KEY: Regex = Regex::new(r"(_country_code|_origin_country)$").unwrap();

    static ref STATE_KEY: Regex = Regex::new(r"_state$").unwrap();

    static ref CURRENCY_KEY: Regex = Regex::new(r"_currency_code$").unwrap();

    /// Captures the address prefix, e.g. `ship_to`.
    static ref POSTAL_KEY: Regex = Regex::new(r"^(.+)_postal_code$").unwrap();

    // =========================================================================
    // VALUE PATTERNS
    // =========================================================================

    static ref TWO_LETTER_CODE: Regex = Regex::new(r"^[A-Z]{2}$").unwrap();

    static ref THREE_LETTER_CODE: Regex = Regex::new(r"^[A-Z]{3}$").unwrap();

    /// 10001 or 10001-1234
    static ref US_POSTAL: Regex = Regex::new(r"^\d{5}(-\d{4})?$").unwrap();

    /// K1A 0B1 or K1A0B1
    static ref CA_POSTAL: Regex = Regex::new(r"^[A-Z]\d[A-Z] ?\d[A-Z]\d$").unwrap();

    /// Compiled `Constraint::Pattern` expressions, keyed by source.
    static ref CONSTRAINT_PATTERNS: Mutex<HashMap<String, Option<Regex>>> = Mutex::new(HashMap::new());
}

/// Compile a declared pattern once; `None` if it does not compile.
fn constraint_pattern(pattern: &str) -> Option<Regex> {
    let Ok(mut cache) = CONSTRAINT_PATTERNS.lock() else {
        return Regex::new(pattern).ok();
    };
    cache
        .entry(pattern.to_string())
        .or_insert_with(|| Regex::new(pattern).ok())
        .clone()
}

/// Whether answers under `key` are case-folded to upper case.
pub fn is_uppercase_key(key: &str) -> bool {
    UPPERCASE_KEY.is_match(key)
}

/// A single value-level problem, reported back to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{reason}")]
pub struct ValidationError {
    pub flat_key: String,
    /// Human-readable message, prefixed with the field's prompt.
    pub reason: String,
}

/// Trim every answer, drop blanks, and upper-case code-like keys.
pub fn normalize(answers: &CollectedAnswers) -> CollectedAnswers {
    answers
        .iter()
        .filter_map(|(key, raw)| {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return None;
            }
            let value = if is_uppercase_key(key) {
                trimmed.to_uppercase()
            } else {
                trimmed.to_string()
            };
            Some((key.clone(), value))
        })
        .collect()
}

/// Check normalized answers against the fields they answer.
///
/// Reports at most one problem per field, in field order. Answers for keys
/// that were not asked are ignored. `doc` supplies context the answers may
/// lack, such as the country of an address whose postal code is asked.
pub fn validate(answers: &CollectedAnswers, fields: &[MissingField], doc: &Value) -> Vec<ValidationError> {
    let mut seen = HashSet::new();
    fields
        .iter()
        .filter(|field| seen.insert(field.flat_key.as_str()))
        .filter_map(|field| {
            let value = answers.get(&field.flat_key)?;
            check_field(field, value, answers, doc).map(|reason| ValidationError {
                flat_key: field.flat_key.clone(),
                reason: format!("{}: {}", field.label(), reason),
            })
        })
        .collect()
}

fn check_field(field: &MissingField, value: &str, answers: &CollectedAnswers, doc: &Value) -> Option<String> {
    let key = field.flat_key.as_str();

    if !field.enum_values.is_empty() && !field.enum_values.iter().any(|v| v == value) {
        return Some(format!("must be one of [{}]", field.enum_values.join(", ")));
    }

    if WEIGHT_KEY.is_match(key) {
        return match value.parse::<f64>() {
            Ok(w) if w.is_finite() && w > 0.0 => None,
            Ok(_) => Some("must be a positive, finite number".to_string()),
            Err(_) => Some("must be a number".to_string()),
        };
    }

    if COUNTRY_KEY.is_match(key) && !TWO_LETTER_CODE.is_match(value) {
        return Some("must be a 2-letter country code".to_string());
    }

    if STATE_KEY.is_match(key) && !TWO_LETTER_CODE.is_match(value) {
        return Some("must be a 2-letter state/province code".to_string());
    }

    if CURRENCY_KEY.is_match(key) && !THREE_LETTER_CODE.is_match(value) {
        return Some("must be a 3-letter currency code (e.g. USD, EUR, GBP)".to_string());
    }

    if let Some(caps) = POSTAL_KEY.captures(key) {
        let country = postal_country(&caps[1], field, answers, doc);
        match country.as_str() {
            "US" if !US_POSTAL.is_match(value) => {
                return Some("must be a valid US postal code (e.g. 10001 or 10001-1234)".to_string())
            }
            "CA" if !CA_POSTAL.is_match(&value.to_uppercase()) => {
                return Some("must be a valid Canadian postal code (e.g. K1A 0B1)".to_string())
            }
            _ => {}
        }
    }

    if let Some(problem) = check_kind(field.kind, value) {
        return Some(problem);
    }

    field
        .constraints
        .iter()
        .find_map(|constraint| check_constraint(constraint, field.kind, value))
}

/// Country governing a postal code: the sibling answer if one was given,
/// otherwise the `CountryCode` next to the postal code in the document.
fn postal_country(prefix: &str, field: &MissingField, answers: &CollectedAnswers, doc: &Value) -> String {
    if let Some(country) = answers.get(&format!("{prefix}_country_code")) {
        return country.trim().to_uppercase();
    }
    field
        .path
        .rsplit_once('.')
        .map(|(parent, _)| path::get_str(doc, &path::join(parent, "CountryCode")).to_uppercase())
        .unwrap_or_default()
}

fn check_kind(kind: FieldKind, value: &str) -> Option<String> {
    match kind {
        FieldKind::String => None,
        FieldKind::Number => match value.parse::<f64>() {
            Ok(n) if n.is_finite() => None,
            _ => Some("must be a number".to_string()),
        },
        FieldKind::Integer => match value.parse::<i64>() {
            Ok(_) => None,
            Err(_) => Some("must be a whole number".to_string()),
        },
        FieldKind::Boolean => match value.to_ascii_lowercase().as_str() {
            "true" | "false" => None,
            _ => Some("must be true or false".to_string()),
        },
    }
}

fn check_constraint(constraint: &Constraint, kind: FieldKind, value: &str) -> Option<String> {
    let numeric = matches!(kind, FieldKind::Number | FieldKind::Integer);
    let number = || value.parse::<f64>().ok();
    match constraint {
        Constraint::MaxLength { value: max } if value.chars().count() > *max => {
            Some(format!("must be at most {max} characters"))
        }
        Constraint::MinLength { value: min } if value.chars().count() < *min => {
            Some(format!("must be at least {min} characters"))
        }
        Constraint::Pattern { value: pattern } => match constraint_pattern(pattern) {
            Some(re) if !re.is_match(value) => Some("has an invalid format".to_string()),
            _ => None,
        },
        Constraint::Gt { value: bound } if numeric && number().is_some_and(|n| n <= *bound) => {
            Some(format!("must be greater than {bound}"))
        }
        Constraint::Ge { value: bound } if numeric && number().is_some_and(|n| n < *bound) => {
            Some(format!("must be at least {bound}"))
        }
        Constraint::Lt { value: bound } if numeric && number().is_some_and(|n| n >= *bound) => {
            Some(format!("must be less than {bound}"))
        }
        Constraint::Le { value: bound } if numeric && number().is_some_and(|n| n > *bound) => {
            Some(format!("must be at most {bound}"))
        }
        _ => None,
    }
}
