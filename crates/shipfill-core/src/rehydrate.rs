//! Merging collected answers back into a document.
//!
//! Rehydration never overwrites: an answer is written only where the target
//! leaf is absent, so values the caller supplied always survive.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::array;
use crate::canonical::{self, CanonicalError};
use crate::path::{self, PathError};
use crate::registry::RuleRegistry;
use crate::rules::{CollectedAnswers, MissingField};

/// An answer could not be placed in the document.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RehydrationError {
    #[error("Cannot set '{flat_key}' at '{path}': {source}")]
    Conflict {
        flat_key: String,
        path: String,
        #[source]
        source: PathError,
    },

    #[error(transparent)]
    Malformed(#[from] CanonicalError),
}

impl RehydrationError {
    pub fn flat_key(&self) -> Option<&str> {
        match self {
            RehydrationError::Conflict { flat_key, .. } => Some(flat_key),
            RehydrationError::Malformed(_) => None,
        }
    }
}

/// Return a copy of `doc` with `answers` merged in.
///
/// Only answers to elicitable `fields` are used; unknown keys and blank
/// answers are skipped. Answers for repeated items are merged per item at
/// their original index.
pub fn rehydrate(
    doc: &Value,
    answers: &CollectedAnswers,
    fields: &[MissingField],
    registry: &RuleRegistry,
) -> Result<Value, RehydrationError> {
    let mut out = canonical::canonicalize(doc, &registry.list_fields)?;

    let asked: HashMap<&str, &str> = fields
        .iter()
        .filter(|f| f.elicitable)
        .map(|f| (f.flat_key.as_str(), f.path.as_str()))
        .collect();

    let array_rules = registry.array_rules();
    // answers grouped by the array rule that claims them, with the highest item seen
    let mut claimed: BTreeMap<usize, (CollectedAnswers, usize)> = BTreeMap::new();
    let mut written = 0usize;

    for (key, answer) in answers {
        let Some(target) = asked.get(key.as_str()) else {
            tracing::trace!(flat_key = %key, "Skipping answer for unknown key");
            continue;
        };
        if answer.trim().is_empty() {
            continue;
        }

        let owner = array_rules
            .iter()
            .enumerate()
            .find_map(|(i, rule)| rule.parse_item_key(key).map(|(n, _)| (i, n)));
        if let Some((rule_index, n)) = owner {
            let entry = claimed.entry(rule_index).or_default();
            entry.0.insert(key.clone(), answer.clone());
            entry.1 = entry.1.max(n);
            continue;
        }

        if path::exists(&out, target) {
            continue;
        }
        path::set(&mut out, target, Value::String(answer.trim().to_string())).map_err(|source| {
            RehydrationError::Conflict {
                flat_key: key.clone(),
                path: target.to_string(),
                source,
            }
        })?;
        written += 1;
    }

    for (rule_index, (item_answers, count)) in &claimed {
        let rule = array_rules[*rule_index];
        written += array::merge_items(&mut out, rule, item_answers, *count)?.len();
    }

    tracing::debug!(registry = %registry.label, written, "Rehydrated answers");
    Ok(out)
}
