//! Expansion of repeated sub-items into indexed flat fields, and the reverse.

use serde_json::{Map, Value};

use crate::canonical;
use crate::path;
use crate::rehydrate::RehydrationError;
use crate::rules::{ArrayFieldRule, CollectedAnswers, MissingField};

/// Number of items `expand` will consider for this document.
pub fn item_count(rule: &ArrayFieldRule, doc: &Value, start_count: Option<usize>) -> usize {
    let existing = canonical::items(doc, &rule.array_path).len();
    existing
        .max(rule.default_item_count)
        .max(start_count.unwrap_or(0))
        .min(rule.max_items)
}

/// Missing sub-fields for every item, as indexed flat fields.
///
/// Keys are `<prefix>_<n>_<sub key>` with `n` starting at 1; paths are
/// `<array path>[i].<sub path>`. Prompts gain an `Item <n>:` prefix only
/// when there is more than one item.
pub fn expand(rule: &ArrayFieldRule, doc: &Value, start_count: Option<usize>) -> Vec<MissingField> {
    let items = canonical::items(doc, &rule.array_path);
    let count = item_count(rule, doc, start_count);
    let mut missing = Vec::new();

    for index in 0..count {
        let item = items.get(index).copied();
        let n = index + 1;
        for sub in &rule.item_rules {
            if item.is_some_and(|item| path::exists(item, &sub.path)) {
                continue;
            }
            let prompt = if count > 1 {
                format!("Item {n}: {}", sub.prompt)
            } else {
                sub.prompt.clone()
            };
            missing.push(sub.to_missing_at(
                path::join(&path::indexed(&rule.array_path, index), &sub.path),
                rule.item_key(n, &sub.flat_key),
                prompt,
            ));
        }
    }

    missing
}

/// Rebuild items from indexed answers, keeping each item's 0-based index.
///
/// Empty answers are skipped and items with no populated sub-field are
/// dropped.
pub fn reconstruct_indexed(
    answers: &CollectedAnswers,
    rule: &ArrayFieldRule,
    count: usize,
) -> Result<Vec<(usize, Value)>, RehydrationError> {
    let mut items = Vec::new();
    for n in 1..=count {
        let mut item = Value::Object(Map::new());
        let mut populated = false;
        for sub in &rule.item_rules {
            let key = rule.item_key(n, &sub.flat_key);
            let Some(answer) = answers.get(&key).map(|a| a.trim()).filter(|a| !a.is_empty()) else {
                continue;
            };
            path::set(&mut item, &sub.path, Value::String(answer.to_string())).map_err(|source| {
                RehydrationError::Conflict {
                    flat_key: key.clone(),
                    path: sub.path.clone(),
                    source,
                }
            })?;
            populated = true;
        }
        if populated {
            items.push((n - 1, item));
        }
    }
    Ok(items)
}

/// Rebuild the array from indexed answers.
pub fn reconstruct(
    answers: &CollectedAnswers,
    rule: &ArrayFieldRule,
    count: usize,
) -> Result<Vec<Value>, RehydrationError> {
    Ok(reconstruct_indexed(answers, rule, count)?
        .into_iter()
        .map(|(_, item)| item)
        .collect())
}

/// Merge reconstructed items into `doc` at their original indices.
///
/// Only absent sub-leaves are written; existing items and sub-fields are
/// left as they are. Returns the flat keys that were written.
pub fn merge_items(
    doc: &mut Value,
    rule: &ArrayFieldRule,
    answers: &CollectedAnswers,
    count: usize,
) -> Result<Vec<String>, RehydrationError> {
    let mut written = Vec::new();
    for (index, item) in reconstruct_indexed(answers, rule, count)? {
        for sub in &rule.item_rules {
            let Some(value) = path::get(&item, &sub.path) else {
                continue;
            };
            let target = path::join(&path::indexed(&rule.array_path, index), &sub.path);
            if path::exists(doc, &target) {
                continue;
            }
            let flat_key = rule.item_key(index + 1, &sub.flat_key);
            path::set(doc, &target, value.clone()).map_err(|source| RehydrationError::Conflict {
                flat_key: flat_key.clone(),
                path: target.clone(),
                source,
            })?;
            written.push(flat_key);
        }
    }
    Ok(written)
}
