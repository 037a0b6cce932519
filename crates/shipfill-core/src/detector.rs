//! Missing-field detection.
//!
//! Evaluates a [`RuleRegistry`] against a document and lists every required
//! leaf that is absent, in registry declaration order. Detection is pure:
//! the same document and registry always produce the same list.

use serde_json::Value;
use thiserror::Error;

use crate::array;
use crate::canonical::{self, CanonicalError};
use crate::path;
use crate::registry::{CountryRules, RuleGroup, RuleRegistry, VariantRules};
use crate::rules::MissingField;

/// Conditions that stop detection outright.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectError {
    #[error(
        "Ambiguous payer: multiple billing objects present ({}). Only one of {} is allowed per charge.",
        .present.join(", "),
        .allowed.join(", ")
    )]
    AmbiguousVariant {
        slot: String,
        present: Vec<String>,
        allowed: Vec<String>,
    },

    #[error(transparent)]
    Malformed(#[from] CanonicalError),
}

/// List the required leaves absent from `doc`.
pub fn detect(registry: &RuleRegistry, doc: &Value) -> Result<Vec<MissingField>, DetectError> {
    let doc = canonical::canonicalize(doc, &registry.list_fields)?;
    let mut missing = Vec::new();

    for group in &registry.groups {
        match group {
            RuleGroup::Unconditional { rules } => {
                missing.extend(
                    rules
                        .iter()
                        .filter(|rule| !path::exists(&doc, &rule.path))
                        .map(|rule| rule.to_missing()),
                );
            }
            RuleGroup::Items { rule } => missing.extend(array::expand(rule, &doc, None)),
            RuleGroup::ByCountry { rules } => missing.extend(by_country(rules, &doc)),
            RuleGroup::ByVariant { rules } => {
                if let Some(field) = by_variant(rules, &doc)? {
                    missing.push(field);
                }
            }
            RuleGroup::International { rules } => missing.extend(rules.missing(&doc)),
        }
    }

    tracing::debug!(
        registry = %registry.label,
        missing = missing.len(),
        structural = missing.iter().filter(|m| !m.elicitable).count(),
        "Detected missing fields"
    );
    Ok(missing)
}

fn by_country(rules: &CountryRules, doc: &Value) -> Vec<MissingField> {
    let mut missing = Vec::new();
    for role in &rules.roles {
        let Some(address) = path::get(doc, &role.address_path).filter(|a| a.is_object()) else {
            continue;
        };
        let country = path::get_str(address, "CountryCode").to_ascii_uppercase();
        if !rules.countries.iter().any(|c| *c == country) {
            continue;
        }
        for rule in &rules.rules {
            if path::exists(address, &rule.path) {
                continue;
            }
            missing.push(rule.to_missing_at(
                path::join(&role.address_path, &rule.path),
                format!("{}_{}", role.prefix, rule.flat_key),
                format!("{} {}", role.label, rule.prompt.to_lowercase()),
            ));
        }
    }
    missing
}

/// Keys of the variants present at the slot, in declaration order.
pub fn present_variants<'a>(rules: &'a VariantRules, doc: &Value) -> Vec<&'a str> {
    let Some(slot) = path::get(doc, &rules.slot).and_then(Value::as_object) else {
        return Vec::new();
    };
    rules
        .variants
        .iter()
        .map(|v| v.key.as_str())
        .filter(|key| slot.contains_key(*key))
        .collect()
}

fn by_variant(rules: &VariantRules, doc: &Value) -> Result<Option<MissingField>, DetectError> {
    let present = present_variants(rules, doc);
    if present.len() > 1 {
        return Err(DetectError::AmbiguousVariant {
            slot: rules.slot.clone(),
            present: present.iter().map(|k| k.to_string()).collect(),
            allowed: rules.keys().iter().map(|k| k.to_string()).collect(),
        });
    }

    let chosen = match present.first() {
        Some(key) => rules.variants.iter().find(|v| v.key == *key),
        None => rules.variants.first(),
    };
    Ok(chosen
        .filter(|variant| !path::exists(doc, &variant.rule.path))
        .map(|variant| variant.rule.to_missing()))
}
