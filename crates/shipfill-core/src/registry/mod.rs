//! Declarative rule registries.
//!
//! A [`RuleRegistry`] is an immutable value describing every required leaf of
//! one request family. Groups are evaluated in declaration order, which is
//! also the order of the detector's output.

mod international;
mod tables;

pub use international::{
    InternationalRules, ReturnDetection, EU_COUNTRIES, FORMS_REQUIRING_CURRENCY,
    FORMS_REQUIRING_PRODUCTS, INTERNATIONAL_FORM_TYPES, REASON_FOR_EXPORT_VALUES,
};
pub use tables::{
    country_rules, package_rule, payment_charge_type_rule, payer_variants, service_code_rule, unconditional_rules,
    PAYER_KEYS,
};

use serde::{Deserialize, Serialize};

use crate::rules::{ArrayFieldRule, FieldRule};

/// An address whose requirements depend on its own country code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressRole {
    /// Path of the address map, e.g. `ShipmentRequest.Shipment.Shipper.Address`.
    pub address_path: String,
    /// Flat key prefix, e.g. `ship_to`.
    pub prefix: String,
    /// Prompt label, e.g. `Recipient`.
    pub label: String,
}

impl AddressRole {
    pub fn new(address_path: impl Into<String>, prefix: &str, label: &str) -> Self {
        Self {
            address_path: address_path.into(),
            prefix: prefix.to_string(),
            label: label.to_string(),
        }
    }
}

/// Leaves required when an address's country is in `countries`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryRules {
    pub roles: Vec<AddressRole>,
    pub countries: Vec<String>,
    /// Rules relative to the address map.
    pub rules: Vec<FieldRule>,
}

/// One mutually exclusive sub-object and the leaf it requires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub key: String,
    pub rule: FieldRule,
}

/// Mutually exclusive variants at a slot. The first variant is the fallback
/// when none is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantRules {
    pub slot: String,
    pub variants: Vec<Variant>,
}

impl VariantRules {
    pub fn keys(&self) -> Vec<&str> {
        self.variants.iter().map(|v| v.key.as_str()).collect()
    }
}

/// A group of rules evaluated together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleGroup {
    Unconditional { rules: Vec<FieldRule> },
    Items { rule: ArrayFieldRule },
    ByCountry { rules: CountryRules },
    ByVariant { rules: VariantRules },
    International { rules: InternationalRules },
}

/// Every requirement of one request family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRegistry {
    /// Used in user-facing messages, e.g. `shipment`.
    pub label: String,

    /// Paths of list-or-single fields, canonicalized before detection.
    pub list_fields: Vec<String>,

    pub groups: Vec<RuleGroup>,
}

impl RuleRegistry {
    /// Array rules declared anywhere in the registry, including nested ones.
    pub fn array_rules(&self) -> Vec<&ArrayFieldRule> {
        self.groups
            .iter()
            .filter_map(|group| match group {
                RuleGroup::Items { rule } => Some(rule),
                RuleGroup::International { rules } => rules.product_rule.as_ref(),
                _ => None,
            })
            .collect()
    }

    /// The payer-style variant group, if any.
    pub fn variant_rules(&self) -> Option<&VariantRules> {
        self.groups.iter().find_map(|group| match group {
            RuleGroup::ByVariant { rules } => Some(rules),
            _ => None,
        })
    }
}
