//! Field rule types shared by the registry, detector, and form builder.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Answers returned by an interaction round: flat key to raw string.
pub type CollectedAnswers = BTreeMap<String, String>;

/// Primitive answer type of a form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    String,
    Number,
    Integer,
    Boolean,
}

impl FieldKind {
    /// JSON Schema `type` keyword for this kind.
    pub fn json_type(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Integer => "integer",
            FieldKind::Boolean => "boolean",
        }
    }
}

/// Value constraint attached to a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Constraint {
    MaxLength { value: usize },
    MinLength { value: usize },
    Pattern { value: String },
    Gt { value: f64 },
    Ge { value: f64 },
    Lt { value: f64 },
    Le { value: f64 },
    /// Passed through to the rendered schema untouched.
    Annotation { key: String, value: Value },
}

/// A required leaf, with everything needed to ask for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    /// Absolute path, or a path relative to an array item for item rules.
    pub path: String,

    /// Flat identifier used as the form field name.
    pub flat_key: String,

    /// Human-readable prompt.
    pub prompt: String,

    #[serde(default)]
    pub kind: FieldKind,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_titles: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
}

impl FieldRule {
    /// Create a string rule with no enumeration, default, or constraints.
    pub fn new(path: impl Into<String>, flat_key: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            flat_key: flat_key.into(),
            prompt: prompt.into(),
            kind: FieldKind::String,
            enum_values: Vec::new(),
            enum_titles: Vec::new(),
            default: None,
            constraints: Vec::new(),
        }
    }

    pub fn kind(mut self, kind: FieldKind) -> Self {
        self.kind = kind;
        self
    }

    /// Restrict answers to `values`, with optional display titles.
    pub fn one_of(mut self, values: &[&str], titles: &[&str]) -> Self {
        self.enum_values = values.iter().map(|v| v.to_string()).collect();
        self.enum_titles = titles.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn max_length(self, value: usize) -> Self {
        self.constraint(Constraint::MaxLength { value })
    }

    pub fn pattern(self, value: &str) -> Self {
        self.constraint(Constraint::Pattern {
            value: value.to_string(),
        })
    }

    pub fn gt(self, value: f64) -> Self {
        self.constraint(Constraint::Gt { value })
    }

    /// Instantiate the rule at a concrete path.
    pub fn to_missing(&self) -> MissingField {
        MissingField::from_rule(self, self.path.clone(), self.flat_key.clone(), self.prompt.clone())
    }

    /// Instantiate the rule under a base path with a derived key and prompt.
    pub fn to_missing_at(&self, path: String, flat_key: String, prompt: String) -> MissingField {
        MissingField::from_rule(self, path, flat_key, prompt)
    }
}

/// A rule instantiated against a concrete document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingField {
    pub path: String,
    pub flat_key: String,
    pub prompt: String,
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_titles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,

    /// False for composite requirements that a flat form cannot satisfy.
    pub elicitable: bool,
}

impl MissingField {
    fn from_rule(rule: &FieldRule, path: String, flat_key: String, prompt: String) -> Self {
        Self {
            path,
            flat_key,
            prompt,
            kind: rule.kind,
            enum_values: rule.enum_values.clone(),
            enum_titles: rule.enum_titles.clone(),
            default: rule.default.clone(),
            constraints: rule.constraints.clone(),
            elicitable: true,
        }
    }

    /// A requirement that must be supplied as a whole structure by the caller.
    pub fn structural(path: impl Into<String>, flat_key: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            flat_key: flat_key.into(),
            prompt: prompt.into(),
            kind: FieldKind::String,
            enum_values: Vec::new(),
            enum_titles: Vec::new(),
            default: None,
            constraints: Vec::new(),
            elicitable: false,
        }
    }

    /// Display label used in validation messages.
    pub fn label(&self) -> &str {
        if self.prompt.is_empty() {
            &self.flat_key
        } else {
            &self.prompt
        }
    }

    pub fn summary(&self) -> MissingSummary {
        MissingSummary {
            path: self.path.clone(),
            flat_key: self.flat_key.clone(),
            prompt: self.prompt.clone(),
        }
    }
}

/// The `{path, flat_key, prompt}` triple reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingSummary {
    pub path: String,
    pub flat_key: String,
    pub prompt: String,
}

/// Rules for a repeated structured sub-item (packages, products).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayFieldRule {
    /// Path of the array itself.
    pub array_path: String,

    /// Flat key prefix; item keys are `<prefix>_<n>_<sub key>`.
    pub item_prefix: String,

    /// Rules whose paths are relative to one item.
    pub item_rules: Vec<FieldRule>,

    pub max_items: usize,

    pub default_item_count: usize,
}

impl ArrayFieldRule {
    pub fn new(array_path: impl Into<String>, item_prefix: impl Into<String>, item_rules: Vec<FieldRule>) -> Self {
        Self {
            array_path: array_path.into(),
            item_prefix: item_prefix.into(),
            item_rules,
            max_items: 50,
            default_item_count: 1,
        }
    }

    pub fn max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    /// Flat key of sub-field `flat_key` for 1-based item `n`.
    pub fn item_key(&self, n: usize, flat_key: &str) -> String {
        format!("{}_{}_{}", self.item_prefix, n, flat_key)
    }

    /// Split `<prefix>_<n>_<sub>` into `(n, item rule)`.
    pub fn parse_item_key(&self, key: &str) -> Option<(usize, &FieldRule)> {
        let rest = key.strip_prefix(&self.item_prefix)?.strip_prefix('_')?;
        let (n, sub) = rest.split_once('_')?;
        let n = n.parse::<usize>().ok().filter(|n| *n >= 1)?;
        let rule = self.item_rules.iter().find(|r| r.flat_key == sub)?;
        Some((n, rule))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_chain() {
        let rule = FieldRule::new("A.B", "a_b", "The B")
            .kind(FieldKind::Number)
            .gt(0.0)
            .default_value("1");
        assert_eq!(rule.kind, FieldKind::Number);
        assert_eq!(rule.constraints, vec![Constraint::Gt { value: 0.0 }]);
        assert_eq!(rule.default.as_deref(), Some("1"));

        let missing = rule.to_missing();
        assert!(missing.elicitable);
        assert_eq!(missing.path, "A.B");
    }

    #[test]
    fn test_label_falls_back_to_key() {
        let field = MissingField::structural("A", "a_key", "");
        assert_eq!(field.label(), "a_key");
        assert!(!field.elicitable);
    }

    #[test]
    fn test_parse_item_key() {
        let rule = ArrayFieldRule::new(
            "A.Items",
            "product",
            vec![
                FieldRule::new("Description", "description", "Description"),
                FieldRule::new("Unit.Value", "unit_value", "Unit value"),
            ],
        );
        let (n, sub) = rule.parse_item_key("product_2_unit_value").unwrap();
        assert_eq!(n, 2);
        assert_eq!(sub.path, "Unit.Value");
        assert!(rule.parse_item_key("product_0_description").is_none());
        assert!(rule.parse_item_key("product_x_description").is_none());
        assert!(rule.parse_item_key("package_1_description").is_none());
        assert!(rule.parse_item_key("product_1_unknown").is_none());
    }

    #[test]
    fn test_constraint_serde_tag() {
        let json = serde_json::to_value(Constraint::MaxLength { value: 35 }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "max_length", "value": 35}));
    }
}
