//! Flat form descriptors built from missing fields.
//!
//! A [`FormSchema`] is what an interaction channel renders: one primitive
//! field per missing leaf, named by its flat key. It can be rendered as a
//! JSON Schema object for channels that speak JSON Schema.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::rules::{Constraint, FieldKind, MissingField};

/// Title used when the caller does not supply one.
pub const DEFAULT_FORM_TITLE: &str = "MissingFields";

/// One primitive form field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    pub description: String,
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    /// Only set when there is exactly one title per enum value.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_titles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
}

impl FormField {
    fn from_missing(field: &MissingField) -> Self {
        let titles_match = !field.enum_titles.is_empty() && field.enum_titles.len() == field.enum_values.len();
        Self {
            name: field.flat_key.clone(),
            description: field.prompt.clone(),
            kind: field.kind,
            enum_values: field.enum_values.clone(),
            enum_titles: if titles_match {
                field.enum_titles.clone()
            } else {
                Vec::new()
            },
            default: field.default.clone(),
            constraints: field.constraints.clone(),
        }
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }

    fn to_json_schema(&self) -> Value {
        let mut prop = Map::new();
        prop.insert("type".into(), json!(self.kind.json_type()));
        prop.insert("description".into(), json!(self.description));

        if !self.enum_values.is_empty() {
            prop.insert("enum".into(), json!(self.enum_values));
            if !self.enum_titles.is_empty() {
                let one_of: Vec<Value> = self
                    .enum_values
                    .iter()
                    .zip(&self.enum_titles)
                    .map(|(value, title)| json!({"const": value, "title": title}))
                    .collect();
                prop.insert("oneOf".into(), Value::Array(one_of));
            }
        }

        if let Some(default) = &self.default {
            prop.insert("default".into(), typed_default(self.kind, default));
        }

        for constraint in &self.constraints {
            let (key, value) = match constraint {
                Constraint::MaxLength { value } => ("maxLength".to_string(), json!(value)),
                Constraint::MinLength { value } => ("minLength".to_string(), json!(value)),
                Constraint::Pattern { value } => ("pattern".to_string(), json!(value)),
                Constraint::Gt { value } => ("exclusiveMinimum".to_string(), json!(value)),
                Constraint::Ge { value } => ("minimum".to_string(), json!(value)),
                Constraint::Lt { value } => ("exclusiveMaximum".to_string(), json!(value)),
                Constraint::Le { value } => ("maximum".to_string(), json!(value)),
                Constraint::Annotation { key, value } => (key.clone(), value.clone()),
            };
            prop.insert(key, value);
        }

        Value::Object(prop)
    }
}

fn typed_default(kind: FieldKind, raw: &str) -> Value {
    match kind {
        FieldKind::String => json!(raw),
        FieldKind::Number => raw.parse::<f64>().map(|n| json!(n)).unwrap_or_else(|_| json!(raw)),
        FieldKind::Integer => raw.parse::<i64>().map(|n| json!(n)).unwrap_or_else(|_| json!(raw)),
        FieldKind::Boolean => raw.parse::<bool>().map(|b| json!(b)).unwrap_or_else(|_| json!(raw)),
    }
}

/// A flat form, ready to present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSchema {
    pub title: String,
    pub fields: Vec<FormField>,
}

impl FormSchema {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Render as a JSON Schema object.
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.to_json_schema()))
            .collect();
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.is_required())
            .map(|f| f.name.as_str())
            .collect();
        json!({
            "title": self.title,
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Build a form from the elicitable fields in `fields`.
///
/// Structural fields are skipped. An empty input yields a valid, empty form.
pub fn build_form_schema(fields: &[MissingField], title: &str) -> FormSchema {
    FormSchema {
        title: if title.is_empty() {
            DEFAULT_FORM_TITLE.to_string()
        } else {
            title.to_string()
        },
        fields: fields
            .iter()
            .filter(|f| f.elicitable)
            .map(FormField::from_missing)
            .collect(),
    }
}
