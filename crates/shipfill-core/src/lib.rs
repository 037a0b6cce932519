//! # shipfill-core
//!
//! Deterministic missing-field detection for partial shipping requests.
//!
//! This crate answers, for a partial shipment or rate request:
//! - Which required leaves are still absent?
//! - How should they be asked for as a flat form?
//! - Where do the answers go back in the nested document?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same document and registry always produce the same missing list
//! 2. **No overwrites**: Defaults and answers only fill absent leaves
//! 3. **Pure**: Every operation returns a new document; inputs are never mutated
//!
//! ## Example
//!
//! ```rust,ignore
//! use shipfill_core::{prepare, build_form_schema, RequestProfile, DEFAULT_FORM_TITLE};
//!
//! let profile = RequestProfile::shipment();
//! let prepared = prepare(&profile, &request_body, &env)?;
//!
//! if prepared.is_complete() {
//!     send(profile.dispatch_form(&prepared.document));
//! } else {
//!     let form = build_form_schema(&prepared.missing, DEFAULT_FORM_TITLE);
//!     // present `form`, then normalize, validate, and rehydrate the answers
//! }
//! ```

pub mod array;
pub mod canonical;
pub mod defaults;
pub mod detector;
pub mod normalize;
pub mod path;
pub mod profile;
pub mod registry;
pub mod rehydrate;
pub mod rules;
pub mod schema;

// Re-export main types at crate root
pub use canonical::{canonicalize, CanonicalError};
pub use defaults::{DefaultsError, DefaultsProfile, VariantFallback};
pub use detector::{detect, DetectError};
pub use normalize::{normalize, validate, ValidationError};
pub use path::PathError;
pub use profile::{RequestProfile, ACCOUNT_NUMBER_ENV};
pub use registry::{RuleGroup, RuleRegistry};
pub use rehydrate::{rehydrate, RehydrationError};
pub use rules::{
    ArrayFieldRule, CollectedAnswers, Constraint, FieldKind, FieldRule, MissingField, MissingSummary,
};
pub use schema::{build_form_schema, FormField, FormSchema, DEFAULT_FORM_TITLE};

use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that stop a document before any interaction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error(transparent)]
    Defaults(#[from] DefaultsError),

    #[error(transparent)]
    Detect(#[from] DetectError),
}

/// A defaulted document and what it still lacks.
#[derive(Debug, Clone, PartialEq)]
pub struct Prepared {
    pub document: Value,
    pub missing: Vec<MissingField>,
}

impl Prepared {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Canonicalize, apply defaults, and detect missing fields.
///
/// This is the first step of every completion; `env` supplies the
/// environment tier of defaults.
pub fn prepare(
    profile: &RequestProfile,
    document: &Value,
    env: &BTreeMap<String, String>,
) -> Result<Prepared, CoreError> {
    let document = profile.apply_defaults(document, env)?;
    let missing = detect(&profile.registry, &document)?;
    Ok(Prepared { document, missing })
}
