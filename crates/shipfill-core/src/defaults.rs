//! Three-tier defaults: built-in < environment < caller.
//!
//! Every tier only fills leaves that are absent, so a caller-supplied value
//! always wins. Tiers are applied from highest to lowest precedence.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::canonical::{self, CanonicalError};
use crate::detector::present_variants;
use crate::path::{self, PathError};
use crate::registry::VariantRules;

/// Errors applying defaults to a malformed document.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DefaultsError {
    #[error(transparent)]
    Malformed(#[from] CanonicalError),

    #[error("Cannot apply default at '{path}': {source}")]
    Conflict {
        path: String,
        #[source]
        source: PathError,
    },
}

/// Environment-sourced default that only applies when no variant is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantFallback {
    pub variants: VariantRules,
    pub path: String,
    pub env_key: String,
}

/// Defaults for one request family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DefaultsProfile {
    /// `(path, value)` pairs.
    pub built_in: Vec<(String, String)>,

    /// `(path, environment key)` pairs.
    pub env: Vec<(String, String)>,

    pub variant_fallback: Option<VariantFallback>,
}

impl DefaultsProfile {
    /// Return a copy of `doc` with defaults filled in.
    ///
    /// Blank environment values are ignored.
    pub fn apply(
        &self,
        doc: &Value,
        env: &BTreeMap<String, String>,
        list_fields: &[String],
    ) -> Result<Value, DefaultsError> {
        let mut out = canonical::canonicalize(doc, list_fields)?;
        let env_value = |key: &str| env.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        for (target, key) in &self.env {
            if let Some(value) = env_value(key) {
                fill(&mut out, target, value)?;
            }
        }

        if let Some(fallback) = &self.variant_fallback {
            if present_variants(&fallback.variants, &out).is_empty() {
                if let Some(value) = env_value(&fallback.env_key) {
                    fill(&mut out, &fallback.path, value)?;
                }
            }
        }

        for (target, value) in &self.built_in {
            fill(&mut out, target, value)?;
        }

        Ok(out)
    }
}

fn fill(doc: &mut Value, target: &str, value: &str) -> Result<(), DefaultsError> {
    if path::exists(doc, target) {
        return Ok(());
    }
    tracing::trace!(path = target, "Applying default");
    path::set(doc, target, Value::String(value.to_string())).map_err(|source| DefaultsError::Conflict {
        path: target.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use crate::profile::RequestProfile;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn env(account: &str) -> BTreeMap<String, String> {
        BTreeMap::from([("UPS_ACCOUNT_NUMBER".to_string(), account.to_string())])
    }

    #[test]
    fn test_shipment_defaults_fill_absent_leaves() {
        let profile = RequestProfile::shipment();
        let out = profile.apply_defaults(&json!({}), &env("ACCT1")).unwrap();
        assert_eq!(
            out,
            json!({"ShipmentRequest": {
                "Request": {"RequestOption": "nonvalidate"},
                "Shipment": {
                    "Shipper": {"ShipperNumber": "ACCT1"},
                    "PaymentInformation": {"ShipmentCharge": [{
                        "Type": "01",
                        "BillShipper": {"AccountNumber": "ACCT1"}
                    }]}
                }
            }})
        );
    }

    #[test]
    fn test_caller_values_win() {
        let profile = RequestProfile::shipment();
        let doc = json!({"ShipmentRequest": {
            "Request": {"RequestOption": "validate"},
            "Shipment": {"Shipper": {"ShipperNumber": "MINE"}}
        }});
        let out = profile.apply_defaults(&doc, &env("ENV")).unwrap();
        assert_eq!(out["ShipmentRequest"]["Request"]["RequestOption"], "validate");
        assert_eq!(out["ShipmentRequest"]["Shipment"]["Shipper"]["ShipperNumber"], "MINE");
    }

    #[test]
    fn test_no_bill_shipper_when_other_payer_present() {
        let profile = RequestProfile::shipment();
        let doc = json!({"ShipmentRequest": {"Shipment": {"PaymentInformation": {
            "ShipmentCharge": {"BillReceiver": {"AccountNumber": "R"}}
        }}}});
        let out = profile.apply_defaults(&doc, &env("ENV")).unwrap();
        let charge = &out["ShipmentRequest"]["Shipment"]["PaymentInformation"]["ShipmentCharge"][0];
        assert!(charge.get("BillShipper").is_none());
        assert_eq!(charge["Type"], "01");
    }

    #[test]
    fn test_blank_env_is_ignored_and_input_untouched() {
        let profile = RequestProfile::shipment();
        let doc = json!({"ShipmentRequest": {}});
        let before = doc.clone();
        let out = profile.apply_defaults(&doc, &env("   ")).unwrap();
        assert_eq!(doc, before);
        assert!(out["ShipmentRequest"]["Shipment"]["Shipper"].is_null());
    }

    #[test]
    fn test_rating_defaults_have_no_request_option() {
        let profile = RequestProfile::rating("Rate");
        let out = profile.apply_defaults(&json!({}), &BTreeMap::new()).unwrap();
        assert!(out["RateRequest"].get("Request").is_none());
        assert_eq!(
            out["RateRequest"]["Shipment"]["PaymentInformation"]["ShipmentCharge"][0]["Type"],
            "01"
        );
    }

    #[test]
    fn test_conflicting_shape_is_reported() {
        let profile = RequestProfile::shipment();
        let doc = json!({"ShipmentRequest": {"Request": "text"}});
        let err = profile.apply_defaults(&doc, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, super::DefaultsError::Conflict { .. }));
    }
}
