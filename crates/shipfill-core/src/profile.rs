//! Request families: a rule registry plus its defaults.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::defaults::{DefaultsError, DefaultsProfile, VariantFallback};
use crate::rules::FieldRule;
use crate::registry::{
    country_rules, package_rule, payer_variants, payment_charge_type_rule, service_code_rule,
    unconditional_rules, InternationalRules, ReturnDetection, RuleGroup, RuleRegistry,
};

/// Environment key holding the shipper's account number.
pub const ACCOUNT_NUMBER_ENV: &str = "UPS_ACCOUNT_NUMBER";

/// Request options for which rating does not need a service code.
const SHOP_OPTIONS: [&str; 2] = ["shop", "shoptimeintransit"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Shipment,
    Rating,
}

/// Everything needed to complete one kind of request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestProfile {
    pub registry: RuleRegistry,
    pub defaults: DefaultsProfile,
    family: Family,
}

impl RequestProfile {
    /// Shipment creation (`ShipmentRequest`).
    pub fn shipment() -> Self {
        let root = "ShipmentRequest";
        let mut unconditional = unconditional_rules(root, true);
        unconditional.push(service_code_rule(root));

        let registry = RuleRegistry {
            label: "shipment".to_string(),
            list_fields: list_fields(root, true),
            groups: shared_groups(
                root,
                unconditional,
                InternationalRules::new(format!("{root}.Shipment"), ReturnDetection::CodedMap)
                    .with_forms(),
            ),
        };

        let mut defaults = shared_defaults(root);
        defaults
            .built_in
            .insert(0, (format!("{root}.Request.RequestOption"), "nonvalidate".to_string()));

        Self {
            registry,
            defaults,
            family: Family::Shipment,
        }
    }

    /// Rating (`RateRequest`). `request_option` is the rating mode; shop
    /// modes compare every service, so no service code is required.
    pub fn rating(request_option: &str) -> Self {
        let root = "RateRequest";
        let shopping = SHOP_OPTIONS
            .iter()
            .any(|o| o.eq_ignore_ascii_case(request_option.trim()));
        let mut unconditional = unconditional_rules(root, false);
        if !shopping {
            unconditional.push(service_code_rule(root));
        }

        let registry = RuleRegistry {
            label: "rate request".to_string(),
            list_fields: list_fields(root, false),
            groups: shared_groups(
                root,
                unconditional,
                InternationalRules::new(format!("{root}.Shipment"), ReturnDetection::Present),
            ),
        };

        Self {
            registry,
            defaults: shared_defaults(root),
            family: Family::Rating,
        }
    }

    pub fn label(&self) -> &str {
        &self.registry.label
    }

    /// Apply this family's defaults to a copy of `doc`.
    pub fn apply_defaults(
        &self,
        doc: &Value,
        env: &BTreeMap<String, String>,
    ) -> Result<Value, DefaultsError> {
        self.defaults.apply(doc, env, &self.registry.list_fields)
    }

    /// The document in the shape the remote endpoint expects.
    ///
    /// Rating names the packaging block `PackagingType`; shipments are
    /// returned unchanged.
    pub fn dispatch_form(&self, doc: &Value) -> Value {
        let mut out = doc.clone();
        if self.family == Family::Rating {
            let packages = out
                .get_mut("RateRequest")
                .and_then(|r| r.get_mut("Shipment"))
                .and_then(|s| s.get_mut("Package"));
            match packages {
                Some(Value::Array(items)) => items.iter_mut().for_each(rename_packaging),
                Some(other) => rename_packaging(other),
                None => {}
            }
        }
        out
    }
}

fn rename_packaging(package: &mut Value) {
    if let Some(map) = package.as_object_mut() {
        if let Some(packaging) = map.remove("Packaging") {
            map.insert("PackagingType".to_string(), packaging);
        }
    }
}

fn list_fields(root: &str, with_products: bool) -> Vec<String> {
    let mut fields = vec![
        format!("{root}.Shipment.Package"),
        format!("{root}.Shipment.PaymentInformation.ShipmentCharge"),
    ];
    if with_products {
        fields.push(format!(
            "{root}.Shipment.ShipmentServiceOptions.InternationalForms.Product"
        ));
    }
    fields
}

fn shared_groups(
    root: &str,
    unconditional: Vec<FieldRule>,
    international: InternationalRules,
) -> Vec<RuleGroup> {
    vec![
        RuleGroup::Unconditional {
            rules: unconditional,
        },
        RuleGroup::Unconditional {
            rules: vec![payment_charge_type_rule(root)],
        },
        RuleGroup::ByVariant {
            rules: payer_variants(root),
        },
        RuleGroup::Items {
            rule: package_rule(root),
        },
        RuleGroup::ByCountry {
            rules: country_rules(root),
        },
        RuleGroup::International {
            rules: international,
        },
    ]
}

fn shared_defaults(root: &str) -> DefaultsProfile {
    let variants = payer_variants(root);
    let charge_type = format!("{}.Type", variants.slot);
    let bill_shipper = format!("{}.BillShipper.AccountNumber", variants.slot);
    DefaultsProfile {
        built_in: vec![(charge_type, "01".to_string())],
        env: vec![(
            format!("{root}.Shipment.Shipper.ShipperNumber"),
            ACCOUNT_NUMBER_ENV.to_string(),
        )],
        variant_fallback: Some(VariantFallback {
            variants,
            path: bill_shipper,
            env_key: ACCOUNT_NUMBER_ENV.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_shop_option_is_case_insensitive() {
        let count = |p: RequestProfile| match &p.registry.groups[0] {
            RuleGroup::Unconditional { rules } => rules.len(),
            _ => 0,
        };
        assert_eq!(count(RequestProfile::rating("SHOP")), 9);
        assert_eq!(count(RequestProfile::rating("Shoptimeintransit")), 9);
        assert_eq!(count(RequestProfile::rating("Rate")), 10);
    }

    #[test]
    fn test_dispatch_form_renames_packaging_for_rating() {
        let doc = json!({"RateRequest": {"Shipment": {"Package": [
            {"Packaging": {"Code": "02"}, "PackageWeight": {"Weight": "1"}},
            {"PackageWeight": {"Weight": "2"}}
        ]}}});
        let out = RequestProfile::rating("Rate").dispatch_form(&doc);
        let packages = &out["RateRequest"]["Shipment"]["Package"];
        assert_eq!(packages[0]["PackagingType"], json!({"Code": "02"}));
        assert!(packages[0].get("Packaging").is_none());
        assert!(packages[1].get("PackagingType").is_none());
        assert!(doc["RateRequest"]["Shipment"]["Package"][0].get("Packaging").is_some());
    }

    #[test]
    fn test_dispatch_form_leaves_shipments_alone() {
        let doc = json!({"ShipmentRequest": {"Shipment": {"Package": {"Packaging": {"Code": "02"}}}}});
        assert_eq!(RequestProfile::shipment().dispatch_form(&doc), doc);
    }
}
