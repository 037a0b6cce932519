//! Rule tables shared by the shipment and rating request families.
//!
//! Both families use the same `Shipment` subtree; only the root key differs.

use super::{AddressRole, CountryRules, Variant, VariantRules};
use crate::rules::{ArrayFieldRule, FieldKind, FieldRule};

/// Billing sub-objects, in fallback priority order.
pub const PAYER_KEYS: [&str; 3] = ["BillShipper", "BillReceiver", "BillThirdParty"];

const SERVICE_CODES: [&str; 15] = [
    "01", "02", "03", "07", "08", "11", "12", "13", "14", "17", "54", "59", "65", "72", "74",
];

const SERVICE_TITLES: [&str; 15] = [
    "Next Day Air",
    "2nd Day Air",
    "Ground",
    "Express",
    "Expedited",
    "UPS Standard",
    "3 Day Select",
    "Next Day Air Saver",
    "Next Day Air Early",
    "Worldwide Economy DDU",
    "Express Plus",
    "2nd Day Air A.M.",
    "UPS Saver",
    "Worldwide Economy DDP",
    "UPS Express 12:00",
];

const COUNTRY_PATTERN: &str = "^[A-Z]{2}$";

fn shipment(root: &str) -> String {
    format!("{root}.Shipment")
}

/// Identity and address leaves that are always required.
///
/// `with_request_option` adds `Request.RequestOption`, which only the
/// shipment family carries.
pub fn unconditional_rules(root: &str, with_request_option: bool) -> Vec<FieldRule> {
    let s = shipment(root);
    let mut rules = Vec::new();
    if with_request_option {
        rules.push(FieldRule::new(
            format!("{root}.Request.RequestOption"),
            "request_option",
            "Request option",
        ));
    }
    rules.extend([
        FieldRule::new(format!("{s}.Shipper.Name"), "shipper_name", "Shipper name"),
        FieldRule::new(format!("{s}.Shipper.ShipperNumber"), "shipper_number", "UPS account number"),
        FieldRule::new(
            format!("{s}.Shipper.Address.AddressLine[0]"),
            "shipper_address_line_1",
            "Shipper street address",
        ),
        FieldRule::new(format!("{s}.Shipper.Address.City"), "shipper_city", "Shipper city"),
        FieldRule::new(
            format!("{s}.Shipper.Address.CountryCode"),
            "shipper_country_code",
            "Shipper country code",
        )
        .max_length(2)
        .pattern(COUNTRY_PATTERN),
        FieldRule::new(format!("{s}.ShipTo.Name"), "ship_to_name", "Recipient name"),
        FieldRule::new(
            format!("{s}.ShipTo.Address.AddressLine[0]"),
            "ship_to_address_line_1",
            "Recipient street address",
        ),
        FieldRule::new(format!("{s}.ShipTo.Address.City"), "ship_to_city", "Recipient city"),
        FieldRule::new(
            format!("{s}.ShipTo.Address.CountryCode"),
            "ship_to_country_code",
            "Recipient country code",
        )
        .max_length(2)
        .pattern(COUNTRY_PATTERN),
    ]);
    rules
}

pub fn service_code_rule(root: &str) -> FieldRule {
    FieldRule::new(format!("{}.Service.Code", shipment(root)), "service_code", "UPS service type")
        .one_of(&SERVICE_CODES, &SERVICE_TITLES)
}

fn first_charge(root: &str) -> String {
    format!("{}.PaymentInformation.ShipmentCharge[0]", shipment(root))
}

pub fn payment_charge_type_rule(root: &str) -> FieldRule {
    FieldRule::new(
        format!("{}.Type", first_charge(root)),
        "payment_charge_type",
        "Shipment charge type",
    )
    .one_of(&["01", "02"], &["Transportation", "Duties and Taxes"])
    .default_value("01")
}

pub fn payer_variants(root: &str) -> VariantRules {
    let slot = first_charge(root);
    let variants = PAYER_KEYS
        .iter()
        .map(|key| Variant {
            key: key.to_string(),
            rule: FieldRule::new(
                format!("{slot}.{key}.AccountNumber"),
                "payment_account_number",
                "Billing account number",
            ),
        })
        .collect();
    VariantRules { slot, variants }
}

/// Per-package leaves, relative to each `Package` element.
pub fn package_rule(root: &str) -> ArrayFieldRule {
    ArrayFieldRule::new(
        format!("{}.Package", shipment(root)),
        "package",
        vec![
            FieldRule::new("Packaging.Code", "packaging_code", "Packaging type code")
                .one_of(
                    &["02", "01", "03", "04", "21", "24", "25"],
                    &[
                        "Customer Supplied Package",
                        "UPS Letter",
                        "Tube",
                        "PAK",
                        "UPS Express Box",
                        "UPS 25KG Box",
                        "UPS 10KG Box",
                    ],
                )
                .default_value("02"),
            FieldRule::new("PackageWeight.UnitOfMeasurement.Code", "weight_unit", "Weight unit")
                .one_of(&["LBS", "KGS"], &[])
                .default_value("LBS"),
            FieldRule::new("PackageWeight.Weight", "weight", "Package weight")
                .kind(FieldKind::Number)
                .gt(0.0),
        ],
    )
    .max_items(200)
}

/// State and postal code for US, CA and PR addresses.
pub fn country_rules(root: &str) -> CountryRules {
    let s = shipment(root);
    CountryRules {
        roles: vec![
            AddressRole::new(format!("{s}.Shipper.Address"), "shipper", "Shipper"),
            AddressRole::new(format!("{s}.ShipTo.Address"), "ship_to", "Recipient"),
        ],
        countries: ["US", "CA", "PR"].iter().map(|c| c.to_string()).collect(),
        rules: vec![
            FieldRule::new("StateProvinceCode", "state", "State/province code")
                .max_length(2)
                .pattern(COUNTRY_PATTERN),
            FieldRule::new("PostalCode", "postal_code", "Postal code"),
        ],
    }
}
