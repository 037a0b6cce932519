//! Cross-border requirements.
//!
//! These rules depend on several sibling values at once (origin and
//! destination countries, service, packaging, return status, form types), so
//! they are evaluated as one unit rather than as flat rule lists.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::tables::PAYER_KEYS;
use crate::array;
use crate::canonical;
use crate::path;
use crate::rules::{ArrayFieldRule, FieldKind, FieldRule, MissingField};

pub const EU_COUNTRIES: [&str; 27] = [
    "AT", "BE", "BG", "HR", "CY", "CZ", "DK", "EE", "FI", "FR", "DE", "GR", "HU", "IE", "IT",
    "LV", "LT", "LU", "MT", "NL", "PL", "PT", "RO", "SK", "SI", "ES", "SE",
];

/// Form type codes and their titles.
pub const INTERNATIONAL_FORM_TYPES: [(&str, &str); 10] = [
    ("01", "Invoice"),
    ("03", "Certificate of Origin"),
    ("04", "USMCA"),
    ("05", "Partial Invoice"),
    ("06", "Packinglist"),
    ("07", "Customer Generated Forms"),
    ("08", "Air Freight Packing List"),
    ("09", "CN22"),
    ("10", "UPS Premium Care Form"),
    ("11", "EEI"),
];

pub const FORMS_REQUIRING_PRODUCTS: [&str; 6] = ["01", "03", "04", "05", "06", "11"];

pub const FORMS_REQUIRING_CURRENCY: [&str; 2] = ["01", "05"];

pub const REASON_FOR_EXPORT_VALUES: [&str; 6] =
    ["SALE", "GIFT", "SAMPLE", "RETURN", "REPAIR", "INTERCOMPANYDATA"];

const FORMS_GUIDANCE: &str = "International shipments require InternationalForms. \
Add ShipmentServiceOptions.InternationalForms to the request with at least: \
FormType (e.g. '01' for Invoice), CurrencyCode, ReasonForExport, and a Product array. \
Example: {\"ShipmentServiceOptions\": {\"InternationalForms\": {\"FormType\": \"01\", \
\"CurrencyCode\": \"USD\", \"ReasonForExport\": \"SALE\", \"InvoiceNumber\": \"INV-001\", \
\"InvoiceDate\": \"20260216\", \"Product\": [{\"Description\": \"Electronics\", \
\"Unit\": {\"Number\": \"1\", \"Value\": \"100\", \"UnitOfMeasurement\": {\"Code\": \"PCS\"}}, \
\"OriginCountryCode\": \"US\"}]}}}";

const FORMS_NOT_OBJECT_GUIDANCE: &str = "ShipmentServiceOptions.InternationalForms must be an object. \
Replace the current value with an object holding FormType, CurrencyCode, ReasonForExport, and a Product array.";

const DUTIES_GUIDANCE: &str = "Duties and Taxes charge (ShipmentCharge[1] Type '02') requires a payer. \
Add BillShipper, BillReceiver, or BillThirdParty with AccountNumber.";

/// How a shipment is recognised as a return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnDetection {
    /// `ReturnService` is a map with a non-empty `Code`.
    CodedMap,
    /// `ReturnService` is present at all.
    Present,
}

/// Cross-border rule set anchored at a `Shipment` node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternationalRules {
    pub shipment_path: String,
    pub returns: ReturnDetection,
    /// Evaluate the `InternationalForms` block.
    pub forms: bool,
    /// Require a payer on a second, duties-type charge.
    pub duties_payer: bool,
    pub product_rule: Option<ArrayFieldRule>,
}

/// Facts about the route that several rules share.
struct Route<'a> {
    origin: &'a str,
    destination: &'a str,
    service: &'a str,
    international: bool,
    letters_only: bool,
    eu_standard: bool,
    is_return: bool,
}

impl Route<'_> {
    fn forms_exempt(&self) -> bool {
        self.letters_only || self.eu_standard
    }
}

impl InternationalRules {
    pub fn new(shipment_path: impl Into<String>, returns: ReturnDetection) -> Self {
        Self {
            shipment_path: shipment_path.into(),
            returns,
            forms: false,
            duties_payer: false,
            product_rule: None,
        }
    }

    /// Enable the `InternationalForms` and duties-payer checks.
    pub fn with_forms(mut self) -> Self {
        self.forms = true;
        self.duties_payer = true;
        self.product_rule = Some(self.product_array_rule());
        self
    }

    fn at(&self, sub: &str) -> String {
        path::join(&self.shipment_path, sub)
    }

    fn forms_path(&self) -> String {
        self.at("ShipmentServiceOptions.InternationalForms")
    }

    fn country<'a>(&self, doc: &'a Value, role: &str) -> &'a str {
        path::get_str(doc, &self.at(&format!("{role}.Address.CountryCode")))
    }

    fn route<'a>(&self, doc: &'a Value) -> Route<'a> {
        let ship_from = self.country(doc, "ShipFrom");
        let origin = if ship_from.is_empty() {
            self.country(doc, "Shipper")
        } else {
            ship_from
        };
        let destination = self.country(doc, "ShipTo");
        let service = path::get_str(doc, &self.at("Service.Code"));

        let packages = canonical::items(doc, &self.at("Package"));
        let letters_only = !packages.is_empty()
            && packages
                .iter()
                .all(|pkg| path::get_str(pkg, "Packaging.Code") == "01");

        let is_eu = |code: &str| EU_COUNTRIES.iter().any(|c| c.eq_ignore_ascii_case(code));
        let eu_standard = is_eu(origin) && is_eu(destination) && service == "11";

        let is_return = match self.returns {
            ReturnDetection::CodedMap => path::get(doc, &self.at("ReturnService"))
                .is_some_and(|rs| rs.is_object() && path::exists(rs, "Code")),
            ReturnDetection::Present => path::get(doc, &self.at("ReturnService"))
                .is_some_and(|rs| !rs.is_null()),
        };

        Route {
            origin,
            destination,
            service,
            international: !origin.is_empty()
                && !destination.is_empty()
                && !origin.eq_ignore_ascii_case(destination),
            letters_only,
            eu_standard,
            is_return,
        }
    }

    /// Missing cross-border leaves for `doc`, in a stable order.
    pub fn missing(&self, doc: &Value) -> Vec<MissingField> {
        let route = self.route(doc);
        let mut missing = Vec::new();
        let require = |missing: &mut Vec<MissingField>, rule: FieldRule| {
            if !path::exists(doc, &rule.path) {
                missing.push(rule.to_missing());
            }
        };

        if route.international {
            for rule in self.contact_rules("Shipper", "shipper", "Shipper") {
                require(&mut missing, rule);
            }
        }

        if route.international || route.service == "14" {
            for rule in self.contact_rules("ShipTo", "ship_to", "Recipient") {
                require(&mut missing, rule);
            }
        }

        if route.international && !route.forms_exempt() {
            require(
                &mut missing,
                FieldRule::new(
                    self.at("Description"),
                    "shipment_description",
                    "Description of goods (required for international)",
                )
                .max_length(50),
            );
        }

        let origin_us = route.origin.eq_ignore_ascii_case("US");
        let to_ca_or_pr = ["CA", "PR"]
            .iter()
            .any(|c| c.eq_ignore_ascii_case(route.destination));
        if origin_us && to_ca_or_pr && !route.is_return {
            for rule in self.invoice_total_rules() {
                require(&mut missing, rule);
            }
        }

        if self.forms && route.international {
            self.forms_missing(doc, &route, &mut missing);
        }

        if self.duties_payer && route.international {
            self.duties_missing(doc, &mut missing);
        }

        missing
    }

    fn forms_missing(&self, doc: &Value, route: &Route<'_>, missing: &mut Vec<MissingField>) {
        let forms_path = self.forms_path();
        let existing = path::get(doc, &forms_path).filter(|f| path::is_present(f));
        let Some(forms) = existing.filter(|f| f.is_object()) else {
            if !route.forms_exempt() {
                // a non-object value sits at the path, so the fix is a replacement
                let guidance = if existing.is_some() { FORMS_NOT_OBJECT_GUIDANCE } else { FORMS_GUIDANCE };
                missing.push(MissingField::structural(forms_path, "intl_forms_required", guidance));
            }
            return;
        };

        let form_types = form_types(forms);

        if form_types.is_empty() {
            let (codes, titles): (Vec<&str>, Vec<&str>) = INTERNATIONAL_FORM_TYPES.iter().copied().unzip();
            require_in_forms(
                missing,
                forms,
                FieldRule::new(
                    path::join(&forms_path, "FormType"),
                    "intl_forms_form_type",
                    "International form type",
                )
                .one_of(&codes, &titles),
                "FormType",
            );
        }

        if has_any(&form_types, &FORMS_REQUIRING_PRODUCTS) {
            if let Some(rule) = &self.product_rule {
                missing.extend(array::expand(rule, doc, None));
            }
        }

        if has_any(&form_types, &FORMS_REQUIRING_CURRENCY) {
            require_in_forms(
                missing,
                forms,
                FieldRule::new(
                    path::join(&forms_path, "CurrencyCode"),
                    "intl_forms_currency_code",
                    "Currency code for international forms (e.g. USD, EUR, GBP)",
                )
                .max_length(3)
                .pattern("^[A-Z]{3}$"),
                "CurrencyCode",
            );
        }

        if has_any(&form_types, &["01"]) {
            require_in_forms(
                missing,
                forms,
                FieldRule::new(
                    path::join(&forms_path, "ReasonForExport"),
                    "intl_forms_reason_for_export",
                    "Reason for export",
                )
                .one_of(
                    &REASON_FOR_EXPORT_VALUES,
                    &["Sale", "Gift", "Sample", "Return", "Repair", "Intercompany Data"],
                ),
                "ReasonForExport",
            );
            require_in_forms(
                missing,
                forms,
                FieldRule::new(
                    path::join(&forms_path, "InvoiceNumber"),
                    "intl_forms_invoice_number",
                    "Commercial invoice number",
                )
                .max_length(35),
                "InvoiceNumber",
            );
            if !route.is_return {
                require_in_forms(
                    missing,
                    forms,
                    FieldRule::new(
                        path::join(&forms_path, "InvoiceDate"),
                        "intl_forms_invoice_date",
                        "Invoice date (YYYYMMDD format)",
                    )
                    .max_length(8)
                    .pattern(r"^\d{8}$"),
                    "InvoiceDate",
                );
            }
        }

        if has_any(&form_types, &["01", "04"]) {
            for rule in sold_to_rules(&forms_path) {
                let relative = rule.path[forms_path.len() + 1..].to_string();
                require_in_forms(missing, forms, rule, &relative);
            }
        }

        if has_any(&form_types, &["11"]) {
            require_in_forms(
                missing,
                forms,
                FieldRule::new(
                    path::join(&forms_path, "EEIFilingOption.Code"),
                    "eei_filing_code",
                    "EEI filing option",
                )
                .one_of(&["1", "2", "3"], &["Shipper Filed", "AES Direct", "UPS Filed"]),
                "EEIFilingOption.Code",
            );
        }
    }

    fn duties_missing(&self, doc: &Value, missing: &mut Vec<MissingField>) {
        let charges_path = self.at("PaymentInformation.ShipmentCharge");
        let charges = canonical::items(doc, &charges_path);
        let Some(second) = charges.get(1) else {
            return;
        };
        if path::get_str(second, "Type") != "02" {
            return;
        }
        let has_payer = second
            .as_object()
            .is_some_and(|m| PAYER_KEYS.iter().any(|k| m.contains_key(*k)));
        if !has_payer {
            missing.push(MissingField::structural(
                path::indexed(&charges_path, 1),
                "duties_payer_required",
                DUTIES_GUIDANCE,
            ));
        }
    }

    fn contact_rules(&self, role: &str, prefix: &str, label: &str) -> [FieldRule; 2] {
        [
            FieldRule::new(
                self.at(&format!("{role}.AttentionName")),
                format!("{prefix}_attention_name"),
                format!("{label} attention name"),
            )
            .max_length(35),
            FieldRule::new(
                self.at(&format!("{role}.Phone.Number")),
                format!("{prefix}_phone"),
                format!("{label} phone number"),
            )
            .max_length(15),
        ]
    }

    fn invoice_total_rules(&self) -> [FieldRule; 2] {
        [
            FieldRule::new(
                self.at("InvoiceLineTotal.CurrencyCode"),
                "invoice_currency_code",
                "Invoice currency code (e.g. USD)",
            )
            .max_length(3)
            .pattern("^[A-Z]{3}$"),
            FieldRule::new(
                self.at("InvoiceLineTotal.MonetaryValue"),
                "invoice_monetary_value",
                "Invoice total monetary value",
            )
            .max_length(11)
            .pattern(r"^\d+(\.\d{1,2})?$"),
        ]
    }

    fn product_array_rule(&self) -> ArrayFieldRule {
        ArrayFieldRule::new(
            path::join(&self.forms_path(), "Product"),
            "product",
            vec![
                FieldRule::new("Description", "description", "Product description").max_length(35),
                FieldRule::new("Unit.Number", "quantity", "Quantity")
                    .kind(FieldKind::Integer)
                    .gt(0.0),
                FieldRule::new("Unit.Value", "value", "Unit value ($)")
                    .kind(FieldKind::Number)
                    .gt(0.0),
                FieldRule::new("Unit.UnitOfMeasurement.Code", "unit_code", "Unit of measure")
                    .one_of(
                        &["PCS", "BOX", "DZ", "EA", "KG", "LB", "PR"],
                        &["Pieces", "Box", "Dozen", "Each", "Kilogram", "Pound", "Pair"],
                    )
                    .default_value("PCS"),
                FieldRule::new("OriginCountryCode", "origin_country", "Country of origin")
                    .max_length(2)
                    .pattern("^[A-Z]{2}$"),
            ],
        )
    }
}

fn sold_to_rules(forms_path: &str) -> Vec<FieldRule> {
    let sold_to = path::join(forms_path, "Contacts.SoldTo");
    let at = |sub: &str| path::join(&sold_to, sub);
    vec![
        FieldRule::new(at("Name"), "sold_to_name", "Sold-to party name").max_length(35),
        FieldRule::new(at("AttentionName"), "sold_to_attention_name", "Sold-to attention name")
            .max_length(35),
        FieldRule::new(at("Phone.Number"), "sold_to_phone", "Sold-to phone number").max_length(15),
        FieldRule::new(at("Address.AddressLine"), "sold_to_address_line", "Sold-to street address"),
        FieldRule::new(at("Address.City"), "sold_to_city", "Sold-to city"),
        FieldRule::new(at("Address.CountryCode"), "sold_to_country_code", "Sold-to country code")
            .max_length(2)
            .pattern("^[A-Z]{2}$"),
    ]
}

fn require_in_forms(missing: &mut Vec<MissingField>, forms: &Value, rule: FieldRule, relative: &str) {
    if !path::exists(forms, relative) {
        missing.push(rule.to_missing());
    }
}

fn has_any(form_types: &[String], codes: &[&str]) -> bool {
    form_types.iter().any(|ft| codes.contains(&ft.as_str()))
}

/// `FormType` as a list of non-blank codes. Accepts a string or an array.
fn form_types(forms: &Value) -> Vec<String> {
    let scalar = |v: &Value| match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };
    match forms.get("FormType") {
        Some(Value::Array(items)) => items.iter().filter_map(scalar).filter(|s| !s.is_empty()).collect(),
        Some(other) => scalar(other).filter(|s| !s.is_empty()).into_iter().collect(),
        None => Vec::new(),
    }
}
