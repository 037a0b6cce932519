//! Completion orchestrator.
//!
//! Drives one document from caller input to a complete request:
//! - Defaults and detection (deterministic, in `shipfill-core`)
//! - Form presentation through an [`InteractionChannel`]
//! - Normalization, validation, and retry with feedback
//! - No-overwrite rehydration and re-detection until nothing is missing
//!
//! Every presentation consumes one attempt. The loop ends on success, on
//! any refusal or structural problem, or when attempts run out.

use chrono::{DateTime, Utc};
use serde_json::Value;

use shipfill_core::{
    build_form_schema, detect, normalize, prepare, rehydrate, validate, MissingField, RequestProfile,
    ValidationError, DEFAULT_FORM_TITLE,
};

use crate::channel::{InteractionChannel, PresentOutcome};
use crate::config::{ConfigError, RuntimeConfig};
use crate::error::CompletionError;

/// A completed document.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// The completed request, in request form.
    pub document: Value,

    /// Number of forms presented.
    pub rounds: u32,

    pub completed_at: DateTime<Utc>,
}

/// What the next presentation should say before the base message.
#[derive(Debug)]
enum Feedback {
    None,
    Invalid(Vec<ValidationError>),
    StillMissing,
}

/// Control state of one completion.
#[derive(Debug)]
enum State {
    Detected { document: Value, missing: Vec<MissingField> },
    Presenting { document: Value, missing: Vec<MissingField>, feedback: Feedback },
    Done(Value),
}

/// Completes partial requests of one family through an interaction channel.
///
/// Holds no state between calls; independent documents may be completed
/// concurrently with the same orchestrator.
#[derive(Debug, Clone)]
pub struct CompletionOrchestrator {
    profile: RequestProfile,
    config: RuntimeConfig,
}

impl CompletionOrchestrator {
    pub fn new(profile: RequestProfile, config: RuntimeConfig) -> Self {
        Self { profile, config }
    }

    pub fn builder() -> CompletionOrchestratorBuilder {
        CompletionOrchestratorBuilder::new()
    }

    pub fn profile(&self) -> &RequestProfile {
        &self.profile
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Complete `document`, asking `channel` for whatever is missing.
    ///
    /// # Execution Flow
    /// 1. Apply defaults and detect missing fields
    /// 2. Stop on structural gaps or a channel without form support
    /// 3. Present a form; stop on decline, cancel, or transport failure
    /// 4. Normalize and validate; on errors, re-present with feedback
    /// 5. Rehydrate, re-detect, and repeat with whatever is still missing
    pub async fn complete(
        &self,
        document: &Value,
        channel: &dyn InteractionChannel,
    ) -> Result<Completion, CompletionError> {
        let label = self.profile.label().to_string();
        let prepared = prepare(&self.profile, document, &self.config.env)?;
        let mut rounds = 0u32;
        let mut state = State::Detected {
            document: prepared.document,
            missing: prepared.missing,
        };

        loop {
            state = match state {
                State::Detected { document, missing } => {
                    if missing.is_empty() {
                        State::Done(document)
                    } else {
                        self.check_structural(&missing)?;
                        State::Presenting {
                            document,
                            missing,
                            feedback: Feedback::None,
                        }
                    }
                }

                State::Presenting {
                    document,
                    missing,
                    feedback,
                } => {
                    if rounds >= self.config.max_retries {
                        tracing::warn!(registry = %label, rounds, "Elicitation attempts exhausted");
                        return Err(CompletionError::MaxRetries {
                            max_retries: self.config.max_retries,
                            label,
                            missing,
                        });
                    }
                    if !channel.supports_form() {
                        tracing::warn!(registry = %label, "Channel does not support forms");
                        return Err(CompletionError::Unsupported { missing });
                    }
                    rounds += 1;

                    let form = build_form_schema(&missing, DEFAULT_FORM_TITLE);
                    let message = self.message(&missing, &feedback);
                    tracing::info!(
                        registry = %label,
                        round = rounds,
                        fields = form.fields.len(),
                        "Presenting form"
                    );

                    let outcome = match channel.present(&message, &form).await {
                        Ok(outcome) => outcome,
                        Err(source) => {
                            tracing::warn!(registry = %label, error = %source, "Elicitation transport failed");
                            return Err(CompletionError::Transport { source, missing });
                        }
                    };

                    let answers = match outcome {
                        PresentOutcome::Accepted(answers) => normalize(&answers),
                        PresentOutcome::Declined => {
                            tracing::info!(registry = %label, "Elicitation declined");
                            return Err(CompletionError::Declined { label, missing });
                        }
                        PresentOutcome::Cancelled => {
                            tracing::info!(registry = %label, "Elicitation cancelled");
                            return Err(CompletionError::Cancelled { label, missing });
                        }
                    };

                    let errors = validate(&answers, &missing, &document);
                    if !errors.is_empty() {
                        tracing::info!(registry = %label, errors = errors.len(), "Answers failed validation");
                        State::Presenting {
                            document,
                            missing,
                            feedback: Feedback::Invalid(errors),
                        }
                    } else {
                        let document = match rehydrate(&document, &answers, &missing, &self.profile.registry) {
                            Ok(document) => document,
                            Err(source) => {
                                tracing::warn!(registry = %label, error = %source, "Answers conflict with request");
                                return Err(CompletionError::Rehydration { source, missing });
                            }
                        };
                        let missing = detect(&self.profile.registry, &document)?;
                        if missing.is_empty() {
                            State::Done(document)
                        } else {
                            self.check_structural(&missing)?;
                            State::Presenting {
                                document,
                                missing,
                                feedback: Feedback::StillMissing,
                            }
                        }
                    }
                }

                State::Done(document) => {
                    tracing::info!(registry = %label, rounds, "Completion finished");
                    return Ok(Completion {
                        document,
                        rounds,
                        completed_at: Utc::now(),
                    });
                }
            };
        }
    }

    fn check_structural(&self, missing: &[MissingField]) -> Result<(), CompletionError> {
        let structural: Vec<MissingField> = missing.iter().filter(|m| !m.elicitable).cloned().collect();
        if structural.is_empty() {
            return Ok(());
        }
        tracing::warn!(
            registry = %self.profile.label(),
            structural = structural.len(),
            "Structural fields missing"
        );
        Err(CompletionError::Structural { missing: structural })
    }

    fn message(&self, missing: &[MissingField], feedback: &Feedback) -> String {
        let base = format!(
            "Missing {} required field(s) for {}.",
            missing.len(),
            self.profile.label()
        );
        match feedback {
            Feedback::None => base,
            Feedback::Invalid(errors) => {
                let lines: Vec<String> = errors.iter().map(|e| format!("- {}", e.reason)).collect();
                format!("Please correct the following:\n{}\n\n{}", lines.join("\n"), base)
            }
            Feedback::StillMissing => {
                let lines: Vec<String> = missing.iter().map(|m| format!("- {}", m.label())).collect();
                format!("Still missing after elicitation:\n{}\n\n{}", lines.join("\n"), base)
            }
        }
    }
}

/// Builder for CompletionOrchestrator.
pub struct CompletionOrchestratorBuilder {
    profile: Option<RequestProfile>,
    config: RuntimeConfig,
}

impl CompletionOrchestratorBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            profile: None,
            config: RuntimeConfig::default(),
        }
    }

    /// Set the request family.
    pub fn profile(mut self, profile: RequestProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Set the configuration.
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the orchestrator.
    pub fn build(self) -> Result<CompletionOrchestrator, ConfigError> {
        let profile = self.profile.ok_or(ConfigError::MissingProfile)?;
        self.config.validate()?;
        Ok(CompletionOrchestrator::new(profile, self.config))
    }
}

impl Default for CompletionOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelError;
    use crate::error::{ErrorCode, FailureReason};
    use async_trait::async_trait;
    use proptest::prelude::*;
    use serde_json::json;
    use shipfill_core::{CollectedAnswers, FormSchema, ACCOUNT_NUMBER_ENV};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    enum Scripted {
        Answers(Vec<(&'static str, &'static str)>),
        Declined,
        Cancelled,
        Fail(&'static str),
    }

    // Mock channel that replays scripted outcomes and records what it was shown
    struct MockChannel {
        forms: bool,
        script: Mutex<VecDeque<Scripted>>,
        shown: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl MockChannel {
        fn new(script: Vec<Scripted>) -> Self {
            Self {
                forms: true,
                script: Mutex::new(script.into()),
                shown: Mutex::new(Vec::new()),
            }
        }

        fn without_forms() -> Self {
            Self {
                forms: false,
                ..Self::new(vec![])
            }
        }

        fn shown(&self) -> Vec<(String, Vec<String>)> {
            self.shown.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InteractionChannel for MockChannel {
        fn supports_form(&self) -> bool {
            self.forms
        }

        async fn present(&self, message: &str, form: &FormSchema) -> Result<PresentOutcome, ChannelError> {
            let names = form.fields.iter().map(|f| f.name.clone()).collect();
            self.shown.lock().unwrap().push((message.to_string(), names));
            match self.script.lock().unwrap().pop_front() {
                Some(Scripted::Answers(pairs)) => Ok(PresentOutcome::Accepted(
                    pairs
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect::<CollectedAnswers>(),
                )),
                Some(Scripted::Declined) => Ok(PresentOutcome::Declined),
                Some(Scripted::Cancelled) | None => Ok(PresentOutcome::Cancelled),
                Some(Scripted::Fail(reason)) => Err(anyhow::anyhow!(reason).into()),
            }
        }
    }

    fn orchestrator() -> CompletionOrchestrator {
        let config = RuntimeConfig::default().env_var(ACCOUNT_NUMBER_ENV, "A1B2C3");
        CompletionOrchestrator::builder()
            .profile(RequestProfile::shipment())
            .config(config)
            .build()
            .unwrap()
    }

    /// Domestic shipment lacking only the recipient's state and postal code.
    fn us_shipment() -> Value {
        json!({"ShipmentRequest": {"Shipment": {
            "Shipper": {
                "Name": "Acme",
                "Address": {
                    "AddressLine": ["1 Main St"],
                    "City": "Chicago",
                    "StateProvinceCode": "IL",
                    "PostalCode": "60601",
                    "CountryCode": "US"
                }
            },
            "ShipTo": {
                "Name": "Bob",
                "Address": {"AddressLine": ["2 Side St"], "City": "New York", "CountryCode": "us"}
            },
            "Service": {"Code": "03"},
            "Package": {
                "Packaging": {"Code": "02"},
                "PackageWeight": {"UnitOfMeasurement": {"Code": "LBS"}, "Weight": "5"}
            }
        }}})
    }

    #[tokio::test]
    async fn test_complete_document_needs_no_rounds() {
        init_tracing();
        let mut doc = us_shipment();
        doc["ShipmentRequest"]["Shipment"]["ShipTo"]["Address"]["StateProvinceCode"] = json!("NY");
        doc["ShipmentRequest"]["Shipment"]["ShipTo"]["Address"]["PostalCode"] = json!("10001");
        let channel = MockChannel::without_forms();
        let completion = orchestrator().complete(&doc, &channel).await.unwrap();
        assert_eq!(completion.rounds, 0);
        let request = &completion.document["ShipmentRequest"];
        assert_eq!(request["Request"]["RequestOption"], "nonvalidate");
        assert_eq!(request["Shipment"]["Shipper"]["ShipperNumber"], "A1B2C3");
        assert_eq!(
            request["Shipment"]["PaymentInformation"]["ShipmentCharge"][0]["BillShipper"]["AccountNumber"],
            "A1B2C3"
        );
    }

    #[tokio::test]
    async fn test_us_address_normalized_and_completed() {
        init_tracing();
        let channel = MockChannel::new(vec![Scripted::Answers(vec![
            ("ship_to_state", " ny "),
            ("ship_to_postal_code", "10001"),
        ])]);
        let doc = us_shipment();
        let completion = orchestrator().complete(&doc, &channel).await.unwrap();

        assert_eq!(completion.rounds, 1);
        let address = &completion.document["ShipmentRequest"]["Shipment"]["ShipTo"]["Address"];
        assert_eq!(address["StateProvinceCode"], "NY");
        assert_eq!(address["PostalCode"], "10001");
        assert_eq!(address["CountryCode"], "us");

        let shown = channel.shown();
        assert_eq!(shown[0].0, "Missing 2 required field(s) for shipment.");
        assert_eq!(shown[0].1, vec!["ship_to_state", "ship_to_postal_code"]);
        assert!(doc["ShipmentRequest"]["Shipment"]["ShipTo"]["Address"]
            .get("StateProvinceCode")
            .is_none());
    }

    #[tokio::test]
    async fn test_retry_with_feedback_then_success() {
        init_tracing();
        let channel = MockChannel::new(vec![
            Scripted::Answers(vec![("ship_to_state", "NY"), ("ship_to_postal_code", "1000")]),
            Scripted::Answers(vec![("ship_to_state", "NY"), ("ship_to_postal_code", "10001")]),
        ]);
        let completion = orchestrator().complete(&us_shipment(), &channel).await.unwrap();
        assert_eq!(completion.rounds, 2);

        let shown = channel.shown();
        assert!(shown[1].0.starts_with("Please correct the following:\n- Recipient postal code: must be a valid US postal code"));
        assert!(shown[1].0.ends_with("\n\nMissing 2 required field(s) for shipment."));
        assert_eq!(shown[1].1, shown[0].1);
    }

    #[tokio::test]
    async fn test_partial_answers_reduce_the_next_form() {
        init_tracing();
        let channel = MockChannel::new(vec![
            Scripted::Answers(vec![("ship_to_state", "NY")]),
            Scripted::Answers(vec![("ship_to_postal_code", "10001")]),
        ]);
        let completion = orchestrator().complete(&us_shipment(), &channel).await.unwrap();
        assert_eq!(completion.rounds, 2);

        let shown = channel.shown();
        assert_eq!(shown[1].1, vec!["ship_to_postal_code"]);
        assert_eq!(
            shown[1].0,
            "Still missing after elicitation:\n- Recipient postal code\n\nMissing 1 required field(s) for shipment."
        );
    }

    #[tokio::test]
    async fn test_max_retries_terminates() {
        init_tracing();
        let bad = || Scripted::Answers(vec![("ship_to_state", "New York")]);
        let channel = MockChannel::new(vec![bad(), bad(), bad(), bad()]);
        let err = orchestrator().complete(&us_shipment(), &channel).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::ElicitationMaxRetries);
        assert_eq!(err.to_string(), "Maximum elicitation retries (3) exceeded for shipment");
        assert_eq!(channel.shown().len(), 3);
        assert_eq!(err.missing().len(), 2);
    }

    #[tokio::test]
    async fn test_decline_and_cancel() {
        init_tracing();
        let channel = MockChannel::new(vec![Scripted::Declined]);
        let err = orchestrator().complete(&us_shipment(), &channel).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ElicitationDeclined);
        assert_eq!(err.to_string(), "User declined to provide missing shipment fields");

        let channel = MockChannel::new(vec![Scripted::Cancelled]);
        let err = orchestrator().complete(&us_shipment(), &channel).await.unwrap_err();
        let report = err.report();
        assert_eq!(report.code, ErrorCode::ElicitationCancelled);
        assert_eq!(report.message, "User cancelled shipment field elicitation");
        assert_eq!(report.missing.len(), 2);
    }

    #[tokio::test]
    async fn test_unsupported_channel() {
        init_tracing();
        let err = orchestrator()
            .complete(&us_shipment(), &MockChannel::without_forms())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ElicitationUnsupported);
        assert_eq!(
            err.to_string(),
            "Missing 2 required field(s) and client does not support form elicitation"
        );
    }

    #[tokio::test]
    async fn test_transport_failure() {
        init_tracing();
        let channel = MockChannel::new(vec![Scripted::Fail("broken pipe")]);
        let err = orchestrator().complete(&us_shipment(), &channel).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ElicitationFailed);
        assert_eq!(err.reason(), FailureReason::TransportError);
        assert_eq!(err.to_string(), "Elicitation request failed: broken pipe");
    }

    #[tokio::test]
    async fn test_structural_fields_block_before_presenting() {
        init_tracing();
        let mut doc = us_shipment();
        doc["ShipmentRequest"]["Shipment"]["ShipTo"]["Address"] = json!({
            "AddressLine": ["10 Downing St"], "City": "London", "CountryCode": "GB"
        });
        doc["ShipmentRequest"]["Shipment"]["Service"]["Code"] = json!("65");
        let channel = MockChannel::new(vec![]);
        let err = orchestrator().complete(&doc, &channel).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::StructuralFieldsRequired);
        assert!(channel.shown().is_empty());
        let keys: Vec<_> = err.missing().iter().map(|m| m.flat_key.as_str()).collect();
        assert_eq!(keys, vec!["intl_forms_required"]);
    }

    #[tokio::test]
    async fn test_ambiguous_payer_is_malformed_request() {
        init_tracing();
        let mut doc = us_shipment();
        doc["ShipmentRequest"]["Shipment"]["PaymentInformation"] = json!({"ShipmentCharge": [{
            "Type": "01",
            "BillShipper": {"AccountNumber": "A"},
            "BillReceiver": {"AccountNumber": "B"}
        }]});
        let channel = MockChannel::new(vec![]);
        let err = orchestrator().complete(&doc, &channel).await.unwrap_err();
        let report = err.report();
        assert_eq!(report.code, ErrorCode::MalformedRequest);
        assert_eq!(report.reason, FailureReason::AmbiguousPayer);
        assert!(channel.shown().is_empty());
    }

    #[tokio::test]
    async fn test_rehydration_conflict_is_invalid_response() {
        init_tracing();
        let channel = MockChannel::new(vec![Scripted::Answers(vec![("package_2_weight", "3")])]);
        let doc = json!({"ShipmentRequest": {"Shipment": {
            "Shipper": {"Name": "Acme", "Address": {"AddressLine": ["1"], "City": "Munich", "CountryCode": "DE"}},
            "ShipTo": {"Name": "Bob", "Address": {"AddressLine": ["2"], "City": "Berlin", "CountryCode": "DE"}},
            "Service": {"Code": "11"},
            "Package": [
                {"Packaging": {"Code": "02"}, "PackageWeight": {"UnitOfMeasurement": {"Code": "KGS"}, "Weight": "1"}},
                {"Packaging": {"Code": "02"}, "PackageWeight": "heavy"}
            ]
        }}});
        let err = orchestrator().complete(&doc, &channel).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ElicitationInvalidResponse);
        assert!(err
            .to_string()
            .starts_with("Elicited data conflicts with request structure: Cannot set 'package_2_weight'"));
        let asked = channel.shown()[0].1.clone();
        assert!(asked.contains(&"package_2_weight".to_string()));

        let report = err.report();
        assert_eq!(report.reason, FailureReason::RehydrationError);
        assert!(!report.missing.is_empty());
        let reported: Vec<String> = report.missing.iter().map(|m| m.flat_key.clone()).collect();
        assert_eq!(reported, asked);
    }

    #[tokio::test]
    async fn test_unknown_answers_are_ignored() {
        init_tracing();
        let channel = MockChannel::new(vec![Scripted::Answers(vec![
            ("ship_to_state", "NY"),
            ("ship_to_postal_code", "10001"),
            ("shipper_name", "Impostor"),
        ])]);
        let completion = orchestrator().complete(&us_shipment(), &channel).await.unwrap();
        assert_eq!(completion.document["ShipmentRequest"]["Shipment"]["Shipper"]["Name"], "Acme");
    }

    proptest! {
        #![proptest_config(ProptestConfig { failure_persistence: None, cases: 32, ..ProptestConfig::default() })]

        #[test]
        fn prop_invalid_answers_terminate_within_budget(max_retries in 1u32..6, extra in 0usize..4) {
            let script = (0..max_retries as usize + extra)
                .map(|_| Scripted::Answers(vec![("ship_to_postal_code", "nope")]))
                .collect();
            let channel = MockChannel::new(script);
            let orchestrator = CompletionOrchestrator::new(
                RequestProfile::shipment(),
                RuntimeConfig::default().max_retries(max_retries).env_var(ACCOUNT_NUMBER_ENV, "A1B2C3"),
            );
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let err = runtime.block_on(orchestrator.complete(&us_shipment(), &channel)).unwrap_err();
            prop_assert_eq!(err.code(), ErrorCode::ElicitationMaxRetries);
            prop_assert_eq!(channel.shown().len(), max_retries as usize);
        }
    }

    #[tokio::test]
    async fn test_builder_requires_profile() {
        assert!(matches!(
            CompletionOrchestrator::builder().build(),
            Err(ConfigError::MissingProfile)
        ));
        assert!(matches!(
            CompletionOrchestrator::builder()
                .profile(RequestProfile::rating("Shop"))
                .config(RuntimeConfig::default().max_retries(0))
                .build(),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
