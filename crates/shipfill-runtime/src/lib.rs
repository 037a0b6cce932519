//! # shipfill-runtime
//!
//! Async completion loop for partial shipping requests.
//!
//! The deterministic work (defaults, detection, forms, validation,
//! rehydration) lives in `shipfill-core`. This crate adds the one thing that
//! waits: asking a person for what is missing through an
//! [`InteractionChannel`], and turning every way that can end into either a
//! [`Completion`] or a structured [`FailureReport`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use shipfill_runtime::{CompletionOrchestrator, RequestProfile, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_yaml_file("shipfill.yaml")?.with_process_env();
//! let orchestrator = CompletionOrchestrator::builder()
//!     .profile(RequestProfile::shipment())
//!     .config(config)
//!     .build()?;
//!
//! match orchestrator.complete(&request_body, &channel).await {
//!     Ok(done) => send(orchestrator.profile().dispatch_form(&done.document)),
//!     Err(err) => respond(err.report()),
//! }
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod orchestrator;

pub use channel::{answers_from_json, ChannelError, InteractionChannel, PresentOutcome};
pub use config::{ConfigError, RuntimeConfig};
pub use error::{CompletionError, ErrorCode, FailureReason, FailureReport};
pub use orchestrator::{Completion, CompletionOrchestrator, CompletionOrchestratorBuilder};

pub use shipfill_core::RequestProfile;
