//! Facade over the construct kernel.
//!
//! [`ConstructApi`] owns a session and layers the outer concerns on top of
//! it: sealed-input verification, record validation after every step, the
//! optional JSONL run log, and soft-bloom exporting.

use std::fmt;
use std::path::PathBuf;

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use contracts::{
    payload_from_value, validate_construct_state, ConstructState, StepPayload, ValidationError,
};
use kernel_core::{
    export_soft_bloom, extract_payload, ConstructSession, ExportError, SealedInputError,
    SoftBloomExport, StepError,
};

pub mod keys;
pub mod run_log;

pub use keys::{load_or_generate_signing_key, load_verify_key, KeyError};
pub use run_log::{RunLog, RunRecord};

#[derive(Debug)]
pub enum ApiError {
    Step(StepError),
    Validation(ValidationError),
    Sealed(SealedInputError),
    Export(ExportError),
    Key(KeyError),
    Payload(serde_json::Error),
    RunLog(std::io::Error),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step(err) => write!(f, "step failed: {err}"),
            Self::Validation(err) => write!(f, "step produced an invalid record: {err}"),
            Self::Sealed(err) => write!(f, "sealed input rejected: {err}"),
            Self::Export(err) => write!(f, "export failed: {err}"),
            Self::Key(err) => write!(f, "key handling failed: {err}"),
            Self::Payload(err) => write!(f, "payload rejected: {err}"),
            Self::RunLog(err) => write!(f, "run log write failed: {err}"),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Step(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Sealed(err) => Some(err),
            Self::Export(err) => Some(err),
            Self::Key(err) => Some(err),
            Self::Payload(err) => Some(err),
            Self::RunLog(err) => Some(err),
        }
    }
}

impl From<StepError> for ApiError {
    fn from(err: StepError) -> Self {
        Self::Step(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}

impl From<SealedInputError> for ApiError {
    fn from(err: SealedInputError) -> Self {
        Self::Sealed(err)
    }
}

impl From<ExportError> for ApiError {
    fn from(err: ExportError) -> Self {
        Self::Export(err)
    }
}

impl From<KeyError> for ApiError {
    fn from(err: KeyError) -> Self {
        Self::Key(err)
    }
}

/// What one validated step produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepOutcome {
    pub state: ConstructState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bloom_probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_pattern: Option<String>,
}

pub struct ConstructApi {
    session: ConstructSession,
    verify_key: Option<VerifyingKey>,
    require_signature: bool,
    run_log: Option<RunLog>,
}

impl ConstructApi {
    /// Bootstrap around the bundled demo fixtures.
    pub fn bootstrap() -> Result<Self, ApiError> {
        Ok(Self::new(ConstructSession::bootstrap()?))
    }

    pub fn new(session: ConstructSession) -> Self {
        Self {
            session,
            verify_key: None,
            require_signature: false,
            run_log: None,
        }
    }

    pub fn with_verify_key(mut self, verify_key: VerifyingKey) -> Self {
        self.verify_key = Some(verify_key);
        self
    }

    /// When set, plain payloads and unsigned envelopes are rejected.
    pub fn require_signature(mut self, required: bool) -> Self {
        self.require_signature = required;
        self
    }

    pub fn attach_run_log(mut self, path: PathBuf) -> Self {
        self.run_log = Some(RunLog::new(path));
        self
    }

    pub fn session(&self) -> &ConstructSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ConstructSession {
        &mut self.session
    }

    /// Step once and validate the resulting record.
    pub fn run_once(&mut self, payload: &StepPayload) -> Result<StepOutcome, ApiError> {
        let state = self.session.step(payload)?;
        validate_construct_state(&state)?;

        let outcome = StepOutcome {
            bloom_probability: self.session.bloom_probability(),
            selected_pattern: self
                .session
                .last_selection()
                .map(|selection| selection.pattern.id.clone()),
            state,
        };
        self.log_outcome(&outcome)?;
        info!(
            counter = outcome.state.counter,
            mode = %outcome.state.mode,
            "construct stepped"
        );
        Ok(outcome)
    }

    /// Step from a raw JSON value, unsealing an envelope first when the
    /// candidate carries one.
    pub fn run_once_value(&mut self, candidate: &Value) -> Result<StepOutcome, ApiError> {
        let raw = extract_payload(candidate, self.verify_key.as_ref(), self.require_signature)?;
        let payload = payload_from_value(&raw).map_err(ApiError::Payload)?;
        self.run_once(&payload)
    }

    /// Step once and build the soft-bloom export for the resulting state.
    pub fn export_once(
        &mut self,
        payload: &StepPayload,
        include_narrative_hint: bool,
    ) -> Result<(SoftBloomExport, StepOutcome), ApiError> {
        let (export, state) = export_soft_bloom(&mut self.session, payload, include_narrative_hint)?;
        validate_construct_state(&state)?;
        let outcome = StepOutcome {
            bloom_probability: self.session.bloom_probability(),
            selected_pattern: self
                .session
                .last_selection()
                .map(|selection| selection.pattern.id.clone()),
            state,
        };
        self.log_outcome(&outcome)?;
        Ok((export, outcome))
    }

    fn log_outcome(&self, outcome: &StepOutcome) -> Result<(), ApiError> {
        if let Some(log) = &self.run_log {
            log.append(&RunRecord {
                state: outcome.state.clone(),
                bloom_probability: outcome.bloom_probability,
                selected_pattern: outcome.selected_pattern.clone(),
            })
            .map_err(ApiError::RunLog)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use kernel_core::seal_payload;
    use serde_json::json;

    fn payload(value: Value) -> StepPayload {
        payload_from_value(&value).unwrap()
    }

    #[test]
    fn run_once_steps_and_reports_bloom() {
        let mut api = ConstructApi::bootstrap().unwrap();
        let outcome = api.run_once(&payload(json!({"input": "hello sin"}))).unwrap();
        assert_eq!(outcome.state.counter, 1);
        assert!(outcome.bloom_probability.is_some());
    }

    #[test]
    fn run_once_value_accepts_plain_and_sealed_payloads() {
        let signing_key = SigningKey::from_bytes(&[3u8; 32]);
        let mut api = ConstructApi::bootstrap()
            .unwrap()
            .with_verify_key(signing_key.verifying_key());

        let plain = api.run_once_value(&json!({"input": "one"})).unwrap();
        assert_eq!(plain.state.counter, 1);

        let envelope = seal_payload(json!({"input": "two"}), &signing_key, None, None);
        let sealed = api
            .run_once_value(&serde_json::to_value(&envelope).unwrap())
            .unwrap();
        assert_eq!(sealed.state.counter, 2);
    }

    #[test]
    fn required_signature_rejects_plain_payloads() {
        let mut api = ConstructApi::bootstrap().unwrap().require_signature(true);
        let result = api.run_once_value(&json!({"input": "plain"}));
        assert!(matches!(result, Err(ApiError::Sealed(_))));
        assert_eq!(api.session().state().counter, 0);
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let mut api = ConstructApi::bootstrap().unwrap();
        assert!(matches!(
            api.run_once_value(&json!([1, 2])),
            Err(ApiError::Payload(_))
        ));
    }

    #[test]
    fn run_log_collects_every_step() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("session.jsonl");
        let mut api = ConstructApi::bootstrap()
            .unwrap()
            .attach_run_log(log_path.clone());

        api.run_once(&payload(json!({"input": "a"}))).unwrap();
        api.run_once(&payload(json!({"input": "b"}))).unwrap();

        let records = RunLog::new(log_path).read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].state.counter, 2);
    }

    #[test]
    fn export_once_returns_export_and_outcome() {
        let mut api = ConstructApi::bootstrap().unwrap();
        let (export, outcome) = api
            .export_once(&payload(json!({"input": "hello"})), true)
            .unwrap();
        assert_eq!(export.glyph, outcome.state.glyph);
        assert_eq!(Some(export.p_bloom), outcome.bloom_probability);
    }
}
