//! Signed input envelopes.
//!
//! The signature covers a canonical JSON rendering of the envelope body:
//! object keys sorted, no whitespace, with the `sig` field excluded. A nonce
//! is part of the signed body whenever present.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug)]
pub enum SealedInputError {
    /// A signature was required but the candidate carries none, or no
    /// verification key was supplied for a sealed envelope.
    SignatureMissing(&'static str),
    SignatureInvalid,
    Malformed(String),
}

impl fmt::Display for SealedInputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SignatureMissing(reason) => write!(f, "signature missing: {reason}"),
            Self::SignatureInvalid => write!(f, "envelope signature is invalid"),
            Self::Malformed(reason) => write!(f, "malformed envelope: {reason}"),
        }
    }
}

impl std::error::Error for SealedInputError {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SealedEnvelope {
    pub payload: Value,
    pub monotonic: u64,
    pub sig: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// serde_json maps are key-sorted, so a compact rendering of this body is
/// already canonical.
fn canonical_message(payload: &Value, monotonic: u64, nonce: Option<&str>) -> Vec<u8> {
    let mut body = Map::new();
    body.insert("monotonic".to_string(), Value::from(monotonic));
    if let Some(nonce) = nonce {
        body.insert("nonce".to_string(), Value::from(nonce));
    }
    body.insert("payload".to_string(), payload.clone());
    serde_json::to_vec(&Value::Object(body)).unwrap_or_default()
}

fn default_monotonic() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or(0)
}

fn fresh_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Wrap `payload` in a signed envelope. Monotonic and nonce default to the
/// current epoch nanos and a random 16-byte hex token.
pub fn seal_payload(
    payload: Value,
    signing_key: &SigningKey,
    monotonic: Option<u64>,
    nonce: Option<String>,
) -> SealedEnvelope {
    let monotonic = monotonic.unwrap_or_else(default_monotonic);
    let nonce = nonce.or_else(|| Some(fresh_nonce()));
    let message = canonical_message(&payload, monotonic, nonce.as_deref());
    let signature = signing_key.sign(&message);
    SealedEnvelope {
        payload,
        monotonic,
        sig: BASE64.encode(signature.to_bytes()),
        nonce,
    }
}

/// Check the envelope signature and return its payload.
pub fn verify_envelope(
    envelope: &SealedEnvelope,
    verify_key: &VerifyingKey,
) -> Result<Value, SealedInputError> {
    let raw_signature = BASE64
        .decode(envelope.sig.as_bytes())
        .map_err(|_| SealedInputError::SignatureInvalid)?;
    let signature =
        Signature::from_slice(&raw_signature).map_err(|_| SealedInputError::SignatureInvalid)?;
    let message = canonical_message(&envelope.payload, envelope.monotonic, envelope.nonce.as_deref());
    verify_key
        .verify(&message, &signature)
        .map_err(|_| SealedInputError::SignatureInvalid)?;
    Ok(envelope.payload.clone())
}

fn looks_like_envelope(candidate: &Value) -> bool {
    candidate
        .as_object()
        .is_some_and(|object| object.contains_key("payload") && object.contains_key("monotonic"))
}

/// Return the step payload inside `candidate`.
///
/// Plain values pass through unless a signature is required. Envelope-shaped
/// values are verified when a key is available; without a key the payload is
/// passed through only if signatures are optional.
pub fn extract_payload(
    candidate: &Value,
    verify_key: Option<&VerifyingKey>,
    require_signature: bool,
) -> Result<Value, SealedInputError> {
    if !looks_like_envelope(candidate) {
        if require_signature {
            return Err(SealedInputError::SignatureMissing("signed envelope expected"));
        }
        return Ok(candidate.clone());
    }

    let Some(object) = candidate.as_object() else {
        return Ok(candidate.clone());
    };
    if !object.contains_key("sig") {
        if require_signature {
            return Err(SealedInputError::SignatureMissing(
                "envelope carries no signature",
            ));
        }
        return Ok(object["payload"].clone());
    }

    let Some(verify_key) = verify_key else {
        if require_signature {
            return Err(SealedInputError::SignatureMissing(
                "verification key required for sealed envelope",
            ));
        }
        return Ok(object["payload"].clone());
    };

    let envelope: SealedEnvelope = serde_json::from_value(candidate.clone())
        .map_err(|err| SealedInputError::Malformed(err.to_string()))?;
    verify_envelope(&envelope, verify_key)
}
