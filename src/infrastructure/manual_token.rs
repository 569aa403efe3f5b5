use crate::domain::models::Provider;
use crate::infrastructure::error::InfraError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Payload produced by the external authentication page when the app runs
/// inside a shell that cannot host the sign-in popup. The only wire format
/// this subsystem owns: base64 over JSON, camelCase field names fixed by
/// the issuing page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ManualTokenPayload {
    pub provider: Provider,
    pub email: String,
    pub uid: String,
    pub access_token: Option<String>,
    pub id_token: Option<String>,
}

pub fn encode_manual_token(payload: &ManualTokenPayload) -> Result<String, InfraError> {
    let raw = serde_json::to_vec(payload)?;
    Ok(STANDARD.encode(raw))
}

pub fn decode_manual_token(encoded: &str) -> Result<ManualTokenPayload, InfraError> {
    let raw = STANDARD
        .decode(encoded.trim())
        .map_err(|error| InfraError::InvalidManualToken(format!("bad base64: {error}")))?;
    serde_json::from_slice(&raw)
        .map_err(|error| InfraError::InvalidManualToken(format!("bad payload: {error}")))
}
