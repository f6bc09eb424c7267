//! Deterministic request identifiers derived from claims

use sha3::{Digest, Keccak256};
use std::fmt;

use crate::error::{Result, ServiceError};
use crate::types::ProofRequest;

/// Domain tag that versions the canonical claim encoding
const REQUEST_ID_DOMAIN: &[u8] = b"sxg-witness/request-id/v1";

/// Content address of a claim, rendered as lowercase hex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId([u8; 32]);

impl RequestId {
    /// Parse a client-supplied id. Case-insensitive, exactly 64 hex digits.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.len() != 64 {
            return Err(ServiceError::Validation(format!(
                "invalid reqId: expected 64 hex characters, got {}",
                raw.len()
            )));
        }

        let bytes = hex::decode(raw.to_ascii_lowercase())
            .map_err(|e| ServiceError::Validation(format!("invalid reqId: {}", e)))?;

        let mut id = [0u8; 32];
        id.copy_from_slice(&bytes);
        Ok(Self(id))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Validate a claim and compute its request id
pub fn identify(request: &ProofRequest) -> Result<RequestId> {
    if request.data.is_empty() {
        return Err(ServiceError::Validation("data required".to_string()));
    }
    if request.source_url.is_empty() {
        return Err(ServiceError::Validation("source_url required".to_string()));
    }

    let mut hasher = Keccak256::new();
    hasher.update(REQUEST_ID_DOMAIN);
    for field in [request.data.as_bytes(), request.source_url.as_bytes()] {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field);
    }

    Ok(RequestId(hasher.finalize().into()))
}
