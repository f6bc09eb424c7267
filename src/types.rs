//! Type definitions for the witness service

use serde::{Deserialize, Serialize};

/// Claim submitted by a client: `data` appears in the content at `source_url`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRequest {
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub source_url: String,
}

/// Witness handed to the external prover.
///
/// Byte buffers serialize as JSON arrays of integers in `0..=255`, which is
/// the format the prover reads back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    /// Exact bytes covered by the exchange signature
    pub final_payload: Vec<u8>,

    /// Claimed data, verbatim
    pub data_to_verify: Vec<u8>,

    /// Offset of `data_to_verify` inside `payload`
    pub data_to_verify_start_index: usize,

    /// Offset of the integrity digest string inside `final_payload`
    pub integrity_start_index: usize,

    /// Payload bytes the digest was computed over
    pub payload: Vec<u8>,

    /// ECDSA signature scalars, big-endian
    pub r: [u8; 32],
    pub s: [u8; 32],

    /// Signer public key coordinates, big-endian
    pub px: [u8; 32],
    pub py: [u8; 32],
}

/// Result record written by the prover once a proof is done
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofResult {
    pub result: i64,
    #[serde(rename = "vkey")]
    pub verification_key: String,
    #[serde(rename = "publicValues")]
    pub public_values: String,
    #[serde(rename = "proof")]
    pub proof_bytes: String,
}

/// Inferred lifecycle of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    NotFound,
    Processing { tracking_ref: Option<String> },
    Completed { result: ProofResult },
}

/// Body of a successful submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    #[serde(rename = "reqId")]
    pub req_id: String,
}

/// Body of a status poll
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ProofResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
