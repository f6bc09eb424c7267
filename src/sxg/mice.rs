//! Merkle Integrity Content Encoding (mi-sha256-03)

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};

use crate::error::{Result, ServiceError};

/// Record size used when the service re-encodes a payload itself
pub const DEFAULT_RECORD_SIZE: usize = 16384;

const DIGEST_PREFIX: &str = "mi-sha256-03=";

/// An integrity content encoding selected by the exchange version
pub trait IntegrityEncoder: Send + Sync {
    /// Encode `payload` and return it with the matching `Digest` header value
    fn encode(&self, payload: &[u8], record_size: usize) -> (Vec<u8>, String);

    /// Decode an encoded body, checking every record against `digest_value`
    /// (a `Digest` header value that may list several algorithms).
    fn decode(&self, encoded: &[u8], digest_value: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MiSha256;

impl IntegrityEncoder for MiSha256 {
    fn encode(&self, payload: &[u8], record_size: usize) -> (Vec<u8>, String) {
        let record_size = record_size.max(1);
        let records: Vec<&[u8]> = payload.chunks(record_size).collect();

        // proofs[i] covers records[i..]
        let mut proofs = vec![[0u8; 32]; records.len()];
        let mut next: Option<[u8; 32]> = None;
        for (i, record) in records.iter().enumerate().rev() {
            let proof = record_proof(record, next.as_ref());
            proofs[i] = proof;
            next = Some(proof);
        }

        let top = next.unwrap_or_else(|| record_proof(&[], None));

        let mut encoded = Vec::with_capacity(8 + payload.len() + 32 * records.len());
        encoded.extend_from_slice(&(record_size as u64).to_be_bytes());
        for (i, record) in records.iter().enumerate() {
            encoded.extend_from_slice(record);
            if let Some(proof) = proofs.get(i + 1) {
                encoded.extend_from_slice(proof);
            }
        }

        (encoded, format!("{}{}", DIGEST_PREFIX, STANDARD.encode(top)))
    }

    fn decode(&self, encoded: &[u8], digest_value: &str) -> Result<Vec<u8>> {
        let expected = parse_digest(digest_value)?;

        if encoded.len() < 8 {
            return Err(ServiceError::Verification(
                "mi-sha256 body shorter than record size header".to_string(),
            ));
        }
        let (header, body) = encoded.split_at(8);
        let mut size_bytes = [0u8; 8];
        size_bytes.copy_from_slice(header);
        let record_size = u64::from_be_bytes(size_bytes);
        if record_size == 0 {
            return Err(ServiceError::Verification("mi-sha256 record size is zero".to_string()));
        }
        let record_size = usize::try_from(record_size).map_err(|_| {
            ServiceError::Verification("mi-sha256 record size too large".to_string())
        })?;

        if body.is_empty() {
            return if record_proof(&[], None) == expected {
                Ok(Vec::new())
            } else {
                Err(ServiceError::Verification("mi-sha256 digest mismatch".to_string()))
            };
        }

        let mut decoded = Vec::with_capacity(body.len());
        let mut pending = expected;
        let mut rest = body;
        loop {
            if rest.len() <= record_size {
                if record_proof(rest, None) != pending {
                    return Err(ServiceError::Verification(
                        "mi-sha256 final record does not match proof".to_string(),
                    ));
                }
                decoded.extend_from_slice(rest);
                return Ok(decoded);
            }

            if rest.len() < record_size + 32 {
                return Err(ServiceError::Verification(
                    "mi-sha256 body truncated inside a proof".to_string(),
                ));
            }
            let (record, tail) = rest.split_at(record_size);
            let (proof_bytes, tail) = tail.split_at(32);
            let mut proof = [0u8; 32];
            proof.copy_from_slice(proof_bytes);

            if tail.is_empty() {
                return Err(ServiceError::Verification(
                    "mi-sha256 body ends with a proof".to_string(),
                ));
            }
            if record_proof(record, Some(&proof)) != pending {
                return Err(ServiceError::Verification(format!(
                    "mi-sha256 record at offset {} does not match proof",
                    decoded.len()
                )));
            }

            decoded.extend_from_slice(record);
            pending = proof;
            rest = tail;
        }
    }
}

fn record_proof(record: &[u8], next: Option<&[u8; 32]>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(record);
    match next {
        Some(proof) => {
            hasher.update(proof);
            hasher.update([0x01]);
        }
        None => hasher.update([0x00]),
    }
    hasher.finalize().into()
}

fn parse_digest(value: &str) -> Result<[u8; 32]> {
    let encoded = value
        .split(',')
        .map(str::trim)
        .find_map(|entry| entry.strip_prefix(DIGEST_PREFIX))
        .ok_or_else(|| {
            ServiceError::Verification(format!("no mi-sha256-03 digest in {:?}", value))
        })?;

    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| ServiceError::Verification(format!("invalid digest encoding: {}", e)))?;

    bytes
        .try_into()
        .map_err(|_| ServiceError::Verification("digest is not 32 bytes".to_string()))
}
