//! Witness extraction from a verified exchange

use tracing::debug;

use crate::error::{Result, ServiceError};
use crate::sxg::{Exchange, DEFAULT_RECORD_SIZE};
use crate::types::{ProofRequest, Witness};

/// Build the prover witness for `request` out of a verified exchange.
///
/// When the exchange carries no `Digest` header the payload is re-encoded with
/// the integrity encoding of the exchange's version, and the data offset is
/// then taken in the re-encoded bytes, since those are the bytes the witness
/// carries.
pub fn extract(request: &ProofRequest, exchange: &Exchange) -> Result<Witness> {
    let (payload, integrity) = match exchange.header("Digest") {
        Some(digest) => (exchange.payload.clone(), digest.to_string()),
        None => {
            debug!(
                "Exchange for {} has no Digest header, re-encoding payload",
                exchange.request_url
            );
            exchange
                .version
                .mice_encoding()
                .encode(&exchange.payload, DEFAULT_RECORD_SIZE)
        }
    };

    let data = request.data.as_bytes();
    let data_start = find_offset(data, &payload)
        .ok_or_else(|| ServiceError::Extraction("data not found in payload".to_string()))?;

    let integrity_start = find_offset(integrity.as_bytes(), &exchange.signed_message).ok_or_else(|| {
        ServiceError::Extraction("integrity digest not found in signed message".to_string())
    })?;

    Ok(Witness {
        final_payload: exchange.signed_message.clone(),
        data_to_verify: data.to_vec(),
        data_to_verify_start_index: data_start,
        integrity_start_index: integrity_start,
        payload,
        r: left_pad_32(&exchange.signature_r, "signature r")?,
        s: left_pad_32(&exchange.signature_s, "signature s")?,
        px: left_pad_32(&exchange.public_key_x, "public key x")?,
        py: left_pad_32(&exchange.public_key_y, "public key y")?,
    })
}

/// Offset of the first occurrence of `needle` in `haystack`.
///
/// A match at offset 0 is treated as absent: the prover reads 0 as "not found".
fn find_offset(needle: &[u8], haystack: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
        .filter(|offset| *offset > 0)
}

fn left_pad_32(scalar: &[u8], name: &str) -> Result<[u8; 32]> {
    if scalar.len() > 32 {
        return Err(ServiceError::Extraction(format!(
            "{} is {} bytes, expected at most 32",
            name,
            scalar.len()
        )));
    }
    let mut out = [0u8; 32];
    out[32 - scalar.len()..].copy_from_slice(scalar);
    Ok(out)
}
