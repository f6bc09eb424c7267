//! Signed exchange verification

use p256::ecdsa::{signature::Verifier, Signature, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::PublicKey;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::certs::{leaf_certificate, leaf_public_key, CertFetcher};
use super::envelope::{signed_message, Envelope, SignatureParams};
use super::Exchange;
use crate::error::{Result, ServiceError};

/// Longest signature validity window a publisher may claim
const MAX_SIGNATURE_VALIDITY_SECS: u64 = 7 * 24 * 60 * 60;

/// Verify an exchange at unix time `now` and return its decoded contents.
///
/// The exchange is accepted if any of its signatures verifies.
pub async fn verify(envelope: &Envelope, cert_fetcher: &dyn CertFetcher, now: u64) -> Result<Exchange> {
    let mut last_error = None;
    for params in SignatureParams::parse_all(&envelope.signature_header)? {
        match verify_signature(envelope, &params, cert_fetcher, now).await {
            Ok(exchange) => return Ok(exchange),
            Err(e) => {
                debug!("Signature {:?} rejected: {}", params.label, e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| ServiceError::Verification("exchange carries no signature".to_string())))
}

async fn verify_signature(
    envelope: &Envelope,
    params: &SignatureParams,
    cert_fetcher: &dyn CertFetcher,
    now: u64,
) -> Result<Exchange> {
    check_validity_window(params, now)?;

    let chain = cert_fetcher.fetch(&params.cert_url).await?;
    let leaf = leaf_certificate(&chain)?;

    let cert_sha256 = params
        .cert_sha256
        .as_deref()
        .ok_or_else(|| ServiceError::Verification("signature lacks cert-sha256".to_string()))?;
    if Sha256::digest(&leaf)[..] != cert_sha256[..] {
        return Err(ServiceError::Verification(
            "cert-sha256 does not match the leaf certificate".to_string(),
        ));
    }

    let public_key = leaf_public_key(&leaf, now)?;
    verify_with_key(envelope, params, &public_key)
}

fn check_validity_window(params: &SignatureParams, now: u64) -> Result<()> {
    if params.expires <= params.date {
        return Err(ServiceError::Verification(format!(
            "signature expires ({}) before its date ({})",
            params.expires, params.date
        )));
    }
    if params.expires - params.date > MAX_SIGNATURE_VALIDITY_SECS {
        return Err(ServiceError::Verification(
            "signature validity exceeds 7 days".to_string(),
        ));
    }
    if now < params.date || now > params.expires {
        return Err(ServiceError::Verification(format!(
            "signature not valid at {} (valid {}..{})",
            now, params.date, params.expires
        )));
    }
    Ok(())
}

/// Check the signature and payload integrity against a known signer key
pub(crate) fn verify_with_key(
    envelope: &Envelope,
    params: &SignatureParams,
    public_key: &PublicKey,
) -> Result<Exchange> {
    let msg = signed_message(envelope.version, params, &envelope.request_url, &envelope.raw_headers);

    let signature = Signature::from_der(&params.sig)
        .map_err(|e| ServiceError::Verification(format!("malformed ECDSA signature: {}", e)))?;
    VerifyingKey::from(public_key)
        .verify(&msg, &signature)
        .map_err(|_| ServiceError::Verification("The exchange has an invalid signature.".to_string()))?;

    if params.integrity != envelope.version.integrity_label() {
        return Err(ServiceError::Verification(format!(
            "unsupported integrity scheme {:?}",
            params.integrity
        )));
    }
    let digest = envelope
        .header("digest")
        .ok_or_else(|| ServiceError::Verification("response lacks a Digest header".to_string()))?;
    let payload = envelope
        .version
        .mice_encoding()
        .decode(&envelope.payload, digest)?;

    debug!(
        "Verified exchange for {} ({} payload bytes)",
        envelope.request_url,
        payload.len()
    );

    let (r, s) = signature.split_bytes();
    let point = public_key.to_encoded_point(false);
    let (x, y) = match (point.x(), point.y()) {
        (Some(x), Some(y)) => (x, y),
        _ => {
            return Err(ServiceError::Verification(
                "public key is the identity point".to_string(),
            ))
        }
    };

    Ok(Exchange {
        version: envelope.version,
        request_url: envelope.request_url.clone(),
        response_headers: envelope.response_headers.clone(),
        payload,
        signed_message: msg,
        signature_r: minimal_be(&r),
        signature_s: minimal_be(&s),
        public_key_x: minimal_be(x),
        public_key_y: minimal_be(y),
    })
}

/// Strip leading zero bytes from a big-endian integer
fn minimal_be(bytes: &[u8]) -> Vec<u8> {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}
