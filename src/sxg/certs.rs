//! Certificate chain retrieval and leaf key extraction

use async_trait::async_trait;
use ciborium::value::Value;
use p256::PublicKey;
use reqwest::{header::ACCEPT, Client};
use tracing::debug;
use x509_cert::der::Decode;
use x509_cert::Certificate;

use crate::error::{Result, ServiceError};

const CERT_CHAIN_MIME_TYPE: &str = "application/cert-chain+cbor";
const CERT_CHAIN_MAGIC: &str = "\u{1F4DC}\u{26D3}";

/// Resolves a `cert-url` to the raw `application/cert-chain+cbor` bytes
#[async_trait]
pub trait CertFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

pub struct HttpCertFetcher {
    client: Client,
}

impl HttpCertFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CertFetcher for HttpCertFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Fetching certificate chain from {}", url);
        let response = self
            .client
            .get(url)
            .header(ACCEPT, CERT_CHAIN_MIME_TYPE)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ServiceError::Verification(format!(
                "certificate chain at {} returned {}",
                url,
                response.status()
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Return the DER bytes of the leaf certificate in a CBOR cert chain
pub fn leaf_certificate(chain: &[u8]) -> Result<Vec<u8>> {
    let value: Value = ciborium::de::from_reader(chain)
        .map_err(|e| invalid_chain(&format!("not valid CBOR: {}", e)))?;

    let mut items = match value {
        Value::Array(items) => items.into_iter(),
        _ => return Err(invalid_chain("not a CBOR array")),
    };

    match items.next() {
        Some(Value::Text(magic)) if magic == CERT_CHAIN_MAGIC => {}
        _ => return Err(invalid_chain("missing magic string")),
    }

    let leaf = match items.next() {
        Some(Value::Map(entries)) => entries,
        _ => return Err(invalid_chain("no certificates")),
    };

    leaf.into_iter()
        .find_map(|(key, value)| match (key, value) {
            (Value::Text(key), Value::Bytes(cert)) if key == "cert" => Some(cert),
            _ => None,
        })
        .ok_or_else(|| invalid_chain("leaf entry has no cert"))
}

/// Parse the leaf certificate and return its P-256 key if it is valid at `now`
pub fn leaf_public_key(der: &[u8], now: u64) -> Result<PublicKey> {
    let cert = Certificate::from_der(der)
        .map_err(|e| ServiceError::Verification(format!("invalid leaf certificate: {}", e)))?;

    let validity = &cert.tbs_certificate.validity;
    let not_before = validity.not_before.to_unix_duration().as_secs();
    let not_after = validity.not_after.to_unix_duration().as_secs();
    if now < not_before || now > not_after {
        return Err(ServiceError::Verification(format!(
            "leaf certificate not valid at {} (valid {}..{})",
            now, not_before, not_after
        )));
    }

    let key_bytes = cert
        .tbs_certificate
        .subject_public_key_info
        .subject_public_key
        .raw_bytes();

    PublicKey::from_sec1_bytes(key_bytes).map_err(|_| {
        ServiceError::Verification("leaf certificate key is not ECDSA P-256".to_string())
    })
}

fn invalid_chain(reason: &str) -> ServiceError {
    ServiceError::Verification(format!("invalid certificate chain: {}", reason))
}
