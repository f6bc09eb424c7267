//! Signed HTTP exchange retrieval and verification
//!
//! The rest of the service consumes this module through [`ExchangeSource`]:
//! give it a URL, get back an authenticated [`Exchange`] or an error.

mod certs;
mod envelope;
mod fetcher;
mod mice;
mod verify;
mod version;

use async_trait::async_trait;

use crate::error::Result;

pub use fetcher::HttpExchangeSource;
pub use mice::DEFAULT_RECORD_SIZE;
pub use version::Version;

#[cfg(test)]
pub(crate) use envelope::{Envelope, SignatureParams};
#[cfg(test)]
pub(crate) use verify::verify_with_key;

/// A verified signed exchange
#[derive(Debug, Clone)]
pub struct Exchange {
    pub version: Version,
    pub request_url: String,
    pub response_headers: Vec<(String, String)>,
    /// Decoded response body
    pub payload: Vec<u8>,
    /// Exact bytes the signature covers
    pub signed_message: Vec<u8>,
    /// Big-endian scalars in minimal form; may be shorter than 32 bytes
    pub signature_r: Vec<u8>,
    pub signature_s: Vec<u8>,
    pub public_key_x: Vec<u8>,
    pub public_key_y: Vec<u8>,
}

impl Exchange {
    /// Case-insensitive response header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        envelope::find_header(&self.response_headers, name)
    }
}

/// Retrieves the exchange published at a URL and authenticates it
#[async_trait]
pub trait ExchangeSource: Send + Sync {
    async fn fetch_and_verify(&self, source_url: &str) -> Result<Exchange>;
}
