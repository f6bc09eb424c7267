//! HTTP retrieval of signed exchanges

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use tracing::{debug, info};

use super::certs::{CertFetcher, HttpCertFetcher};
use super::envelope::Envelope;
use super::verify::verify;
use super::version::Version;
use super::{Exchange, ExchangeSource};
use crate::error::{Result, ServiceError};

pub struct HttpExchangeSource {
    client: Client,
    cert_fetcher: Arc<dyn CertFetcher>,
    version: Version,
}

impl HttpExchangeSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let cert_fetcher = Arc::new(HttpCertFetcher::new(client.clone()));
        Ok(Self::with_cert_fetcher(client, cert_fetcher))
    }

    pub fn with_cert_fetcher(client: Client, cert_fetcher: Arc<dyn CertFetcher>) -> Self {
        Self {
            client,
            cert_fetcher,
            version: Version::LATEST,
        }
    }
}

#[async_trait]
impl ExchangeSource for HttpExchangeSource {
    async fn fetch_and_verify(&self, source_url: &str) -> Result<Exchange> {
        let mime_type = self.version.mime_type();
        info!("Fetching signed exchange from {}", source_url);

        let response = self
            .client
            .get(source_url)
            .header(ACCEPT, mime_type)
            .send()
            .await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if content_type != mime_type {
            return Err(ServiceError::UnexpectedContentType {
                url: source_url.to_string(),
                content_type,
            });
        }

        if !response.status().is_success() {
            return Err(ServiceError::Fetch(format!(
                "GET {} returned {}",
                source_url,
                response.status()
            )));
        }

        let body = response.bytes().await?;
        debug!("Received {} byte exchange from {}", body.len(), source_url);

        let envelope = Envelope::parse(&body)?;
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        verify(&envelope, self.cert_fetcher.as_ref(), now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::sxg::testing::{encode_cert_chain, self_signed, ExchangeSpec};

    const SXG_MIME: &str = "application/signed-exchange;v=b3";

    fn source() -> HttpExchangeSource {
        HttpExchangeSource::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_rejects_unexpected_content_type() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/test")
            .match_header("accept", SXG_MIME)
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html>hello</html>")
            .create_async()
            .await;

        let url = format!("{}/test", server.url());
        let err = source().fetch_and_verify(&url).await.unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.category(), ErrorCategory::Fetch);
        assert!(err.to_string().contains("unexpected content type"));
    }

    #[tokio::test]
    async fn test_garbage_exchange_is_verification_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/test")
            .with_status(200)
            .with_header("content-type", SXG_MIME)
            .with_body("sxg1-b3\0garbage")
            .create_async()
            .await;

        let url = format!("{}/test", server.url());
        let err = source().fetch_and_verify(&url).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Verification);
    }

    #[tokio::test]
    async fn test_fetches_and_verifies_exchange() {
        let mut server = mockito::Server::new_async().await;
        let (cert_der, key) = self_signed();
        let cert_url = format!("{}/cert.cbor", server.url());

        let mut spec = ExchangeSpec::new("https://example/test", b"...hello...");
        spec.cert_der = &cert_der;
        spec.cert_url = &cert_url;
        let exchange_bytes = spec.build(&key);

        server
            .mock("GET", "/test")
            .match_header("accept", SXG_MIME)
            .with_status(200)
            .with_header("content-type", SXG_MIME)
            .with_body(exchange_bytes)
            .create_async()
            .await;
        let cert_mock = server
            .mock("GET", "/cert.cbor")
            .match_header("accept", "application/cert-chain+cbor")
            .with_status(200)
            .with_body(encode_cert_chain(&[cert_der.as_slice()]))
            .create_async()
            .await;

        let url = format!("{}/test", server.url());
        let exchange = source().fetch_and_verify(&url).await.unwrap();

        cert_mock.assert_async().await;
        assert_eq!(exchange.payload, b"...hello...");
        assert_eq!(exchange.request_url, "https://example/test");
    }

    #[tokio::test]
    async fn test_missing_certificate_is_verification_error() {
        let mut server = mockito::Server::new_async().await;
        let cert_url = format!("{}/cert.cbor", server.url());
        let mut spec = ExchangeSpec::new("https://example/test", b"hello");
        spec.cert_url = &cert_url;

        server
            .mock("GET", "/test")
            .with_status(200)
            .with_header("content-type", SXG_MIME)
            .with_body(spec.build(&crate::sxg::testing::signing_key()))
            .create_async()
            .await;
        server
            .mock("GET", "/cert.cbor")
            .with_status(404)
            .create_async()
            .await;

        let url = format!("{}/test", server.url());
        let err = source().fetch_and_verify(&url).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Verification);
    }
}
