//! Submission pipeline and status lookups

use std::sync::Arc;

use tracing::{info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::{Result, ServiceError};
use crate::request_id::{identify, RequestId};
use crate::status::StatusResolver;
use crate::store::JobStore;
use crate::sxg::ExchangeSource;
use crate::types::{JobStatus, ProofRequest};
use crate::witness;

pub struct ProofService {
    exchanges: Arc<dyn ExchangeSource>,
    store: JobStore,
    dispatcher: Dispatcher,
    resolver: StatusResolver,
}

impl ProofService {
    pub fn new(
        exchanges: Arc<dyn ExchangeSource>,
        store: JobStore,
        dispatcher: Dispatcher,
        resolver: StatusResolver,
    ) -> Self {
        Self {
            exchanges,
            store,
            dispatcher,
            resolver,
        }
    }

    /// Validate a claim, build its witness and start proving it
    pub async fn submit(&self, request: &ProofRequest) -> Result<RequestId> {
        let id = identify(request)?;

        if self.store.has_artifacts(&id).await {
            return Err(ServiceError::Duplicate { id: id.to_string() });
        }

        info!("Processing proof request {} for {}", id, request.source_url);

        let exchange = self.exchanges.fetch_and_verify(&request.source_url).await?;
        let witness = witness::extract(request, &exchange)?;

        // Authoritative duplicate check: only one writer wins the witness file
        self.store.put_witness(&id, &witness).await?;

        let handle = match self.dispatcher.dispatch(&id) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Failed to dispatch prover for {}: {}", id, e);
                // Nothing will ever complete this job; let the claim be resubmitted
                if let Err(cleanup) = self.store.remove_witness(&id).await {
                    warn!("Failed to remove witness for {}: {}", id, cleanup);
                }
                return Err(e);
            }
        };

        info!(
            "Proof request {} dispatched (data at {}, integrity at {}, pid {:?})",
            id, witness.data_to_verify_start_index, witness.integrity_start_index, handle.pid
        );

        Ok(id)
    }

    pub async fn status(&self, id: &RequestId) -> Result<JobStatus> {
        self.resolver.resolve(id).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dispatcher::ProverSettings;
    use crate::error::ErrorCategory;
    use crate::status::ExplorerLinkParser;
    use crate::sxg::{Envelope, Exchange, SignatureParams};
    use crate::sxg::testing::{signing_key, ExchangeSpec};
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Serves a synthetic exchange signed by the test key, verified in-process
    pub(crate) struct FixtureSource {
        pub body: Vec<u8>,
        pub calls: AtomicUsize,
    }

    impl FixtureSource {
        pub fn new(body: &[u8]) -> Self {
            Self {
                body: body.to_vec(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ExchangeSource for FixtureSource {
        async fn fetch_and_verify(&self, source_url: &str) -> Result<Exchange> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let key = signing_key();
            let bytes = ExchangeSpec::new(source_url, &self.body).build(&key);
            let envelope = Envelope::parse(&bytes)?;
            let signatures = SignatureParams::parse_all(&envelope.signature_header)?;
            crate::sxg::verify_with_key(&envelope, &signatures[0], &p256::PublicKey::from(key.verifying_key()))
        }
    }

    struct RejectingSource;

    #[async_trait]
    impl ExchangeSource for RejectingSource {
        async fn fetch_and_verify(&self, _source_url: &str) -> Result<Exchange> {
            Err(ServiceError::Verification("The exchange has an invalid signature.".to_string()))
        }
    }

    pub(crate) fn service_with(
        source: Arc<dyn ExchangeSource>,
        data_dir: &Path,
        prover: &str,
    ) -> ProofService {
        let store = JobStore::new(data_dir);
        let settings = ProverSettings {
            binary: PathBuf::from(prover),
            system: "groth16".to_string(),
            network: "mock".to_string(),
            private_key: "0xsecret".to_string(),
            log_level: "info".to_string(),
        };
        ProofService::new(
            source,
            store.clone(),
            Dispatcher::new(settings, store.clone()),
            StatusResolver::new(store, Arc::new(ExplorerLinkParser::new("https://explorer.succinct.xyz"))),
        )
    }

    fn claim(data: &str) -> ProofRequest {
        ProofRequest {
            data: data.to_string(),
            source_url: "https://example/test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_end_to_end_witness() {
        let dir = tempdir().unwrap();
        let service = service_with(Arc::new(FixtureSource::new(b"...hello...")), dir.path(), "true");

        let id = service.submit(&claim("hello")).await.unwrap();

        let store = JobStore::new(dir.path());
        let witness = store.read_witness(&id).await.unwrap();
        assert_eq!(witness.data_to_verify, b"hello");
        assert_eq!(witness.data_to_verify_start_index, 3);
        assert_eq!(&witness.payload[3..8], b"hello");
        assert_eq!(witness.r.len(), 32);
        assert_eq!(witness.s.len(), 32);
        assert_eq!(witness.px.len(), 32);
        assert_eq!(witness.py.len(), 32);

        let digest_at = witness.integrity_start_index;
        assert!(witness.final_payload[digest_at..].starts_with(b"mi-sha256-03="));

        assert!(matches!(
            service.status(&id).await.unwrap(),
            JobStatus::Processing { .. }
        ));
    }

    #[tokio::test]
    async fn test_duplicate_submission_rejected() {
        let dir = tempdir().unwrap();
        let source = Arc::new(FixtureSource::new(b"...hello..."));
        let service = service_with(source.clone(), dir.path(), "true");

        let first = service.submit(&claim("hello")).await.unwrap();
        let err = service.submit(&claim("hello")).await.unwrap_err();

        assert!(matches!(err, ServiceError::Duplicate { ref id } if *id == first.to_string()));
        // the pre-check stops the second request before fetching
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_validation_happens_before_fetch() {
        let dir = tempdir().unwrap();
        let source = Arc::new(FixtureSource::new(b"...hello..."));
        let service = service_with(source.clone(), dir.path(), "true");

        let err = service
            .submit(&ProofRequest {
                data: String::new(),
                source_url: "https://x".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_verification_failure_writes_nothing() {
        let dir = tempdir().unwrap();
        let service = service_with(Arc::new(RejectingSource), dir.path(), "true");

        let err = service.submit(&claim("hello")).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Verification);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_data_missing_from_payload() {
        let dir = tempdir().unwrap();
        let service = service_with(Arc::new(FixtureSource::new(b"...goodbye...")), dir.path(), "true");

        let err = service.submit(&claim("hello")).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Extraction);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_reported() {
        let dir = tempdir().unwrap();
        let service = service_with(
            Arc::new(FixtureSource::new(b"...hello...")),
            dir.path(),
            "/nonexistent/prover",
        );

        let err = service.submit(&claim("hello")).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Dispatch);

        // the claim can be retried once the prover is fixed
        let id = identify(&claim("hello")).unwrap();
        assert_eq!(service.status(&id).await.unwrap(), JobStatus::NotFound);
    }
}
