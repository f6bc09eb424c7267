//! Job status inference

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::request_id::RequestId;
use crate::store::{ArtifactState, JobStore};
use crate::types::JobStatus;

/// Extracts a tracking reference from the prover's log output
pub trait TrackingRefParser: Send + Sync {
    fn parse(&self, log: &str) -> Option<String>;
}

/// Finds the prover network's "View in explorer" line
#[derive(Debug, Clone)]
pub struct ExplorerLinkParser {
    marker: String,
    base_url: String,
}

impl ExplorerLinkParser {
    pub const DEFAULT_MARKER: &'static str = "View in explorer: https://explorer.succinct.xyz/";

    pub fn new(base_url: &str) -> Self {
        Self {
            marker: Self::DEFAULT_MARKER.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl TrackingRefParser for ExplorerLinkParser {
    fn parse(&self, log: &str) -> Option<String> {
        let line = log.lines().find(|line| line.contains(&self.marker))?;
        let segment = line.rsplit('/').next()?.trim();
        if segment.is_empty() {
            return None;
        }
        Some(format!("{}/{}", self.base_url, segment))
    }
}

pub struct StatusResolver {
    store: JobStore,
    parser: Arc<dyn TrackingRefParser>,
}

impl StatusResolver {
    pub fn new(store: JobStore, parser: Arc<dyn TrackingRefParser>) -> Self {
        Self { store, parser }
    }

    pub async fn resolve(&self, id: &RequestId) -> Result<JobStatus> {
        match self.store.artifact_state(id).await {
            ArtifactState::Unknown => Ok(JobStatus::NotFound),
            ArtifactState::Processing => Ok(JobStatus::Processing {
                tracking_ref: self.tracking_ref(id).await,
            }),
            ArtifactState::Completed => Ok(JobStatus::Completed {
                result: self.store.read_result(id).await?,
            }),
        }
    }

    async fn tracking_ref(&self, id: &RequestId) -> Option<String> {
        match self.store.read_log(id).await {
            Ok(bytes) => self.parser.parse(&String::from_utf8_lossy(&bytes)),
            Err(e) => {
                debug!("No log for {}: {}", id, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request_id::identify;
    use crate::types::{ProofRequest, ProofResult, Witness};
    use std::io::Write;
    use tempfile::tempdir;

    const EXPLORER: &str = "https://explorer.succinct.xyz";

    fn resolver(store: &JobStore) -> StatusResolver {
        StatusResolver::new(store.clone(), Arc::new(ExplorerLinkParser::new(EXPLORER)))
    }

    fn request_id() -> RequestId {
        identify(&ProofRequest {
            data: "hello".to_string(),
            source_url: "https://example/test".to_string(),
        })
        .unwrap()
    }

    fn witness() -> Witness {
        Witness {
            final_payload: vec![0; 4],
            data_to_verify: b"hello".to_vec(),
            data_to_verify_start_index: 3,
            integrity_start_index: 1,
            payload: b"...hello...".to_vec(),
            r: [0; 32],
            s: [0; 32],
            px: [0; 32],
            py: [0; 32],
        }
    }

    #[test]
    fn test_parser_extracts_last_segment() {
        let parser = ExplorerLinkParser::new(EXPLORER);
        let log = "starting\n\
                   2024-01-01 INFO View in explorer: https://explorer.succinct.xyz/abcd1234  \n\
                   waiting";
        assert_eq!(
            parser.parse(log),
            Some("https://explorer.succinct.xyz/abcd1234".to_string())
        );
    }

    #[test]
    fn test_parser_without_marker() {
        let parser = ExplorerLinkParser::new(EXPLORER);
        assert_eq!(parser.parse("compiling...\nproving...\n"), None);
        assert_eq!(parser.parse(""), None);
        assert_eq!(
            parser.parse("View in explorer: https://explorer.succinct.xyz/"),
            None
        );
    }

    #[tokio::test]
    async fn test_status_lifecycle() {
        let dir = tempdir().unwrap();
        let store = JobStore::new(dir.path());
        let resolver = resolver(&store);
        let id = request_id();

        assert_eq!(resolver.resolve(&id).await.unwrap(), JobStatus::NotFound);

        store.put_witness(&id, &witness()).await.unwrap();
        assert_eq!(
            resolver.resolve(&id).await.unwrap(),
            JobStatus::Processing { tracking_ref: None }
        );

        let result = ProofResult {
            result: 1,
            verification_key: "0x01".to_string(),
            public_values: "0x02".to_string(),
            proof_bytes: "0x03".to_string(),
        };
        store.put_result(&id, &result).await.unwrap();
        assert_eq!(
            resolver.resolve(&id).await.unwrap(),
            JobStatus::Completed { result }
        );
    }

    #[tokio::test]
    async fn test_processing_reports_tracking_ref() {
        let dir = tempdir().unwrap();
        let store = JobStore::new(dir.path());
        let id = request_id();
        store.put_witness(&id, &witness()).await.unwrap();

        let mut log = store.create_log(&id).unwrap();
        writeln!(log, "Requesting proof").unwrap();
        writeln!(log, "View in explorer: https://explorer.succinct.xyz/abcd1234").unwrap();
        drop(log);

        match resolver(&store).resolve(&id).await.unwrap() {
            JobStatus::Processing { tracking_ref: Some(url) } => assert!(url.ends_with("abcd1234")),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_log_without_marker_omits_tracking_ref() {
        let dir = tempdir().unwrap();
        let store = JobStore::new(dir.path());
        let id = request_id();
        store.put_witness(&id, &witness()).await.unwrap();

        let mut log = store.create_log(&id).unwrap();
        log.write_all(b"\xff\xfe not utf8 and no marker").unwrap();
        drop(log);

        assert_eq!(
            resolver(&store).resolve(&id).await.unwrap(),
            JobStatus::Processing { tracking_ref: None }
        );
    }
}
