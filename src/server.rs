//! HTTP routes for submitting claims and polling job status

use std::convert::Infallible;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::error::{ErrorCategory, ServiceError};
use crate::request_id::RequestId;
use crate::service::ProofService;
use crate::types::{ErrorResponse, JobStatus, ProofRequest, StatusResponse, SubmitResponse};

/// Largest accepted submission body
const MAX_BODY_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Deserialize)]
struct StatusQuery {
    #[serde(rename = "reqId")]
    req_id: String,
}

pub fn routes(
    service: Arc<ProofService>,
) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let health = warp::get()
        .and(warp::path("health"))
        .and(warp::path::end())
        .map(|| warp::reply::with_status("OK", StatusCode::OK));

    let submit = warp::post()
        .and(
            warp::path::end()
                .or(warp::path("proof").and(warp::path::end()))
                .unify(),
        )
        .and(warp::body::bytes())
        .and(with_service(service.clone()))
        .and_then(handle_submit);

    let status = warp::get()
        .and(warp::path("status"))
        .and(warp::path::end())
        .and(warp::query::<StatusQuery>())
        .and(with_service(service))
        .and_then(handle_status);

    health.or(submit).or(status).recover(handle_rejection)
}

fn with_service(
    service: Arc<ProofService>,
) -> impl Filter<Extract = (Arc<ProofService>,), Error = Infallible> + Clone {
    warp::any().map(move || service.clone())
}

async fn handle_submit(body: Bytes, service: Arc<ProofService>) -> Result<Response, Infallible> {
    let request = match decode_request(&body) {
        Ok(request) => request,
        Err(reply) => return Ok(reply),
    };

    match service.submit(&request).await {
        Ok(id) => Ok(json_reply(&SubmitResponse { req_id: id.to_hex() }, StatusCode::OK)),
        Err(e) => {
            warn!("Rejected proof request for {}: {}", request.source_url, e);
            Ok(error_reply(&e))
        }
    }
}

/// Size-check and parse a submission body. Chunked bodies carry no
/// `Content-Length`, so the limit applies to the bytes received.
fn decode_request(body: &[u8]) -> std::result::Result<ProofRequest, Response> {
    if body.len() as u64 > MAX_BODY_BYTES {
        return Err(json_reply(
            &ErrorResponse {
                error: "request body too large".to_string(),
            },
            StatusCode::PAYLOAD_TOO_LARGE,
        ));
    }

    serde_json::from_slice(body).map_err(|e| {
        json_reply(
            &ErrorResponse {
                error: format!("invalid request body: {}", e),
            },
            StatusCode::BAD_REQUEST,
        )
    })
}

async fn handle_status(
    query: StatusQuery,
    service: Arc<ProofService>,
) -> Result<Response, Infallible> {
    let id = match RequestId::parse(&query.req_id) {
        Ok(id) => id,
        Err(e) => return Ok(error_reply(&e)),
    };

    let reply = match service.status(&id).await {
        Ok(JobStatus::NotFound) => json_reply(
            &ErrorResponse {
                error: "proof request not found".to_string(),
            },
            StatusCode::NOT_FOUND,
        ),
        Ok(JobStatus::Processing { tracking_ref }) => {
            // A tracking link means the prover network has accepted the job
            let code = if tracking_ref.is_some() {
                StatusCode::OK
            } else {
                StatusCode::ACCEPTED
            };
            json_reply(
                &StatusResponse {
                    status: Some("processing".to_string()),
                    tracking_id: tracking_ref,
                    result: None,
                },
                code,
            )
        }
        Ok(JobStatus::Completed { result }) => json_reply(
            &StatusResponse {
                status: Some("completed".to_string()),
                tracking_id: None,
                result: Some(result),
            },
            StatusCode::OK,
        ),
        Err(e) => {
            error!("Failed to resolve status of {}: {}", id, e);
            error_reply(&e)
        }
    };
    Ok(reply)
}

async fn handle_rejection(rejection: Rejection) -> Result<Response, Infallible> {
    let (message, code) = if rejection.is_not_found() {
        ("not found".to_string(), StatusCode::NOT_FOUND)
    } else if rejection.find::<warp::reject::InvalidQuery>().is_some() {
        ("reqId query parameter required".to_string(), StatusCode::BAD_REQUEST)
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        ("request body too large".to_string(), StatusCode::PAYLOAD_TOO_LARGE)
    } else if rejection.find::<warp::reject::LengthRequired>().is_some() {
        ("content length required".to_string(), StatusCode::LENGTH_REQUIRED)
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        ("method not allowed".to_string(), StatusCode::METHOD_NOT_ALLOWED)
    } else {
        error!("Unhandled rejection: {:?}", rejection);
        ("internal server error".to_string(), StatusCode::INTERNAL_SERVER_ERROR)
    };

    Ok(json_reply(&ErrorResponse { error: message }, code))
}

fn error_reply(err: &ServiceError) -> Response {
    let message = match err.category() {
        // io details stay in the server log
        ErrorCategory::Persistence => "internal server error".to_string(),
        _ => err.to_string(),
    };
    json_reply(&ErrorResponse { error: message }, err.status_code())
}

fn json_reply<T: Serialize>(body: &T, code: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(body), code).into_response()
}
