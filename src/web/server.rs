use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::limit::ConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::{error, info};

use crate::cli::ServeArgs;
use crate::core::patient::{MatchRequest, Patient, PatientSubmission};
use crate::core::API_MIME_TYPE;
use crate::federation::{FanoutConfig, FederationProxy, AUTH_HEADER};
use crate::services::Services;
use crate::trust::PartnerServer;
use crate::web::schema::{validate_request, validate_response};

/// Maximum results returned for one match query
pub const RESULT_LIMIT: usize = 5;

/// Request body cap; match requests are small JSON documents
pub const MAX_BODY_SIZE: usize = 1024 * 1024; // 1MB

/// Shared application state
pub struct AppState {
    pub services: Services,
    pub proxy: FederationProxy,
}

/// Query parameters for the federated match endpoint
#[derive(Deserialize)]
struct FederatedParams {
    /// Comma-separated partner server ids; all outbound partners if absent
    servers: Option<String>,

    /// Per-partner timeout in milliseconds
    timeout_ms: Option<u64>,
}

/// Run the web server
///
/// # Errors
///
/// Returns an error if the tokio runtime cannot be created or the server
/// fails to start.
pub fn run(args: &ServeArgs, services: Services) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move { run_server(args, services).await })
}

async fn run_server(args: &ServeArgs, services: Services) -> anyhow::Result<()> {
    let client = reqwest::Client::builder().build()?;
    let proxy = FederationProxy::new(services.servers.clone(), client, FanoutConfig::default());
    let state = Arc::new(AppState { services, proxy });
    let app = create_router(state);

    let addr = format!("{}:{}", args.address, args.port);
    info!("Starting pheno-match server at http://{addr}");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Create the application router with all routes and middleware configured.
#[allow(clippy::missing_panics_doc)] // Panics only on invalid governor config (constants are valid)
#[must_use]
pub fn create_router(state: Arc<AppState>) -> Router {
    // IP-based rate limiting
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(10)
        .burst_size(50)
        .finish()
        .unwrap();

    Router::new()
        .route("/", get(index_handler))
        .route("/match", post(match_handler))
        .route("/federation/match", post(federated_match_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetResponseHeaderLayer::if_not_present(
                    HeaderName::from_static("x-content-type-options"),
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    HeaderName::from_static("strict-transport-security"),
                    HeaderValue::from_static("max-age=31536000; includeSubDomains"),
                ))
                .layer(GovernorLayer {
                    config: Arc::new(governor_conf),
                })
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    Duration::from_secs(30),
                ))
                .layer(ConcurrencyLimitLayer::new(100))
                .layer(DefaultBodyLimit::max(MAX_BODY_SIZE)),
        )
}

/// Service metadata and the partners this server queries
async fn index_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let partners: Vec<Value> = state
        .services
        .servers
        .list(crate::trust::Direction::Out)
        .unwrap_or_default()
        .iter()
        .map(|p| json!({"server": p.server_id, "label": p.server_label}))
        .collect();

    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "partners": partners,
    }))
}

/// Return patients similar to the query patient
async fn match_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let _partner = match authorize(&state, &headers) {
        Ok(partner) => partner,
        Err(response) => return response,
    };
    let submission = match parse_request(&body) {
        Ok(submission) => submission,
        Err(response) => return response,
    };
    let patient = match normalize(&state, submission) {
        Ok(patient) => patient,
        Err(response) => return response,
    };

    info!("Finding similar patients for {:?}", patient.id());
    let results = match state.services.patients.query(
        &patient.phenotype_closure,
        &patient.gene_set,
        RESULT_LIMIT,
    ) {
        Ok(results) => results,
        Err(e) => {
            error!("Match query failed: {e}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Search backend unavailable");
        }
    };

    let wire_results: Vec<Value> = results.iter().filter_map(|r| r.to_wire().ok()).collect();
    let response_json = json!({ "results": wire_results });
    if let Err(e) = validate_response(&response_json) {
        // Log and return the response anyway
        error!("Response does not conform to API specification:\n{e}");
    }

    api_response(StatusCode::OK, response_json)
}

/// Fan the query out to outbound partners and aggregate their results
async fn federated_match_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FederatedParams>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let _partner = match authorize(&state, &headers) {
        Ok(partner) => partner,
        Err(response) => return response,
    };
    let submission = match parse_request(&body) {
        Ok(submission) => submission,
        Err(response) => return response,
    };
    let patient = match normalize(&state, submission) {
        Ok(patient) => patient,
        Err(response) => return response,
    };

    let Ok(canonical) = patient.to_wire() else {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Unable to serialize query");
    };
    let payload = json!({ "patient": canonical });

    let targets: Option<Vec<String>> = params.servers.map(|s| {
        s.split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    });
    let timeout = params.timeout_ms.map(Duration::from_millis);

    info!("Federating query for {:?}", patient.id());
    let outcomes = match state.proxy.fanout(&payload, timeout, targets.as_deref()).await {
        Ok(outcomes) => outcomes,
        Err(e) => {
            error!("Unable to read partner registry: {e}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Partner registry unavailable");
        }
    };

    let mut merged: Vec<Value> = Vec::new();
    let mut servers: Vec<Value> = Vec::new();
    for outcome in outcomes {
        match outcome.outcome {
            Ok(response) => match validate_response(&response) {
                Ok(()) => {
                    let results = response
                        .get("results")
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default();
                    servers.push(json!({
                        "server": outcome.server_id,
                        "label": outcome.server_label,
                        "status": "ok",
                        "results": results.len(),
                    }));
                    merged.extend(results);
                }
                Err(e) => servers.push(json!({
                    "server": outcome.server_id,
                    "label": outcome.server_label,
                    "status": "error",
                    "message": format!("response does not conform to API specification: {e}"),
                })),
            },
            Err(failure) => servers.push(json!({
                "server": outcome.server_id,
                "label": outcome.server_label,
                "status": "error",
                "message": failure.to_string(),
            })),
        }
    }

    merged.sort_by(|a, b| {
        let score = |v: &Value| {
            v.get("score")
                .and_then(|s| s.get("patient"))
                .and_then(Value::as_f64)
                .unwrap_or(0.0)
        };
        score(b).partial_cmp(&score(a)).unwrap_or(std::cmp::Ordering::Equal)
    });

    api_response(StatusCode::OK, json!({ "results": merged, "servers": servers }))
}

/// Verify the shared-secret token against inbound trust entries
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<PartnerServer, Response> {
    let token = headers
        .get(AUTH_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    state.services.servers.verify(token).ok_or_else(|| {
        error_response(StatusCode::UNAUTHORIZED, "X-Auth-Token not authorized")
    })
}

/// Parse and schema-validate the request body
fn parse_request(body: &str) -> Result<PatientSubmission, Response> {
    let payload: Value = serde_json::from_str(body).map_err(|_| {
        error_response(StatusCode::BAD_REQUEST, "Request body is not valid JSON")
    })?;

    validate_request(&payload).map_err(|e| {
        error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            &format!("Request does not conform to API specification:\n{e}"),
        )
    })?;

    let request: MatchRequest = serde_json::from_value(payload).map_err(|e| {
        error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            &format!("Request does not conform to API specification:\n{e}"),
        )
    })?;
    Ok(request.patient)
}

fn normalize(state: &AppState, submission: PatientSubmission) -> Result<Patient, Response> {
    let normalizer = crate::matching::Normalizer::new(&state.services.ontology, &state.services.genes);
    normalizer
        .normalize(submission)
        .map_err(|e| error_response(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string()))
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

/// Success responses carry the versioned vendor media type
fn api_response(status: StatusCode, body: Value) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, API_MIME_TYPE)],
        Json(body),
    )
        .into_response()
}
