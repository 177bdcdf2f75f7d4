//! Main axum router and request handlers for the gateway.
//!
//! Routes:
//! - `GET /healthz` - health check
//! - `GET /metrics` - Prometheus metrics
//! - anything else  - Git Smart HTTP, authorized then bridged to the backend
//!
//! The gateway flow: resolve the requested service, run the authorizer, and
//! on approval invoke the backend transport.  Backend stdout is CGI-parsed
//! into the response; every failure class maps to a distinct status code
//! (401 denial, 500 spawn, 502 malformed output, 504 timeout, 510 backend
//! exit).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, DefaultBodyLimit, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use tracing::{error, info, instrument, warn};

use crate::auth::{self, Decision, Service};
use crate::metrics::{Outcome, RequestLabels, ServiceLabel};
use crate::transport::{cgi, BackendInvocation, TransportError};
use crate::AppState;

/// Basic-auth challenge sent with every denial.
const CHALLENGE: &str = "Basic realm=\"git\"";

/// Upper bound on buffered request bodies.  Pushes carry whole packfiles.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the axum [`Router`] with all HTTP routes and shared state.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(handle_health))
        .route("/metrics", get(handle_metrics))
        // Any other method/path is a Git request for the backend.
        .fallback(handle_git)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Gateway handler
// ---------------------------------------------------------------------------

#[instrument(skip(state, headers, body), fields(%method, path = %uri.path()))]
async fn handle_git(
    State(state): State<Arc<AppState>>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    serve_git(&state, method, &uri, &headers, body, Some(remote_addr)).await
}

/// The gateway flow, separated from axum extraction so tests can drive it
/// with a scripted transport.
pub(crate) async fn serve_git(
    state: &AppState,
    method: Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
) -> Response {
    let service = resolve_service(uri);
    let credentials = auth::basic_credentials(headers);

    if auth::authorize(service, credentials.as_ref(), &state.policy) == Decision::Deny {
        info!(
            service = service.map(|s| s.as_str()),
            user = credentials.as_ref().map(|c| c.username.as_str()),
            "denied git request"
        );
        record(state, service, Outcome::Denied);
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, CHALLENGE)],
            "",
        )
            .into_response();
    }

    let invocation = BackendInvocation {
        method: method.as_str().to_string(),
        path_info: uri.path().to_string(),
        query_string: uri.query().unwrap_or_default().to_string(),
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        remote_user: credentials.map(|c| c.username),
        remote_addr: remote_addr.map(|a| a.ip().to_string()),
        body,
    };

    let started = Instant::now();
    let result = state.transport.invoke(invocation).await;
    state
        .metrics
        .metrics
        .backend_duration_seconds
        .observe(started.elapsed().as_secs_f64());

    let (outcome, response) = match result {
        Err(TransportError::Spawn(e)) => {
            error!(error = %e, "failed to spawn backend process");
            (
                Outcome::SpawnFailure,
                (StatusCode::INTERNAL_SERVER_ERROR, "could not create backend process")
                    .into_response(),
            )
        }
        Err(TransportError::Io(e)) => {
            error!(error = %e, "backend pipe I/O failed");
            (
                Outcome::IoFailure,
                (StatusCode::INTERNAL_SERVER_ERROR, "backend I/O failed").into_response(),
            )
        }
        Err(TransportError::Timeout) => {
            warn!("backend timed out");
            (
                Outcome::Timeout,
                (StatusCode::GATEWAY_TIMEOUT, "backend timed out").into_response(),
            )
        }
        Ok(output) if !output.success => {
            warn!(stderr = %output.stderr, "backend exited non-zero");
            (
                Outcome::BackendFailure,
                (StatusCode::NOT_EXTENDED, output.stderr).into_response(),
            )
        }
        Ok(output) => match cgi::parse(&output.stdout) {
            Some(parsed) => (Outcome::Success, cgi_response(parsed)),
            None => {
                warn!(
                    stdout_len = output.stdout.len(),
                    "backend output missing CGI header separator"
                );
                (
                    Outcome::MalformedOutput,
                    (StatusCode::BAD_GATEWAY, "malformed backend output").into_response(),
                )
            }
        },
    };

    record(state, service, outcome);
    response
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Resolve the requested Git service.
///
/// The `service` query parameter wins when present (the ref-advertisement
/// request).  The stateless-RPC POSTs carry no query parameter, so the
/// terminal path segment decides; without this fallback a
/// `POST .../git-receive-pack` would bypass the write check entirely.
fn resolve_service(uri: &Uri) -> Option<Service> {
    if let Some(query) = uri.query() {
        if let Some(name) = query.split('&').find_map(|pair| pair.strip_prefix("service=")) {
            return Service::from_name(name);
        }
    }
    uri.path().rsplit('/').next().and_then(Service::from_name)
}

/// Turn parsed CGI output into a 200 response, setting every backend header
/// verbatim.  Headers that are not valid HTTP are skipped, not fatal.
fn cgi_response(parsed: cgi::CgiResponse) -> Response {
    let mut response = Response::new(Body::from(parsed.body));
    for (name, value) in parsed.headers {
        match (
            HeaderName::try_from(name.trim()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().append(name, value);
            }
            _ => warn!(header = %name, "skipping invalid backend header"),
        }
    }
    response
}

fn record(state: &AppState, service: Option<Service>, outcome: Outcome) {
    let service = match service {
        Some(Service::UploadPack) => ServiceLabel::UploadPack,
        Some(Service::ReceivePack) => ServiceLabel::ReceivePack,
        None => ServiceLabel::Other,
    };
    state
        .metrics
        .metrics
        .requests_total
        .get_or_create(&RequestLabels { service, outcome })
        .inc();
}

// ---------------------------------------------------------------------------
// Health and metrics
// ---------------------------------------------------------------------------

/// `GET /healthz`
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health_state = crate::health::HealthState {
        config: Arc::clone(&state.config),
    };
    crate::health::health_handler(axum::extract::State(health_state)).await
}

/// `GET /metrics`
async fn handle_metrics(State(state): State<Arc<AppState>>) -> Response {
    let mut buf = String::new();
    match prometheus_client::encoding::text::encode(&mut buf, &state.metrics.registry) {
        Ok(()) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                "application/openmetrics-text; version=1.0.0; charset=utf-8",
            )],
            buf,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "metrics encoding failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
