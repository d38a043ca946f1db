//! Administrative HTTP interface over the routing table.
//!
//! # Routes
//!
//! | Method | Path | Body | Description |
//! |---|---|---|---|
//! | GET | `/api/domains/all` | – | One `domain candidate weight` line per entry |
//! | PUT, POST | `/api/domains/{domain}` | `candidate weight` | Insert or update a candidate |
//! | DELETE | `/api/domains/{domain}` | `candidate` | Remove a candidate |
//! | GET | `/api/snapshot` | – | Whole table as JSON |
//! | PUT | `/api/snapshot` | JSON | Replace the whole table |

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::Router;
use std::fmt::Write as _;
use tracing::{info, warn};

use crate::error::DnsError;
use crate::metrics::{self, AdminOp};
use crate::snapshot;
use crate::table::RoutingTable;

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    /// Table mutated and read by every route.
    pub table: RoutingTable,
}

/// Build the admin router.
pub fn build_router(table: RoutingTable) -> Router {
    let state = AdminState { table };

    Router::new()
        .route("/api/domains/all", get(list_all))
        .route(
            "/api/domains/{domain}",
            put(upsert).post(upsert).delete(remove),
        )
        .route("/api/snapshot", get(export_snapshot).put(restore_snapshot))
        .with_state(state)
}

fn error_response(err: &DnsError) -> Response {
    let status = if err.is_rejection() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, err.to_string()).into_response()
}

/// Parse an upsert body: `<candidate> <weight>`.
fn parse_upsert(body: &str) -> Result<(&str, u32), DnsError> {
    let parts: Vec<&str> = body.split_whitespace().collect();
    let [candidate, weight] = parts.as_slice() else {
        return Err(DnsError::MalformedAdminInput(format!(
            "expected \"<candidate> <weight>\", got {} fields",
            parts.len()
        )));
    };

    let weight: i64 = weight
        .parse()
        .map_err(|_| DnsError::MalformedAdminInput(format!("weight {weight:?} is not a number")))?;
    let weight = u32::try_from(weight)
        .ok()
        .filter(|w| *w > 0)
        .ok_or(DnsError::InvalidWeight)?;

    Ok((*candidate, weight))
}

/// Parse a removal body: `<candidate>`.
fn parse_remove(body: &str) -> Result<&str, DnsError> {
    let parts: Vec<&str> = body.split_whitespace().collect();
    match parts.as_slice() {
        [candidate] => Ok(*candidate),
        [] => Err(DnsError::MalformedAdminInput(
            "candidate is required".to_string(),
        )),
        _ => Err(DnsError::MalformedAdminInput(format!(
            "expected a single candidate, got {} fields",
            parts.len()
        ))),
    }
}

fn body_text(body: &Bytes) -> Result<&str, DnsError> {
    std::str::from_utf8(body)
        .map_err(|_| DnsError::MalformedAdminInput("body is not valid UTF-8".to_string()))
}

/// GET /api/domains/all
async fn list_all(State(state): State<AdminState>) -> impl IntoResponse {
    let mut out = String::new();
    for (domain, entry) in state.table.snapshot() {
        for (candidate, weight) in entry.resolvers {
            let _ = writeln!(out, "{domain} {candidate} {weight}");
        }
    }
    out
}

/// PUT|POST /api/domains/{domain}
async fn upsert(
    State(state): State<AdminState>,
    Path(domain): Path<String>,
    body: Bytes,
) -> Response {
    let result = body_text(&body)
        .and_then(parse_upsert)
        .and_then(|(candidate, weight)| {
            state.table.set(&domain, candidate, weight)?;
            Ok((candidate, weight))
        });

    match result {
        Ok((candidate, weight)) => {
            metrics::record_admin_request(AdminOp::Upsert, true);
            info!(%domain, %candidate, weight, "admin upsert");
            StatusCode::OK.into_response()
        }
        Err(e) => {
            metrics::record_admin_request(AdminOp::Upsert, false);
            warn!(%domain, error = %e, "admin upsert rejected");
            error_response(&e)
        }
    }
}

/// DELETE /api/domains/{domain}
async fn remove(
    State(state): State<AdminState>,
    Path(domain): Path<String>,
    body: Bytes,
) -> Response {
    match body_text(&body).and_then(parse_remove) {
        Ok(candidate) => {
            state.table.unset(&domain, candidate);
            metrics::record_admin_request(AdminOp::Remove, true);
            info!(%domain, %candidate, "admin remove");
            StatusCode::OK.into_response()
        }
        Err(e) => {
            metrics::record_admin_request(AdminOp::Remove, false);
            warn!(%domain, error = %e, "admin remove rejected");
            error_response(&e)
        }
    }
}

/// GET /api/snapshot
async fn export_snapshot(State(state): State<AdminState>) -> Response {
    match snapshot::encode(&state.table.snapshot()) {
        Ok(bytes) => ([(header::CONTENT_TYPE, "application/json")], bytes).into_response(),
        Err(e) => error_response(&e),
    }
}

/// PUT /api/snapshot
async fn restore_snapshot(State(state): State<AdminState>, body: Bytes) -> Response {
    let result = snapshot::decode(&body).and_then(|snap| state.table.replace_all(snap));

    match result {
        Ok(()) => {
            metrics::record_admin_request(AdminOp::Restore, true);
            info!(domains = state.table.domains_count(), "admin snapshot restore");
            StatusCode::OK.into_response()
        }
        Err(e) => {
            metrics::record_admin_request(AdminOp::Restore, false);
            warn!(error = %e, "admin snapshot restore rejected");
            error_response(&e)
        }
    }
}
