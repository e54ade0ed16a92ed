use crate::AppState;
use crate::api::error::AppError;
use crate::models::RelayResult;
use crate::services::relay_service::RelayRequest;
use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequestBody {
    /// Provider file id
    pub file_id: Option<String>,
    /// Destination URL; omit to keep the file in local storage only
    pub target: Option<String>,
    /// `tus` or `http` (default when a target is given)
    pub protocol: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct RelayQuery {
    /// Use the configured demo credential instead of the caller's
    pub demo: Option<String>,
}

impl RelayQuery {
    fn wants_demo(&self) -> bool {
        self.demo
            .as_deref()
            .map(|v| !v.is_empty() && v != "false" && v != "0")
            .unwrap_or(false)
    }
}

/// Picks the bearer credential for the provider: the demo token when asked
/// for, otherwise the caller's `Authorization: Bearer` header.
fn resolve_credential(
    state: &AppState,
    headers: &HeaderMap,
    query: &RelayQuery,
) -> Result<String, AppError> {
    if query.wants_demo() {
        return state
            .config
            .demo_token
            .clone()
            .ok_or_else(|| AppError::Unauthorized("Demo mode is not configured".to_string()));
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing provider credential".to_string()))
}

#[utoipa::path(
    post,
    path = "/google/get",
    request_body = RelayRequestBody,
    params(RelayQuery),
    responses(
        (status = 200, description = "File stored locally, delivered, or upload started", body = RelayResult),
        (status = 400, description = "Invalid fileId, target or protocol", body = RelayResult),
        (status = 401, description = "No provider credential"),
        (status = 500, description = "Provider or local storage failure", body = RelayResult)
    ),
    security(
        ("bearer" = [])
    ),
    tag = "relay"
)]
pub async fn fetch_and_relay(
    State(state): State<AppState>,
    Query(query): Query<RelayQuery>,
    headers: HeaderMap,
    Json(body): Json<RelayRequestBody>,
) -> Result<(StatusCode, Json<RelayResult>), AppError> {
    let credential = resolve_credential(&state, &headers, &query)?;

    let request = RelayRequest {
        file_id: body.file_id,
        target: body.target,
        protocol: body.protocol,
    };
    let result = state.relay.fetch_and_relay(&credential, request).await;

    let status =
        StatusCode::from_u16(result.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Ok((status, Json(result)))
}
