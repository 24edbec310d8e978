//! Commerce GraphQL gateway route.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};

use crate::error::{AppError, Result};
use crate::gateway::GatewayRequest;
use crate::state::AppState;

/// Forward a GraphQL operation to the catalog or identity endpoint.
///
/// The upstream status and JSON body are passed through unchanged so callers
/// can branch on upstream error shapes.
///
/// # Route
///
/// `POST /commerce/graphql`
pub async fn graphql(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<GatewayRequest>,
) -> Result<Response> {
    let query = request
        .query
        .filter(|query| !query.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing GraphQL query".to_string()))?;

    let response = state
        .gateway()
        .forward(
            &query,
            request.variables,
            request.endpoint_type,
            headers.get(header::AUTHORIZATION),
        )
        .await?;

    Ok((response.status, Json(response.body)).into_response())
}
