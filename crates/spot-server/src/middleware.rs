//! Bearer `client-token` auth: every agent-facing endpoint validates token
//! ownership of the agent-id. No JWT, no sessions — a command-queue
//! client-token is minted once at registration and never rotated.

use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use spot_core::Error;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::ApiError;
use crate::AppState;

fn client_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get("client-token")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError(Error::Auth("missing client-token header".into())))
}

/// Validates that the `client-token` header owns the `{agent_id}` path
/// segment, then hands the resolved agent to the handler via request
/// extensions so it doesn't have to look it up again.
///
/// Takes the raw param map rather than `Path<Uuid>` because some routes
/// under this middleware (commands/:command_id/executed) carry a second
/// path segment, which a scalar `Path<Uuid>` can't handle.
pub async fn require_agent_token(
    State(state): State<Arc<AppState>>,
    Path(params): Path<HashMap<String, String>>,
    headers: HeaderMap,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let agent_id: Uuid = params
        .get("agent_id")
        .ok_or_else(|| ApiError(Error::Internal("route missing agent_id param".into())))?
        .parse()
        .map_err(|_| ApiError(Error::Validation("agent_id is not a valid uuid".into())))?;
    let token = client_token(&headers)?;
    let agent = state
        .agents
        .agent_by_token(agent_id, token)
        .await?
        .ok_or_else(|| ApiError(Error::Auth("token does not own this agent-id".into())))?;

    request.extensions_mut().insert(agent);
    Ok(next.run(request).await)
}

pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let response = next.run(request).await;
    tracing::info!(%method, %uri, status = response.status().as_u16(), "request");
    response
}
