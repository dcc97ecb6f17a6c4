/*
 * Responsibility
 * - POST /oauth2/revoke
 * - Validate the proof unless revocation is exempt, then mark the token revoked
 * - The token's binding is kept: a revoked token stays tied to its key
 */
use axum::{
    Json,
    extract::{OriginalUri, State},
    http::{HeaderMap, Method},
};

use crate::{
    api::v1::dto::revoke::{RevokeRequest, RevokeResponse},
    error::AppError,
    middleware::dpop::{expected_htu, proof_header},
    services::{binding::BindingReference, dpop::ValidationContext},
    state::AppState,
};

pub async fn revoke(
    State(state): State<AppState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Json(req): Json<RevokeRequest>,
) -> Result<Json<RevokeResponse>, AppError> {
    req.validate().map_err(AppError::invalid_request)?;

    let reference = BindingReference::for_token(req.token.trim());
    let proof = proof_header(&headers)?;
    let htu = expected_htu(&headers, &uri, &state.origin);

    let ctx = ValidationContext::revocation(method.as_str(), htu, Some(reference.clone()));
    state.validator.validate(proof.as_deref(), &ctx).await?;

    let revoked = state.validator.revoke_token(&reference).await?;
    tracing::info!(
        revoked,
        token_type_hint = ?req.token_type_hint,
        "token revoked"
    );

    Ok(Json(RevokeResponse { revoked }))
}
