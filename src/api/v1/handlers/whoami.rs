/*
 * Responsibility
 * - GET /api/v1/whoami: echo the key and proof the guard accepted,
 *   plus the token's confirmation claim when it is bound
 */
use axum::{Json, extract::State, http::HeaderMap};

use crate::{
    api::v1::{dto::whoami::WhoamiResponse, extractors::VerifiedDpopExtractor},
    error::AppError,
    middleware::dpop::dpop_access_token,
    services::binding::BindingReference,
    state::AppState,
};

pub async fn whoami(
    State(state): State<AppState>,
    headers: HeaderMap,
    VerifiedDpopExtractor(verified): VerifiedDpopExtractor,
) -> Result<Json<WhoamiResponse>, AppError> {
    let token = dpop_access_token(&headers)?;
    let binding = state
        .validator
        .bindings()
        .lookup(&BindingReference::for_token(&token))
        .await?;

    Ok(Json(WhoamiResponse::new(verified, binding.as_ref())))
}
