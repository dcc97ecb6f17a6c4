use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::services::dpop::VerifiedDpop;
use crate::state::AppState;

/// Hands the proof verified by `middleware::dpop` to a handler.
///
/// Missing extension (route not behind the guard) is a 401.
pub struct VerifiedDpopExtractor(pub VerifiedDpop);

impl FromRequestParts<AppState> for VerifiedDpopExtractor
where
    AppState: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<VerifiedDpop>()
            .cloned()
            .map(VerifiedDpopExtractor)
            .ok_or(AppError::InvalidToken)
    }
}
