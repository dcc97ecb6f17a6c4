/*
 * Responsibility
 * - URL structure of /api/v1
 * - Every route here sits behind the DPoP resource guard
 */
use axum::{Router, routing::get};

use crate::api::v1::handlers::whoami::whoami;
use crate::middleware;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let protected = Router::new().route("/whoami", get(whoami));

    middleware::dpop::apply(protected, state)
}
