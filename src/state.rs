/*
 * Responsibility
 * - Shared context attached to the Router (AppState)
 * - Cheap to clone (Arc inside)
 */
use std::sync::Arc;

use crate::middleware::dpop::RequestOrigin;
use crate::services::dpop::DpopValidator;

#[derive(Clone)]
pub struct AppState {
    pub validator: Arc<DpopValidator>,
    // How the expected `htu` is rebuilt from a request.
    pub origin: RequestOrigin,
}

impl AppState {
    pub fn new(validator: Arc<DpopValidator>, origin: RequestOrigin) -> Self {
        Self { validator, origin }
    }
}
