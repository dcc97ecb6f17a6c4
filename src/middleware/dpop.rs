//! DPoP guard for protected resources.
//!
//! - reads `Authorization: DPoP <access token>` and the `DPoP` proof header
//! - rebuilds the absolute request URL (`htu`) the client signed
//! - runs the resource-access flow and stores `VerifiedDpop` in request extensions
//!
//! Handlers pick the result up with `VerifiedDpopExtractor`.

use axum::{
    Router,
    body::Body,
    extract::{OriginalUri, State},
    http::{HeaderMap, Request, Uri, header},
    middleware::{self, Next},
    response::Response,
};

use crate::error::AppError;
use crate::services::dpop::{DPOP_HEADER, DPOP_TOKEN_TYPE, DpopError, ValidationContext};
use crate::state::AppState;

/// Guard every route of `router` with DPoP resource-access validation.
pub fn apply(router: Router<AppState>, state: AppState) -> Router<AppState> {
    // axum 0.8 `from_fn` cannot take State; pass it explicitly.
    router.layer(middleware::from_fn_with_state(state, dpop_middleware))
}

async fn dpop_middleware(
    State(state): State<AppState>,
    OriginalUri(original_uri): OriginalUri,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = dpop_access_token(req.headers())?;
    let proof = proof_header(req.headers())?;
    let htu = expected_htu(req.headers(), &original_uri, &state.origin);

    let ctx = ValidationContext::resource_access(req.method().as_str(), htu, &token);
    let verified = state
        .validator
        .validate(proof.as_deref(), &ctx)
        .await?
        .verified()
        // resource access never takes the revocation bypass
        .ok_or(AppError::Internal)?;

    req.extensions_mut().insert(verified);

    Ok(next.run(req).await)
}

/// Access token from `Authorization: DPoP <token>`.
pub(crate) fn dpop_access_token(headers: &HeaderMap) -> Result<String, AppError> {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::InvalidToken)?;

    let (scheme, token) = auth.split_once(' ').ok_or(AppError::InvalidToken)?;
    if !scheme.eq_ignore_ascii_case(DPOP_TOKEN_TYPE) {
        return Err(AppError::InvalidToken);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::InvalidToken);
    }
    Ok(token.to_string())
}

/// The `DPoP` header value. More than one proof on a request is malformed.
pub(crate) fn proof_header(headers: &HeaderMap) -> Result<Option<String>, AppError> {
    let mut values = headers.get_all(DPOP_HEADER).iter();
    let Some(first) = values.next() else {
        return Ok(None);
    };
    if values.next().is_some() {
        return Err(DpopError::MalformedProof("multiple DPoP headers").into());
    }

    let value = first.to_str().map_err(|e| {
        tracing::warn!(error = ?e, "invalid DPoP header encoding");
        AppError::from(DpopError::MalformedProof("DPoP header is not visible ASCII"))
    })?;
    Ok(Some(value.to_string()))
}

/// Where the public request URL (`htu`) comes from.
#[derive(Debug, Clone, Default)]
pub struct RequestOrigin {
    // Configured external origin, e.g. `https://api.example.com`.
    pub public_base_url: Option<String>,
    // X-Forwarded-* are client-controlled unless a proxy overwrites them.
    pub trust_forwarded_headers: bool,
}

impl RequestOrigin {
    pub fn public(base_url: impl Into<String>) -> Self {
        Self {
            public_base_url: Some(base_url.into()),
            trust_forwarded_headers: false,
        }
    }
}

/// Absolute URL of the request as the client addressed it.
///
/// `PUBLIC_BASE_URL` wins when configured; then proxy headers if trusted, then `Host`.
pub(crate) fn expected_htu(headers: &HeaderMap, uri: &Uri, origin: &RequestOrigin) -> String {
    if let Some(base) = origin.public_base_url.as_deref() {
        match htu_from_base(base, uri) {
            Ok(url) => return url,
            Err(e) => tracing::warn!(error = %e, "unusable PUBLIC_BASE_URL; using request headers"),
        }
    }
    htu_from_headers(headers, uri, origin.trust_forwarded_headers)
}

fn htu_from_base(base: &str, uri: &Uri) -> Result<String, url::ParseError> {
    let mut url = url::Url::parse(base)?;

    // Keep any path prefix the public origin is mounted under.
    let prefix = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{prefix}{}", uri.path()));
    url.set_query(None);

    Ok(url.to_string())
}

fn htu_from_headers(headers: &HeaderMap, uri: &Uri, trust_forwarded: bool) -> String {
    let first = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            // proxies may append: "https, http"
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let forwarded = |name: &str| if trust_forwarded { first(name) } else { None };

    let scheme = forwarded("x-forwarded-proto").unwrap_or("http");
    let host = forwarded("x-forwarded-host")
        .or_else(|| first(header::HOST.as_str()))
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or("localhost");

    format!("{}://{}{}", scheme, host, uri.path())
}
