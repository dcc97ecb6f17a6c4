//! Validation orchestrator.
//!
//! Received -> Decoded -> SignatureVerified -> ClaimsMatched -> ReplayChecked
//! -> [BindingChecked] -> Accepted. Any stage may reject; nothing is retried.

use std::{fmt, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};

use crate::services::{
    binding::{BindingReference, BindingRegistry, BindingStore, TokenBinding},
    dpop::{
        claims::{compute_ath, match_claims},
        decode::decode,
        error::DpopError,
        signature,
        thumbprint::thumbprint,
        types::{JwkThumbprint, VerifiedDpop},
    },
    replay::{ReplayGuard, ReplayStore},
};

/// Policy knobs for proof validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DpopPolicy {
    // Maximum acceptable age of a proof (now - iat).
    pub header_validity_period: Duration,
    // Allowed future drift of iat.
    pub clock_skew: Duration,
    // Revocation requests skip proof validation entirely.
    pub skip_dpop_validation_in_revoke: bool,
    // Accept tokens that were issued without a binding.
    pub allow_unbound_tokens: bool,
    // How long a revocation is remembered; at least the longest token lifetime.
    pub revocation_ttl: Duration,
}

impl Default for DpopPolicy {
    fn default() -> Self {
        Self {
            header_validity_period: Duration::from_millis(60_000),
            clock_skew: Duration::ZERO,
            skip_dpop_validation_in_revoke: true,
            allow_unbound_tokens: false,
            revocation_ttl: Duration::from_secs(24 * 3600),
        }
    }
}

impl DpopPolicy {
    /// How long a consumed `jti` must be remembered: every instant at which a
    /// proof carrying it could still pass the freshness check.
    pub fn replay_ttl(&self) -> Duration {
        self.header_validity_period.saturating_add(self.clock_skew)
    }
}

/// Grant being exchanged at the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenGrant {
    /// Fresh issuance; the caller binds the new token afterwards.
    Initial,
    /// Code exchange; honours a `dpop_jkt` registered for the code.
    AuthorizationCode { code: String },
    /// Refresh; the proof key must match the refresh token's binding.
    RefreshToken { binding: BindingReference },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    TokenRequest(TokenGrant),
    ResourceAccess { binding: BindingReference },
    Revocation { binding: Option<BindingReference> },
}

/// Per-request input to [`DpopValidator::validate`].
#[derive(Debug, Clone)]
pub struct ValidationContext {
    pub method: String,
    // Absolute request URL as the client addressed it.
    pub url: String,
    pub now: DateTime<Utc>,
    // base64url(SHA-256(access token)) when a token accompanies the proof.
    pub access_token_hash: Option<String>,
    pub flow: Flow,
}

impl ValidationContext {
    pub fn token_request(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(method, url, Flow::TokenRequest(TokenGrant::Initial))
    }

    pub fn resource_access(
        method: impl Into<String>,
        url: impl Into<String>,
        access_token: &str,
    ) -> Self {
        let mut ctx = Self::new(
            method,
            url,
            Flow::ResourceAccess {
                binding: BindingReference::for_token(access_token),
            },
        );
        ctx.access_token_hash = Some(compute_ath(access_token));
        ctx
    }

    pub fn revocation(
        method: impl Into<String>,
        url: impl Into<String>,
        binding: Option<BindingReference>,
    ) -> Self {
        Self::new(method, url, Flow::Revocation { binding })
    }

    fn new(method: impl Into<String>, url: impl Into<String>, flow: Flow) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            now: Utc::now(),
            access_token_hash: None,
            flow,
        }
    }

    /// Replace the grant of a token request.
    pub fn with_grant(mut self, grant: TokenGrant) -> Self {
        self.flow = Flow::TokenRequest(grant);
        self
    }

    /// Evaluate at a fixed instant instead of the wall clock.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

/// Successful outcome of [`DpopValidator::validate`].
#[derive(Debug, Clone)]
pub enum Accepted {
    Verified(VerifiedDpop),
    /// Revocation request let through without looking at the proof.
    RevocationBypass,
}

impl Accepted {
    pub fn thumbprint(&self) -> Option<&JwkThumbprint> {
        match self {
            Self::Verified(v) => Some(&v.thumbprint),
            Self::RevocationBypass => None,
        }
    }

    pub fn verified(self) -> Option<VerifiedDpop> {
        match self {
            Self::Verified(v) => Some(v),
            Self::RevocationBypass => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Received,
    Decoded,
    SignatureVerified,
    ClaimsMatched,
    ReplayChecked,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Received => "received",
            Self::Decoded => "decoded",
            Self::SignatureVerified => "signature_verified",
            Self::ClaimsMatched => "claims_matched",
            Self::ReplayChecked => "replay_checked",
        })
    }
}

pub struct DpopValidator {
    policy: DpopPolicy,
    replay: ReplayGuard,
    bindings: BindingRegistry,
}

impl DpopValidator {
    pub fn new(
        policy: DpopPolicy,
        replay_store: Arc<dyn ReplayStore>,
        binding_store: Arc<dyn BindingStore>,
    ) -> Self {
        Self {
            policy,
            replay: ReplayGuard::new(replay_store),
            bindings: BindingRegistry::new(binding_store),
        }
    }

    pub fn policy(&self) -> &DpopPolicy {
        &self.policy
    }

    pub fn bindings(&self) -> &BindingRegistry {
        &self.bindings
    }

    /// Validate `raw_proof` (the `DPoP` header value) for the request in `ctx`.
    pub async fn validate(
        &self,
        raw_proof: Option<&str>,
        ctx: &ValidationContext,
    ) -> Result<Accepted, DpopError> {
        if matches!(ctx.flow, Flow::Revocation { .. }) && self.policy.skip_dpop_validation_in_revoke
        {
            tracing::debug!("skipping DPoP validation for revocation request");
            return Ok(Accepted::RevocationBypass);
        }

        let mut stage = Stage::Received;
        match self.run(raw_proof, ctx, &mut stage).await {
            Ok(verified) => {
                tracing::debug!(
                    jti = %verified.jti,
                    jkt = %verified.thumbprint,
                    alg = %verified.algorithm,
                    "DPoP proof accepted"
                );
                Ok(Accepted::Verified(verified))
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    stage = %stage,
                    code = err.code().as_str(),
                    method = %ctx.method,
                    url = %ctx.url,
                    "DPoP proof rejected"
                );
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        raw_proof: Option<&str>,
        ctx: &ValidationContext,
        stage: &mut Stage,
    ) -> Result<VerifiedDpop, DpopError> {
        let raw = raw_proof
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(DpopError::MissingProof)?;

        let proof = decode(raw)?;
        *stage = Stage::Decoded;

        if !signature::verify(&proof)? {
            return Err(DpopError::SignatureInvalid);
        }
        *stage = Stage::SignatureVerified;

        match_claims(&proof, ctx, &self.policy)?;
        *stage = Stage::ClaimsMatched;

        let jkt = thumbprint(&proof.header.public_key);

        if !self
            .replay
            .check_and_consume(&proof.claims.jti, ctx.now, self.policy.replay_ttl())
            .await?
        {
            return Err(DpopError::ReplayDetected);
        }
        *stage = Stage::ReplayChecked;

        self.check_binding(&ctx.flow, &jkt).await?;

        let claims = proof.claims;
        Ok(VerifiedDpop {
            jti: claims.jti,
            iat: claims.iat,
            htm: claims.htm,
            htu: claims.htu,
            algorithm: proof.header.algorithm,
            thumbprint: jkt,
        })
    }

    async fn check_binding(&self, flow: &Flow, jkt: &JwkThumbprint) -> Result<(), DpopError> {
        let reference = match flow {
            Flow::TokenRequest(TokenGrant::Initial) | Flow::Revocation { binding: None } => {
                return Ok(());
            }
            // dpop_jkt is optional on the authorization request
            Flow::TokenRequest(TokenGrant::AuthorizationCode { code }) => {
                return self
                    .check_optional_binding(&BindingReference::for_authorization_code(code), jkt)
                    .await;
            }
            // RFC 7009: revoking an unknown or unbound token is not an error
            Flow::Revocation {
                binding: Some(binding),
            } => return self.check_optional_binding(binding, jkt).await,
            Flow::TokenRequest(TokenGrant::RefreshToken { binding })
            | Flow::ResourceAccess { binding } => binding,
        };

        // checked first so a revoked token never falls through to allow_unbound_tokens
        if self.bindings.is_revoked(reference).await? {
            return Err(DpopError::TokenRevoked);
        }

        match self.bindings.verify_binding(reference, jkt).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(DpopError::BindingMismatch),
            Err(DpopError::NoBindingFound) if self.policy.allow_unbound_tokens => {
                tracing::debug!(
                    binding_ref = %reference.as_str(),
                    "no DPoP binding for token; unbound tokens allowed"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    // A binding, if present, must match; absence passes.
    async fn check_optional_binding(
        &self,
        reference: &BindingReference,
        jkt: &JwkThumbprint,
    ) -> Result<(), DpopError> {
        match self.bindings.lookup(reference).await? {
            Some(b) if !b.binding_value.matches(jkt.as_str()) => Err(DpopError::BindingMismatch),
            _ => Ok(()),
        }
    }

    /// Revoke the token behind `reference`. Its binding is kept, so the token
    /// can never be accepted again, whichever key presents it.
    pub async fn revoke_token(&self, reference: &BindingReference) -> Result<bool, DpopError> {
        self.bindings
            .revoke(reference, self.policy.revocation_ttl)
            .await
    }

    /// Bind a freshly issued token to the key proven in `verified`.
    pub async fn bind_token(
        &self,
        reference: BindingReference,
        verified: &VerifiedDpop,
        ttl: Duration,
    ) -> Result<TokenBinding, DpopError> {
        self.bindings
            .bind(reference, verified.thumbprint.clone(), ttl)
            .await
    }
}
