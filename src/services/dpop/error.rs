use crate::services::{binding::BindingStoreError, replay::ReplayError};

/// Wire-level error codes surfaced to OAuth2 clients.
///
/// Every proof failure collapses into `invalid_dpop_proof` and every binding
/// failure into `invalid_client`, so a client cannot tell which check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidDpopProof,
    InvalidClient,
    ServerError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidDpopProof => "invalid_dpop_proof",
            Self::InvalidClient => "invalid_client",
            Self::ServerError => "server_error",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::InvalidDpopProof => "Invalid DPoP Proof",
            Self::InvalidClient => "Invalid Client",
            Self::ServerError => "Internal Server Error",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DpopError {
    #[error("missing DPoP header")]
    MissingProof,
    #[error("malformed DPoP proof: {0}")]
    MalformedProof(&'static str),
    #[error("missing jwk in DPoP header")]
    MissingEmbeddedKey,
    #[error("unsupported DPoP alg: {0}")]
    UnsupportedAlgorithm(String),
    #[error("unsupported jwk for DPoP: {0}")]
    UnsupportedKeyType(String),
    #[error("missing required claim: {0}")]
    MissingClaim(&'static str),

    #[error("DPoP proof signature does not verify against its embedded jwk")]
    SignatureInvalid,

    #[error("invalid DPoP typ")]
    InvalidProofType,
    #[error("htm mismatch")]
    MethodMismatch,
    #[error("htu mismatch")]
    UriMismatch,
    #[error("iat is older than the validity period")]
    ProofExpired,
    #[error("iat is in the future")]
    ProofNotYetValid,
    #[error("ath mismatch")]
    AccessTokenHashMismatch,
    #[error("ath required for access token bound proof")]
    MissingAccessTokenHash,

    #[error("DPoP proof replay detected")]
    ReplayDetected,

    #[error("binding reference is already bound to another key")]
    AlreadyBound,
    #[error("no DPoP binding found for token")]
    NoBindingFound,
    #[error("cnf.jkt mismatch")]
    BindingMismatch,
    #[error("token has been revoked")]
    TokenRevoked,

    #[error(transparent)]
    ReplayStore(#[from] ReplayError),
    #[error(transparent)]
    BindingStore(#[from] BindingStoreError),
}

impl DpopError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::AlreadyBound
            | Self::NoBindingFound
            | Self::BindingMismatch
            | Self::TokenRevoked => ErrorCode::InvalidClient,
            Self::ReplayStore(_) | Self::BindingStore(_) => ErrorCode::ServerError,
            _ => ErrorCode::InvalidDpopProof,
        }
    }
}
