//! DPoP proof validation (RFC 9449).
//!
//! Leaf components (`thumbprint`, `decode`, `signature`, `claims`) are pure and
//! know nothing about storage or HTTP. `validator` composes them with the
//! replay guard and the binding registry.

pub mod claims;
pub mod decode;
pub mod error;
pub mod signature;
pub mod thumbprint;
pub mod types;
pub mod validator;

#[cfg(test)]
pub(crate) mod test_support;

pub use claims::compute_ath;
pub use error::{DpopError, ErrorCode};
pub use thumbprint::{thumbprint, thumbprint_of_jwk};
pub use types::{
    DPOP_HEADER, DPOP_JWT_TYPE, DPOP_TOKEN_TYPE, DpopProof, JwkThumbprint, ProofAlgorithm,
    PublicKey, VerifiedDpop,
};
pub use validator::{
    Accepted, DpopPolicy, DpopValidator, Flow, TokenGrant, ValidationContext,
};
