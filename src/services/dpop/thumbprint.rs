//! JWK thumbprint (RFC 7638).
//!
//! The canonical form is built from a fixed, lexicographically ordered member
//! list per key family. Incidental members (`kid`, `use`, `alg`, ...) never take
//! part, and JSON member order in the incoming jwk is irrelevant.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

use crate::services::dpop::{
    error::DpopError,
    types::{JwkThumbprint, PublicKey},
};

/// Thumbprint of a parsed public key.
///
/// Must be used both when a token is bound and on every later check so the
/// binding stays stable.
pub fn thumbprint(key: &PublicKey) -> JwkThumbprint {
    let canonical = canonical_json(key);
    let digest = Sha256::digest(canonical.as_bytes());
    JwkThumbprint::new(URL_SAFE_NO_PAD.encode(digest))
}

/// Thumbprint of a raw JWK; fails for families other than EC P-256 / RSA.
pub fn thumbprint_of_jwk(jwk: &serde_json::Value) -> Result<JwkThumbprint, DpopError> {
    let key = PublicKey::from_jwk(jwk)?;
    Ok(thumbprint(&key))
}

fn canonical_json(key: &PublicKey) -> String {
    // Values are base64url, so they never need JSON escaping.
    match key {
        // crv < kty < x < y
        PublicKey::Ec(ec) => format!(
            r#"{{"crv":"P-256","kty":"EC","x":"{}","y":"{}"}}"#,
            ec.x, ec.y
        ),
        // e < kty < n
        PublicKey::Rsa(rsa) => format!(r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#, rsa.e, rsa.n),
    }
}
