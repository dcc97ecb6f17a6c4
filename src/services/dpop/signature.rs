//! Signature verification against the proof's own embedded key.
//!
//! A successful check proves possession of the private key only. Whether that
//! key is allowed to use a given token is the binding registry's concern.

use jsonwebtoken::DecodingKey;

use crate::services::dpop::{
    error::DpopError,
    types::{DpopProof, PublicKey},
};

/// Verify the JWS signature over the received `header.payload` bytes.
///
/// - `Ok(true)`: signature verifies under `header.jwk`
/// - `Ok(false)`: it doesn't (bad signature, unusable key material, wrong curve)
/// - `Err(UnsupportedAlgorithm)`: declared alg doesn't fit the key family
pub fn verify(proof: &DpopProof) -> Result<bool, DpopError> {
    let algorithm = proof.header.algorithm;
    let public_key = &proof.header.public_key;

    if algorithm.family() != public_key.family() {
        return Err(DpopError::UnsupportedAlgorithm(algorithm.to_string()));
    }

    let key = match decoding_key(public_key) {
        Ok(key) => key,
        Err(e) => {
            tracing::debug!(error = ?e, alg = %algorithm, "unusable DPoP jwk");
            return Ok(false);
        }
    };

    match jsonwebtoken::crypto::verify(
        &proof.signature,
        proof.signing_input.as_bytes(),
        &key,
        algorithm.jws_algorithm(),
    ) {
        Ok(valid) => Ok(valid),
        Err(e) => {
            tracing::debug!(error = ?e, alg = %algorithm, "DPoP signature check errored");
            Ok(false)
        }
    }
}

fn decoding_key(key: &PublicKey) -> jsonwebtoken::errors::Result<DecodingKey> {
    match key {
        PublicKey::Ec(ec) => DecodingKey::from_ec_components(&ec.x, &ec.y),
        PublicKey::Rsa(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::dpop::{
        decode::decode,
        test_support::{self, TestKey},
    };
    use serde_json::json;

    const HTU: &str = "https://rs.example.com/api/v1/whoami";

    #[test]
    fn es256_signature_verifies() {
        let raw = test_support::proof(TestKey::Ec, "jti-ec", "GET", HTU, 1_700_000_000);
        let proof = decode(&raw).unwrap();
        assert!(verify(&proof).unwrap());
    }

    #[test]
    fn rs384_signature_verifies() {
        let raw = test_support::proof(TestKey::Rsa, "jti-rsa", "GET", HTU, 1_700_000_000);
        let proof = decode(&raw).unwrap();
        assert!(verify(&proof).unwrap());
    }

    #[test]
    fn tampered_payload_fails() {
        let raw = test_support::proof(TestKey::Ec, "jti-1", "GET", HTU, 1_700_000_000);
        let sig = raw.rsplit('.').next().unwrap();

        // same header and signature, different claims
        let other = test_support::proof(TestKey::Ec, "jti-2", "GET", HTU, 1_700_000_000);
        let mut parts: Vec<&str> = other.split('.').collect();
        parts[2] = sig;
        let forged = parts.join(".");

        let proof = decode(&forged).unwrap();
        assert!(!verify(&proof).unwrap());
    }

    #[test]
    fn tampered_signature_fails() {
        let raw = test_support::proof(TestKey::Rsa, "jti-1", "POST", HTU, 1_700_000_000);
        let (input, sig) = raw.rsplit_once('.').unwrap();
        let flipped = if sig.starts_with('A') { "B" } else { "A" };
        let forged = format!("{input}.{flipped}{}", &sig[1..]);

        let proof = decode(&forged).unwrap();
        assert!(!verify(&proof).unwrap());
    }

    #[test]
    fn key_swap_fails() {
        // signed by the EC fixture key, but claims to be someone else's P-256 key
        let mut header = test_support::header(TestKey::Ec);
        header["jwk"]["x"] = json!("f83OJ3D2xF1Bg8vub9tLe1gHMzV76e8Tus9uPHvRVEU");
        header["jwk"]["y"] = json!("x_FEzRu9m36HLN_tue659LNpXW6pCyStikYjKIWI5a0");
        let raw = test_support::sign(
            TestKey::Ec,
            &header,
            &test_support::claims("jti-1", "GET", HTU, 1_700_000_000),
        );

        let proof = decode(&raw).unwrap();
        assert!(!verify(&proof).unwrap());
    }
}
