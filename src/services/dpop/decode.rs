//! Proof decoder: compact JWS -> `DpopProof`.
//!
//! Pure parsing. The embedded `jwk` is the only key source; nothing here is
//! trusted until the signature verifier has run.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::services::dpop::{
    error::DpopError,
    types::{DpopProof, ProofAlgorithm, ProofClaims, ProofHeader, PublicKey},
};

#[derive(Debug, Deserialize)]
struct RawHeader {
    typ: Option<String>,
    alg: Option<String>,
    jwk: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawClaims {
    jti: Option<String>,
    htm: Option<String>,
    htu: Option<String>,
    // NumericDate; fractional seconds are allowed on the wire
    iat: Option<serde_json::Number>,
    ath: Option<String>,
}

pub fn decode(raw: &str) -> Result<DpopProof, DpopError> {
    let raw = raw.trim();

    let mut segments = raw.split('.');
    let (header_b64, payload_b64, signature_b64) = match (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) {
        (Some(h), Some(p), Some(s), None) if !h.is_empty() && !p.is_empty() => (h, p, s),
        _ => return Err(DpopError::MalformedProof("expected three compact JWS segments")),
    };

    let header: RawHeader = decode_segment(header_b64, "header")?;

    let alg = header
        .alg
        .as_deref()
        .ok_or(DpopError::MalformedProof("header without alg"))?;
    let algorithm = ProofAlgorithm::parse(alg)?;

    let jwk = header.jwk.as_ref().ok_or(DpopError::MissingEmbeddedKey)?;
    let public_key = PublicKey::from_jwk(jwk)?;

    if algorithm.family() != public_key.family() {
        return Err(DpopError::UnsupportedAlgorithm(format!(
            "{algorithm} cannot be used with a {:?} key",
            public_key.family()
        )));
    }

    let claims = decode_claims(payload_b64)?;

    // `alg: none` style tokens end with an empty segment; they are already
    // rejected above, anything reaching here must carry a real signature.
    if signature_b64.is_empty() {
        return Err(DpopError::MalformedProof("missing signature"));
    }
    if URL_SAFE_NO_PAD.decode(signature_b64).is_err() {
        return Err(DpopError::MalformedProof("signature is not base64url"));
    }

    Ok(DpopProof {
        header: ProofHeader {
            typ: header.typ,
            algorithm,
            public_key,
        },
        claims,
        signing_input: format!("{header_b64}.{payload_b64}"),
        signature: signature_b64.to_string(),
    })
}

fn decode_claims(payload_b64: &str) -> Result<ProofClaims, DpopError> {
    let raw: RawClaims = decode_segment(payload_b64, "payload")?;

    let iat = raw
        .iat
        .as_ref()
        .and_then(|n| n.as_i64().or_else(|| n.as_f64().map(|f| f.floor() as i64)))
        .ok_or(DpopError::MissingClaim("iat"))?;

    Ok(ProofClaims {
        jti: raw
            .jti
            .filter(|s| !s.is_empty())
            .ok_or(DpopError::MissingClaim("jti"))?,
        htm: raw.htm.ok_or(DpopError::MissingClaim("htm"))?,
        htu: raw.htu.ok_or(DpopError::MissingClaim("htu"))?,
        iat,
        ath: raw.ath,
    })
}

fn decode_segment<T: DeserializeOwned>(segment: &str, what: &'static str) -> Result<T, DpopError> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(error = %e, segment = what, "DPoP segment is not base64url");
        DpopError::MalformedProof("segment is not base64url")
    })?;

    serde_json::from_slice(&bytes).map_err(|e| {
        tracing::debug!(error = %e, segment = what, "DPoP segment is not valid JSON");
        DpopError::MalformedProof("segment is not a valid JSON object")
    })
}
