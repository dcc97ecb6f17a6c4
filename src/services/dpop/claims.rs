//! Claim matcher: binds a signature-verified proof to the request it arrived on.
//!
//! Checks run in a fixed order and stop at the first failure:
//! typ -> htm -> htu -> iat window -> ath.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

use crate::services::dpop::{
    error::DpopError,
    types::{DPOP_JWT_TYPE, DpopProof, constant_time_eq},
    validator::{DpopPolicy, ValidationContext},
};

pub fn match_claims(
    proof: &DpopProof,
    ctx: &ValidationContext,
    policy: &DpopPolicy,
) -> Result<(), DpopError> {
    let claims = &proof.claims;

    // 1) typ
    match proof.header.typ.as_deref() {
        Some(typ) if typ.eq_ignore_ascii_case(DPOP_JWT_TYPE) => {}
        _ => return Err(DpopError::InvalidProofType),
    }

    // 2) htm
    if !claims.htm.eq_ignore_ascii_case(&ctx.method) {
        return Err(DpopError::MethodMismatch);
    }

    // 3) htu
    if normalize_htu(&claims.htu) != normalize_htu(&ctx.url) {
        tracing::debug!(
            htu = %claims.htu,
            expected_htu = %ctx.url,
            "DPoP htu check failed"
        );
        return Err(DpopError::UriMismatch);
    }

    // 4) iat window, in milliseconds
    let now_ms = ctx.now.timestamp_millis();
    let iat_ms = claims.iat.saturating_mul(1000);
    let validity_ms = duration_ms(policy.header_validity_period);
    let skew_ms = duration_ms(policy.clock_skew);

    if now_ms.saturating_sub(iat_ms) > validity_ms {
        return Err(DpopError::ProofExpired);
    }
    if iat_ms.saturating_sub(now_ms) > skew_ms {
        return Err(DpopError::ProofNotYetValid);
    }

    // 5) ath, only when the request carries an access token
    if let Some(expected) = ctx.access_token_hash.as_deref() {
        let ath = claims
            .ath
            .as_deref()
            .ok_or(DpopError::MissingAccessTokenHash)?;
        if !constant_time_eq(ath, expected) {
            return Err(DpopError::AccessTokenHashMismatch);
        }
    }

    Ok(())
}

/// `ath` value for an access token: base64url(SHA-256(ASCII(token))).
pub fn compute_ath(access_token: &str) -> String {
    let digest = Sha256::digest(access_token.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Normalization used only for equality comparison.
///
/// - lower scheme/host
/// - drop default ports
/// - drop query and fragment
pub fn normalize_htu(htu: &str) -> String {
    if let Ok(url) = url::Url::parse(htu) {
        let scheme = url.scheme().to_ascii_lowercase();
        let host = url.host_str().unwrap_or("").to_ascii_lowercase();
        // `Url::port` is already `None` for the scheme's default port
        let port = url.port();

        let mut out = String::with_capacity(htu.len());
        out.push_str(&scheme);
        out.push_str("://");
        out.push_str(&host);
        if let Some(port) = port {
            out.push(':');
            out.push_str(&port.to_string());
        }
        out.push_str(url.path());
        out
    } else {
        // not an absolute URL; compare what precedes query/fragment verbatim
        htu.split(['?', '#']).next().unwrap_or_default().to_string()
    }
}

fn duration_ms(d: std::time::Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::dpop::{
        decode::decode,
        test_support::{self, TestKey},
    };
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;
    use std::time::Duration;

    const HTU: &str = "https://server.example.com/token";
    const IAT: i64 = 1_700_000_000;

    fn at(ms_after_iat: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(IAT * 1000 + ms_after_iat).unwrap()
    }

    fn ctx(method: &str, url: &str, now: DateTime<Utc>) -> ValidationContext {
        ValidationContext::token_request(method, url).at(now)
    }

    fn proof_with(claims: serde_json::Value) -> DpopProof {
        decode(&test_support::sign(
            TestKey::Ec,
            &test_support::header(TestKey::Ec),
            &claims,
        ))
        .unwrap()
    }

    fn proof(htm: &str, htu: &str) -> DpopProof {
        proof_with(test_support::claims("jti-1", htm, htu, IAT))
    }

    #[test]
    fn matching_request_passes() {
        let p = proof("POST", HTU);
        let res = match_claims(&p, &ctx("POST", HTU, at(0)), &DpopPolicy::default());
        assert!(res.is_ok(), "{res:?}");
    }

    #[test]
    fn typ_is_required_and_case_insensitive() {
        let mut header = test_support::header(TestKey::Ec);
        header["typ"] = json!("DPoP+JWT");
        let claims = test_support::claims("jti-1", "POST", HTU, IAT);
        let p = decode(&test_support::sign(TestKey::Ec, &header, &claims)).unwrap();
        assert!(match_claims(&p, &ctx("POST", HTU, at(0)), &DpopPolicy::default()).is_ok());

        for typ in [json!("JWT"), json!(null)] {
            let mut header = test_support::header(TestKey::Ec);
            header["typ"] = typ;
            let p = decode(&test_support::sign(TestKey::Ec, &header, &claims)).unwrap();
            assert!(matches!(
                match_claims(&p, &ctx("POST", HTU, at(0)), &DpopPolicy::default()),
                Err(DpopError::InvalidProofType)
            ));
        }
    }

    #[test]
    fn method_must_match() {
        let p = proof("GET", HTU);
        assert!(matches!(
            match_claims(&p, &ctx("POST", HTU, at(0)), &DpopPolicy::default()),
            Err(DpopError::MethodMismatch)
        ));
        // case-insensitive
        let p = proof("post", HTU);
        assert!(match_claims(&p, &ctx("POST", HTU, at(0)), &DpopPolicy::default()).is_ok());
    }

    #[test]
    fn uri_ignores_query_fragment_case_and_default_port() {
        let p = proof("POST", "HTTPS://Server.Example.com:443/token");
        let c = ctx("POST", "https://server.example.com/token?x=1#frag", at(0));
        assert!(match_claims(&p, &c, &DpopPolicy::default()).is_ok());
    }

    #[test]
    fn uri_path_and_port_must_match() {
        let p = proof("POST", "https://server.example.com/token2");
        assert!(matches!(
            match_claims(&p, &ctx("POST", HTU, at(0)), &DpopPolicy::default()),
            Err(DpopError::UriMismatch)
        ));

        let p = proof("POST", "https://server.example.com:8443/token");
        assert!(matches!(
            match_claims(&p, &ctx("POST", HTU, at(0)), &DpopPolicy::default()),
            Err(DpopError::UriMismatch)
        ));
    }

    #[test]
    fn freshness_boundary_is_inclusive_in_millis() {
        let p = proof("POST", HTU);
        let policy = DpopPolicy::default();

        assert!(match_claims(&p, &ctx("POST", HTU, at(59_999)), &policy).is_ok());
        assert!(match_claims(&p, &ctx("POST", HTU, at(60_000)), &policy).is_ok());
        assert!(matches!(
            match_claims(&p, &ctx("POST", HTU, at(60_001)), &policy),
            Err(DpopError::ProofExpired)
        ));
    }

    #[test]
    fn future_iat_needs_skew() {
        let p = proof("POST", HTU);

        assert!(matches!(
            match_claims(&p, &ctx("POST", HTU, at(-1)), &DpopPolicy::default()),
            Err(DpopError::ProofNotYetValid)
        ));

        let skewed = DpopPolicy {
            clock_skew: Duration::from_secs(5),
            ..DpopPolicy::default()
        };
        assert!(match_claims(&p, &ctx("POST", HTU, at(-5_000)), &skewed).is_ok());
        assert!(matches!(
            match_claims(&p, &ctx("POST", HTU, at(-5_001)), &skewed),
            Err(DpopError::ProofNotYetValid)
        ));
    }

    #[test]
    fn ath_checked_only_with_access_token() {
        let token = "Kz~8mXK1EalYznwH-LC-1fBAo.4Ljp~zsPE_NeO.gxU";
        let mut claims = test_support::claims("jti-1", "GET", HTU, IAT);

        let c = ValidationContext::resource_access("GET", HTU, token).at(at(0));
        let p = proof_with(claims.clone());
        assert!(matches!(
            match_claims(&p, &c, &DpopPolicy::default()),
            Err(DpopError::MissingAccessTokenHash)
        ));

        claims["ath"] = json!(compute_ath("some-other-token"));
        let p = proof_with(claims.clone());
        assert!(matches!(
            match_claims(&p, &c, &DpopPolicy::default()),
            Err(DpopError::AccessTokenHashMismatch)
        ));

        claims["ath"] = json!(compute_ath(token));
        let p = proof_with(claims);
        assert!(match_claims(&p, &c, &DpopPolicy::default()).is_ok());

        // token request: a stray ath is ignored
        assert!(match_claims(&p, &ctx("GET", HTU, at(0)), &DpopPolicy::default()).is_ok());
    }

    #[test]
    fn compute_ath_matches_rfc9449_example() {
        // RFC 9449 section 7.1
        assert_eq!(
            compute_ath("Kz~8mXK1EalYznwH-LC-1fBAo.4Ljp~zsPE_NeO.gxU"),
            "fUHyO2r2Z3DZ53EsNrWBb0xWXoaNy59IiKCAqksmQEo"
        );
    }

    #[test]
    fn normalize_htu_falls_back_for_relative_values() {
        assert_eq!(normalize_htu("/token?x=1"), "/token");
        assert_eq!(normalize_htu("not a url#frag"), "not a url");
    }
}
