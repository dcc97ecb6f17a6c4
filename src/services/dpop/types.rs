use std::fmt;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::services::dpop::error::DpopError;

/// Request header carrying the proof.
pub const DPOP_HEADER: &str = "DPoP";
/// `typ` every proof must declare.
pub const DPOP_JWT_TYPE: &str = "dpop+jwt";
/// Token type / Authorization scheme for DPoP-bound tokens.
pub const DPOP_TOKEN_TYPE: &str = "DPoP";

/// P-256 coordinates are always 32 bytes.
const P256_COORDINATE_LEN: usize = 32;

// RFC 9449 4.2: the embedded jwk MUST NOT contain a private key.
const PRIVATE_JWK_MEMBERS: [&str; 6] = ["d", "p", "q", "dp", "dq", "qi"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Ec,
    Rsa,
}

/// Asymmetric JWS algorithms accepted for proofs.
///
/// `none` and every HMAC variant are rejected at decode time; so is ES384/ES512
/// since only P-256 keys are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofAlgorithm {
    ES256,
    RS256,
    RS384,
    RS512,
    PS256,
    PS384,
    PS512,
}

impl ProofAlgorithm {
    pub fn parse(alg: &str) -> Result<Self, DpopError> {
        match alg {
            "ES256" => Ok(Self::ES256),
            "RS256" => Ok(Self::RS256),
            "RS384" => Ok(Self::RS384),
            "RS512" => Ok(Self::RS512),
            "PS256" => Ok(Self::PS256),
            "PS384" => Ok(Self::PS384),
            "PS512" => Ok(Self::PS512),
            other => Err(DpopError::UnsupportedAlgorithm(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ES256 => "ES256",
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
            Self::PS256 => "PS256",
            Self::PS384 => "PS384",
            Self::PS512 => "PS512",
        }
    }

    pub fn family(&self) -> KeyFamily {
        match self {
            Self::ES256 => KeyFamily::Ec,
            _ => KeyFamily::Rsa,
        }
    }

    pub fn jws_algorithm(&self) -> jsonwebtoken::Algorithm {
        use jsonwebtoken::Algorithm;

        match self {
            Self::ES256 => Algorithm::ES256,
            Self::RS256 => Algorithm::RS256,
            Self::RS384 => Algorithm::RS384,
            Self::RS512 => Algorithm::RS512,
            Self::PS256 => Algorithm::PS256,
            Self::PS384 => Algorithm::PS384,
            Self::PS512 => Algorithm::PS512,
        }
    }
}

impl fmt::Display for ProofAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// EC P-256 public key, coordinates kept in their base64url JWK form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcPublicKey {
    pub x: String,
    pub y: String,
}

/// RSA public key, modulus and exponent kept in their base64url JWK form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPublicKey {
    pub n: String,
    pub e: String,
}

/// Public key embedded in a proof header. Only these two families exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    Ec(EcPublicKey),
    Rsa(RsaPublicKey),
}

impl PublicKey {
    /// Parse the `jwk` header member.
    pub fn from_jwk(jwk: &serde_json::Value) -> Result<Self, DpopError> {
        let obj = jwk
            .as_object()
            .ok_or(DpopError::MalformedProof("jwk is not a JSON object"))?;

        if PRIVATE_JWK_MEMBERS.iter().any(|m| obj.contains_key(*m)) {
            return Err(DpopError::MalformedProof("jwk contains private key material"));
        }

        let member = |name: &str| obj.get(name).and_then(|v| v.as_str());

        let kty = member("kty").ok_or(DpopError::MalformedProof("jwk without kty"))?;

        match kty {
            "EC" => {
                let crv = member("crv").unwrap_or_default();
                if crv != "P-256" {
                    return Err(DpopError::UnsupportedKeyType(format!("EC/{crv}")));
                }
                let x = member("x").ok_or(DpopError::MalformedProof("EC jwk without x"))?;
                let y = member("y").ok_or(DpopError::MalformedProof("EC jwk without y"))?;
                if !is_b64url_of_len(x, P256_COORDINATE_LEN)
                    || !is_b64url_of_len(y, P256_COORDINATE_LEN)
                {
                    return Err(DpopError::MalformedProof("invalid EC coordinates"));
                }
                Ok(Self::Ec(EcPublicKey {
                    x: x.to_string(),
                    y: y.to_string(),
                }))
            }
            "RSA" => {
                let n = member("n").ok_or(DpopError::MalformedProof("RSA jwk without n"))?;
                let e = member("e").ok_or(DpopError::MalformedProof("RSA jwk without e"))?;
                if !is_nonempty_b64url(n) || !is_nonempty_b64url(e) {
                    return Err(DpopError::MalformedProof("invalid RSA parameters"));
                }
                Ok(Self::Rsa(RsaPublicKey {
                    n: n.to_string(),
                    e: e.to_string(),
                }))
            }
            other => Err(DpopError::UnsupportedKeyType(other.to_string())),
        }
    }

    pub fn family(&self) -> KeyFamily {
        match self {
            Self::Ec(_) => KeyFamily::Ec,
            Self::Rsa(_) => KeyFamily::Rsa,
        }
    }
}

fn is_b64url_of_len(s: &str, len: usize) -> bool {
    URL_SAFE_NO_PAD
        .decode(s)
        .map(|b| b.len() == len)
        .unwrap_or(false)
}

fn is_nonempty_b64url(s: &str) -> bool {
    URL_SAFE_NO_PAD
        .decode(s)
        .map(|b| !b.is_empty())
        .unwrap_or(false)
}

/// Decoded proof header.
#[derive(Debug, Clone)]
pub struct ProofHeader {
    pub typ: Option<String>,
    pub algorithm: ProofAlgorithm,
    pub public_key: PublicKey,
}

/// Decoded proof claims.
#[derive(Debug, Clone)]
pub struct ProofClaims {
    pub jti: String,
    pub htm: String,
    pub htu: String,
    // issued-at, seconds since epoch
    pub iat: i64,
    pub ath: Option<String>,
}

/// A proof that parsed cleanly. Nothing about it has been verified yet.
#[derive(Debug, Clone)]
pub struct DpopProof {
    pub header: ProofHeader,
    pub claims: ProofClaims,
    // `header.payload` exactly as received; the signature covers these bytes.
    pub(crate) signing_input: String,
    pub(crate) signature: String,
}

impl DpopProof {
    pub fn signing_input(&self) -> &str {
        &self.signing_input
    }
}

/// RFC 7638 JWK thumbprint (`jkt`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JwkThumbprint(String);

impl JwkThumbprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison against another encoded thumbprint.
    pub fn matches(&self, other: &str) -> bool {
        constant_time_eq(&self.0, other)
    }
}

impl fmt::Display for JwkThumbprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a proof that passed every check.
#[derive(Debug, Clone)]
pub struct VerifiedDpop {
    pub jti: String,
    pub iat: i64,
    pub htm: String,
    pub htu: String,
    pub algorithm: ProofAlgorithm,
    pub thumbprint: JwkThumbprint,
}

pub(crate) fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
