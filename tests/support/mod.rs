//! Shared fixtures: the EC P-256 / RSA-2048 test key pairs and a proof builder.
#![allow(dead_code)]

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use dpop_validator::services::{
    binding::InMemoryBindingStore,
    dpop::{DpopPolicy, DpopValidator, compute_ath},
    replay::InMemoryReplayStore,
};
use jsonwebtoken::{Algorithm, EncodingKey};
use serde_json::{Value, json};

pub const EC_JKT: &str = "C07a9MZgz5wYywPc39Tw81gE8QzhkpC14sjx-2pAwbI";
pub const RSA_JKT: &str = "_Z3DHS03lCZVeRs-J9fO7JHuTE0BmVYuBF6Rdc5qjII";

const EC_X: &str = "-6F4irv76jwSiLHebVzksLfjtXYplS9RwmvJFdRp-rc";
const EC_Y: &str = "GbVCG0C3LHB9Uo7CIoJeB2vNAhteGNDqHwVcMEuyAI0";
const RSA_N: &str = "t9x8A_JZb313HsuwnUNMat52cNQSoI7HfHtv2IwM7QFtuq_HzMLwlYajYPIkaCiIhG67vGStNQAYPUG-z7fW6uXI3cLX-9ws2moPwjSnPhCf_UFmwRUXSSXNBUthVWTFJeUIYQ_WldeZyOD4LGpc-OhxHkj4PQvz2nZUhYM0vu163a8NbKvC3IQ-pbFOmW9mnGCSO2YqPN_zS1G1X76CdGxtJzVIpdjj4_HgoKCo-RAysMnnKDQz3-lmd-kQBqXzvVx0ZNuPY_B7nBzT6kvKqNBRwduPwzEgkH3rBpIBv0Ve-pHdI6Tm_2c6bC1NRlu-b_g8CeZDE0tZ4IyhTVsAIQ";

const EC_PEM: &str = include_str!("../fixtures/ec_p256_private.pem");
const RSA_PEM: &str = include_str!("../fixtures/rsa_2048_private.pem");

#[derive(Debug, Clone, Copy)]
pub enum Key {
    /// ES256
    Ec,
    /// RS384
    Rsa,
}

impl Key {
    pub fn jkt(self) -> &'static str {
        match self {
            Key::Ec => EC_JKT,
            Key::Rsa => RSA_JKT,
        }
    }

    fn jwk(self) -> Value {
        match self {
            Key::Ec => json!({"kty": "EC", "crv": "P-256", "x": EC_X, "y": EC_Y}),
            Key::Rsa => json!({"kty": "RSA", "n": RSA_N, "e": "AQAB"}),
        }
    }

    fn alg(self) -> Algorithm {
        match self {
            Key::Ec => Algorithm::ES256,
            Key::Rsa => Algorithm::RS384,
        }
    }

    fn alg_name(self) -> &'static str {
        match self {
            Key::Ec => "ES256",
            Key::Rsa => "RS384",
        }
    }

    fn encoding_key(self) -> EncodingKey {
        match self {
            Key::Ec => EncodingKey::from_ec_pem(EC_PEM.as_bytes()).unwrap(),
            Key::Rsa => EncodingKey::from_rsa_pem(RSA_PEM.as_bytes()).unwrap(),
        }
    }
}

/// Builds a signed proof; defaults to a fresh random `jti` and `iat = now`.
pub struct ProofBuilder {
    key: Key,
    header: Value,
    claims: Value,
}

impl ProofBuilder {
    pub fn new(key: Key, htm: &str, htu: &str) -> Self {
        Self {
            key,
            header: json!({"typ": "dpop+jwt", "alg": key.alg_name(), "jwk": key.jwk()}),
            claims: json!({
                "jti": uuid::Uuid::new_v4().to_string(),
                "htm": htm,
                "htu": htu,
                "iat": chrono::Utc::now().timestamp(),
            }),
        }
    }

    pub fn jti(mut self, jti: &str) -> Self {
        self.claims["jti"] = json!(jti);
        self
    }

    pub fn iat(mut self, iat: i64) -> Self {
        self.claims["iat"] = json!(iat);
        self
    }

    pub fn access_token(mut self, token: &str) -> Self {
        self.claims["ath"] = json!(compute_ath(token));
        self
    }

    pub fn typ(mut self, typ: &str) -> Self {
        self.header["typ"] = json!(typ);
        self
    }

    pub fn sign(self) -> String {
        let h = URL_SAFE_NO_PAD.encode(self.header.to_string());
        let c = URL_SAFE_NO_PAD.encode(self.claims.to_string());
        let input = format!("{h}.{c}");
        let sig = jsonwebtoken::crypto::sign(
            input.as_bytes(),
            &self.key.encoding_key(),
            self.key.alg(),
        )
        .unwrap();
        format!("{input}.{sig}")
    }
}

/// Flip one character of the signature segment.
pub fn tamper_signature(proof: &str) -> String {
    let (input, sig) = proof.rsplit_once('.').unwrap();
    let replacement = if sig.starts_with('A') { 'B' } else { 'A' };
    format!("{input}.{replacement}{}", &sig[1..])
}

pub fn validator(policy: DpopPolicy) -> Arc<DpopValidator> {
    Arc::new(DpopValidator::new(
        policy,
        Arc::new(InMemoryReplayStore::new()),
        Arc::new(InMemoryBindingStore::new()),
    ))
}
