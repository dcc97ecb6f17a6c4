//! Proof minting for unit tests, using the fixture key pairs under `tests/fixtures`.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, EncodingKey};
use serde_json::{Value, json};

pub(crate) const EC_X: &str = "-6F4irv76jwSiLHebVzksLfjtXYplS9RwmvJFdRp-rc";
pub(crate) const EC_Y: &str = "GbVCG0C3LHB9Uo7CIoJeB2vNAhteGNDqHwVcMEuyAI0";
pub(crate) const EC_JKT: &str = "C07a9MZgz5wYywPc39Tw81gE8QzhkpC14sjx-2pAwbI";

pub(crate) const RSA_N: &str = "t9x8A_JZb313HsuwnUNMat52cNQSoI7HfHtv2IwM7QFtuq_HzMLwlYajYPIkaCiIhG67vGStNQAYPUG-z7fW6uXI3cLX-9ws2moPwjSnPhCf_UFmwRUXSSXNBUthVWTFJeUIYQ_WldeZyOD4LGpc-OhxHkj4PQvz2nZUhYM0vu163a8NbKvC3IQ-pbFOmW9mnGCSO2YqPN_zS1G1X76CdGxtJzVIpdjj4_HgoKCo-RAysMnnKDQz3-lmd-kQBqXzvVx0ZNuPY_B7nBzT6kvKqNBRwduPwzEgkH3rBpIBv0Ve-pHdI6Tm_2c6bC1NRlu-b_g8CeZDE0tZ4IyhTVsAIQ";
pub(crate) const RSA_E: &str = "AQAB";
pub(crate) const RSA_JKT: &str = "_Z3DHS03lCZVeRs-J9fO7JHuTE0BmVYuBF6Rdc5qjII";

const EC_PEM: &str = include_str!("../../../tests/fixtures/ec_p256_private.pem");
const RSA_PEM: &str = include_str!("../../../tests/fixtures/rsa_2048_private.pem");

#[derive(Debug, Clone, Copy)]
pub(crate) enum TestKey {
    Ec,
    Rsa,
}

impl TestKey {
    pub(crate) fn jwk(self) -> Value {
        match self {
            Self::Ec => json!({"kty": "EC", "crv": "P-256", "x": EC_X, "y": EC_Y}),
            Self::Rsa => json!({"kty": "RSA", "n": RSA_N, "e": RSA_E}),
        }
    }

    pub(crate) fn alg(self) -> Algorithm {
        match self {
            Self::Ec => Algorithm::ES256,
            Self::Rsa => Algorithm::RS384,
        }
    }

    pub(crate) fn alg_name(self) -> &'static str {
        match self {
            Self::Ec => "ES256",
            Self::Rsa => "RS384",
        }
    }

    pub(crate) fn jkt(self) -> &'static str {
        match self {
            Self::Ec => EC_JKT,
            Self::Rsa => RSA_JKT,
        }
    }

    fn encoding_key(self) -> EncodingKey {
        match self {
            Self::Ec => EncodingKey::from_ec_pem(EC_PEM.as_bytes()).unwrap(),
            Self::Rsa => EncodingKey::from_rsa_pem(RSA_PEM.as_bytes()).unwrap(),
        }
    }
}

/// Sign an arbitrary header/claims pair with a fixture key.
pub(crate) fn sign(key: TestKey, header: &Value, claims: &Value) -> String {
    let h = URL_SAFE_NO_PAD.encode(header.to_string());
    let c = URL_SAFE_NO_PAD.encode(claims.to_string());
    let input = format!("{h}.{c}");
    let sig = jsonwebtoken::crypto::sign(input.as_bytes(), &key.encoding_key(), key.alg()).unwrap();
    format!("{input}.{sig}")
}

pub(crate) fn header(key: TestKey) -> Value {
    json!({"typ": "dpop+jwt", "alg": key.alg_name(), "jwk": key.jwk()})
}

pub(crate) fn claims(jti: &str, htm: &str, htu: &str, iat: i64) -> Value {
    json!({"jti": jti, "htm": htm, "htu": htu, "iat": iat})
}

/// A correctly signed proof with the usual header.
pub(crate) fn proof(key: TestKey, jti: &str, htm: &str, htu: &str, iat: i64) -> String {
    sign(key, &header(key), &claims(jti, htm, htu, iat))
}
