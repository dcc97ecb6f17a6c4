use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::services::dpop::types::{DPOP_TOKEN_TYPE, JwkThumbprint};

/// Opaque identifier linking an issued token (or authorization code) to a key.
///
/// Raw tokens never reach the store: references are derived by hashing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BindingReference(String);

impl BindingReference {
    /// Use an identifier the caller already owns (token id, session id, ...).
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// `tok:` + base64url(SHA-256(token)).
    pub fn for_token(token: &str) -> Self {
        Self(format!("tok:{}", hash(token)))
    }

    /// `code:` + base64url(SHA-256(code)); used for `dpop_jkt` pre-binding.
    pub fn for_authorization_code(code: &str) -> Self {
        Self(format!("code:{}", hash(code)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn hash(value: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(value.as_bytes()))
}

/// Association between a token and the key thumbprint proven when it was issued.
///
/// Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBinding {
    pub binding_type: String,
    pub binding_value: JwkThumbprint,
    pub binding_ref: BindingReference,
}

impl TokenBinding {
    pub fn dpop(binding_ref: BindingReference, thumbprint: JwkThumbprint) -> Self {
        Self {
            binding_type: DPOP_TOKEN_TYPE.to_string(),
            binding_value: thumbprint,
            binding_ref,
        }
    }

    /// Confirmation claim for token introspection: `{"jkt": "<thumbprint>"}`.
    pub fn cnf(&self) -> serde_json::Value {
        serde_json::json!({ "jkt": self.binding_value.as_str() })
    }
}
