use serde::{Deserialize, Serialize};

/// RFC 7009 revocation request.
#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub token: String,
    // accepted for compatibility; every token type is looked up the same way
    #[serde(default)]
    pub token_type_hint: Option<String>,
}

impl RevokeRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.token.trim().is_empty() {
            return Err("token must not be empty");
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct RevokeResponse {
    // false when the token was already revoked
    pub revoked: bool,
}
