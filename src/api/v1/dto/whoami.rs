use serde::Serialize;

use crate::services::{binding::TokenBinding, dpop::VerifiedDpop};

#[derive(Debug, Serialize)]
pub struct WhoamiResponse {
    pub jkt: String,
    pub jti: String,
    pub htm: String,
    pub htu: String,
    pub alg: &'static str,
    // absent for unbound tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cnf: Option<serde_json::Value>,
}

impl WhoamiResponse {
    pub fn new(v: VerifiedDpop, binding: Option<&TokenBinding>) -> Self {
        Self {
            jkt: v.thumbprint.as_str().to_string(),
            alg: v.algorithm.as_str(),
            jti: v.jti,
            htm: v.htm,
            htu: v.htu,
            cnf: binding.map(TokenBinding::cnf),
        }
    }
}
