use anyhow::Context;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Body sent to the identity registry. The national ID only leaves the process as a blind index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VerificationRequest {
    pub registrant_name: String,
    pub ssn_hash: String,
    pub address: String,
}

impl VerificationRequest {
    pub fn new(name: &str, ssn: &str, address: &str) -> Self {
        Self {
            registrant_name: name.to_string(),
            ssn_hash: blind_index(ssn),
            address: address.to_string(),
        }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("serialize verification request")
    }
}

/// Hex SHA-256 of the value; equality lookups work without the plaintext.
pub fn blind_index(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VerificationOutcome {
    pub success: bool,
    pub address_match: bool,
    pub db_address: Option<String>,
    pub message: Option<String>,
}

impl VerificationOutcome {
    pub fn from_json_str(s: &str) -> anyhow::Result<Self> {
        serde_json::from_str(s).context("parse verification response json")
    }

    pub fn is_verified(&self) -> bool {
        self.success && self.address_match
    }
}

/// The registry lookup service.
pub trait IdentityVerifier {
    fn verify(&self, request: &VerificationRequest) -> anyhow::Result<VerificationOutcome>;
}
