use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// Generic GCP credential types shared by the auth flows and the token cache.

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceAccount {
    #[serde(rename = "type")]
    pub account_type: String,
    pub project_id: String,
    pub private_key_id: String,
    pub private_key: String,
    pub client_email: String,
    pub client_id: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub auth_provider_x509_cert_url: String,
    pub client_x509_cert_url: String,
}

/// OAuth client secrets downloaded from the console (`credentials.json`).
#[derive(Debug, Deserialize)]
pub struct ClientSecrets {
    #[serde(alias = "web")]
    pub installed: OAuthClient,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
}

/// Token endpoint response.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Cached user credentials, in the authorized-user layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_uri: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

/// Tokens expiring within this window are treated as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

impl StoredToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.token.is_empty()
            && self
                .expiry
                .is_some_and(|exp| exp - Duration::seconds(EXPIRY_SKEW_SECS) > now)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}
