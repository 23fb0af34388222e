//! # GCP Authentication
//!
//! Produces the bearer token used for every management API call. The token is
//! taken from the cache when still valid, refreshed when it carries a refresh
//! token, and otherwise acquired from the credentials file given on the
//! command line:
//!
//! - OAuth client secrets (`installed` or `web`): the loopback
//!   authorization-code flow with PKCE. The user opens the printed URL and the
//!   redirect is caught on an ephemeral local port.
//! - A service account key: a signed JWT exchanged for an access token.
//!
//! Whatever is obtained is written back to the [`CredentialStore`].

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::Path;

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use rand::Rng;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::client::BLOCKING_CLIENT;
use crate::error::ProvisionError;
use crate::gcp::token_store::CredentialStore;
use crate::gcp::types::{AccessToken, ClientSecrets, OAuthClient, ServiceAccount, StoredToken};

/// Scope requested for every token.
pub const SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Represents the claims in the JSON Web Token (JWT) used for service accounts.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// The service account's email address.
    iss: String,
    scope: String,
    /// The token endpoint URL.
    aud: String,
    exp: u64,
    iat: u64,
}

/// What to do with the cached token, if any.
#[derive(Debug, PartialEq, Eq)]
pub enum TokenAction {
    UseCached,
    Refresh,
    Acquire,
}

pub fn plan(cached: Option<&StoredToken>, now: DateTime<Utc>) -> TokenAction {
    match cached {
        Some(t) if t.is_valid_at(now) => TokenAction::UseCached,
        Some(t) if t.can_refresh() => TokenAction::Refresh,
        _ => TokenAction::Acquire,
    }
}

pub struct Authenticator<'a, S: CredentialStore + ?Sized> {
    store: &'a S,
    credentials_file: &'a Path,
}

impl<'a, S: CredentialStore + ?Sized> Authenticator<'a, S> {
    pub fn new(store: &'a S, credentials_file: &'a Path) -> Self {
        Self {
            store,
            credentials_file,
        }
    }

    /// Returns a valid access token, refreshing or acquiring one as needed.
    pub fn bearer(&self) -> Result<String, ProvisionError> {
        let cached = self.store.load();
        let token = match (plan(cached.as_ref(), Utc::now()), cached) {
            (TokenAction::UseCached, Some(t)) => {
                info!("using cached access token");
                return Ok(t.token);
            }
            (TokenAction::Refresh, Some(t)) => match refresh(&t) {
                Ok(fresh) => Ok(fresh),
                Err(e) => {
                    warn!(error = %format!("{e:#}"), "token refresh failed, starting a new authorization");
                    self.acquire()
                }
            },
            _ => self.acquire(),
        }
        .map_err(|e| ProvisionError::Credentials(format!("{e:#}")))?;

        self.store.save(&token)?;
        Ok(token.token)
    }

    fn acquire(&self) -> Result<StoredToken> {
        let path = self.credentials_file;
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read credentials file {}", path.display()))?;
        let kind: serde_json::Value =
            serde_json::from_str(&text).context("Invalid credentials file")?;

        if kind.get("type").and_then(|v| v.as_str()) == Some("service_account") {
            let sa: ServiceAccount =
                serde_json::from_str(&text).context("Invalid service account key")?;
            service_account_token(&sa)
        } else {
            let secrets: ClientSecrets =
                serde_json::from_str(&text).context("Invalid OAuth client secrets")?;
            installed_app_flow(&secrets.installed)
        }
    }
}

fn now_secs() -> Result<u64> {
    Ok(std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)?
        .as_secs())
}

fn expiry_from(expires_in: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(expires_in).ok()?;
    Utc::now().checked_add_signed(chrono::Duration::seconds(secs))
}

fn token_request(token_uri: &str, params: &[(&str, &str)]) -> Result<AccessToken> {
    let response = BLOCKING_CLIENT
        .post(token_uri)
        .form(params)
        .send()
        .context("Failed to call the token endpoint")?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().unwrap_or_default();
        bail!("Failed to get access token ({}): {}", status, error_text);
    }
    response.json().context("Invalid token endpoint response")
}

/// Exchanges the refresh token for a new access token.
fn refresh(cached: &StoredToken) -> Result<StoredToken> {
    info!("refreshing expired access token");
    let refresh_token = cached.refresh_token.as_deref().unwrap_or_default();
    let res = token_request(
        &cached.token_uri,
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &cached.client_id),
            ("client_secret", &cached.client_secret),
        ],
    )?;
    Ok(StoredToken {
        token: res.access_token,
        refresh_token: res.refresh_token.or_else(|| cached.refresh_token.clone()),
        expiry: expiry_from(res.expires_in),
        ..cached.clone()
    })
}

/// Server-to-server flow: a JWT signed with the service account key (RS256)
/// is exchanged for an access token.
fn service_account_token(sa: &ServiceAccount) -> Result<StoredToken> {
    info!(client_email = %sa.client_email, "authenticating as service account");
    let now = now_secs()?;
    let claims = Claims {
        iss: sa.client_email.clone(),
        scope: SCOPE.to_string(),
        aud: sa.token_uri.clone(),
        exp: now + 3600,
        iat: now,
    };

    let header = Header::new(Algorithm::RS256);
    let encoding_key = EncodingKey::from_rsa_pem(sa.private_key.as_bytes())
        .context("Invalid service account private key")?;
    let jwt = encode(&header, &claims, &encoding_key)?;

    let res = token_request(
        &sa.token_uri,
        &[
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", &jwt),
        ],
    )?;
    Ok(StoredToken {
        token: res.access_token,
        refresh_token: None,
        token_uri: sa.token_uri.clone(),
        client_id: sa.client_id.clone(),
        client_secret: String::new(),
        scopes: vec![SCOPE.to_string()],
        expiry: expiry_from(res.expires_in),
    })
}

fn random_string(len: usize) -> String {
    rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Builds the consent URL the user has to open.
pub fn authorization_url(
    client: &OAuthClient,
    redirect_uri: &str,
    state: &str,
    code_verifier: &str,
) -> Result<Url> {
    let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(code_verifier.as_bytes()));
    let mut url = Url::parse(&client.auth_uri).context("Invalid auth_uri")?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", &client.client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", SCOPE)
        .append_pair("state", state)
        .append_pair("code_challenge", &challenge)
        .append_pair("code_challenge_method", "S256")
        .append_pair("access_type", "offline")
        .append_pair("prompt", "consent");
    Ok(url)
}

/// Extracts the authorization code from the redirect's request line
/// (`GET /?state=..&code=.. HTTP/1.1`).
pub fn parse_redirect(request_line: &str, expected_state: &str) -> Result<String> {
    let target = request_line
        .split_whitespace()
        .nth(1)
        .context("Malformed redirect request")?;
    let url = Url::parse(&format!("http://127.0.0.1{target}")).context("Malformed redirect")?;

    let mut code = None;
    let mut state = None;
    for (k, v) in url.query_pairs() {
        match k.as_ref() {
            "code" => code = Some(v.into_owned()),
            "state" => state = Some(v.into_owned()),
            "error" => bail!("Authorization denied: {}", v),
            _ => {}
        }
    }
    if state.as_deref() != Some(expected_state) {
        bail!("Authorization state mismatch");
    }
    code.context("Redirect carries no authorization code")
}

fn installed_app_flow(client: &OAuthClient) -> Result<StoredToken> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).context("Failed to bind redirect port")?;
    let port = listener.local_addr()?.port();
    let redirect_uri = format!("http://127.0.0.1:{port}/");
    let state = random_string(24);
    let verifier = random_string(64);

    let url = authorization_url(client, &redirect_uri, &state, &verifier)?;
    println!("Please visit this URL to authorize this application: {url}");

    let (mut stream, _) = listener.accept().context("Failed to accept redirect")?;
    let mut request_line = String::new();
    BufReader::new(&stream).read_line(&mut request_line)?;
    let code = parse_redirect(&request_line, &state);
    let message = if code.is_ok() {
        "The authentication flow has completed. You may close this window."
    } else {
        "The authentication flow has failed. You may close this window."
    };
    let _ = write!(
        stream,
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        message.len(),
        message
    );
    let code = code?;

    let res = token_request(
        &client.token_uri,
        &[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("client_id", &client.client_id),
            ("client_secret", &client.client_secret),
            ("redirect_uri", &redirect_uri),
            ("code_verifier", &verifier),
        ],
    )?;
    info!("authorization completed");
    Ok(StoredToken {
        token: res.access_token,
        refresh_token: res.refresh_token,
        token_uri: client.token_uri.clone(),
        client_id: client.client_id.clone(),
        client_secret: client.client_secret.clone(),
        scopes: vec![SCOPE.to_string()],
        expiry: expiry_from(res.expires_in),
    })
}
