use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::mail_reader::error::{AuthError, ProviderError};
use crate::mail_reader::gmail::read_json;
use crate::settings::GmailConfig;
use crate::telemetry::MetricsSink;

// If modifying these scopes, delete the token file.
pub const SCOPES: &[&str] = &["https://www.googleapis.com/auth/gmail.readonly"];

/// Access tokens this close to expiry are refreshed up front.
const EXPIRY_MARGIN_MILLIS: i64 = 60_000;

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    web: Option<ClientSecret>,
    installed: Option<ClientSecret>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    pub auth_uri: Option<String>,
    pub token_uri: Option<String>,
}

impl ClientSecret {
    fn redirect_uri(&self) -> &str {
        self.redirect_uris
            .first()
            .map(String::as_str)
            .unwrap_or("urn:ietf:wg:oauth:2.0:oob")
    }
}

/// The token cache, in the same shape googleapis writes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Expiry as epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<i64>,
}

impl StoredToken {
    /// A token without a recorded expiry is assumed valid.
    pub fn is_expired(&self, now_millis: i64) -> bool {
        match self.expiry_date {
            Some(expiry) => now_millis >= expiry - EXPIRY_MARGIN_MILLIS,
            None => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    scope: Option<String>,
    token_type: Option<String>,
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_stored(self, now_millis: i64, previous_refresh: Option<String>) -> StoredToken {
        StoredToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            scope: self.scope,
            token_type: self.token_type,
            expiry_date: self.expires_in.map(|secs| now_millis + secs * 1000),
        }
    }
}

pub fn load_client_secret(path: &Path) -> Result<ClientSecret, AuthError> {
    let content = fs::read_to_string(path).map_err(|source| AuthError::Credentials {
        path: path.to_path_buf(),
        source,
    })?;
    let file: CredentialsFile = serde_json::from_str(&content).map_err(|source| AuthError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    file.web
        .or(file.installed)
        .ok_or_else(|| AuthError::MissingClient(path.to_path_buf()))
}

pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: PathBuf) -> Self {
        TokenStore { path }
    }

    /// `Ok(None)` when no token has been stored yet. A file that exists but
    /// does not parse is an error.
    pub fn load(&self) -> Result<Option<StoredToken>, AuthError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path).map_err(|source| AuthError::Credentials {
            path: self.path.clone(),
            source,
        })?;
        let token = serde_json::from_str(&content).map_err(|source| AuthError::Malformed {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(token))
    }

    pub fn save(&self, token: &StoredToken) -> Result<(), AuthError> {
        let content = serde_json::to_string(token).map_err(|source| AuthError::Malformed {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, content).map_err(|source| AuthError::TokenWrite {
            path: self.path.clone(),
            source,
        })?;
        // The file holds a refresh token; keep it owner-only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600)).map_err(|source| {
                AuthError::TokenWrite { path: self.path.clone(), source }
            })?;
        }
        info!("Token stored to {}", self.path.display());
        Ok(())
    }
}

/// The OAuth2 calls needed to obtain an access token.
pub trait TokenEndpoint {
    /// The consent page the user has to visit to obtain a code.
    fn authorize_url(&self) -> String;

    fn exchange_code(&self, code: &str) -> impl Future<Output = Result<StoredToken, ProviderError>>;

    fn refresh(&self, refresh_token: &str) -> impl Future<Output = Result<StoredToken, ProviderError>>;
}

pub struct OAuthClient {
    http: Client,
    secret: ClientSecret,
    auth_uri: String,
    token_uri: String,
}

impl OAuthClient {
    pub fn new(config: &GmailConfig, secret: ClientSecret) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;
        let auth_uri = secret.auth_uri.clone().unwrap_or_else(|| config.auth_uri.clone());
        let token_uri = secret.token_uri.clone().unwrap_or_else(|| config.token_uri.clone());
        Ok(OAuthClient { http, secret, auth_uri, token_uri })
    }
}

impl TokenEndpoint for OAuthClient {
    fn authorize_url(&self) -> String {
        format!(
            "{}?access_type=offline&response_type=code&client_id={}&redirect_uri={}&scope={}",
            self.auth_uri,
            urlencoding::encode(&self.secret.client_id),
            urlencoding::encode(self.secret.redirect_uri()),
            urlencoding::encode(&SCOPES.join(" ")),
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<StoredToken, ProviderError> {
        let params = [
            ("code", code),
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.as_str()),
            ("redirect_uri", self.secret.redirect_uri()),
            ("grant_type", "authorization_code"),
        ];
        let response = self.http.post(&self.token_uri).form(&params).send().await?;
        let token: TokenResponse = read_json(response).await?;
        Ok(token.into_stored(now_millis(), None))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<StoredToken, ProviderError> {
        let params = [
            ("refresh_token", refresh_token),
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ];
        let response = self.http.post(&self.token_uri).form(&params).send().await?;
        let token: TokenResponse = read_json(response).await?;
        Ok(token.into_stored(now_millis(), Some(refresh_token.to_string())))
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Produce a usable token: the cached one, a refreshed one, or a fresh one
/// from the interactive flow.
pub async fn authorize(config: &GmailConfig, metrics: &dyn MetricsSink) -> Result<StoredToken, AuthError> {
    metrics.increment("authentication.attempts", &[]);

    let secret = load_client_secret(&config.credentials_path)?;
    let oauth = OAuthClient::new(config, secret)?;
    let store = TokenStore::new(config.token_path.clone());

    resolve_token(&oauth, &store, metrics, prompt_for_code).await
}

/// Pick between the stored token, a refresh, and a new authorization.
/// `prompt` is shown the consent URL and returns the code the user pasted.
pub async fn resolve_token<E: TokenEndpoint>(
    oauth: &E,
    store: &TokenStore,
    metrics: &dyn MetricsSink,
    prompt: impl FnOnce(&str) -> io::Result<String>,
) -> Result<StoredToken, AuthError> {
    // Check if we have previously stored a token.
    let Some(token) = store.load()? else {
        return get_new_token(oauth, store, metrics, prompt).await;
    };
    if !token.is_expired(now_millis()) {
        return Ok(token);
    }

    let Some(refresh_token) = &token.refresh_token else {
        warn!("Stored token expired and has no refresh token");
        return get_new_token(oauth, store, metrics, prompt).await;
    };

    info!("-- access token expired, refreshing");
    match oauth.refresh(refresh_token).await {
        Ok(fresh) => {
            store.save(&fresh)?;
            Ok(fresh)
        }
        // Revoked or expired refresh token (invalid_grant)
        Err(ProviderError::Api { code: 400 | 401, message }) => {
            warn!("Refresh token rejected ({}), authorizing again", message);
            get_new_token(oauth, store, metrics, prompt).await
        }
        Err(e) => Err(e.into()),
    }
}

fn prompt_for_code(authorize_url: &str) -> io::Result<String> {
    println!("Authorize this app by visiting this url: {}", authorize_url);
    rpassword::prompt_password("Enter the code from that page here: ")
}

async fn get_new_token<E: TokenEndpoint>(
    oauth: &E,
    store: &TokenStore,
    metrics: &dyn MetricsSink,
    prompt: impl FnOnce(&str) -> io::Result<String>,
) -> Result<StoredToken, AuthError> {
    metrics.increment("authentication.newToken", &[]);

    let code = prompt(&oauth.authorize_url()).map_err(AuthError::Prompt)?;

    let token = oauth.exchange_code(code.trim()).await?;
    // Store the token to disk for later program executions
    store.save(&token)?;
    Ok(token)
}
