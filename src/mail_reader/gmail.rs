use std::future::Future;
use std::time::Duration;

use log::debug;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::mail_reader::error::ProviderError;
use crate::mail_reader::message::{GmailMessage, MessageList, Profile, Thread};
use crate::settings::GmailConfig;

/// The calls the scanner makes against a mailbox. All of them address the
/// authorized user's own mailbox (`me`).
pub trait MailProvider {
    fn get_profile(&self) -> impl Future<Output = Result<Profile, ProviderError>>;

    fn list_messages(
        &self,
        include_spam_trash: bool,
        page_token: Option<&str>,
    ) -> impl Future<Output = Result<MessageList, ProviderError>>;

    fn get_message(&self, id: &str) -> impl Future<Output = Result<GmailMessage, ProviderError>>;

    fn get_thread(&self, id: &str) -> impl Future<Output = Result<Thread, ProviderError>>;
}

/// Gmail v1 REST client bound to one access token.
#[derive(Clone)]
pub struct GmailClient {
    http: Client,
    base_url: String,
    access_token: String,
}

impl GmailClient {
    pub fn new(config: &GmailConfig, access_token: String) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;
        let mut base_url = config.api_base_url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Ok(GmailClient { http, base_url, access_token })
    }

    fn url(&self, path: &str) -> String {
        format!("{}users/me/{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        let url = self.url(path);
        debug!("GET {}", url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await?;
        read_json(response).await
    }
}

impl MailProvider for GmailClient {
    async fn get_profile(&self) -> Result<Profile, ProviderError> {
        self.get_json("profile", &[]).await
    }

    async fn list_messages(
        &self,
        include_spam_trash: bool,
        page_token: Option<&str>,
    ) -> Result<MessageList, ProviderError> {
        let include = if include_spam_trash { "true" } else { "false" };
        let mut query = vec![("includeSpamTrash", include)];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }
        self.get_json("messages", &query).await
    }

    async fn get_message(&self, id: &str) -> Result<GmailMessage, ProviderError> {
        let path = format!("messages/{}", urlencoding::encode(id));
        self.get_json(&path, &[]).await
    }

    async fn get_thread(&self, id: &str) -> Result<Thread, ProviderError> {
        let path = format!("threads/{}", urlencoding::encode(id));
        self.get_json(&path, &[]).await
    }
}

/// Decode a JSON response, turning non-2xx statuses into `ProviderError::Api`.
pub async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ProviderError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(parse_error_body(status.as_u16(), &body));
    }
    Ok(serde_json::from_str(&body)?)
}

/// Google APIs answer errors either as `{"error": {"code", "message"}}` or,
/// from the OAuth endpoints, as `{"error": "...", "error_description": "..."}`.
pub fn parse_error_body(status: u16, body: &str) -> ProviderError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let (code, message) = match parsed.as_ref().and_then(|v| v.get("error")) {
        Some(Value::Object(error)) => (
            error
                .get("code")
                .and_then(Value::as_u64)
                .and_then(|code| u16::try_from(code).ok())
                .unwrap_or(status),
            error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        Some(Value::String(error)) => {
            let description = parsed
                .as_ref()
                .and_then(|v| v.get("error_description"))
                .and_then(Value::as_str);
            match description {
                Some(description) => (status, format!("{}: {}", error, description)),
                None => (status, error.clone()),
            }
        }
        _ => (status, body.trim().to_string()),
    };
    ProviderError::Api { code, message }
}
