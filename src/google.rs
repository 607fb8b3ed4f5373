use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::auth::{self, Credential};
use crate::config::GoogleConfig;
use crate::error::BriefError;

struct AccessToken {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

/// Shared HTTP client for the Google REST APIs, authorised by one session's
/// credential. A refreshed access token stays inside this client and is
/// dropped with it at the end of the briefing.
pub struct GoogleApi {
    pub calendar_api: String,
    pub people_api: String,
    pub gmail_api: String,
    credential: Credential,
    token: Mutex<AccessToken>,
    client: reqwest::Client,
}

impl GoogleApi {
    pub fn new(credential: &Credential, config: &GoogleConfig) -> Self {
        Self {
            calendar_api: config.calendar_api.trim_end_matches('/').to_string(),
            people_api: config.people_api.trim_end_matches('/').to_string(),
            gmail_api: config.gmail_api.trim_end_matches('/').to_string(),
            credential: credential.clone(),
            token: Mutex::new(AccessToken {
                value: credential.access_token.clone(),
                expires_at: credential.expires_at,
            }),
            client: reqwest::Client::new(),
        }
    }

    /// GET `url` with `query` and decode the JSON body.
    ///
    /// A 401 triggers one token refresh and retry; a second 401 means the
    /// credential is no longer usable.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, BriefError> {
        let token = self.current_token().await?;
        let mut response = self.send(url, query, &token).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            log::warn!("Google API: 401 from {}, refreshing token", url);
            let token = self.refresh().await?;
            response = self.send(url, query, &token).await?;
            if response.status() == StatusCode::UNAUTHORIZED {
                return Err(BriefError::CredentialExpired(
                    "Google rejected the refreshed token".to_string(),
                ));
            }
        }

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(BriefError::Provider(format!(
                "Google API error ({}) for {}: {}",
                status,
                url,
                error_text.chars().take(200).collect::<String>()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| BriefError::Provider(format!("malformed response from {}: {}", url, e)))
    }

    async fn send(
        &self,
        url: &str,
        query: &[(&str, String)],
        token: &str,
    ) -> Result<reqwest::Response, BriefError> {
        self.client
            .get(url)
            .query(query)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| BriefError::Provider(format!("request to {} failed: {}", url, e)))
    }

    async fn current_token(&self) -> Result<String, BriefError> {
        let expired = {
            let token = self.token.lock().await;
            token.expires_at.is_some_and(|at| at <= Utc::now())
        };
        if expired {
            return self.refresh().await;
        }
        Ok(self.token.lock().await.value.clone())
    }

    async fn refresh(&self) -> Result<String, BriefError> {
        let mut token = self.token.lock().await;
        let (value, expires_at) = auth::refresh_access_token(&self.client, &self.credential).await?;
        token.value = value.clone();
        token.expires_at = expires_at;
        Ok(value)
    }
}
