use chrono::{DateTime, Duration, Utc};
use reqwest::Url;
use serde::Deserialize;

use crate::config::GoogleConfig;
use crate::error::BriefError;

/// Read-only scopes every briefing source needs.
pub const SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/calendar.readonly",
    "https://www.googleapis.com/auth/contacts.readonly",
    "https://www.googleapis.com/auth/gmail.readonly",
];

/// Authorization for the Google APIs on behalf of one user.
#[derive(Debug, Clone)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// True when every required scope was granted.
    pub fn covers(&self, required: &[&str]) -> bool {
        required
            .iter()
            .all(|scope| self.scopes.iter().any(|granted| granted == scope))
    }
}

/// Token endpoint response (both code exchange and refresh).
#[derive(Debug, Deserialize)]
pub struct TokenGrant {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl TokenGrant {
    fn failure(&self) -> Option<String> {
        self.error.as_ref().map(|e| match &self.error_description {
            Some(desc) => format!("{}: {}", e, desc),
            None => e.clone(),
        })
    }

    fn expiry(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in.map(|secs| now + Duration::seconds(secs))
    }
}

/// The OAuth consent handshake: build the consent URL, trade a code for a
/// [`Credential`].
pub struct OAuthFlow {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    auth_uri: String,
    token_uri: String,
    http: reqwest::Client,
}

impl OAuthFlow {
    pub fn new(config: &GoogleConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            auth_uri: config.auth_uri.clone(),
            token_uri: config.token_uri.clone(),
            http: reqwest::Client::new(),
        }
    }

    /// Consent URL asking for offline access to the read-only scopes.
    pub fn authorization_url(&self, state: &str) -> Result<String, BriefError> {
        let scope = SCOPES.join(" ");
        let url = Url::parse_with_params(
            &self.auth_uri,
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", scope.as_str()),
                ("state", state),
                ("access_type", "offline"),
                ("include_granted_scopes", "true"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| BriefError::Configuration(format!("invalid auth_uri: {}", e)))?;
        Ok(url.to_string())
    }

    /// Exchange an authorization code for a credential.
    pub async fn exchange_code(&self, code: &str) -> Result<Credential, BriefError> {
        log::info!("OAuth: exchanging authorization code");

        let response = self
            .http
            .post(&self.token_uri)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| BriefError::Authorization(format!("token endpoint unreachable: {}", e)))?;

        let status = response.status();
        let grant: TokenGrant = response
            .json()
            .await
            .map_err(|e| BriefError::Authorization(format!("malformed token response: {}", e)))?;

        if let Some(reason) = grant.failure() {
            return Err(BriefError::Authorization(reason));
        }
        if !status.is_success() {
            return Err(BriefError::Authorization(format!(
                "token endpoint returned {}",
                status
            )));
        }

        let access_token = grant
            .access_token
            .clone()
            .ok_or_else(|| BriefError::Authorization("no access token granted".to_string()))?;

        let scopes = match &grant.scope {
            Some(scope) => scope.split_whitespace().map(str::to_string).collect(),
            None => SCOPES.iter().map(|s| s.to_string()).collect(),
        };

        let credential = Credential {
            access_token,
            refresh_token: grant.refresh_token.clone(),
            token_uri: self.token_uri.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            scopes,
            expires_at: grant.expiry(Utc::now()),
        };

        if !credential.covers(&SCOPES) {
            return Err(BriefError::Authorization(
                "not all required permissions were granted".to_string(),
            ));
        }

        log::info!(
            "OAuth: credential obtained (refresh token: {})",
            credential.refresh_token.is_some()
        );
        Ok(credential)
    }
}

/// Obtain a fresh access token for `credential`.
pub async fn refresh_access_token(
    http: &reqwest::Client,
    credential: &Credential,
) -> Result<(String, Option<DateTime<Utc>>), BriefError> {
    let refresh_token = credential.refresh_token.as_deref().ok_or_else(|| {
        BriefError::CredentialExpired("access token expired and no refresh token".to_string())
    })?;

    log::info!("OAuth: refreshing access token");

    let response = http
        .post(&credential.token_uri)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", credential.client_id.as_str()),
            ("client_secret", credential.client_secret.as_str()),
        ])
        .send()
        .await
        .map_err(|e| BriefError::Provider(format!("token endpoint unreachable: {}", e)))?;

    let status = response.status();
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(BriefError::Provider(format!("token endpoint returned {}", status)));
    }

    // 400/401 carry an OAuth error body; a missing or garbled body there still
    // means the grant was refused.
    let rejected = status.is_client_error();
    let grant: TokenGrant = match response.json().await {
        Ok(grant) => grant,
        Err(e) if rejected => {
            return Err(BriefError::CredentialExpired(format!(
                "refresh rejected with {}: {}",
                status, e
            )))
        }
        Err(e) => {
            return Err(BriefError::Provider(format!(
                "malformed refresh response: {}",
                e
            )))
        }
    };

    if let Some(reason) = grant.failure() {
        return Err(BriefError::CredentialExpired(reason));
    }
    if rejected {
        return Err(BriefError::CredentialExpired(format!(
            "refresh rejected with {}",
            status
        )));
    }
    match grant.access_token.clone() {
        Some(token) if status.is_success() => Ok((token, grant.expiry(Utc::now()))),
        _ => Err(BriefError::Provider(format!(
            "refresh returned {} without an access token",
            status
        ))),
    }
}

/// Pull the authorization code (and state, if any) out of what the user pasted:
/// either the bare code or the whole redirect URL.
pub fn parse_redirect(input: &str) -> Result<(String, Option<String>), BriefError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(BriefError::Authorization("no authorization code given".to_string()));
    }

    let Ok(url) = Url::parse(input) else {
        return Ok((input.to_string(), None));
    };

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => return Err(BriefError::Authorization(value.into_owned())),
            _ => {}
        }
    }

    code.map(|c| (c, state))
        .ok_or_else(|| BriefError::Authorization("redirect URL has no code".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn google_config(token_uri: String) -> GoogleConfig {
        GoogleConfig {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            redirect_uri: "http://localhost:8501".to_string(),
            auth_uri: crate::config::GOOGLE_AUTH_URI.to_string(),
            token_uri,
            calendar_api: crate::config::CALENDAR_API.to_string(),
            people_api: crate::config::PEOPLE_API.to_string(),
            gmail_api: crate::config::GMAIL_API.to_string(),
        }
    }

    #[test]
    fn test_authorization_url_carries_scopes_and_state() {
        let flow = OAuthFlow::new(&google_config(crate::config::GOOGLE_TOKEN_URI.to_string()));
        let url = flow.authorization_url("abc123").unwrap();
        let parsed = Url::parse(&url).unwrap();
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let get = |k: &str| pairs.iter().find(|(key, _)| key == k).map(|(_, v)| v.clone());

        assert_eq!(get("state").as_deref(), Some("abc123"));
        assert_eq!(get("access_type").as_deref(), Some("offline"));
        assert_eq!(get("prompt").as_deref(), Some("consent"));
        let scope = get("scope").unwrap();
        for required in SCOPES {
            assert!(scope.contains(required));
        }
    }

    #[test]
    fn test_parse_redirect_variants() {
        let (code, state) =
            parse_redirect("http://localhost:8501/?state=xyz&code=4%2F0Ab&scope=a").unwrap();
        assert_eq!(code, "4/0Ab");
        assert_eq!(state.as_deref(), Some("xyz"));

        let (code, state) = parse_redirect("  4/0AbCode  ").unwrap();
        assert_eq!(code, "4/0AbCode");
        assert!(state.is_none());

        assert!(matches!(
            parse_redirect("http://localhost:8501/?error=access_denied"),
            Err(BriefError::Authorization(_))
        ));
        assert!(parse_redirect("   ").is_err());
    }

    #[test]
    fn test_credential_covers() {
        let mut credential = Credential {
            access_token: "a".to_string(),
            refresh_token: None,
            token_uri: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
            expires_at: None,
        };
        assert!(credential.covers(&SCOPES));
        credential.scopes.pop();
        assert!(!credential.covers(&SCOPES));
    }

    #[tokio::test]
    async fn test_exchange_code_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.token",
                "refresh_token": "1//refresh",
                "expires_in": 3599,
                "scope": SCOPES.join(" "),
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let flow = OAuthFlow::new(&google_config(format!("{}/token", server.uri())));
        let credential = flow.exchange_code("the-code").await.unwrap();
        assert_eq!(credential.access_token, "ya29.token");
        assert_eq!(credential.refresh_token.as_deref(), Some("1//refresh"));
        assert!(credential.expires_at.is_some());
        assert!(credential.covers(&SCOPES));
    }

    #[tokio::test]
    async fn test_exchange_code_denied() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Bad Request"
            })))
            .mount(&server)
            .await;

        let flow = OAuthFlow::new(&google_config(format!("{}/token", server.uri())));
        let err = flow.exchange_code("stale").await.unwrap_err();
        assert!(matches!(err, BriefError::Authorization(ref m) if m.contains("invalid_grant")));
    }

    #[tokio::test]
    async fn test_exchange_code_missing_scope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.token",
                "scope": SCOPES[0]
            })))
            .mount(&server)
            .await;

        let flow = OAuthFlow::new(&google_config(format!("{}/token", server.uri())));
        assert!(matches!(
            flow.exchange_code("code").await,
            Err(BriefError::Authorization(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_is_expired() {
        let credential = Credential {
            access_token: "old".to_string(),
            refresh_token: None,
            token_uri: "http://127.0.0.1:9/token".to_string(),
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            scopes: vec![],
            expires_at: None,
        };
        let err = refresh_access_token(&reqwest::Client::new(), &credential)
            .await
            .unwrap_err();
        assert!(err.clears_session());
    }

    fn refreshable(token_uri: String) -> Credential {
        Credential {
            access_token: "old".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            token_uri,
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            scopes: vec![],
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_refresh_outage_keeps_credential() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(503).set_body_string("<html>Service Unavailable</html>"),
            )
            .mount(&server)
            .await;

        let credential = refreshable(format!("{}/token", server.uri()));
        let err = refresh_access_token(&reqwest::Client::new(), &credential)
            .await
            .unwrap_err();
        assert!(matches!(err, BriefError::Provider(_)));
        assert!(!err.clears_session());
    }

    #[tokio::test]
    async fn test_refresh_unreachable_keeps_credential() {
        let credential = refreshable("http://127.0.0.1:9/token".to_string());
        let err = refresh_access_token(&reqwest::Client::new(), &credential)
            .await
            .unwrap_err();
        assert!(matches!(err, BriefError::Provider(_)));
    }

    #[tokio::test]
    async fn test_refresh_invalid_grant_is_expired() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .mount(&server)
            .await;

        let credential = refreshable(format!("{}/token", server.uri()));
        let err = refresh_access_token(&reqwest::Client::new(), &credential)
            .await
            .unwrap_err();
        assert!(matches!(err, BriefError::CredentialExpired(ref m) if m.contains("invalid_grant")));
        assert!(err.clears_session());
    }

    #[tokio::test]
    async fn test_refresh_unauthorized_without_body_is_expired() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let credential = refreshable(format!("{}/token", server.uri()));
        let err = refresh_access_token(&reqwest::Client::new(), &credential)
            .await
            .unwrap_err();
        assert!(err.clears_session());
    }
}
