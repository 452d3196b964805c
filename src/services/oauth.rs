//! Google OAuth 2.0 authorization-code client.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::config::GoogleOAuthConfig;
use crate::services::strategy::FederatedProfile;

const SCOPES: &str = "openid email profile";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct UserInfo {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
}

impl From<UserInfo> for FederatedProfile {
    fn from(info: UserInfo) -> Self {
        Self {
            subject: info.sub,
            email: info.email,
            email_verified: info.email_verified,
            name: info.name,
        }
    }
}

pub struct GoogleOAuthClient {
    client: Client,
    config: GoogleOAuthConfig,
}

impl GoogleOAuthClient {
    pub fn new(config: GoogleOAuthConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build OAuth HTTP client")?;

        Ok(Self { client, config })
    }

    #[must_use]
    pub fn success_redirect(&self) -> &str {
        &self.config.success_redirect
    }

    #[must_use]
    pub fn failure_redirect(&self) -> &str {
        &self.config.failure_redirect
    }

    /// Provider consent URL carrying `state` for CSRF protection.
    pub fn authorize_url(&self, state: &str) -> Result<Url> {
        let mut url = Url::parse(&self.config.authorize_url).context("Invalid authorize_url")?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.callback_url)
            .append_pair("response_type", "code")
            .append_pair("scope", SCOPES)
            .append_pair("state", state);
        Ok(url)
    }

    /// Exchange an authorization code and fetch the user's profile.
    pub async fn fetch_profile(&self, code: &str) -> Result<FederatedProfile> {
        let token: TokenResponse = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.callback_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .context("Token request failed")?
            .error_for_status()
            .context("Token endpoint rejected the code")?
            .json()
            .await
            .context("Malformed token response")?;

        let info: UserInfo = self
            .client
            .get(&self.config.user_info_url)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .context("Userinfo request failed")?
            .error_for_status()
            .context("Userinfo endpoint rejected the token")?
            .json()
            .await
            .context("Malformed userinfo response")?;

        Ok(info.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GoogleOAuthClient {
        GoogleOAuthClient::new(GoogleOAuthConfig {
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            ..GoogleOAuthConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_authorize_url() {
        let url = client().authorize_url("xyz").unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(pairs["client_id"], "cid");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["scope"], "openid email profile");
        assert_eq!(pairs["state"], "xyz");
        assert_eq!(
            pairs["redirect_uri"],
            "http://localhost:3001/api/auth/google/callback"
        );
    }

    #[test]
    fn test_userinfo_mapping() {
        let info: UserInfo = serde_json::from_str(
            r#"{"sub":"123","email":"bob@x.com","email_verified":true,"name":"Bob"}"#,
        )
        .unwrap();
        let profile = FederatedProfile::from(info);
        assert_eq!(profile.verified_email(), Some("bob@x.com"));

        let info: UserInfo = serde_json::from_str(r#"{"sub":"123","email":"bob@x.com"}"#).unwrap();
        let profile = FederatedProfile::from(info);
        assert_eq!(profile.verified_email(), None);
    }
}
