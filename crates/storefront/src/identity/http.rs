//! Hosted auth endpoint client.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::instrument;
use url::Url;

use grocer_core::IdentityId;

use super::{AuthError, AuthProvider};
use crate::config::AuthConfig;

/// Mints anonymous identities through the hosted auth service.
///
/// Sends `POST {auth_url}/signup` with an empty JSON body; the service answers
/// with the new user record.
#[derive(Clone)]
pub struct HttpAuthProvider {
    inner: Arc<HttpAuthProviderInner>,
}

struct HttpAuthProviderInner {
    client: reqwest::Client,
    signup_url: Url,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SignupResponse {
    user: SignupUser,
}

#[derive(Debug, Deserialize)]
struct SignupUser {
    id: uuid::Uuid,
}

impl HttpAuthProvider {
    /// Create a new auth client.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidUrl` if the signup URL cannot be derived.
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let signup_url = signup_url(&config.url)?;
        Ok(Self {
            inner: Arc::new(HttpAuthProviderInner {
                client: reqwest::Client::new(),
                signup_url,
                api_key: config.api_key.expose_secret().to_string(),
            }),
        })
    }
}

/// `{base}/signup`, keeping any path prefix on `base`.
fn signup_url(base: &Url) -> Result<Url, url::ParseError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join("signup")
}

fn parse_signup(body: &str) -> Result<IdentityId, AuthError> {
    let response: SignupResponse = serde_json::from_str(body)?;
    Ok(IdentityId::new(response.user.id))
}

#[async_trait]
impl AuthProvider for HttpAuthProvider {
    #[instrument(skip(self))]
    async fn mint_anonymous(&self) -> Result<IdentityId, AuthError> {
        let response = self
            .inner
            .client
            .post(self.inner.signup_url.clone())
            .header("apikey", &self.inner.api_key)
            .bearer_auth(&self.inner.api_key)
            .json(&serde_json::json!({}))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        parse_signup(&body)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_signup_url_keeps_prefix() {
        let base = Url::parse("https://auth.example.com/auth/v1").unwrap();
        assert_eq!(
            signup_url(&base).unwrap().as_str(),
            "https://auth.example.com/auth/v1/signup"
        );

        let base = Url::parse("https://auth.example.com/").unwrap();
        assert_eq!(
            signup_url(&base).unwrap().as_str(),
            "https://auth.example.com/signup"
        );
    }

    #[test]
    fn test_parse_signup_response() {
        let body = r#"{"access_token":"t","user":{"id":"7d0f3c9a-6f1e-4c43-9a57-0e0c2f3b2a11","is_anonymous":true}}"#;
        let id = parse_signup(body).unwrap();
        assert_eq!(id.to_string(), "7d0f3c9a-6f1e-4c43-9a57-0e0c2f3b2a11");
    }

    #[test]
    fn test_parse_signup_rejects_missing_user() {
        assert!(matches!(
            parse_signup(r#"{"access_token":"t"}"#),
            Err(AuthError::MalformedResponse(_))
        ));
    }
}
