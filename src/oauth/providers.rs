// ABOUTME: HTTP-backed OAuth provider driven by catalog configuration
// ABOUTME: One implementation covers Strava and Garmin; the entry supplies URLs and scopes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Stride Fitness

use super::{OAuthProvider, TokenBundle};
use crate::config::ProviderEntry;
use crate::constants::limits;
use crate::errors::{AuthError, AuthResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::time::Duration as StdDuration;

/// Wire shape of a token endpoint response.
///
/// Strava reports `expires_at` as unix seconds; other providers report
/// `expires_in` relative seconds. Both are accepted.
#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    scope: Option<String>,
}

impl TokenEndpointResponse {
    fn into_bundle(self) -> TokenBundle {
        let expires_at = self
            .expires_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .or_else(|| self.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)));
        TokenBundle {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            scope: self.scope,
        }
    }
}

/// OAuth provider that talks to a real token endpoint over HTTPS
pub struct HttpOAuthProvider {
    entry: ProviderEntry,
    client: reqwest::Client,
}

impl HttpOAuthProvider {
    /// Build a provider from its catalog entry
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed
    pub fn new(entry: ProviderEntry) -> AuthResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(limits::PROVIDER_HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| AuthError::Internal(format!("failed to build http client: {e}")))?;
        Ok(Self { entry, client })
    }

    fn credentials(&self) -> AuthResult<(&str, &str)> {
        match (&self.entry.client_id, &self.entry.client_secret) {
            (Some(id), Some(secret)) => Ok((id, secret)),
            _ => Err(AuthError::UnsupportedProvider(format!(
                "{} is not configured",
                self.entry.name
            ))),
        }
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> AuthResult<TokenBundle> {
        let response = self
            .client
            .post(&self.entry.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| AuthError::ProviderExchangeFailed(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::ProviderExchangeFailed(format!(
                "{} token endpoint returned {status}: {body}",
                self.entry.name
            )));
        }

        let parsed: TokenEndpointResponse = response
            .json()
            .await
            .map_err(|e| AuthError::ProviderExchangeFailed(format!("malformed response: {e}")))?;
        Ok(parsed.into_bundle())
    }
}

#[async_trait]
impl OAuthProvider for HttpOAuthProvider {
    fn name(&self) -> &str {
        &self.entry.name
    }

    fn authorize_url(
        &self,
        redirect_uri: &str,
        state: &str,
        code_challenge: &str,
    ) -> AuthResult<String> {
        let (client_id, _) = self.credentials()?;
        Ok(format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&state={}&scope={}&code_challenge={}&code_challenge_method=S256",
            self.entry.auth_url,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(state),
            urlencoding::encode(&self.entry.scope),
            urlencoding::encode(code_challenge),
        ))
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> AuthResult<TokenBundle> {
        let (client_id, client_secret) = self.credentials()?;
        self.token_request(&[
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
            ("code_verifier", code_verifier),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenBundle> {
        let (client_id, client_secret) = self.credentials()?;
        self.token_request(&[
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ProviderEntry {
        ProviderEntry {
            name: "strava".to_owned(),
            client_id: Some("12345".to_owned()),
            client_secret: Some("shhh".to_owned()),
            auth_url: "https://www.strava.com/oauth/authorize".to_owned(),
            token_url: "https://www.strava.com/oauth/token".to_owned(),
            scope: "read,activity:read_all".to_owned(),
            enabled: true,
        }
    }

    #[test]
    fn authorize_url_carries_pkce_and_state() {
        let provider = HttpOAuthProvider::new(entry()).unwrap();
        let url = provider
            .authorize_url("https://app.example.com/cb", "st4te", "ch4llenge")
            .unwrap();
        assert!(url.starts_with("https://www.strava.com/oauth/authorize?"));
        assert!(url.contains("client_id=12345"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fapp.example.com%2Fcb"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("state=st4te"));
        assert!(url.contains("code_challenge=ch4llenge"));
        assert!(url.contains("code_challenge_method=S256"));
    }

    #[test]
    fn unconfigured_provider_cannot_start_a_flow() {
        let mut unconfigured = entry();
        unconfigured.client_id = None;
        let provider = HttpOAuthProvider::new(unconfigured).unwrap();
        let err = provider
            .authorize_url("https://app.example.com/cb", "s", "c")
            .unwrap_err();
        assert!(matches!(err, AuthError::UnsupportedProvider(_)));
    }

    #[test]
    fn expires_at_wins_over_expires_in() {
        let response = TokenEndpointResponse {
            access_token: "at".to_owned(),
            refresh_token: None,
            expires_in: Some(3600),
            expires_at: Some(1_700_000_000),
            scope: None,
        };
        let bundle = response.into_bundle();
        assert_eq!(
            bundle.expires_at,
            DateTime::from_timestamp(1_700_000_000, 0)
        );
    }
}
