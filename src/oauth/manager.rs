// ABOUTME: OAuth flow orchestration: PKCE state, code exchange, and sealed token storage
// ABOUTME: States redeem at most once; token material is ciphertext everywhere past this point
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Stride Fitness

use super::{ProviderRegistry, TokenBundle};
use crate::constants::limits;
use crate::crypto::{self, TokenCipher};
use crate::database::{Database, OAuthStateRecord};
use crate::errors::{AuthError, AuthResult};
use crate::models::{Athlete, ConnectionStatus, ProviderConnection};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Everything a caller needs to redirect a user into an authorization flow
#[derive(Debug, Clone)]
pub struct FlowStart {
    /// Provider authorization URL including state and PKCE challenge
    pub authorization_url: String,
    /// State nonce that will come back on the callback
    pub state: String,
    /// When the pending flow expires
    pub expires_at: DateTime<Utc>,
}

/// Orchestrates OAuth flows against the registered providers
pub struct OAuthBroker {
    database: Database,
    cipher: TokenCipher,
    registry: ProviderRegistry,
    state_ttl: Duration,
}

impl OAuthBroker {
    /// Create a broker over the given storage and provider registry
    #[must_use]
    pub fn new(
        database: Database,
        cipher: TokenCipher,
        registry: ProviderRegistry,
        state_ttl_minutes: i64,
    ) -> Self {
        Self {
            database,
            cipher,
            registry,
            state_ttl: Duration::minutes(state_ttl_minutes),
        }
    }

    /// Begin an authorization flow for a user against a provider.
    ///
    /// Generates a fresh state nonce and PKCE verifier, records them with a
    /// TTL, and returns the authorization URL to redirect to.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnsupportedProvider`] for unknown or
    /// unconfigured providers
    pub async fn start_flow(
        &self,
        user_id: Uuid,
        provider_name: &str,
        redirect_uri: &str,
    ) -> AuthResult<FlowStart> {
        let provider = self.registry.get(provider_name)?;

        let state = crypto::generate_secret();
        let code_verifier = crypto::generate_secret();
        let authorization_url =
            provider.authorize_url(redirect_uri, &state, &crypto::pkce_challenge(&code_verifier))?;

        let expires_at = Utc::now() + self.state_ttl;
        self.database
            .insert_oauth_state(
                &state,
                &OAuthStateRecord {
                    user_id,
                    provider: provider_name.to_owned(),
                    code_verifier,
                    redirect_uri: redirect_uri.to_owned(),
                },
                expires_at,
            )
            .await?;

        tracing::debug!(user_id = %user_id, provider = provider_name, "started oauth flow");
        Ok(FlowStart {
            authorization_url,
            state,
            expires_at,
        })
    }

    /// Complete an authorization callback.
    ///
    /// The state is consumed atomically, so replaying a callback fails with
    /// [`AuthError::InvalidState`] even under concurrent delivery. On
    /// success the exchanged tokens are sealed and stored against the
    /// user's athlete profile, creating one if needed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidState`] for unknown, expired, used, or
    /// provider-mismatched states and [`AuthError::ProviderExchangeFailed`]
    /// when the code exchange fails
    pub async fn complete_flow(
        &self,
        provider_name: &str,
        state: &str,
        code: &str,
    ) -> AuthResult<Athlete> {
        let record = self
            .database
            .consume_oauth_state(state, provider_name)
            .await?
            .ok_or(AuthError::InvalidState)?;

        let provider = self.registry.get(provider_name)?;
        let bundle = provider
            .exchange_code(code, &record.redirect_uri, &record.code_verifier)
            .await?;

        let athlete = match self.database.resolve_athlete(record.user_id).await? {
            Some(athlete) => athlete,
            None => {
                let user = self
                    .database
                    .get_user_by_id(record.user_id)
                    .await?
                    .ok_or(AuthError::Unauthenticated)?;
                self.database
                    .create_athlete(user.id, &user.full_name())
                    .await?
            }
        };

        self.store_bundle(athlete.id, provider_name, &bundle, true)
            .await?;
        tracing::info!(
            athlete_id = %athlete.id,
            provider = provider_name,
            "linked provider connection"
        );
        Ok(athlete)
    }

    /// Decrypt and return the token bundle for a connection.
    ///
    /// Returns `None` when no live connection exists. Ciphertext that fails
    /// to decrypt is an error, not an absence, so corruption and key
    /// mismatches surface instead of looking like a missing link.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ProviderTokenCorrupt`] when stored ciphertext
    /// cannot be opened
    pub async fn get_tokens(
        &self,
        athlete_id: Uuid,
        provider_name: &str,
    ) -> AuthResult<Option<TokenBundle>> {
        let Some((ciphertext, _)) = self
            .database
            .get_connection_ciphertext(athlete_id, provider_name)
            .await?
        else {
            return Ok(None);
        };

        let plaintext = self.cipher.open(&ciphertext)?;
        let bundle = serde_json::from_slice(&plaintext)
            .map_err(|_| AuthError::ProviderTokenCorrupt)?;
        Ok(Some(bundle))
    }

    /// Try to refresh a connection's tokens.
    ///
    /// Returns `true` when fresh tokens were stored. A missing connection,
    /// a connection with no refresh token, or a provider-side failure all
    /// return `false` without erroring; the stale tokens stay in place and
    /// a provider failure marks the connection as needing re-auth.
    ///
    /// # Errors
    ///
    /// Returns an error only for storage or decryption failures
    pub async fn refresh_tokens(
        &self,
        athlete_id: Uuid,
        provider_name: &str,
    ) -> AuthResult<bool> {
        let Some((_, Some(refresh_ciphertext))) = self
            .database
            .get_connection_ciphertext(athlete_id, provider_name)
            .await?
        else {
            return Ok(false);
        };

        let refresh_token = String::from_utf8(self.cipher.open(&refresh_ciphertext)?)
            .map_err(|_| AuthError::ProviderTokenCorrupt)?;

        let provider = self.registry.get(provider_name)?;
        let bundle = match provider.refresh(&refresh_token).await {
            Ok(bundle) => bundle,
            Err(e) => {
                tracing::warn!(
                    athlete_id = %athlete_id,
                    provider = provider_name,
                    error = %e,
                    "token refresh failed, connection needs re-auth"
                );
                self.database
                    .set_connection_status(athlete_id, provider_name, ConnectionStatus::NeedsReauth)
                    .await?;
                return Ok(false);
            }
        };

        self.store_bundle(athlete_id, provider_name, &bundle, false)
            .await?;
        Ok(true)
    }

    /// Disconnect a provider, marking its connection revoked.
    ///
    /// Returns `true` if a connection existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn revoke_connection(
        &self,
        athlete_id: Uuid,
        provider_name: &str,
    ) -> AuthResult<bool> {
        let revoked = self
            .database
            .set_connection_status(athlete_id, provider_name, ConnectionStatus::Revoked)
            .await?;
        if revoked {
            tracing::info!(
                athlete_id = %athlete_id,
                provider = provider_name,
                "revoked provider connection"
            );
        }
        Ok(revoked)
    }

    /// Whether a connection's access token is missing, already expired, or
    /// due to expire within `horizon`.
    ///
    /// Unknown expiry counts as expiring, so callers refresh rather than
    /// risk a dead token mid-sync.
    /// [`limits::TOKEN_EXPIRY_HORIZON_MINUTES`] is the usual horizon.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails
    pub async fn token_expiring_soon(
        &self,
        athlete_id: Uuid,
        provider_name: &str,
        horizon: Duration,
    ) -> AuthResult<bool> {
        let Some(connection) = self
            .database
            .get_connection(athlete_id, provider_name)
            .await?
        else {
            return Ok(true);
        };
        let cutoff = Utc::now() + horizon;
        Ok(connection
            .expires_at
            .is_none_or(|expires| expires <= cutoff))
    }

    /// List every connection an athlete holds, token material excluded
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn list_connections(
        &self,
        athlete_id: Uuid,
    ) -> AuthResult<Vec<ProviderConnection>> {
        self.database.list_connections(athlete_id).await
    }

    /// Stamp a connection's sync watermark after a successful data pull
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn mark_synced(&self, athlete_id: Uuid, provider_name: &str) -> AuthResult<()> {
        self.database.mark_synced(athlete_id, provider_name).await
    }

    /// Record the rate-limit window a provider reported on its last response
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn record_rate_limit(
        &self,
        athlete_id: Uuid,
        provider_name: &str,
        remaining: i64,
        reset_at: Option<DateTime<Utc>>,
    ) -> AuthResult<()> {
        self.database
            .update_rate_limit(athlete_id, provider_name, remaining, reset_at)
            .await
    }

    async fn store_bundle(
        &self,
        athlete_id: Uuid,
        provider_name: &str,
        bundle: &TokenBundle,
        is_new_link: bool,
    ) -> AuthResult<()> {
        let tokens_encrypted = self.cipher.seal(&serde_json::to_vec(bundle)?)?;
        let refresh_encrypted = bundle
            .refresh_token
            .as_ref()
            .map(|rt| self.cipher.seal(rt.as_bytes()))
            .transpose()?;

        if is_new_link {
            self.database
                .upsert_connection(
                    athlete_id,
                    provider_name,
                    &tokens_encrypted,
                    refresh_encrypted.as_deref(),
                    bundle.expires_at,
                    limits::DEFAULT_SYNC_FREQUENCY_MINUTES,
                )
                .await
        } else {
            self.database
                .update_connection_tokens(
                    athlete_id,
                    provider_name,
                    &tokens_encrypted,
                    refresh_encrypted.as_deref(),
                    bundle.expires_at,
                )
                .await
        }
    }
}
