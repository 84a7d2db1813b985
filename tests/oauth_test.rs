// ABOUTME: Integration tests for OAuth flows against in-process mock providers
// ABOUTME: Covers state redemption, sealed token storage, refresh, and revocation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Stride Fitness

mod common;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use common::register_user;
use stride_identity::auth::AuthManager;
use stride_identity::crypto::{self, TokenCipher};
use stride_identity::database::Database;
use stride_identity::errors::{AuthError, AuthResult};
use stride_identity::models::ConnectionStatus;
use stride_identity::oauth::manager::OAuthBroker;
use stride_identity::oauth::{OAuthProvider, ProviderRegistry, TokenBundle};

/// Provider that hands out canned tokens without any network traffic
struct MockProvider {
    name: &'static str,
    fail_refresh: bool,
}

impl MockProvider {
    const fn named(name: &'static str) -> Self {
        Self {
            name,
            fail_refresh: false,
        }
    }
}

#[async_trait]
impl OAuthProvider for MockProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn authorize_url(
        &self,
        redirect_uri: &str,
        state: &str,
        code_challenge: &str,
    ) -> AuthResult<String> {
        Ok(format!(
            "https://{}.test/authorize?redirect_uri={redirect_uri}&state={state}&code_challenge={code_challenge}",
            self.name
        ))
    }

    async fn exchange_code(
        &self,
        code: &str,
        _redirect_uri: &str,
        _code_verifier: &str,
    ) -> AuthResult<TokenBundle> {
        if code == "bad-code" {
            return Err(AuthError::ProviderExchangeFailed("bad code".to_owned()));
        }
        Ok(TokenBundle {
            access_token: format!("{}-access-1", self.name),
            refresh_token: Some(format!("{}-refresh-1", self.name)),
            expires_at: Some(Utc::now() + Duration::hours(6)),
            scope: Some("read".to_owned()),
        })
    }

    async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenBundle> {
        if self.fail_refresh {
            return Err(AuthError::ProviderExchangeFailed(
                "refresh rejected".to_owned(),
            ));
        }
        assert_eq!(refresh_token, format!("{}-refresh-1", self.name));
        Ok(TokenBundle {
            access_token: format!("{}-access-2", self.name),
            refresh_token: Some(format!("{}-refresh-2", self.name)),
            expires_at: Some(Utc::now() + Duration::hours(6)),
            scope: Some("read".to_owned()),
        })
    }
}

struct Fixture {
    database: Database,
    auth: AuthManager,
    broker: OAuthBroker,
}

async fn fixture_with(providers: Vec<Box<dyn OAuthProvider>>) -> Fixture {
    let database = common::test_database().await;
    let auth = AuthManager::new(database.clone(), common::test_auth_config());
    let mut registry = ProviderRegistry::new();
    for provider in providers {
        registry.register(provider);
    }
    let cipher = TokenCipher::new(crypto::generate_encryption_key().to_vec()).unwrap();
    let broker = OAuthBroker::new(database.clone(), cipher, registry, 10);
    Fixture {
        database,
        auth,
        broker,
    }
}

async fn fixture() -> Fixture {
    fixture_with(vec![
        Box::new(MockProvider::named("strava")),
        Box::new(MockProvider::named("garmin")),
    ])
    .await
}

#[tokio::test]
async fn full_link_flow_stores_decryptable_tokens() {
    let fx = fixture().await;
    let user = register_user(&fx.auth, "alice@example.com").await;

    let flow = fx
        .broker
        .start_flow(user.id, "strava", "https://app.test/cb")
        .await
        .unwrap();
    assert!(flow.authorization_url.contains(&flow.state));
    assert!(flow.expires_at > Utc::now());

    let athlete = fx
        .broker
        .complete_flow("strava", &flow.state, "good-code")
        .await
        .unwrap();
    assert_eq!(athlete.user_id, user.id);
    assert_eq!(athlete.name, "Alice Runner");

    let bundle = fx
        .broker
        .get_tokens(athlete.id, "strava")
        .await
        .unwrap()
        .expect("linked connection should have tokens");
    assert_eq!(bundle.access_token, "strava-access-1");
    assert_eq!(bundle.refresh_token.as_deref(), Some("strava-refresh-1"));
}

#[tokio::test]
async fn callback_replay_is_rejected() {
    let fx = fixture().await;
    let user = register_user(&fx.auth, "alice@example.com").await;

    let flow = fx
        .broker
        .start_flow(user.id, "strava", "https://app.test/cb")
        .await
        .unwrap();
    fx.broker
        .complete_flow("strava", &flow.state, "good-code")
        .await
        .unwrap();

    let err = fx
        .broker
        .complete_flow("strava", &flow.state, "good-code")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidState));
}

#[tokio::test]
async fn state_is_bound_to_the_provider_it_started_with() {
    let fx = fixture().await;
    let user = register_user(&fx.auth, "alice@example.com").await;

    let flow = fx
        .broker
        .start_flow(user.id, "strava", "https://app.test/cb")
        .await
        .unwrap();

    let err = fx
        .broker
        .complete_flow("garmin", &flow.state, "good-code")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidState));

    // The strava redemption still works after the mismatched attempt
    fx.broker
        .complete_flow("strava", &flow.state, "good-code")
        .await
        .unwrap();
}

#[tokio::test]
async fn failed_exchange_still_burns_the_state() {
    let fx = fixture().await;
    let user = register_user(&fx.auth, "alice@example.com").await;

    let flow = fx
        .broker
        .start_flow(user.id, "strava", "https://app.test/cb")
        .await
        .unwrap();

    let err = fx
        .broker
        .complete_flow("strava", &flow.state, "bad-code")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ProviderExchangeFailed(_)));

    let err = fx
        .broker
        .complete_flow("strava", &flow.state, "good-code")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidState));
}

#[tokio::test]
async fn unknown_provider_cannot_start_a_flow() {
    let fx = fixture().await;
    let user = register_user(&fx.auth, "alice@example.com").await;

    let err = fx
        .broker
        .start_flow(user.id, "fitbit", "https://app.test/cb")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::UnsupportedProvider(_)));
}

#[tokio::test]
async fn refresh_rotates_stored_tokens() {
    let fx = fixture().await;
    let user = register_user(&fx.auth, "alice@example.com").await;

    let flow = fx
        .broker
        .start_flow(user.id, "strava", "https://app.test/cb")
        .await
        .unwrap();
    let athlete = fx
        .broker
        .complete_flow("strava", &flow.state, "good-code")
        .await
        .unwrap();

    assert!(fx.broker.refresh_tokens(athlete.id, "strava").await.unwrap());

    let bundle = fx
        .broker
        .get_tokens(athlete.id, "strava")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bundle.access_token, "strava-access-2");
    assert_eq!(bundle.refresh_token.as_deref(), Some("strava-refresh-2"));
}

#[tokio::test]
async fn failed_refresh_keeps_old_tokens_and_flags_reauth() {
    let fx = fixture_with(vec![Box::new(MockProvider {
        name: "strava",
        fail_refresh: true,
    })])
    .await;
    let user = register_user(&fx.auth, "alice@example.com").await;

    let flow = fx
        .broker
        .start_flow(user.id, "strava", "https://app.test/cb")
        .await
        .unwrap();
    let athlete = fx
        .broker
        .complete_flow("strava", &flow.state, "good-code")
        .await
        .unwrap();

    assert!(!fx.broker.refresh_tokens(athlete.id, "strava").await.unwrap());

    // Stale tokens remain readable and the connection is flagged
    let bundle = fx
        .broker
        .get_tokens(athlete.id, "strava")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bundle.access_token, "strava-access-1");

    let connections = fx.broker.list_connections(athlete.id).await.unwrap();
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0].status, ConnectionStatus::NeedsReauth);
}

#[tokio::test]
async fn revoked_connections_yield_no_tokens() {
    let fx = fixture().await;
    let user = register_user(&fx.auth, "alice@example.com").await;

    let flow = fx
        .broker
        .start_flow(user.id, "strava", "https://app.test/cb")
        .await
        .unwrap();
    let athlete = fx
        .broker
        .complete_flow("strava", &flow.state, "good-code")
        .await
        .unwrap();

    assert!(fx.broker.revoke_connection(athlete.id, "strava").await.unwrap());
    assert!(fx
        .broker
        .get_tokens(athlete.id, "strava")
        .await
        .unwrap()
        .is_none());

    // Re-linking restores the connection
    let flow = fx
        .broker
        .start_flow(user.id, "strava", "https://app.test/cb")
        .await
        .unwrap();
    fx.broker
        .complete_flow("strava", &flow.state, "good-code")
        .await
        .unwrap();
    assert!(fx
        .broker
        .get_tokens(athlete.id, "strava")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn sync_bookkeeping_is_recorded_on_the_connection() {
    let fx = fixture().await;
    let user = register_user(&fx.auth, "alice@example.com").await;

    let flow = fx
        .broker
        .start_flow(user.id, "strava", "https://app.test/cb")
        .await
        .unwrap();
    let athlete = fx
        .broker
        .complete_flow("strava", &flow.state, "good-code")
        .await
        .unwrap();

    fx.broker.mark_synced(athlete.id, "strava").await.unwrap();
    fx.broker
        .record_rate_limit(athlete.id, "strava", 87, Some(Utc::now() + Duration::minutes(15)))
        .await
        .unwrap();

    let connection = &fx.broker.list_connections(athlete.id).await.unwrap()[0];
    assert!(connection.last_sync.is_some());
    assert_eq!(connection.rate_limit_remaining, Some(87));
    assert!(connection.rate_limit_reset.is_some());
    assert_eq!(connection.sync_frequency_minutes, 1440);
}

#[tokio::test]
async fn expiry_horizon_treats_missing_and_near_expiry_as_expiring() {
    let fx = fixture().await;
    let user = register_user(&fx.auth, "alice@example.com").await;

    let flow = fx
        .broker
        .start_flow(user.id, "strava", "https://app.test/cb")
        .await
        .unwrap();
    let athlete = fx
        .broker
        .complete_flow("strava", &flow.state, "good-code")
        .await
        .unwrap();

    let horizon = Duration::minutes(60);

    // No connection at all counts as expiring
    assert!(fx
        .broker
        .token_expiring_soon(athlete.id, "garmin", horizon)
        .await
        .unwrap());

    // Six hours out is comfortably beyond the horizon
    assert!(!fx
        .broker
        .token_expiring_soon(athlete.id, "strava", horizon)
        .await
        .unwrap());

    // Pull the expiry inside the horizon
    sqlx::query(
        "UPDATE provider_connections SET expires_at = $2 WHERE athlete_id = $1",
    )
    .bind(athlete.id.to_string())
    .bind(Utc::now() + Duration::minutes(5))
    .execute(fx.database.pool())
    .await
    .unwrap();
    assert!(fx
        .broker
        .token_expiring_soon(athlete.id, "strava", horizon)
        .await
        .unwrap());
}

#[tokio::test]
async fn corrupted_ciphertext_surfaces_as_an_error_not_an_absence() {
    let fx = fixture().await;
    let user = register_user(&fx.auth, "alice@example.com").await;

    let flow = fx
        .broker
        .start_flow(user.id, "strava", "https://app.test/cb")
        .await
        .unwrap();
    let athlete = fx
        .broker
        .complete_flow("strava", &flow.state, "good-code")
        .await
        .unwrap();

    sqlx::query(
        "UPDATE provider_connections SET tokens_encrypted = 'bm90LWEtY2lwaGVydGV4dA==' WHERE athlete_id = $1",
    )
    .bind(athlete.id.to_string())
    .execute(fx.database.pool())
    .await
    .unwrap();

    let err = fx.broker.get_tokens(athlete.id, "strava").await.unwrap_err();
    assert!(matches!(err, AuthError::ProviderTokenCorrupt));
}

#[tokio::test]
async fn expired_states_cannot_complete_and_are_cleaned_up() {
    let fx = fixture().await;
    let user = register_user(&fx.auth, "alice@example.com").await;

    let flow = fx
        .broker
        .start_flow(user.id, "strava", "https://app.test/cb")
        .await
        .unwrap();

    sqlx::query("UPDATE oauth_states SET expires_at = $2 WHERE state = $1")
        .bind(&flow.state)
        .bind(Utc::now() - Duration::minutes(1))
        .execute(fx.database.pool())
        .await
        .unwrap();

    let err = fx
        .broker
        .complete_flow("strava", &flow.state, "good-code")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidState));

    assert_eq!(fx.database.cleanup_expired().await.unwrap(), 1);
}
