// ABOUTME: Integration tests for registration, login, lockout, and session lifecycle
// ABOUTME: Covers the credential failure paths and the refresh token lifecycle end to end
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Stride Fitness

mod common;

use common::{new_user, register_user, test_auth_config, test_database, TEST_PASSWORD};
use stride_identity::auth::AuthManager;
use stride_identity::errors::AuthError;
use stride_identity::models::{UserStatus, UserUpdate};

#[tokio::test]
async fn file_backed_database_is_created_on_first_open() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}/identity.db", dir.path().display());

    let database = stride_identity::database::Database::new(&url).await.unwrap();
    let auth = AuthManager::new(database, test_auth_config());
    register_user(&auth, "alice@example.com").await;

    // Reopening the same file sees the persisted user
    let database = stride_identity::database::Database::new(&url).await.unwrap();
    let auth = AuthManager::new(database, test_auth_config());
    auth.authenticate("alice@example.com", TEST_PASSWORD)
        .await
        .unwrap();
}

#[tokio::test]
async fn register_then_authenticate() {
    let auth = common::test_auth_manager().await;
    let user = register_user(&auth, "alice@example.com").await;

    assert_eq!(user.email, "alice@example.com");
    assert!(user.tenant_id.starts_with("tenant_"));
    assert!(user.is_active);

    let logged_in = auth
        .authenticate("alice@example.com", TEST_PASSWORD)
        .await
        .unwrap();
    assert_eq!(logged_in.id, user.id);
    assert!(logged_in.last_login.is_some());
}

#[tokio::test]
async fn email_is_normalized_and_unique() {
    let auth = common::test_auth_manager().await;
    let mut request = new_user("  Alice@Example.COM ");
    let user = auth.register(request.clone()).await.unwrap();
    assert_eq!(user.email, "alice@example.com");

    request.email = "ALICE@example.com".to_owned();
    let err = auth.register(request).await.unwrap_err();
    assert!(matches!(err, AuthError::Conflict(_)));

    // Lookup works regardless of case
    auth.authenticate("ALICE@EXAMPLE.COM", TEST_PASSWORD)
        .await
        .unwrap();
}

#[tokio::test]
async fn plaintext_password_is_never_stored() {
    let auth = common::test_auth_manager().await;
    let user = register_user(&auth, "alice@example.com").await;
    assert!(user.password_hash.starts_with("$argon2"));
    assert!(!user.password_hash.contains(TEST_PASSWORD));
}

#[tokio::test]
async fn register_rejects_bad_input() {
    let auth = common::test_auth_manager().await;

    let mut bad_email = new_user("not-an-email");
    assert!(matches!(
        auth.register(bad_email.clone()).await.unwrap_err(),
        AuthError::InvalidInput(_)
    ));

    bad_email.email = "alice@example.com".to_owned();
    bad_email.password = "short".to_owned();
    assert!(matches!(
        auth.register(bad_email.clone()).await.unwrap_err(),
        AuthError::InvalidInput(_)
    ));

    bad_email.password = TEST_PASSWORD.to_owned();
    bad_email.first_name = String::new();
    assert!(matches!(
        auth.register(bad_email).await.unwrap_err(),
        AuthError::InvalidInput(_)
    ));
}

#[tokio::test]
async fn wrong_password_and_unknown_email_are_indistinguishable() {
    let auth = common::test_auth_manager().await;
    register_user(&auth, "alice@example.com").await;

    let wrong = auth
        .authenticate("alice@example.com", "wrong-password")
        .await
        .unwrap_err();
    let unknown = auth
        .authenticate("nobody@example.com", TEST_PASSWORD)
        .await
        .unwrap_err();
    assert_eq!(wrong.to_string(), unknown.to_string());
    assert!(matches!(wrong, AuthError::Unauthenticated));
    assert!(matches!(unknown, AuthError::Unauthenticated));
}

#[tokio::test]
async fn account_locks_after_repeated_failures_even_for_the_right_password() {
    let auth = common::test_auth_manager().await;
    register_user(&auth, "alice@example.com").await;

    for _ in 0..5 {
        let err = auth
            .authenticate("alice@example.com", "wrong-password")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated));
    }

    // Correct password while locked gains nothing
    let err = auth
        .authenticate("alice@example.com", TEST_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AccountLocked { .. }));

    // More wrong guesses while locked do not extend the window either
    let err = auth
        .authenticate("alice@example.com", "wrong-password")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AccountLocked { .. }));
}

#[tokio::test]
async fn lockout_expires_and_failure_count_resets() {
    let database = test_database().await;
    let auth = AuthManager::new(database.clone(), test_auth_config());
    let user = register_user(&auth, "alice@example.com").await;

    for _ in 0..5 {
        let _ = auth
            .authenticate("alice@example.com", "wrong-password")
            .await;
    }

    // Backdate the lock so the window has passed
    sqlx::query("UPDATE users SET locked_until = $2 WHERE id = $1")
        .bind(user.id.to_string())
        .bind(chrono::Utc::now() - chrono::Duration::minutes(1))
        .execute(database.pool())
        .await
        .unwrap();

    let logged_in = auth
        .authenticate("alice@example.com", TEST_PASSWORD)
        .await
        .unwrap();
    assert_eq!(logged_in.failed_login_attempts, 0);
    assert!(logged_in.locked_until.is_none());

    // One fresh failure does not re-lock from the stale count
    let _ = auth
        .authenticate("alice@example.com", "wrong-password")
        .await;
    auth.authenticate("alice@example.com", TEST_PASSWORD)
        .await
        .unwrap();
}

#[tokio::test]
async fn inactive_accounts_cannot_authenticate() {
    let auth = common::test_auth_manager().await;
    let user = register_user(&auth, "alice@example.com").await;

    auth.update_profile(
        user.id,
        UserUpdate {
            status: Some(UserStatus::Suspended),
            ..UserUpdate::default()
        },
    )
    .await
    .unwrap();

    let err = auth
        .authenticate("alice@example.com", TEST_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AccountInactive));
}

#[tokio::test]
async fn access_tokens_verify_and_carry_claims() {
    let auth = common::test_auth_manager().await;
    let user = register_user(&auth, "alice@example.com").await;
    let session = auth.issue_session(&user).await.unwrap();

    assert_eq!(session.token_type, "bearer");
    assert_eq!(session.expires_in, 30 * 60);

    let claims = auth.verify_access(&session.access_token).unwrap();
    assert_eq!(claims.sub, user.id.to_string());
    assert_eq!(claims.email, "alice@example.com");
    assert_eq!(claims.tenant_id, user.tenant_id);

    let resolved = auth.current_user(&session.access_token).await.unwrap();
    assert_eq!(resolved.id, user.id);
}

#[tokio::test]
async fn tampered_and_garbage_tokens_are_rejected() {
    let auth = common::test_auth_manager().await;
    let user = register_user(&auth, "alice@example.com").await;
    let session = auth.issue_session(&user).await.unwrap();

    let mut tampered = session.access_token.clone();
    tampered.pop();
    tampered.push('x');
    assert!(matches!(
        auth.verify_access(&tampered).unwrap_err(),
        AuthError::Unauthenticated
    ));
    assert!(matches!(
        auth.verify_access("not.a.jwt").unwrap_err(),
        AuthError::Unauthenticated
    ));

    // A token signed with a different secret fails too
    let other = AuthManager::new(test_database().await, {
        let mut config = test_auth_config();
        config.jwt_secret = vec![9u8; 64];
        config
    });
    assert!(other.verify_access(&session.access_token).is_err());
}

#[tokio::test]
async fn rotate_issues_fresh_access_without_consuming_the_refresh_token() {
    let auth = common::test_auth_manager().await;
    let user = register_user(&auth, "alice@example.com").await;
    let session = auth.issue_session(&user).await.unwrap();

    let rotated = auth.rotate(&session.refresh_token).await.unwrap();
    auth.verify_access(&rotated.access_token).unwrap();
    assert_eq!(rotated.refresh_token, session.refresh_token);

    // The same refresh token keeps working until revoked or expired
    auth.rotate(&session.refresh_token).await.unwrap();
}

#[tokio::test]
async fn revoke_kills_a_single_session() {
    let auth = common::test_auth_manager().await;
    let user = register_user(&auth, "alice@example.com").await;
    let session = auth.issue_session(&user).await.unwrap();

    assert!(auth.revoke(&session.refresh_token).await.unwrap());
    assert!(matches!(
        auth.rotate(&session.refresh_token).await.unwrap_err(),
        AuthError::Unauthenticated
    ));
    // Idempotent: second revoke is a no-op
    assert!(!auth.revoke(&session.refresh_token).await.unwrap());
}

#[tokio::test]
async fn revoke_all_logs_out_every_device() {
    let auth = common::test_auth_manager().await;
    let user = register_user(&auth, "alice@example.com").await;
    let phone = auth.issue_session(&user).await.unwrap();
    let laptop = auth.issue_session(&user).await.unwrap();

    assert_eq!(auth.list_sessions(user.id).await.unwrap().len(), 2);
    assert_eq!(auth.revoke_all(user.id).await.unwrap(), 2);

    assert!(auth.rotate(&phone.refresh_token).await.is_err());
    assert!(auth.rotate(&laptop.refresh_token).await.is_err());
    assert!(auth.list_sessions(user.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn revoke_session_is_scoped_to_its_owner() {
    let auth = common::test_auth_manager().await;
    let alice = register_user(&auth, "alice@example.com").await;
    let bob = register_user(&auth, "bob@example.com").await;
    let session = auth.issue_session(&alice).await.unwrap();
    let session_id = auth.list_sessions(alice.id).await.unwrap()[0].id;

    // Bob cannot revoke Alice's session
    assert!(!auth.revoke_session(bob.id, session_id).await.unwrap());
    auth.rotate(&session.refresh_token).await.unwrap();

    assert!(auth.revoke_session(alice.id, session_id).await.unwrap());
    assert!(auth.rotate(&session.refresh_token).await.is_err());
}

#[tokio::test]
async fn update_profile_touches_only_the_given_fields() {
    let auth = common::test_auth_manager().await;
    let user = register_user(&auth, "alice@example.com").await;

    let updated = auth
        .update_profile(
            user.id,
            UserUpdate {
                first_name: Some("Alicia".to_owned()),
                ..UserUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.first_name, "Alicia");
    assert_eq!(updated.last_name, "Runner");
    assert_eq!(updated.email, user.email);
}

#[tokio::test]
async fn delete_identity_removes_the_account_and_its_sessions() {
    let auth = common::test_auth_manager().await;
    let user = register_user(&auth, "alice@example.com").await;
    let session = auth.issue_session(&user).await.unwrap();

    auth.delete_identity(user.id).await.unwrap();

    assert!(matches!(
        auth.authenticate("alice@example.com", TEST_PASSWORD)
            .await
            .unwrap_err(),
        AuthError::Unauthenticated
    ));
    assert!(auth.rotate(&session.refresh_token).await.is_err());

    // The email is free for re-registration
    register_user(&auth, "alice@example.com").await;
}
