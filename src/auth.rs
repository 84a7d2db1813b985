// ABOUTME: Session authority: registration, credential checks with lockout, and JWT sessions
// ABOUTME: Issues HS256 access tokens plus opaque refresh tokens stored only as hashes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Stride Fitness

//! # Authentication
//!
//! [`AuthManager`] is the single authority for identity lifecycle and
//! sessions. Credential failures deliberately collapse into one
//! [`AuthError::Unauthenticated`] value so callers cannot distinguish a
//! wrong password from an unknown email.

use crate::config::AuthConfig;
use crate::constants::{jwt, limits};
use crate::crypto;
use crate::database::{Database, SingleUseKind};
use crate::errors::{AuthError, AuthResult};
use crate::models::{NewUser, SessionInfo, TokenResponse, User, UserRole, UserStatus, UserUpdate};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT claims carried by every access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// User email
    pub email: String,
    /// Tenant the user belongs to
    pub tenant_id: String,
    /// Audience
    pub aud: String,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiry (unix seconds)
    pub exp: i64,
}

/// Authentication manager for identity lifecycle and sessions
pub struct AuthManager {
    database: Database,
    config: AuthConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AuthManager {
    /// Create a new manager over the given database
    #[must_use]
    pub fn new(database: Database, config: AuthConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(&config.jwt_secret);
        let decoding_key = DecodingKey::from_secret(&config.jwt_secret);
        Self {
            database,
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// Register a new user.
    ///
    /// The email is normalized to lowercase, the password hashed with
    /// Argon2id, and a tenant generated when none is supplied.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidInput`] for malformed fields and
    /// [`AuthError::Conflict`] when the email is taken
    pub async fn register(&self, new_user: NewUser) -> AuthResult<User> {
        let email = new_user.email.trim().to_lowercase();
        validate_email(&email)?;
        validate_name("first_name", &new_user.first_name)?;
        validate_name("last_name", &new_user.last_name)?;
        if new_user.password.len() < self.config.min_password_length {
            return Err(AuthError::InvalidInput(format!(
                "password must be at least {} characters",
                self.config.min_password_length
            )));
        }

        let tenant_id = new_user
            .tenant_id
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(generate_tenant_id);

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email,
            first_name: new_user.first_name.trim().to_owned(),
            last_name: new_user.last_name.trim().to_owned(),
            password_hash: crypto::hash_password(&new_user.password)?,
            tenant_id,
            role: new_user.role.unwrap_or(UserRole::User),
            status: UserStatus::Active,
            is_active: true,
            failed_login_attempts: 0,
            locked_until: None,
            created_at: now,
            updated_at: now,
            last_login: None,
        };

        self.database.insert_user(&user).await?;
        tracing::info!(user_id = %user.id, tenant = %user.tenant_id, "registered new user");
        Ok(user)
    }

    /// Check credentials and return the user on success.
    ///
    /// The lockout window is checked before the password, so a locked
    /// account rejects even the correct password and failed attempts made
    /// while locked do not extend the lock.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::AccountLocked`] during a lockout window,
    /// [`AuthError::AccountInactive`] for disabled accounts, and
    /// [`AuthError::Unauthenticated`] for any credential failure
    pub async fn authenticate(&self, email: &str, password: &str) -> AuthResult<User> {
        let Some(user) = self.database.get_user_by_email(email).await? else {
            // Unknown emails and wrong passwords are indistinguishable
            return Err(AuthError::Unauthenticated);
        };

        if let Some(until) = user.locked_until {
            if until > Utc::now() {
                return Err(AuthError::AccountLocked { until });
            }
        }

        if !user.can_login() {
            return Err(AuthError::AccountInactive);
        }

        if crypto::verify_password(password, &user.password_hash) {
            self.database.record_login_success(user.id).await?;
            tracing::debug!(user_id = %user.id, "authentication succeeded");
            return Ok(User {
                failed_login_attempts: 0,
                locked_until: None,
                last_login: Some(Utc::now()),
                ..user
            });
        }

        let (attempts, locked_until) = self
            .database
            .record_login_failure(
                user.id,
                self.config.lockout_threshold,
                Duration::minutes(self.config.lockout_duration_minutes),
            )
            .await?;
        if locked_until.is_some_and(|until| until > Utc::now()) {
            tracing::warn!(user_id = %user.id, attempts, "account locked after repeated failures");
        }
        Err(AuthError::Unauthenticated)
    }

    /// Issue a session: a signed access token plus a fresh refresh token.
    ///
    /// The refresh token leaves this function exactly once; only its
    /// SHA-256 hash is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if signing or storage fails
    pub async fn issue_session(&self, user: &User) -> AuthResult<TokenResponse> {
        let access_token = self.sign_access_token(user)?;

        let refresh_token = crypto::generate_secret();
        let expires_at = Utc::now() + Duration::days(self.config.refresh_token_days);
        self.database
            .insert_refresh_token(user.id, &crypto::hash_secret(&refresh_token), expires_at)
            .await?;

        Ok(TokenResponse {
            access_token,
            refresh_token,
            token_type: "bearer".to_owned(),
            expires_in: self.config.access_token_minutes * 60,
        })
    }

    /// Validate an access token and return its claims.
    ///
    /// Fails closed: expiry, bad signature, and malformed tokens all
    /// collapse into [`AuthError::Unauthenticated`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthenticated`] for any invalid token
    pub fn verify_access(&self, token: &str) -> AuthResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[jwt::AUDIENCE]);
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::Unauthenticated)
    }

    /// Resolve an access token to its user row
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthenticated`] when the token is invalid or
    /// the user no longer exists or may not log in
    pub async fn current_user(&self, token: &str) -> AuthResult<User> {
        let claims = self.verify_access(token)?;
        let user_id =
            Uuid::parse_str(&claims.sub).map_err(|_| AuthError::Unauthenticated)?;
        let user = self
            .database
            .get_user_by_id(user_id)
            .await?
            .ok_or(AuthError::Unauthenticated)?;
        if !user.can_login() {
            return Err(AuthError::AccountInactive);
        }
        Ok(user)
    }

    /// Exchange a refresh token for a fresh access token.
    ///
    /// The refresh token itself stays valid until it expires or is
    /// revoked, so several devices can hold independent sessions.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthenticated`] for unknown, expired, or
    /// revoked refresh tokens
    pub async fn rotate(&self, refresh_token: &str) -> AuthResult<TokenResponse> {
        let session = self
            .database
            .get_refresh_session(&crypto::hash_secret(refresh_token))
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        let user = self
            .database
            .get_user_by_id(session.user_id)
            .await?
            .ok_or(AuthError::Unauthenticated)?;
        if !user.can_login() {
            return Err(AuthError::AccountInactive);
        }

        Ok(TokenResponse {
            access_token: self.sign_access_token(&user)?,
            refresh_token: refresh_token.to_owned(),
            token_type: "bearer".to_owned(),
            expires_in: self.config.access_token_minutes * 60,
        })
    }

    /// Revoke a single refresh token
    ///
    /// Returns `true` if a live session was revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn revoke(&self, refresh_token: &str) -> AuthResult<bool> {
        self.database
            .revoke_refresh_token(&crypto::hash_secret(refresh_token))
            .await
    }

    /// Revoke every session a user holds (logout everywhere)
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn revoke_all(&self, user_id: Uuid) -> AuthResult<u64> {
        let revoked = self.database.revoke_all_refresh_tokens(user_id).await?;
        tracing::info!(user_id = %user_id, sessions = revoked, "revoked all sessions");
        Ok(revoked)
    }

    /// List a user's active sessions
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn list_sessions(&self, user_id: Uuid) -> AuthResult<Vec<SessionInfo>> {
        self.database.list_sessions(user_id).await
    }

    /// Revoke one session by id, scoped to its owner
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn revoke_session(&self, user_id: Uuid, session_id: Uuid) -> AuthResult<bool> {
        self.database.revoke_session(user_id, session_id).await
    }

    /// Start a password reset, returning the single-use secret for delivery.
    ///
    /// Returns `None` for unknown or inactive accounts; callers respond
    /// identically either way so the API does not confirm which emails
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails
    pub async fn request_password_reset(&self, email: &str) -> AuthResult<Option<String>> {
        let Some(user) = self.database.get_user_by_email(email).await? else {
            return Ok(None);
        };
        if !user.can_login() {
            return Ok(None);
        }

        let secret = crypto::generate_secret();
        let expires_at = Utc::now() + Duration::minutes(limits::PASSWORD_RESET_TTL_MINUTES);
        self.database
            .insert_single_use_token(
                SingleUseKind::PasswordReset,
                user.id,
                &crypto::hash_secret(&secret),
                expires_at,
            )
            .await?;
        tracing::info!(user_id = %user.id, "password reset requested");
        Ok(Some(secret))
    }

    /// Complete a password reset with a single-use secret.
    ///
    /// Every existing session and any other outstanding reset secret is
    /// revoked once the password changes.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthenticated`] for unknown, used, or expired
    /// secrets and [`AuthError::InvalidInput`] for a too-short password
    pub async fn reset_password(&self, secret: &str, new_password: &str) -> AuthResult<()> {
        if new_password.len() < self.config.min_password_length {
            return Err(AuthError::InvalidInput(format!(
                "password must be at least {} characters",
                self.config.min_password_length
            )));
        }

        let user_id = self
            .database
            .consume_single_use_token(SingleUseKind::PasswordReset, &crypto::hash_secret(secret))
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        let hash = crypto::hash_password(new_password)?;
        self.database.update_password(user_id, &hash).await?;
        self.database.revoke_all_refresh_tokens(user_id).await?;
        self.database
            .revoke_single_use_tokens(SingleUseKind::PasswordReset, user_id)
            .await?;
        tracing::info!(user_id = %user_id, "password reset completed");
        Ok(())
    }

    /// Issue a passwordless login secret for the given email.
    ///
    /// Enumeration-safe like [`Self::request_password_reset`].
    ///
    /// # Errors
    ///
    /// Returns an error if storage fails
    pub async fn issue_magic_link(&self, email: &str) -> AuthResult<Option<String>> {
        let Some(user) = self.database.get_user_by_email(email).await? else {
            return Ok(None);
        };
        if !user.can_login() {
            return Ok(None);
        }

        let secret = crypto::generate_secret();
        let expires_at = Utc::now() + Duration::minutes(limits::MAGIC_LINK_TTL_MINUTES);
        self.database
            .insert_single_use_token(
                SingleUseKind::MagicLink,
                user.id,
                &crypto::hash_secret(&secret),
                expires_at,
            )
            .await?;
        Ok(Some(secret))
    }

    /// Redeem a magic-link secret for a full session
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthenticated`] for unknown, used, or expired
    /// secrets
    pub async fn verify_magic_link(&self, secret: &str) -> AuthResult<TokenResponse> {
        let user_id = self
            .database
            .consume_single_use_token(SingleUseKind::MagicLink, &crypto::hash_secret(secret))
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        let user = self
            .database
            .get_user_by_id(user_id)
            .await?
            .ok_or(AuthError::Unauthenticated)?;
        if !user.can_login() {
            return Err(AuthError::AccountInactive);
        }

        self.database.record_login_success(user.id).await?;
        self.issue_session(&user).await
    }

    /// Apply a partial profile update
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidInput`] for malformed names
    pub async fn update_profile(&self, user_id: Uuid, update: UserUpdate) -> AuthResult<User> {
        if let Some(name) = &update.first_name {
            validate_name("first_name", name)?;
        }
        if let Some(name) = &update.last_name {
            validate_name("last_name", name)?;
        }
        self.database.update_user(user_id, &update).await?;
        self.database
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::InvalidInput("no such user".to_owned()))
    }

    /// Delete a user and everything keyed to them.
    ///
    /// All sessions, tokens, pending states, and provider connections go
    /// with the account; nothing is removed if any step fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the transactional delete fails
    pub async fn delete_identity(&self, user_id: Uuid) -> AuthResult<()> {
        self.database.delete_user(user_id).await?;
        tracing::info!(user_id = %user_id, "deleted identity and associated data");
        Ok(())
    }

    /// Remove expired tokens and states from storage
    ///
    /// # Errors
    ///
    /// Returns an error if any delete fails
    pub async fn cleanup_expired(&self) -> AuthResult<u64> {
        self.database.cleanup_expired().await
    }

    fn sign_access_token(&self, user: &User) -> AuthResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            tenant_id: user.tenant_id.clone(),
            aud: jwt::AUDIENCE.to_owned(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(self.config.access_token_minutes)).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("failed to sign access token: {e}")))
    }
}

fn generate_tenant_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("tenant_{}", &id[..8])
}

fn validate_email(email: &str) -> AuthResult<()> {
    let (local, domain) = email
        .split_once('@')
        .ok_or_else(|| AuthError::InvalidInput("invalid email address".to_owned()))?;
    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err(AuthError::InvalidInput("invalid email address".to_owned()));
    }
    Ok(())
}

fn validate_name(field: &str, value: &str) -> AuthResult<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.len() > 50 {
        return Err(AuthError::InvalidInput(format!(
            "{field} must be between 1 and 50 characters"
        )));
    }
    Ok(())
}
