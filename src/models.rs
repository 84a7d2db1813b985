// ABOUTME: Domain models for the multi-tenant identity core
// ABOUTME: Users, roles, sessions, athletes, and provider connection records
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Stride Fitness

//! Common data structures shared across the identity core.

use crate::errors::AuthError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// User roles in the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Regular platform user
    User,
    /// Athlete with a performance profile
    Athlete,
    /// Coach with access to assigned athletes
    Coach,
    /// Platform administrator
    Admin,
}

impl UserRole {
    /// Database representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Athlete => "athlete",
            Self::Coach => "coach",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for UserRole {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "athlete" => Ok(Self::Athlete),
            "coach" => Ok(Self::Coach),
            "admin" => Ok(Self::Admin),
            other => Err(AuthError::Internal(format!("unknown role: {other}"))),
        }
    }
}

/// Account status. Orthogonal to lockout: a locked account keeps its status
/// and unlocks automatically once `locked_until` passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// Verified, may authenticate
    Active,
    /// Deactivated by the user or an administrator
    Inactive,
    /// Suspended by an administrator
    Suspended,
    /// Freshly registered, awaiting verification
    PendingVerification,
}

impl UserStatus {
    /// Database representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Suspended => "suspended",
            Self::PendingVerification => "pending_verification",
        }
    }
}

impl FromStr for UserStatus {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "suspended" => Ok(Self::Suspended),
            "pending_verification" => Ok(Self::PendingVerification),
            other => Err(AuthError::Internal(format!("unknown status: {other}"))),
        }
    }
}

/// A user in the multi-tenant platform.
///
/// The password is stored as an Argon2 hash only; the plaintext never
/// touches this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier
    pub id: Uuid,
    /// Email address, stored lowercased and unique
    pub email: String,
    /// First name
    pub first_name: String,
    /// Last name
    pub last_name: String,
    /// Argon2 PHC-format password hash
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Tenant this user belongs to
    pub tenant_id: String,
    /// Role for the permission system
    pub role: UserRole,
    /// Account status
    pub status: UserStatus,
    /// Whether the account is active (soft-delete flag)
    pub is_active: bool,
    /// Consecutive failed login attempts since the last success
    pub failed_login_attempts: i64,
    /// When the lockout expires, if the account is locked
    pub locked_until: Option<DateTime<Utc>>,
    /// Account creation time
    pub created_at: DateTime<Utc>,
    /// Last profile or counter mutation
    pub updated_at: DateTime<Utc>,
    /// Last successful login
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    /// Full display name
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Whether the lockout window is currently in effect
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked_until.is_some_and(|until| until > Utc::now())
    }

    /// Whether the account may authenticate (status gate, not lockout)
    #[must_use]
    pub const fn can_login(&self) -> bool {
        self.is_active && matches!(self.status, UserStatus::Active)
    }
}

/// Registration request for a new user
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    /// Email address
    pub email: String,
    /// Plaintext password, hashed before storage and never logged
    pub password: String,
    /// First name (1..=50 chars)
    pub first_name: String,
    /// Last name (1..=50 chars)
    pub last_name: String,
    /// Tenant, auto-generated when absent
    pub tenant_id: Option<String>,
    /// Role, defaults to `user`
    pub role: Option<UserRole>,
}

/// Typed partial update for a user profile.
///
/// Each field is optional; only set fields are applied, via parameterized
/// assignments rather than string-built queries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    /// New first name
    pub first_name: Option<String>,
    /// New last name
    pub last_name: Option<String>,
    /// New active flag
    pub is_active: Option<bool>,
    /// New account status
    pub status: Option<UserStatus>,
}

impl UserUpdate {
    /// Whether the update carries no changes
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.is_active.is_none()
            && self.status.is_none()
    }
}

/// Tokens handed to the caller after a successful login.
///
/// The refresh token appears here exactly once; the server keeps only its
/// hash.
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    /// Signed JWT access token
    pub access_token: String,
    /// Opaque high-entropy refresh token
    pub refresh_token: String,
    /// Always "bearer"
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// Metadata for an active refresh-token session (multi-device view)
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    /// Refresh token row id, usable with `revoke_session`
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When the refresh token expires
    pub expires_at: DateTime<Utc>,
}

/// Athlete profile linked to a user account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Athlete {
    /// Unique athlete identifier
    pub id: Uuid,
    /// Owning user account
    pub user_id: Uuid,
    /// Display name
    pub name: String,
    /// Whether the profile is active
    pub is_active: bool,
    /// Profile creation time
    pub created_at: DateTime<Utc>,
}

/// Provider connection lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Tokens stored, sync permitted
    Active,
    /// Last provider interaction failed
    Error,
    /// Refresh token rejected; user must re-authorize
    NeedsReauth,
    /// Disconnected by the user; history retained
    Revoked,
}

impl ConnectionStatus {
    /// Database representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Error => "error",
            Self::NeedsReauth => "needs_reauth",
            Self::Revoked => "revoked",
        }
    }
}

impl FromStr for ConnectionStatus {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "error" => Ok(Self::Error),
            "needs_reauth" => Ok(Self::NeedsReauth),
            "revoked" => Ok(Self::Revoked),
            other => Err(AuthError::Internal(format!(
                "unknown connection status: {other}"
            ))),
        }
    }
}

/// A stored OAuth connection between an athlete and one provider.
///
/// Token material stays in the database as ciphertext; this view exposes
/// only metadata.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderConnection {
    /// Connection row id
    pub id: Uuid,
    /// Owning athlete
    pub athlete_id: Uuid,
    /// Provider name
    pub provider: String,
    /// Lifecycle status
    pub status: ConnectionStatus,
    /// When the provider access token expires, if known
    pub expires_at: Option<DateTime<Utc>>,
    /// Last completed data sync
    pub last_sync: Option<DateTime<Utc>>,
    /// Polling interval hint for the sync collaborator
    pub sync_frequency_minutes: i64,
    /// Remaining calls reported by the provider's rate limiter
    pub rate_limit_remaining: Option<i64>,
    /// When the provider's rate-limit window resets
    pub rate_limit_reset: Option<DateTime<Utc>>,
    /// First successful OAuth completion
    pub created_at: DateTime<Utc>,
    /// Last token refresh or status change
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        for role in [UserRole::User, UserRole::Athlete, UserRole::Coach, UserRole::Admin] {
            assert_eq!(role.as_str().parse::<UserRole>().unwrap(), role);
        }
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            UserStatus::Active,
            UserStatus::Inactive,
            UserStatus::Suspended,
            UserStatus::PendingVerification,
        ] {
            assert_eq!(status.as_str().parse::<UserStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_lock_window() {
        let mut user = test_user();
        assert!(!user.is_locked());

        user.locked_until = Some(Utc::now() + chrono::Duration::minutes(5));
        assert!(user.is_locked());

        user.locked_until = Some(Utc::now() - chrono::Duration::minutes(5));
        assert!(!user.is_locked(), "expired lock must clear automatically");
    }

    fn test_user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "test@example.com".into(),
            first_name: "Test".into(),
            last_name: "User".into(),
            password_hash: "$argon2id$stub".into(),
            tenant_id: "tenant_00000000".into(),
            role: UserRole::User,
            status: UserStatus::Active,
            is_active: true,
            failed_login_attempts: 0,
            locked_until: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_login: None,
        }
    }
}
