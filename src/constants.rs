// ABOUTME: Central constants for token lifetimes, lockout limits, and provider catalog defaults
// ABOUTME: Single source of truth for defaults overridable via environment configuration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Stride Fitness

//! Default limits and provider catalog constants.

/// Token lifetime and lockout limits
pub mod limits {
    /// Access token lifetime in minutes
    pub const DEFAULT_ACCESS_TOKEN_MINUTES: i64 = 30;

    /// Refresh token lifetime in days
    pub const DEFAULT_REFRESH_TOKEN_DAYS: i64 = 7;

    /// Consecutive failed logins before the account locks
    pub const DEFAULT_LOCKOUT_THRESHOLD: i64 = 5;

    /// How long a locked account stays locked, in minutes
    pub const DEFAULT_LOCKOUT_DURATION_MINUTES: i64 = 15;

    /// OAuth state lifetime in minutes
    pub const DEFAULT_OAUTH_STATE_TTL_MINUTES: i64 = 10;

    /// Password reset token lifetime in minutes
    pub const PASSWORD_RESET_TTL_MINUTES: i64 = 60;

    /// Magic link token lifetime in minutes
    pub const MAGIC_LINK_TTL_MINUTES: i64 = 15;

    /// Minimum accepted password length
    pub const DEFAULT_MIN_PASSWORD_LENGTH: usize = 8;

    /// Provider token refresh horizon in minutes (collaborator default)
    pub const TOKEN_EXPIRY_HORIZON_MINUTES: i64 = 60;

    /// Default provider sync interval in minutes (24 hours)
    pub const DEFAULT_SYNC_FREQUENCY_MINUTES: i64 = 1440;

    /// Outbound provider token-endpoint timeout in seconds
    pub const PROVIDER_HTTP_TIMEOUT_SECS: u64 = 30;
}

/// OAuth provider catalog defaults
pub mod oauth {
    /// Strava provider name
    pub const STRAVA: &str = "strava";

    /// Garmin provider name
    pub const GARMIN: &str = "garmin";

    /// Strava authorization endpoint
    pub const STRAVA_AUTH_URL: &str = "https://www.strava.com/oauth/authorize";

    /// Strava token endpoint
    pub const STRAVA_TOKEN_URL: &str = "https://www.strava.com/oauth/token";

    /// Default Strava scopes
    pub const STRAVA_DEFAULT_SCOPES: &str = "read,activity:read_all,profile:read_all";

    /// Garmin authorization endpoint
    pub const GARMIN_AUTH_URL: &str = "https://connect.garmin.com/oauthConfirm";

    /// Garmin token endpoint
    pub const GARMIN_TOKEN_URL: &str = "https://connect.garmin.com/oauth/token";

    /// Default Garmin scopes (Garmin grants scopes at the app level)
    pub const GARMIN_DEFAULT_SCOPES: &str = "";
}

/// JWT claim constants
pub mod jwt {
    /// Audience embedded in and required from access tokens
    pub const AUDIENCE: &str = "stride-api";
}
