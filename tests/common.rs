// ABOUTME: Shared helpers for integration tests
// ABOUTME: In-memory database, deterministic config, and a canned test user
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Stride Fitness

#![allow(dead_code)] // each integration test binary uses a subset

use std::sync::Once;
use stride_identity::auth::AuthManager;
use stride_identity::config::{AuthConfig, LogLevel};
use stride_identity::database::Database;
use stride_identity::models::{NewUser, User};

pub const TEST_PASSWORD: &str = "correct-horse-battery";

static INIT_LOGGING: Once = Once::new();

/// Quiet logging unless RUST_LOG says otherwise
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| stride_identity::logging::init(&LogLevel::Warn));
}

/// Fresh in-memory database with migrations applied
pub async fn test_database() -> Database {
    init_test_logging();
    Database::new("sqlite::memory:")
        .await
        .expect("in-memory database should open")
}

/// Auth config with a fixed signing secret and library defaults
pub fn test_auth_config() -> AuthConfig {
    AuthConfig::with_secret(vec![7u8; 64])
}

pub async fn test_auth_manager() -> AuthManager {
    AuthManager::new(test_database().await, test_auth_config())
}

pub fn new_user(email: &str) -> NewUser {
    NewUser {
        email: email.to_owned(),
        password: TEST_PASSWORD.to_owned(),
        first_name: "Alice".to_owned(),
        last_name: "Runner".to_owned(),
        tenant_id: None,
        role: None,
    }
}

/// Register a canned user and return it
pub async fn register_user(auth: &AuthManager, email: &str) -> User {
    auth.register(new_user(email))
        .await
        .expect("registration should succeed")
}
