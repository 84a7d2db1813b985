// ABOUTME: Logging configuration and structured logging setup for observability
// ABOUTME: Configures tracing subscriber with env-filter based level control
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Stride Fitness

//! Structured logging initialization built on `tracing`.

use crate::config::LogLevel;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence when set; otherwise the configured level
/// applies crate-wide. Safe to call once per process; subsequent calls are
/// ignored rather than panicking so tests can share a process.
pub fn init(level: &LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().as_str().to_lowercase()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
