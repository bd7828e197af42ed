//! Shared constants for end-to-end tests
//!
//! This module contains all constants used across the test suite.
//! When test data changes (seller ids, timeouts, etc.), update only
//! this file.

// ============================================================================
// Test Sellers
// ============================================================================

/// Seller used by most tests
pub const SELLER_1: &str = "seller-franca";

/// Second seller, used for isolation checks
pub const SELLER_2: &str = "seller-gigi";

// ============================================================================
// Timeouts
// ============================================================================

/// Timeout for individual HTTP requests
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// How long to wait for the test server to become ready
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Polling interval while waiting for the test server
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;

/// How long to wait for a WebSocket message before giving up
pub const WS_MESSAGE_TIMEOUT_MS: u64 = 3000;
