//! Shared constants for end-to-end tests

/// Bearer token the test server accepts
pub const TEST_API_TOKEN: &str = "test-api-token";

/// Library IDs used across upload tests
pub const LIBRARY_1_ID: &str = "library-1";
pub const LIBRARY_2_ID: &str = "library-2";

/// Maximum time to wait for server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Polling interval when waiting for server ready (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;
