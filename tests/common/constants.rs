//! Shared constants for integration tests
//!
//! When test users or channel ids change, update only this file.

use std::time::Duration;

// ============================================================================
// Test Users
// ============================================================================

/// Pro user with a watchlist only
pub const ALICE: &str = "alice@example.com";

/// Pro user with every category populated
pub const BOB: &str = "bob@example.com";

/// Free-tier user, never processed
pub const CAROL: &str = "carol@example.com";

/// Messaging chat id used for linked users
pub const ALICE_CHAT_ID: &str = "55501";

// ============================================================================
// Channels
// ============================================================================

pub const AGENT_ID: &str = "140";
pub const WATCHLIST_WORKSPACE: &str = "3422";
pub const SECTOR_WORKSPACE: &str = "3420";
pub const NARRATIVE_WORKSPACE: &str = "3421";
pub const WATCHLIST_SOCIAL_WORKSPACE: &str = "4422";
pub const MESSAGING_WORKSPACE: &str = "3416";
pub const MESSAGING_AGENT_ID: &str = "267";

// ============================================================================
// Timing
// ============================================================================

/// Delay before an armed first digest fires in tests
pub const INITIAL_SEND_DELAY: Duration = Duration::from_millis(200);

/// Upper bound for polling helpers before a test gives up
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
