//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{pro_user, Harness, ALICE};
//!
//! #[tokio::test]
//! async fn test_refresh() {
//!     let harness = Harness::builder()
//!         .user(pro_user(ALICE, &["BTC"], &[], &[]))
//!         .build();
//!     let user = harness.user(ALICE);
//!     assert!(harness.pipeline.run(&user, false).await);
//! }
//! ```

mod constants;
mod fixtures;
mod harness;
mod server;
mod stubs;

// Not every test binary uses every helper
#[allow(unused_imports)]
pub use constants::*;
#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use harness::{wait_until, Harness, HarnessBuilder, MESSAGING_COOLDOWN_HOURS};
#[allow(unused_imports)]
pub use server::TestServer;
#[allow(unused_imports)]
pub use stubs::{RecordingSender, Reply, ScriptedChannel, ScriptedSynthesizer};
