pub mod discovery;
pub mod error;
pub mod evidence;
pub mod keywords;
pub mod places;
pub mod poller;
pub mod run_log;
pub mod scout;
pub mod spacing;
pub mod stats;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod verification;

pub use error::{ErrorKind, ErrorScope, RunError, ScoutError};
pub use scout::{Scout, ScoutDeps};
pub use stats::{RunPhase, RunSummary};
