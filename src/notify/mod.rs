//! Outbound side effects of the ladder
//!
//! Notifications, match sessions and tier synchronization all sit behind
//! traits so the engines stay independent of whatever delivers them. All of
//! them are best effort; a failed side effect never fails ladder state.

pub mod notifier;
pub mod session;
pub mod tier_sync;

// Re-export commonly used types
pub use notifier::{notify_or_log, LoggingNotifier, MockNotifier, Notifier};
pub use session::{LocalSessionProvider, MockSessionProvider, SessionProvider};
pub use tier_sync::{sync_tier_or_log, LoggingTierSync, MockTierSync, TierSync};
