//! Services layer for the identity engine.
//!
//! One component per file; each is a cheap-to-clone handle over the shared
//! store, event log, and notifier seams.

mod activity;
mod api_keys;
mod credential_guard;
mod devices;
pub mod error;
mod events;
mod notify;
mod password_reset;
pub mod policy;
mod rate_limit;
mod sessions;
mod sso;
mod stats;
mod two_factor;

pub use activity::ActivityTracker;
pub use api_keys::ApiKeyRegistry;
pub use credential_guard::{CredentialGuard, FailedLoginOutcome};
pub use devices::{ConnectionInfo, DeviceRegistry};
pub use error::SecurityError;
pub use events::SecurityEventLog;
pub use notify::{
    send_best_effort, LogNotifier, MockNotifier, NotificationCategory, Notifier, SentNotification,
};
pub use password_reset::{PasswordResetFlow, ResetRequested, GENERIC_RESET_MESSAGE};
pub use policy::{PasswordPolicy, PolicyError};
pub use rate_limit::RateLimiter;
pub use sessions::{ClientInfo, SessionRegistry};
pub use sso::{SsoCorrelator, SsoIdentity};
pub use stats::{
    ApiKeyUsageStats, LockoutStats, ResetFlowStats, SecurityStats, SeverityBreakdown, SsoStats,
    TwoFactorAdoption,
};
pub use two_factor::SecondFactorIssuer;
