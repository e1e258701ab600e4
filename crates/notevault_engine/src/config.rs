//! Vault configuration.

use notevault_crypto::AUTO_LOCK_TIMEOUT_MS;
use notevault_sync::{SettingsMergePolicy, SyncSessionConfig};

/// How often the maintenance sweep runs by default.
pub const MAINTENANCE_INTERVAL_MS: u64 = 60 * 1000;

/// Tunables for a [`VaultService`](crate::VaultService).
///
/// The defaults match production behavior; tests shrink the windows and
/// drive them with a manual clock.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Master key idle window before auto-lock.
    pub auto_lock_timeout_ms: u64,
    /// Sync session and key lifetimes.
    pub session: SyncSessionConfig,
    /// Store plaintext (logged and counted) instead of failing when a
    /// write arrives while locked.
    pub plaintext_fallback: bool,
    /// Which settings fields the remote side wins during merges.
    pub settings_policy: SettingsMergePolicy,
    /// Period of the background maintenance sweep.
    pub maintenance_interval_ms: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            auto_lock_timeout_ms: AUTO_LOCK_TIMEOUT_MS,
            session: SyncSessionConfig::default(),
            plaintext_fallback: false,
            settings_policy: SettingsMergePolicy::default(),
            maintenance_interval_ms: MAINTENANCE_INTERVAL_MS,
        }
    }
}

impl VaultConfig {
    /// Sets the auto-lock idle window.
    #[must_use]
    pub fn with_auto_lock_timeout(mut self, timeout_ms: u64) -> Self {
        self.auto_lock_timeout_ms = timeout_ms;
        self
    }

    /// Sets the sync session and key lifetimes.
    #[must_use]
    pub fn with_session_config(mut self, session: SyncSessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Enables the audited plaintext fallback for writes while locked.
    #[must_use]
    pub fn with_plaintext_fallback(mut self, enabled: bool) -> Self {
        self.plaintext_fallback = enabled;
        self
    }

    /// Sets the settings merge policy.
    #[must_use]
    pub fn with_settings_policy(mut self, policy: SettingsMergePolicy) -> Self {
        self.settings_policy = policy;
        self
    }

    /// Sets the maintenance sweep period.
    #[must_use]
    pub fn with_maintenance_interval(mut self, interval_ms: u64) -> Self {
        self.maintenance_interval_ms = interval_ms;
        self
    }
}
