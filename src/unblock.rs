//! Temporary unblocking.
//!
//! A grant lets one key (a URL, a tab id, whatever the host uses) through
//! for a fixed time. Grants carry an expiry timestamp checked at query time.
//! Repeated grants are throttled: after each grant, further grants are
//! refused for a countdown that starts at a base value and grows with every
//! grant, and falls back to the base after a quiet period.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::config::FilterOptions;

/// Timing of temporary unblocks, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnblockPolicy {
    /// How long a grant lasts
    pub duration_ms: u64,
    pub countdown_base_ms: u64,
    pub countdown_increment_ms: u64,
    /// Quiet period after which the countdown starts over
    pub countdown_reset_ms: u64,
}

impl UnblockPolicy {
    pub fn from_options(options: &FilterOptions) -> Self {
        Self {
            duration_ms: options.temp_unblock_duration_ms,
            countdown_base_ms: options.temp_unblock_countdown_base_ms,
            countdown_increment_ms: options.temp_unblock_countdown_increment_ms,
            countdown_reset_ms: options.temp_unblock_countdown_reset_ms,
        }
    }
}

impl Default for UnblockPolicy {
    fn default() -> Self {
        Self::from_options(&FilterOptions::default())
    }
}

/// Answer to an unblock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnblockGrant {
    Granted { expires_at: u64 },
    /// Refused; another grant is possible from `retry_at`
    Throttled { retry_at: u64 },
}

impl UnblockGrant {
    pub fn is_granted(&self) -> bool {
        matches!(self, UnblockGrant::Granted { .. })
    }
}

#[derive(Debug, Default)]
struct State {
    countdown_ms: u64,
    last_access: Option<u64>,
    /// key -> expiry
    grants: HashMap<String, u64>,
}

/// Registry of temporary unblocks.
#[derive(Debug)]
pub struct TempUnblock {
    policy: UnblockPolicy,
    state: Mutex<State>,
}

impl TempUnblock {
    pub fn new(policy: UnblockPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(State::default()),
        }
    }

    pub fn policy(&self) -> UnblockPolicy {
        self.policy
    }

    /// Request an unblock of `key` at time `now`.
    pub fn grant(&self, key: &str, now: u64) -> UnblockGrant {
        let mut state = self.state.lock();

        let quiet = match state.last_access {
            Some(last) => {
                let retry_at = last.saturating_add(state.countdown_ms);
                if last.saturating_add(self.policy.countdown_reset_ms) > now && retry_at > now {
                    tracing::debug!(key, retry_at, "temporary unblock throttled");
                    return UnblockGrant::Throttled { retry_at };
                }
                last.saturating_add(self.policy.countdown_reset_ms) <= now
            }
            None => true,
        };

        state.countdown_ms = if quiet {
            self.policy.countdown_base_ms
        } else {
            state.countdown_ms + self.policy.countdown_increment_ms
        };
        state.last_access = Some(now);

        let expires_at = now.saturating_add(self.policy.duration_ms);
        state.grants.retain(|_, expiry| *expiry > now);
        state.grants.insert(key.to_string(), expires_at);
        UnblockGrant::Granted { expires_at }
    }

    /// Whether `key` holds an unexpired grant at `now`.
    pub fn is_unblocked(&self, key: &str, now: u64) -> bool {
        let mut state = self.state.lock();
        match state.grants.get(key) {
            Some(&expiry) if expiry > now => true,
            Some(_) => {
                state.grants.remove(key);
                false
            }
            None => false,
        }
    }

    /// Drop the grant of `key`, if any.
    pub fn revoke(&self, key: &str) {
        self.state.lock().grants.remove(key);
    }
}

impl Default for TempUnblock {
    fn default() -> Self {
        Self::new(UnblockPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: u64 = 24 * 60 * 60 * 1000;

    #[test]
    fn test_grant_expires() {
        let unblock = TempUnblock::default();
        assert_eq!(unblock.grant("k", 1000), UnblockGrant::Granted { expires_at: 9000 });
        assert!(unblock.is_unblocked("k", 8999));
        assert!(!unblock.is_unblocked("k", 9000));
        assert!(!unblock.is_unblocked("other", 1000));
    }

    #[test]
    fn test_countdown_throttles_and_grows() {
        let unblock = TempUnblock::default();
        let t0 = 1_000_000;
        assert!(unblock.grant("a", t0).is_granted());
        // countdown is 10000 after the first grant
        assert_eq!(
            unblock.grant("b", t0 + 9999),
            UnblockGrant::Throttled { retry_at: t0 + 10000 }
        );
        assert!(unblock.grant("b", t0 + 10000).is_granted());
        // it grew by 500
        let t1 = t0 + 10000;
        assert_eq!(
            unblock.grant("c", t1 + 10000),
            UnblockGrant::Throttled { retry_at: t1 + 10500 }
        );
        assert!(unblock.grant("c", t1 + 10500).is_granted());
    }

    #[test]
    fn test_countdown_resets_after_quiet_period() {
        let unblock = TempUnblock::default();
        let t0 = 1_000_000;
        assert!(unblock.grant("a", t0).is_granted());
        assert!(unblock.grant("a", t0 + 10000).is_granted());
        let t2 = t0 + 10000 + DAY;
        assert!(unblock.grant("a", t2).is_granted());
        // back to the base countdown
        assert_eq!(
            unblock.grant("a", t2 + 1),
            UnblockGrant::Throttled { retry_at: t2 + 10000 }
        );
    }

    #[test]
    fn test_revoke() {
        let unblock = TempUnblock::default();
        unblock.grant("k", 0);
        unblock.revoke("k");
        assert!(!unblock.is_unblocked("k", 1));
    }
}
