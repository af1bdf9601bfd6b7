//! Per-channel timeout policy.

use std::collections::HashSet;
use std::time::Duration;

/// Fixed call window applied to channels not in the exclusion set.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Decides, per channel, whether a call gets a deadline and how long.
///
/// Constructed once and handed to the caller by reference-parameter rather
/// than read from shared module state, so independent instances (e.g. in
/// tests) never interfere. Channels that are legitimately long-running or
/// wait on user interaction are exempted by name and never time out.
#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    timeout: Duration,
    no_timeout: HashSet<String>,
}

impl TimeoutPolicy {
    /// Policy with the default window and the given exclusion set.
    pub fn new(no_timeout: impl IntoIterator<Item = String>) -> Self {
        Self::with_timeout(DEFAULT_CALL_TIMEOUT, no_timeout)
    }

    /// Policy with a custom window and the given exclusion set.
    pub fn with_timeout(timeout: Duration, no_timeout: impl IntoIterator<Item = String>) -> Self {
        Self {
            timeout,
            no_timeout: no_timeout.into_iter().collect(),
        }
    }

    /// True when `channel` must never time out.
    pub fn is_exempt(&self, channel: &str) -> bool {
        self.no_timeout.contains(channel)
    }

    /// Call window for `channel`; `None` when the channel is exempt.
    pub fn call_timeout(&self, channel: &str) -> Option<Duration> {
        if self.is_exempt(channel) {
            None
        } else {
            Some(self.timeout)
        }
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::new(std::iter::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_times_out_everything() {
        let policy = TimeoutPolicy::default();
        assert_eq!(policy.call_timeout("Foo.bar"), Some(DEFAULT_CALL_TIMEOUT));
        assert!(!policy.is_exempt("Foo.bar"));
    }

    #[test]
    fn exempt_channels_have_no_window() {
        let policy = TimeoutPolicy::new(["Foo.launchVM".to_string()]);
        assert_eq!(policy.call_timeout("Foo.launchVM"), None);
        assert_eq!(policy.call_timeout("Foo.bar"), Some(DEFAULT_CALL_TIMEOUT));
    }

    #[test]
    fn custom_window_applies_to_plain_channels() {
        let policy = TimeoutPolicy::with_timeout(Duration::from_millis(50), std::iter::empty());
        assert_eq!(
            policy.call_timeout("Foo.bar"),
            Some(Duration::from_millis(50))
        );
    }
}
