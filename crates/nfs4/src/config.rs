//! Server tunables.

use std::time::Duration;

/// Default lease time, RFC 7530 recommends 90 seconds
pub const DEFAULT_LEASE_TIME: Duration = Duration::from_secs(90);

/// Default length of the grace period after a (re)start
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(90);

/// Settings of the state store
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// How long a client lease stays valid without renewal
    pub lease_time: Duration,
    /// How long after start clients may reclaim their state
    pub grace_period: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            lease_time: DEFAULT_LEASE_TIME,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

impl ServerConfig {
    pub fn with_lease_time(mut self, lease_time: Duration) -> Self {
        self.lease_time = lease_time;
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }
}
