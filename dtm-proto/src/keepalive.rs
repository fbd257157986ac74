//! Keepalive liveness tracking — one tick-driven miss counter per session,
//! deciding when to trigger a reconnect or surface a fatal timeout.
//!
//! Grounded on `layer-client/src/retry.rs`'s `RetryPolicy` shape: a small
//! sans-IO decision type (`ControlFlow`-like) returned from a pure function,
//! leaving the actual sleeping/reconnecting to the async caller.

use std::ops::ControlFlow;

/// Default `connection_timeout`: consecutive missed ticks tolerated before
/// the session is considered dead.
pub const DEFAULT_CONNECTION_TIMEOUT: u32 = 10;

/// Valid range for `connection_timeout`: bounded to 1..1024 inclusive.
pub const CONNECTION_TIMEOUT_RANGE: std::ops::RangeInclusive<u32> = 1..=1024;

/// What the owning task should do after a tick.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeepAliveAction {
    /// Nothing to do; possibly still emit the periodic `Service/KeepAlive`.
    SendKeepAlive,
    /// The miss counter exceeded `connection_timeout`; reconnect is enabled.
    /// The caller should attempt to restore the transport, then emit
    /// `Service/DataLost` on success to drive a Resync.
    AttemptReconnect,
    /// The miss counter exceeded `connection_timeout` and reconnect is
    /// disabled (or a prior reconnect attempt already failed): fatal.
    ConnectionDead,
}

/// One-second-tick liveness tracker for a single session direction.
pub struct KeepAliveTracker {
    miss_count: u32,
    connection_timeout: u32,
    reconnect_enabled: bool,
}

impl KeepAliveTracker {
    /// Build a tracker. `connection_timeout` is clamped into
    /// [`CONNECTION_TIMEOUT_RANGE`].
    pub fn new(connection_timeout: u32, reconnect_enabled: bool) -> Self {
        let connection_timeout =
            connection_timeout.clamp(*CONNECTION_TIMEOUT_RANGE.start(), *CONNECTION_TIMEOUT_RANGE.end());
        Self { miss_count: 0, connection_timeout, reconnect_enabled }
    }

    /// Current consecutive-miss count.
    pub fn miss_count(&self) -> u32 {
        self.miss_count
    }

    /// Call once per second. Increments the miss counter and decides what
    /// the caller should do this tick.
    pub fn tick(&mut self) -> ControlFlow<KeepAliveAction, KeepAliveAction> {
        self.miss_count += 1;
        if self.miss_count > self.connection_timeout {
            return ControlFlow::Break(if self.reconnect_enabled {
                KeepAliveAction::AttemptReconnect
            } else {
                KeepAliveAction::ConnectionDead
            });
        }
        ControlFlow::Continue(KeepAliveAction::SendKeepAlive)
    }

    /// Call on receipt of any inbound `Service/KeepAlive` (or any other
    /// traffic counted as liveness) — resets the local miss counter.
    pub fn reset(&mut self) {
        self.miss_count = 0;
    }

    /// Call after a reconnect attempt completes, success or failure. A
    /// successful reconnect resets the miss counter so the new connection
    /// starts with a clean slate; a failed one is reported by the caller as
    /// [`KeepAliveAction::ConnectionDead`] without calling this.
    pub fn note_reconnect_success(&mut self) {
        self.miss_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_under_threshold_request_keepalive() {
        let mut t = KeepAliveTracker::new(3, true);
        for _ in 0..3 {
            assert_eq!(t.tick(), ControlFlow::Continue(KeepAliveAction::SendKeepAlive));
        }
    }

    #[test]
    fn exceeding_threshold_with_reconnect_enabled_requests_reconnect() {
        let mut t = KeepAliveTracker::new(2, true);
        assert_eq!(t.tick(), ControlFlow::Continue(KeepAliveAction::SendKeepAlive));
        assert_eq!(t.tick(), ControlFlow::Continue(KeepAliveAction::SendKeepAlive));
        assert_eq!(t.tick(), ControlFlow::Break(KeepAliveAction::AttemptReconnect));
    }

    #[test]
    fn exceeding_threshold_with_reconnect_disabled_is_fatal() {
        let mut t = KeepAliveTracker::new(1, false);
        assert_eq!(t.tick(), ControlFlow::Continue(KeepAliveAction::SendKeepAlive));
        assert_eq!(t.tick(), ControlFlow::Break(KeepAliveAction::ConnectionDead));
    }

    #[test]
    fn inbound_keepalive_resets_miss_counter() {
        let mut t = KeepAliveTracker::new(2, true);
        t.tick();
        t.tick();
        t.reset();
        assert_eq!(t.miss_count(), 0);
        assert_eq!(t.tick(), ControlFlow::Continue(KeepAliveAction::SendKeepAlive));
    }

    #[test]
    fn connection_timeout_is_clamped_into_range() {
        let t = KeepAliveTracker::new(0, true);
        assert_eq!(t.connection_timeout, 1);
        let t = KeepAliveTracker::new(5000, true);
        assert_eq!(t.connection_timeout, 1024);
    }

    #[test]
    fn reconnect_success_clears_miss_count() {
        let mut t = KeepAliveTracker::new(5, true);
        t.tick();
        t.tick();
        t.note_reconnect_success();
        assert_eq!(t.miss_count(), 0);
    }
}
