use governor::Quota;
use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

/// Slowest rate a catalog can be configured to.
const MIN_PER_SECOND: f64 = 0.001;

/// Request budget shared by every call against one catalog.
///
/// `acquire` is the only way in; taking a cell is a single atomic step of
/// the underlying GCRA state.
pub struct RateLimiter {
    limiter: governor::RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    clock: DefaultClock,
}

impl RateLimiter {
    pub fn new(per_second: f64, burst: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / per_second.max(MIN_PER_SECOND))
            .max(Duration::from_nanos(1));
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(burst);

        Self {
            limiter: governor::RateLimiter::direct(quota),
            clock: DefaultClock::default(),
        }
    }

    /// Effectively no limit. Used by tests and in-memory catalogs.
    pub fn unlimited() -> Self {
        Self::new(1_000_000.0, 1_000_000)
    }

    /// Waits until a request may be made and takes its cell.
    pub async fn acquire(&self) {
        if let Err(not_until) = self.limiter.check() {
            debug!(
                "Rate limiting: waiting {:?}",
                not_until.wait_time_from(self.clock.now())
            );
            self.limiter.until_ready().await;
        }
    }
}
