use time::OffsetDateTime;

/// Time source for the authenticator lifecycle.
///
/// Injected into every service so expiry and idle-timeout decisions are
/// deterministic under test.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Wall-clock time in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}
