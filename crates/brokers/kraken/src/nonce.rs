use krakenwatch_core::SourceError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A Kraken request nonce: nanoseconds since the Unix epoch, never repeated.
pub type Nonce = u64;

#[derive(Debug, thiserror::Error)]
#[error("System clock unavailable: {0}")]
pub struct ClockError(String);

impl ClockError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

impl From<ClockError> for SourceError {
    fn from(e: ClockError) -> Self {
        SourceError::Clock(e.0)
    }
}

/// Wall-clock time source for nonces.
pub trait Clock: Send + Sync {
    /// Nanoseconds since the Unix epoch.
    fn now_nanos(&self) -> Result<u64, ClockError>;
}

/// The platform clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_nanos(&self) -> Result<u64, ClockError> {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ClockError::new(format!("clock is before the Unix epoch: {}", e)))?;
        u64::try_from(elapsed.as_nanos())
            .map_err(|_| ClockError::new("timestamp does not fit in 64 bits"))
    }
}

/// Issues strictly increasing nonces.
///
/// Each nonce is `max(now, last + 1)`, so two calls landing on the same clock
/// tick, or a clock that steps backwards, still yield increasing values.
#[derive(Debug)]
pub struct NonceGenerator<C = SystemClock> {
    clock: C,
    last: AtomicU64,
}

impl NonceGenerator<SystemClock> {
    pub const fn system() -> Self {
        Self {
            clock: SystemClock,
            last: AtomicU64::new(0),
        }
    }
}

impl<C: Clock> NonceGenerator<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            last: AtomicU64::new(0),
        }
    }

    pub fn next_nonce(&self) -> Result<Nonce, ClockError> {
        let now = self.clock.now_nanos()?;
        let mut last = self.last.load(Ordering::Acquire);
        loop {
            let floor = last
                .checked_add(1)
                .ok_or_else(|| ClockError::new("nonce space exhausted"))?;
            let candidate = now.max(floor);
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(candidate),
                Err(actual) => last = actual,
            }
        }
    }
}

static PROCESS_NONCES: NonceGenerator = NonceGenerator::system();

/// Next nonce from the process-wide generator.
///
/// Every client in the process draws from the same generator, so two clients
/// sharing one API key never race each other into a rejected nonce.
pub fn next_nonce() -> Result<Nonce, ClockError> {
    PROCESS_NONCES.next_nonce()
}
