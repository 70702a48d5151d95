use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;

struct CachedTotal {
    version: u64,
    computed_at: Instant,
    total: Decimal,
}

/// Collected-revenue total, reused until a payment status changes or the TTL passes.
pub struct RevenueCache {
    version: AtomicU64,
    ttl: Duration,
    cached: Mutex<Option<CachedTotal>>,
}

impl RevenueCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            version: AtomicU64::new(0),
            ttl,
            cached: Mutex::new(None),
        }
    }

    /// Bumped on every payment-status transition.
    pub fn invalidate(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn get_or_compute<E>(
        &self,
        compute: impl FnOnce() -> Result<Decimal, E>,
    ) -> Result<Decimal, E> {
        let version = self.version();
        if let Ok(cached) = self.cached.lock() {
            if let Some(c) = cached.as_ref() {
                if c.version == version && c.computed_at.elapsed() < self.ttl {
                    return Ok(c.total);
                }
            }
        }

        let total = compute()?;
        if let Ok(mut cached) = self.cached.lock() {
            *cached = Some(CachedTotal {
                version,
                computed_at: Instant::now(),
                total,
            });
        }
        Ok(total)
    }
}

pub fn sum(amounts: &[Decimal]) -> Decimal {
    amounts.iter().copied().sum::<Decimal>().round_dp(2)
}
