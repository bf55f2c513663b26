//! Request pacing shared by every backend.
//!
//! A `RateLimiter` is a single gate: one `Permit` exists at a time, and the
//! gate only reopens after the holder's cooldown (`duration * jitter`, jitter
//! uniform in `[0.85, 1.15]`) has elapsed or its cancellation token fired.

use ironloop_core::ChatError;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Used when a limiter is built with a zero duration.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

const JITTER_MIN: f64 = 0.85;
const JITTER_MAX: f64 = 1.15;

/// Serializes and paces requests to a backend. Clones share the same gate.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    gate: Arc<Mutex<()>>,
    base: Duration,
}

impl RateLimiter {
    pub fn new(base: Duration) -> Self {
        Self {
            gate: Arc::new(Mutex::new(())),
            base: if base.is_zero() { DEFAULT_WAIT } else { base },
        }
    }

    /// The base cooldown applied by `acquire`.
    pub fn base(&self) -> Duration {
        self.base
    }

    /// Wait for the gate with the default cooldown.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Permit, ChatError> {
        self.acquire_for(cancel, self.base).await
    }

    /// Wait for the gate; the permit's cooldown is `duration` with jitter.
    pub async fn acquire_for(
        &self,
        cancel: &CancellationToken,
        duration: Duration,
    ) -> Result<Permit, ChatError> {
        let guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChatError::Cancelled),
            guard = self.gate.clone().lock_owned() => guard,
        };
        let cooldown = jittered(duration);
        trace!(cooldown_ms = cooldown.as_millis() as u64, "Rate limit gate acquired");
        Ok(Permit {
            guard: Some(guard),
            cooldown,
            cancel: cancel.clone(),
        })
    }
}

fn jittered(duration: Duration) -> Duration {
    let factor = rand::rng().random_range(JITTER_MIN..=JITTER_MAX);
    duration.mul_f64(factor)
}

/// Exclusive hold on a `RateLimiter` gate.
#[derive(Debug)]
pub struct Permit {
    guard: Option<OwnedMutexGuard<()>>,
    cooldown: Duration,
    cancel: CancellationToken,
}

impl Permit {
    /// The cooldown served before the gate reopens.
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Serve the cooldown, then unlock. Returns early if cancelled.
    pub async fn release(mut self) {
        if let Some(guard) = self.guard.take() {
            cool_down(guard, self.cooldown, self.cancel.clone()).await;
        }
    }
}

async fn cool_down(guard: OwnedMutexGuard<()>, cooldown: Duration, cancel: CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(cooldown) => {}
    }
    drop(guard);
}

impl Drop for Permit {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        if self.cancel.is_cancelled() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(cool_down(guard, self.cooldown, self.cancel.clone()));
            }
            // Outside a runtime the cooldown cannot be timed; unlock now.
            Err(_) => drop(guard),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    const BASE: Duration = Duration::from_secs(10);

    #[test]
    fn zero_base_uses_default() {
        assert_eq!(RateLimiter::new(Duration::ZERO).base(), DEFAULT_WAIT);
        assert_eq!(RateLimiter::new(BASE).base(), BASE);
    }

    #[test]
    fn jitter_stays_in_bounds() {
        for _ in 0..1000 {
            let d = jittered(BASE);
            assert!(d >= BASE.mul_f64(JITTER_MIN));
            assert!(d <= BASE.mul_f64(JITTER_MAX));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn second_acquire_waits_for_release_and_cooldown() {
        let limiter = RateLimiter::new(BASE);
        let cancel = CancellationToken::new();

        let permit = limiter.acquire(&cancel).await.unwrap();
        let waiter = {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let start = Instant::now();
                let permit = limiter.acquire(&cancel).await.unwrap();
                drop(permit);
                start.elapsed()
            })
        };

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        permit.release().await;
        let waited = waiter.await.unwrap();
        assert!(waited >= BASE.mul_f64(JITTER_MIN));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_cooldown_unlocks_immediately() {
        let limiter = RateLimiter::new(BASE);
        let cancel = CancellationToken::new();

        let permit = limiter.acquire(&cancel).await.unwrap();
        cancel.cancel();

        let start = Instant::now();
        permit.release().await;
        assert!(start.elapsed() < BASE.mul_f64(JITTER_MIN));

        let fresh = CancellationToken::new();
        let start = Instant::now();
        let again = limiter.acquire(&fresh).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(1));
        drop(again);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_permit_serves_cooldown_in_background() {
        let limiter = RateLimiter::new(BASE);
        let cancel = CancellationToken::new();

        drop(limiter.acquire(&cancel).await.unwrap());

        let start = Instant::now();
        let permit = limiter.acquire(&cancel).await.unwrap();
        assert!(start.elapsed() >= BASE.mul_f64(JITTER_MIN));
        permit.release().await;
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_for_gate_is_cancellable() {
        let limiter = RateLimiter::new(BASE);
        let holder = CancellationToken::new();
        let _permit = limiter.acquire(&holder).await.unwrap();

        let waiter = CancellationToken::new();
        let pending = {
            let limiter = limiter.clone();
            let waiter = waiter.clone();
            tokio::spawn(async move { limiter.acquire(&waiter).await })
        };
        tokio::task::yield_now().await;
        waiter.cancel();
        assert!(matches!(pending.await.unwrap(), Err(ChatError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_for_uses_the_given_duration() {
        let limiter = RateLimiter::new(BASE);
        let cancel = CancellationToken::new();
        let permit = limiter
            .acquire_for(&cancel, Duration::from_secs(100))
            .await
            .unwrap();
        assert!(permit.cooldown() >= Duration::from_secs(85));
        permit.release().await;
    }
}
