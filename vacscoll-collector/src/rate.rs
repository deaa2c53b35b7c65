//! Single-slot dispatch gate.
//!
//! At most one caller passes [`RateGate::acquire`] per `delay`. The slot is
//! handed back by a detached timer task, so the caller that took it is free to
//! run its request while the next waiter is woken as soon as the interval
//! elapses. Waiters are served in arrival order by the underlying semaphore.
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;

#[derive(Clone, Debug)]
pub struct RateGate {
    slot: Arc<Semaphore>,
    delay: Duration,
}

impl RateGate {
    pub fn new(delay: Duration) -> Self {
        Self {
            slot: Arc::new(Semaphore::new(1)),
            delay,
        }
    }

    /// Negative, NaN and infinite values collapse to no delay; finite values
    /// too large for a `Duration` saturate.
    pub fn from_secs_f64(secs: f64) -> Self {
        let delay = if secs.is_finite() && secs > 0.0 {
            Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        };
        Self::new(delay)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Wait for the slot, take it, and schedule its return after `delay`.
    pub async fn acquire(&self) {
        let permit = match self.slot.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                // Only reachable if someone closes the semaphore.
                tracing::warn!("rate_gate.closed");
                return;
            }
        };
        if self.delay.is_zero() {
            return;
        }

        permit.forget();
        let slot = self.slot.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            sleep(delay).await;
            slot.add_permits(1);
        });
        tracing::trace!(target: "rate", delay_ms = delay.as_millis() as u64, "rate_gate.acquired");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::time::Instant;

    #[tokio::test]
    async fn five_acquisitions_take_at_least_four_intervals() {
        let gate = RateGate::from_secs_f64(0.2);
        let started = Instant::now();

        let granted = join_all((0..5).map(|_| {
            let gate = gate.clone();
            async move {
                gate.acquire().await;
                Instant::now()
            }
        }))
        .await;

        assert!(started.elapsed() >= Duration::from_millis(800));

        let mut times = granted;
        times.sort();
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(190));
        }
    }

    #[tokio::test]
    async fn slot_reopens_while_holder_is_still_busy() {
        let gate = RateGate::from_secs_f64(0.05);
        let started = Instant::now();

        // Each holder "works" far longer than the gate interval; dispatch pacing
        // must not wait for that work to finish.
        let work = |gate: RateGate| async move {
            gate.acquire().await;
            tokio::time::sleep(Duration::from_millis(500)).await;
        };
        join_all((0..4).map(|_| work(gate.clone()))).await;

        assert!(started.elapsed() < Duration::from_millis(1200));
    }

    #[tokio::test]
    async fn many_waiters_all_get_through() {
        let gate = RateGate::from_secs_f64(0.01);
        let all = join_all((0..25).map(|_| {
            let gate = gate.clone();
            async move { gate.acquire().await }
        }));

        tokio::time::timeout(Duration::from_secs(5), all)
            .await
            .expect("every waiter is eventually admitted");
    }

    #[test]
    fn huge_delay_saturates() {
        assert_eq!(RateGate::from_secs_f64(1.0e30).delay(), Duration::MAX);
        assert_eq!(RateGate::from_secs_f64(f64::INFINITY).delay(), Duration::ZERO);
    }

    #[tokio::test]
    async fn zero_delay_never_blocks() {
        let gate = RateGate::from_secs_f64(-3.0);
        assert_eq!(gate.delay(), Duration::ZERO);

        let started = Instant::now();
        for _ in 0..100 {
            gate.acquire().await;
        }
        assert!(started.elapsed() < Duration::from_millis(500));
    }
}
