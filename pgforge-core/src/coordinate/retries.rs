//! Turn a [`Backoff`] into a plain [`Iterator`] of delays, for use in the
//! lock-retry loops in [`super::startup`] and [`super::resource`].

use std::time::Duration;

use backoff::backoff::Backoff;
use rand::RngCore;

/// Adapts any [`Backoff`] to an [`Iterator`]; yields `None` once the backoff
/// reports it is exhausted.
pub struct BackoffIter<B> {
    backoff: B,
}

impl<B: Backoff> From<B> for BackoffIter<B> {
    fn from(backoff: B) -> Self {
        Self { backoff }
    }
}

impl<B: Backoff> Iterator for BackoffIter<B> {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        self.backoff.next_backoff()
    }
}

/// A [`Backoff`] that never gives up, waiting a uniformly random delay
/// between 200ms and 1000ms between attempts. This is the jitter used while
/// polling for another process to finish starting or stopping a resource.
#[derive(Debug, Default)]
pub struct RandomJitter;

impl Backoff for RandomJitter {
    fn reset(&mut self) {}

    fn next_backoff(&mut self) -> Option<Duration> {
        let delay = rand::rng().next_u32();
        let delay = 200 + (delay % 800);
        Some(Duration::from_millis(u64::from(delay)))
    }
}

/// The retry policy used internally by [`super::run_and_stop`] and friends:
/// jittered, unbounded.
pub fn unbounded() -> BackoffIter<RandomJitter> {
    RandomJitter.into()
}

#[cfg(test)]
mod tests {
    use super::{unbounded, BackoffIter, RandomJitter};

    #[test]
    fn random_jitter_never_exhausts() {
        let mut retries = unbounded();
        for _ in 0..10 {
            let delay = retries.next().expect("should never be exhausted");
            assert!(delay.as_millis() >= 200 && delay.as_millis() < 1000);
        }
    }

    #[test]
    fn wraps_an_exponential_backoff() {
        let backoff = backoff::ExponentialBackoffBuilder::new()
            .with_initial_interval(std::time::Duration::from_millis(1))
            .with_max_elapsed_time(Some(std::time::Duration::from_millis(5)))
            .build();
        let retries: BackoffIter<_> = backoff.into();
        assert!(retries.count() > 0);
        let _ = RandomJitter;
    }
}
