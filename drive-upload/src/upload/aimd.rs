use crate::config::{DEFAULT_INITIAL_CONCURRENCY, DEFAULT_MAX_CONCURRENCY};

/// Additive-increase/multiplicative-decrease bound on in-flight transfers.
/// Grows by one per successful item, halves per failed item, and always stays
/// within `1..=max`. `max` itself never exceeds [`DEFAULT_MAX_CONCURRENCY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AimdLimit {
    limit: usize,
    max: usize,
}

impl Default for AimdLimit {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_CONCURRENCY, DEFAULT_MAX_CONCURRENCY)
    }
}

impl AimdLimit {
    pub fn new(initial: usize, max: usize) -> Self {
        let max = max.clamp(1, DEFAULT_MAX_CONCURRENCY);
        Self {
            limit: initial.clamp(1, max),
            max,
        }
    }

    pub fn current(&self) -> usize {
        self.limit
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn on_success(&mut self) -> usize {
        self.limit = (self.limit + 1).min(self.max);
        self.limit
    }

    // TODO: halving on every failed item oscillates when one flaky file sits
    // among many healthy ones; a windowed failure rate would damp that.
    pub fn on_failure(&mut self) -> usize {
        self.limit = (self.limit / 2).max(1);
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn five_successes_ramp_three_to_eight() {
        let mut limit = AimdLimit::default();
        let steps: Vec<_> = (0..5).map(|_| limit.on_success()).collect();
        assert_eq!(steps, vec![4, 5, 6, 7, 8]);
    }

    #[test]
    fn ramp_is_capped_at_max() {
        let mut limit = AimdLimit::new(9, 10);
        assert_eq!(limit.on_success(), 10);
        assert_eq!(limit.on_success(), 10);
    }

    #[test]
    fn oversized_max_still_ramps_only_to_ten() {
        let mut limit = AimdLimit::new(3, 50);
        let last = (0..60).map(|_| limit.on_success()).last();
        assert_eq!(last, Some(10));
    }

    #[test]
    fn failure_halves_and_floors_at_one() {
        let mut limit = AimdLimit::new(8, 10);
        assert_eq!(limit.on_failure(), 4);

        let mut limit = AimdLimit::new(1, 10);
        assert_eq!(limit.on_failure(), 1);

        let mut limit = AimdLimit::new(3, 10);
        assert_eq!(limit.on_failure(), 1);
    }

    #[test]
    fn constructor_clamps_out_of_range_values() {
        assert_eq!(AimdLimit::new(0, 10).current(), 1);
        assert_eq!(AimdLimit::new(50, 10).current(), 10);
        let oversized = AimdLimit::new(3, 50);
        assert_eq!(oversized.max(), 10);
        assert_eq!(AimdLimit::new(50, 50).current(), 10);
        let degenerate = AimdLimit::new(3, 0);
        assert_eq!(degenerate.max(), 1);
        assert_eq!(degenerate.current(), 1);
    }

    #[test]
    fn random_sequences_stay_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut limit = AimdLimit::default();
        for _ in 0..10_000 {
            let next = if rng.gen_bool(0.3) {
                limit.on_failure()
            } else {
                limit.on_success()
            };
            assert!((1..=10).contains(&next));
        }
    }
}
