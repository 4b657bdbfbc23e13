/// Continuously decaying learning rate: the rate shrinks by a factor of
/// `decay_rate` every `decay_steps` steps, interpolating between those
/// boundaries instead of stepping down at them.
#[derive(Debug)]
pub(crate) struct ExponentialDecay {
    initial: f64,
    decay_steps: u32,
    decay_rate: f64,
}

impl ExponentialDecay {
    pub(crate) fn new(initial: f64, decay_steps: u32, decay_rate: f64) -> Self {
        Self {
            initial,
            decay_steps,
            decay_rate,
        }
    }

    /// The learning rate for a zero based step counter.
    pub(crate) fn lr_at(&self, step: u32) -> f64 {
        self.initial
            * self
                .decay_rate
                .powf(f64::from(step) / f64::from(self.decay_steps))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn starts_at_the_initial_rate() {
        let schedule = ExponentialDecay::new(1.0, 100, 0.96);
        assert_abs_diff_eq!(schedule.lr_at(0), 1.0);
    }

    #[test]
    fn decays_by_the_rate_every_decay_steps() {
        let schedule = ExponentialDecay::new(2.0, 100, 0.5);
        assert_abs_diff_eq!(schedule.lr_at(100), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(schedule.lr_at(200), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn interpolates_between_boundaries() {
        // continuous decay, not a staircase
        let schedule = ExponentialDecay::new(1.0, 100, 0.25);
        assert_abs_diff_eq!(schedule.lr_at(50), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn strictly_decreases_for_rates_below_one() {
        let schedule = ExponentialDecay::new(1.0, 100, 0.96);

        let mut last = f64::INFINITY;
        for step in 0..500 {
            let lr = schedule.lr_at(step);
            assert!(lr < last, "step {}: {} should be below {}", step, lr, last);
            last = lr;
        }
    }
}
