use {rand::Rng, std::time::Duration};

/// Produces the pause a paced script takes between operations. Called
/// once per operation so randomized policies re-draw every time.
pub type DelayFunction = Box<dyn Fn() -> Duration + Send + Sync>;

/// Back-to-back operations, no pacing.
pub fn no_delay() -> DelayFunction {
    Box::new(|| Duration::from_micros(0))
}

/// The same pause before every operation.
pub fn fixed_delay(micros: u64) -> DelayFunction {
    Box::new(move || Duration::from_micros(micros))
}

/// Exponentially distributed pauses with the given mean, which makes the
/// operation stream Poisson. This is the load model for the throughput
/// scripts.
pub fn exponential_delay(mean_micros: f64) -> DelayFunction {
    assert!(mean_micros > 0.0);
    Box::new(move || {
        let draw: f64 = rand::thread_rng().gen_range(f64::EPSILON..1.0);
        Duration::from_micros((-mean_micros * draw.ln()) as u64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_delay_is_constant() {
        let delay = fixed_delay(1500);
        assert_eq!(delay(), Duration::from_micros(1500));
        assert_eq!(delay(), Duration::from_micros(1500));
        assert_eq!(no_delay()(), Duration::from_micros(0));
    }

    #[test]
    fn exponential_delay_has_a_plausible_mean() {
        let delay = exponential_delay(1000.0);
        let total: u128 = (0..4000).map(|_| delay().as_micros()).sum();
        let mean = total / 4000;
        assert!(mean > 500 && mean < 2000, "observed mean {}", mean);
    }
}
