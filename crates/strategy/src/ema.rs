/// Three exponential moving averages over the same price stream, keyed by
/// period class (fast/mid/slow). Weight factor is the standard `2/(N+1)`;
/// each average seeds itself with the first sample.
///
/// With the production periods (1, 3, 7) the fast EMA degenerates to the
/// raw price, which the engine uses as its working price.
#[derive(Debug, Clone)]
pub struct EmaTrio {
    alpha_fast: f64,
    alpha_mid: f64,
    alpha_slow: f64,
    fast: Option<f64>,
    mid: Option<f64>,
    slow: Option<f64>,
}

impl EmaTrio {
    pub fn new(fast_period: usize, mid_period: usize, slow_period: usize) -> Self {
        assert!(fast_period >= 1 && mid_period >= 1 && slow_period >= 1);
        Self {
            alpha_fast: 2.0 / (fast_period as f64 + 1.0),
            alpha_mid: 2.0 / (mid_period as f64 + 1.0),
            alpha_slow: 2.0 / (slow_period as f64 + 1.0),
            fast: None,
            mid: None,
            slow: None,
        }
    }

    /// Fold one price sample into all three averages and return the
    /// updated (fast, mid, slow) values.
    pub fn update(&mut self, price: f64) -> (f64, f64, f64) {
        let fast = step(self.fast, price, self.alpha_fast);
        let mid = step(self.mid, price, self.alpha_mid);
        let slow = step(self.slow, price, self.alpha_slow);
        self.fast = Some(fast);
        self.mid = Some(mid);
        self.slow = Some(slow);
        (fast, mid, slow)
    }
}

fn step(prev: Option<f64>, price: f64, alpha: f64) -> f64 {
    match prev {
        None => price,
        Some(v) => price * alpha + v * (1.0 - alpha),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_seeds_all_three() {
        let mut ema = EmaTrio::new(1, 3, 7);
        assert_eq!(ema.update(100.0), (100.0, 100.0, 100.0));
    }

    #[test]
    fn period_one_tracks_price_exactly() {
        let mut ema = EmaTrio::new(1, 3, 7);
        ema.update(100.0);
        let (fast, _, _) = ema.update(123.45);
        assert_eq!(fast, 123.45);
    }

    #[test]
    fn slower_periods_lag_behind() {
        let mut ema = EmaTrio::new(1, 3, 7);
        ema.update(100.0);
        let (fast, mid, slow) = ema.update(110.0);
        assert!(fast > mid, "fast should lead mid on an up-move");
        assert!(mid > slow, "mid should lead slow on an up-move");
        // alpha(3) = 0.5, alpha(7) = 0.25
        assert!((mid - 105.0).abs() < 1e-9);
        assert!((slow - 102.5).abs() < 1e-9);
    }

    #[test]
    fn converges_on_constant_input() {
        let mut ema = EmaTrio::new(1, 3, 7);
        let mut last = (0.0, 0.0, 0.0);
        for _ in 0..200 {
            last = ema.update(42.0);
        }
        assert!((last.1 - 42.0).abs() < 1e-9);
        assert!((last.2 - 42.0).abs() < 1e-9);
    }
}
