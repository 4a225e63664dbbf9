//! Politeness delay between downloads

use rand::Rng;
use std::time::Duration;

/// Random pause taken after each successful download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolitenessDelay {
    min_ms: u64,
    max_ms: u64,
}

impl PolitenessDelay {
    /// Bounds are in milliseconds; swapped if given in the wrong order
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: min_ms.max(max_ms),
        }
    }

    /// Pick the next pause length
    pub fn next_delay(&self) -> Duration {
        if self.max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(self.min_ms..=self.max_ms))
    }

    /// Sleep for a freshly picked pause
    pub fn pause(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_within_bounds() {
        let delay = PolitenessDelay::new(500, 1500);
        for _ in 0..100 {
            let d = delay.next_delay();
            assert!(d >= Duration::from_millis(500));
            assert!(d <= Duration::from_millis(1500));
        }
    }

    #[test]
    fn test_bounds_are_ordered() {
        assert_eq!(PolitenessDelay::new(900, 100), PolitenessDelay::new(100, 900));
    }

    #[test]
    fn test_zero_delay() {
        assert_eq!(PolitenessDelay::new(0, 0).next_delay(), Duration::ZERO);
    }

    #[test]
    fn test_fixed_delay() {
        assert_eq!(
            PolitenessDelay::new(250, 250).next_delay(),
            Duration::from_millis(250)
        );
    }
}
