use std::thread;
use std::time::Duration;

use log::info;
use rand::Rng;

use crate::config::DelayRange;

/// Negative or non-finite bounds count as zero.
pub fn pick_delay(range: DelayRange) -> Duration {
    let min = clamp_secs(range.min_secs);
    let max = clamp_secs(range.max_secs);
    if max <= min {
        return Duration::from_secs_f64(min);
    }
    let mut rng = rand::thread_rng();
    Duration::from_secs_f64(rng.gen_range(min..=max))
}

fn clamp_secs(secs: f64) -> f64 {
    if secs.is_finite() && secs > 0.0 {
        secs
    } else {
        0.0
    }
}

/// Sleeps between two page loads. Fixed bounds, no adaptation.
pub fn random_page_delay(range: DelayRange) {
    let delay = pick_delay(range);
    if delay.is_zero() {
        return;
    }
    info!("Waiting for {:.2} seconds (Page Delay)...", delay.as_secs_f64());
    thread::sleep(delay);
}

/// Sleeps before re-attempting a failed page.
pub fn retry_delay(range: DelayRange, attempt: u32) {
    let delay = pick_delay(range);
    if delay.is_zero() {
        return;
    }
    info!(
        "Waiting for {:.2} seconds before attempt {} (Retry Delay)...",
        delay.as_secs_f64(),
        attempt
    );
    thread::sleep(delay);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picked_delay_stays_within_bounds() {
        let range = DelayRange::new(1.0, 2.5).unwrap();
        for _ in 0..200 {
            let secs = pick_delay(range).as_secs_f64();
            assert!((1.0..=2.5).contains(&secs), "{secs} out of range");
        }
    }

    #[test]
    fn degenerate_range_is_fixed() {
        assert_eq!(pick_delay(DelayRange::NONE), Duration::ZERO);
        let fixed = DelayRange::new(0.5, 0.5).unwrap();
        assert_eq!(pick_delay(fixed), Duration::from_millis(500));
    }

    #[test]
    fn unchecked_bad_bounds_clamp_to_zero() {
        let negative = DelayRange {
            min_secs: -2.0,
            max_secs: -1.0,
        };
        assert_eq!(pick_delay(negative), Duration::ZERO);

        let nan = DelayRange {
            min_secs: f64::NAN,
            max_secs: f64::NAN,
        };
        assert_eq!(pick_delay(nan), Duration::ZERO);

        let half_bad = DelayRange {
            min_secs: -1.0,
            max_secs: 0.25,
        };
        assert!(pick_delay(half_bad) <= Duration::from_millis(250));
    }
}
