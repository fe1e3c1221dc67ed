//! Turns raw motion and light samples into discrete alert events.

use std::time::Duration;
use tokio::time::Instant;

use crate::config::{LIGHT_THRESHOLD, MOTION_DEBOUNCE};

pub struct EventDetector {
    debounce: Duration,
    light_threshold: u16,
    /// Time of the last accepted motion event; `None` until the first one.
    last_trigger: Option<Instant>,
}

impl Default for EventDetector {
    fn default() -> Self {
        Self::new(MOTION_DEBOUNCE, LIGHT_THRESHOLD)
    }
}

impl EventDetector {
    pub fn new(debounce: Duration, light_threshold: u16) -> Self {
        Self {
            debounce,
            light_threshold,
            last_trigger: None,
        }
    }

    /// Accept a motion event if `motion` is set and more than the debounce
    /// window has passed since the last accepted one. Accepting records
    /// `now` as the new reference point.
    pub fn evaluate_motion(&mut self, now: Instant, motion: bool) -> bool {
        if !motion {
            return false;
        }

        let clear = match self.last_trigger {
            Some(last) => now.saturating_duration_since(last) > self.debounce,
            None => true,
        };
        if clear {
            self.last_trigger = Some(now);
        }
        clear
    }

    /// Light alert: level strictly below the threshold.
    pub fn evaluate_light(&self, light_level: u16) -> bool {
        light_level < self.light_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn first_motion_is_accepted() {
        let mut d = EventDetector::default();
        assert!(d.evaluate_motion(Instant::now(), true));
    }

    #[test]
    fn no_motion_never_triggers() {
        let mut d = EventDetector::default();
        let t0 = Instant::now();
        for i in 0..10 {
            assert!(!d.evaluate_motion(t0 + ms(i * 5000), false));
        }
    }

    #[test]
    fn motion_within_window_is_suppressed() {
        let mut d = EventDetector::default();
        let t0 = Instant::now();
        assert!(d.evaluate_motion(t0, true));
        assert!(!d.evaluate_motion(t0 + ms(1000), true));
        assert!(!d.evaluate_motion(t0 + ms(2999), true));
    }

    #[test]
    fn window_boundary_is_exclusive() {
        let mut d = EventDetector::default();
        let t0 = Instant::now();
        assert!(d.evaluate_motion(t0, true));
        // Exactly the window does not exceed it.
        assert!(!d.evaluate_motion(t0 + ms(3000), true));
        assert!(d.evaluate_motion(t0 + ms(3001), true));
    }

    #[test]
    fn suppressed_events_do_not_extend_window() {
        let mut d = EventDetector::default();
        let t0 = Instant::now();
        assert!(d.evaluate_motion(t0, true));
        assert!(!d.evaluate_motion(t0 + ms(2000), true));
        // Measured from the accepted event at t0, not the suppressed one.
        assert!(d.evaluate_motion(t0 + ms(3500), true));
    }

    #[test]
    fn at_most_one_event_per_window() {
        let mut d = EventDetector::default();
        let t0 = Instant::now();
        // A motion sample every 250 ms for 12 s.
        let accepted: Vec<u64> = (0..48)
            .map(|i| i * 250)
            .filter(|&t| d.evaluate_motion(t0 + ms(t), true))
            .collect();
        for pair in accepted.windows(2) {
            assert!(pair[1] - pair[0] > 3000, "too close: {pair:?}");
        }
        assert_eq!(accepted, vec![0, 3250, 6500, 9750]);
    }

    #[test]
    fn light_threshold_is_strict() {
        let d = EventDetector::default();
        assert!(d.evaluate_light(0));
        assert!(d.evaluate_light(499));
        assert!(!d.evaluate_light(500));
        assert!(!d.evaluate_light(4095));
    }
}
