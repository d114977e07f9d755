//! Fixed-window attendance evaluation.
//!
//! Once per window the evaluator reads every identity's "seen this window"
//! flag and moves the measured interval into worked time or into the
//! current absence run. An absence run that reaches the threshold is
//! finalized into the absence total. A run that ends because the person
//! reappears is forgiven: credited back as worked time.

use crate::ledger::AttendanceLedger;
use crate::types::Identity;
use std::time::{Duration, Instant};

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(2);
pub const DEFAULT_ABSENT_THRESHOLD: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    /// Nominal window length. Evaluation uses the measured interval instead.
    pub window: Duration,
    /// Absence run length that finalizes into the absence total.
    pub absent_threshold: Duration,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            absent_threshold: DEFAULT_ABSENT_THRESHOLD,
        }
    }
}

/// Everything one evaluation changed, in roster order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowEvents {
    /// Measured length of the evaluated window.
    pub interval: Duration,
    /// Absence runs credited back as worked time.
    pub forgiven_absences: Vec<(Identity, Duration)>,
    /// Worked time added for people seen in the window.
    pub worked_added: Vec<(Identity, Duration)>,
    /// Finalized absences, each exactly the threshold.
    pub marked_absences: Vec<(Identity, Duration)>,
}

impl WindowEvents {
    pub fn is_empty(&self) -> bool {
        self.forgiven_absences.is_empty()
            && self.worked_added.is_empty()
            && self.marked_absences.is_empty()
    }
}

/// Window state machine. Only constructible with a window anchor, so an
/// evaluation can never run against an unset start time.
#[derive(Debug, Clone)]
pub struct WindowEvaluator {
    config: WindowConfig,
    window_start: Instant,
}

impl WindowEvaluator {
    pub fn new(config: WindowConfig, anchor: Instant) -> Self {
        Self {
            config,
            window_start: anchor,
        }
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    /// True once the nominal window has elapsed since the anchor.
    pub fn should_evaluate(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) >= self.config.window
    }

    /// Time left until the window is due, zero if already due.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.config
            .window
            .saturating_sub(now.saturating_duration_since(self.window_start))
    }

    /// Close the current window at `now` and open the next one.
    ///
    /// Every roster identity gets exactly one transition. Detection flags are
    /// cleared and the anchor moves to `now`, so calling this twice without
    /// detections in between accumulates absence twice.
    pub fn evaluate(&mut self, ledger: &mut AttendanceLedger, now: Instant) -> WindowEvents {
        let interval = now.saturating_duration_since(self.window_start);
        let threshold = self.config.absent_threshold;

        let mut events = WindowEvents {
            interval,
            ..WindowEvents::default()
        };

        for (id, c) in ledger.iter_mut() {
            if c.detected_in_window {
                if c.absent_time > Duration::ZERO {
                    let forgiven = c.absent_time;
                    c.worked_time += forgiven;
                    c.absent_time = Duration::ZERO;
                    events.forgiven_absences.push((id.clone(), forgiven));
                }
                c.worked_time += interval;
                events.worked_added.push((id.clone(), interval));
            } else {
                c.absent_time += interval;
                if c.absent_time >= threshold {
                    // Overshoot past the threshold is dropped, not carried.
                    c.total_absent_time += threshold;
                    c.absent_time = Duration::ZERO;
                    events.marked_absences.push((id.clone(), threshold));
                }
            }
            c.detected_in_window = false;
        }

        self.window_start = now;
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO: Duration = Duration::from_secs(2);

    fn setup() -> (AttendanceLedger, WindowEvaluator, Instant) {
        let ledger = AttendanceLedger::new(["A", "B"].into_iter().map(Identity::from));
        let t0 = Instant::now();
        (ledger, WindowEvaluator::new(WindowConfig::default(), t0), t0)
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_should_evaluate_boundary() {
        let (_, ev, t0) = setup();
        assert!(!ev.should_evaluate(t0));
        assert!(!ev.should_evaluate(t0 + Duration::from_millis(1999)));
        assert!(ev.should_evaluate(t0 + TWO));
        assert!(ev.should_evaluate(t0 + secs(5)));
    }

    #[test]
    fn test_should_evaluate_does_not_mutate() {
        let (_, ev, t0) = setup();
        let _ = ev.should_evaluate(t0 + secs(10));
        assert_eq!(ev.window_start(), t0);
    }

    #[test]
    fn test_remaining_countdown() {
        let (_, ev, t0) = setup();
        assert_eq!(ev.remaining(t0), TWO);
        assert_eq!(ev.remaining(t0 + Duration::from_millis(500)), Duration::from_millis(1500));
        assert_eq!(ev.remaining(t0 + secs(9)), Duration::ZERO);
    }

    #[test]
    fn test_detected_adds_measured_interval() {
        let (mut l, mut ev, t0) = setup();
        l.mark_detected("A");
        // Scheduling slack: evaluated late, the measured 2.3s counts, not the nominal 2s.
        let now = t0 + Duration::from_millis(2300);
        let events = ev.evaluate(&mut l, now);

        assert_eq!(events.interval, Duration::from_millis(2300));
        assert_eq!(l.worked_time("A"), Some(Duration::from_millis(2300)));
        assert_eq!(events.worked_added, vec![(Identity::from("A"), Duration::from_millis(2300))]);
        assert_eq!(ev.window_start(), now);
    }

    #[test]
    fn test_flags_reset_after_evaluate() {
        let (mut l, mut ev, t0) = setup();
        l.mark_detected("A");
        l.mark_detected("B");
        ev.evaluate(&mut l, t0 + TWO);
        assert!(l.iter().all(|(_, c)| !c.detected_in_window));
    }

    #[test]
    fn test_forgiveness_credits_absence() {
        let (mut l, mut ev, t0) = setup();
        // Three absent windows: 6s accumulated for A.
        let mut now = t0;
        for _ in 0..3 {
            now += TWO;
            ev.evaluate(&mut l, now);
        }
        assert_eq!(l.absent_time("A"), Some(secs(6)));
        let worked_before = l.worked_time("A").unwrap();

        l.mark_detected("A");
        now += TWO;
        let events = ev.evaluate(&mut l, now);

        assert_eq!(l.worked_time("A").unwrap() - worked_before, secs(6) + TWO);
        assert_eq!(l.absent_time("A"), Some(Duration::ZERO));
        assert_eq!(events.forgiven_absences, vec![(Identity::from("A"), secs(6))]);
        assert_eq!(events.worked_added, vec![(Identity::from("A"), TWO)]);
        assert!(events.marked_absences.is_empty());
    }

    #[test]
    fn test_no_forgiveness_event_without_absence() {
        let (mut l, mut ev, t0) = setup();
        l.mark_detected("A");
        let events = ev.evaluate(&mut l, t0 + TWO);
        assert!(events.forgiven_absences.is_empty());
    }

    #[test]
    fn test_threshold_exact_finalizes() {
        let (mut l, mut ev, t0) = setup();
        let mut now = t0;
        let mut marks = Vec::new();
        for _ in 0..15 {
            now += TWO;
            marks.extend(ev.evaluate(&mut l, now).marked_absences);
        }
        // 15 x 2s = exactly 30s: >= comparison finalizes.
        assert_eq!(
            marks,
            vec![(Identity::from("A"), secs(30)), (Identity::from("B"), secs(30))]
        );
        assert_eq!(l.total_absent_time("A"), Some(secs(30)));
        assert_eq!(l.absent_time("A"), Some(Duration::ZERO));
    }

    #[test]
    fn test_threshold_overshoot_discarded() {
        let (mut l, mut ev, t0) = setup();
        l.mark_detected("A");
        // A: 28s absent, then a late 7s window takes the run to 35s.
        let mut now = t0 + TWO;
        ev.evaluate(&mut l, now);
        now += secs(28);
        ev.evaluate(&mut l, now);
        l.mark_detected("A");
        now += TWO;
        ev.evaluate(&mut l, now);

        now += secs(28);
        ev.evaluate(&mut l, now);
        assert_eq!(l.absent_time("A"), Some(secs(28)));
        now += secs(7);
        let events = ev.evaluate(&mut l, now);

        assert!(events.marked_absences.contains(&(Identity::from("A"), secs(30))));
        assert_eq!(l.total_absent_time("A"), Some(secs(30)));
        // The 5s overshoot is not carried into the next run.
        assert_eq!(l.absent_time("A"), Some(Duration::ZERO));
    }

    #[test]
    fn test_below_threshold_carries_without_event() {
        let (mut l, mut ev, t0) = setup();
        let events = ev.evaluate(&mut l, t0 + secs(29));
        assert!(events.marked_absences.is_empty());
        assert_eq!(l.absent_time("B"), Some(secs(29)));
        assert_eq!(l.total_absent_time("B"), Some(Duration::ZERO));
    }

    #[test]
    fn test_repeated_evaluate_accumulates_absence() {
        let (mut l, mut ev, t0) = setup();
        ev.evaluate(&mut l, t0 + TWO);
        ev.evaluate(&mut l, t0 + secs(4));
        assert_eq!(l.absent_time("A"), Some(secs(4)));
        assert_eq!(l.absent_time("B"), Some(secs(4)));
    }

    #[test]
    fn test_invariants_over_mixed_sequence() {
        let (mut l, mut ev, t0) = setup();
        let threshold = ev.config().absent_threshold;
        let mut now = t0;
        // Irregular intervals and a detection pattern that mixes both transitions.
        for step in 0u64..200 {
            if step % 7 == 0 {
                l.mark_detected("A");
            }
            if step % 23 == 0 {
                l.mark_detected("B");
            }
            now += Duration::from_millis(1500 + (step % 5) * 700);
            ev.evaluate(&mut l, now);

            for (_, c) in l.iter() {
                assert!(c.absent_time < threshold);
                assert_eq!(c.total_absent_time.as_nanos() % threshold.as_nanos(), 0);
            }
        }
    }

    #[test]
    fn test_end_to_end_two_people() {
        let (mut l, mut ev, t0) = setup();

        // Window 1: A seen, B not.
        l.mark_detected("A");
        let mut now = t0 + TWO;
        ev.evaluate(&mut l, now);
        assert_eq!(l.worked_time("A"), Some(TWO));
        assert_eq!(l.absent_time("B"), Some(TWO));

        // Window 2: nobody seen.
        now += TWO;
        ev.evaluate(&mut l, now);
        assert_eq!(l.worked_time("A"), Some(TWO));
        assert_eq!(l.absent_time("A"), Some(TWO));
        assert_eq!(l.absent_time("B"), Some(secs(4)));

        // B stays away until its run reaches 30s (13 more windows).
        let mut b_marks = 0;
        for _ in 0..13 {
            now += TWO;
            let events = ev.evaluate(&mut l, now);
            b_marks += events
                .marked_absences
                .iter()
                .filter(|(id, _)| id.as_str() == "B")
                .count();
        }
        assert_eq!(b_marks, 1);
        assert_eq!(l.total_absent_time("B"), Some(secs(30)));
        assert_eq!(l.absent_time("B"), Some(Duration::ZERO));
    }

    #[test]
    fn test_events_empty_while_absence_accumulates() {
        let (mut l, mut ev, t0) = setup();
        let events = ev.evaluate(&mut l, t0 + TWO);
        assert!(events.is_empty());
        assert_eq!(events.interval, TWO);

        l.mark_detected("A");
        assert!(!ev.evaluate(&mut l, t0 + secs(4)).is_empty());
    }
}
