//! Text rendering of attendance state. Read-only views over the ledger.

use crate::ledger::{AttendanceLedger, PersonCounters};
use crate::roster::Roster;
use std::fmt::Write as _;
use std::time::Duration;

const BAR_WIDTH: usize = 20;

/// `MM:SS` below an hour, `H:MM:SS` from an hour up. Sub-second parts are truncated.
pub fn format_duration(d: Duration) -> String {
    let total = d.as_secs();
    let hrs = total / 3600;
    let mins = (total % 3600) / 60;
    let secs = total % 60;
    if hrs > 0 {
        format!("{hrs}:{mins:02}:{secs:02}")
    } else {
        format!("{mins:02}:{secs:02}")
    }
}

/// Same as [`format_duration`] for persisted second counts.
pub fn format_secs(secs: f64) -> String {
    Duration::try_from_secs_f64(secs)
        .map(format_duration)
        .unwrap_or_else(|_| "--:--".to_string())
}

/// Progress of the current absence run toward the threshold, clamped to `[0, 1]`.
pub fn absence_progress(absent: Duration, threshold: Duration) -> f64 {
    if threshold.is_zero() {
        return 1.0;
    }
    (absent.as_secs_f64() / threshold.as_secs_f64()).clamp(0.0, 1.0)
}

/// Fixed-width text bar, e.g. `[#####---------------]`.
pub fn absence_bar(absent: Duration, threshold: Duration) -> String {
    let filled = (absence_progress(absent, threshold) * BAR_WIDTH as f64) as usize;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

/// One person's line: worked, current absence run, finalized absence, bar.
pub fn status_line(label: &str, c: &PersonCounters, threshold: Duration) -> String {
    format!(
        "{label:<16} W:{:>8}  Acur:{:>8}  Atot:{:>8}  {}",
        format_duration(c.worked_time),
        format_duration(c.absent_time),
        format_duration(c.total_absent_time),
        absence_bar(c.absent_time, threshold),
    )
}

/// Full status panel: header, one line per person, countdown to next window.
pub fn render_status(
    ledger: &AttendanceLedger,
    roster: Option<&Roster>,
    threshold: Duration,
    remaining: Option<Duration>,
) -> String {
    let mut out = String::from("Attendance\n");
    for (id, c) in ledger.iter() {
        let label = match roster {
            Some(r) => format!("{} ({id})", r.display_name(id)),
            None => id.to_string(),
        };
        let _ = writeln!(out, "{}", status_line(&label, c, threshold));
    }
    if let Some(rem) = remaining {
        let _ = writeln!(out, "Next in: {}s", rem.as_secs());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Identity;

    #[test]
    fn test_format_under_an_hour() {
        assert_eq!(format_duration(Duration::from_secs(0)), "00:00");
        assert_eq!(format_duration(Duration::from_secs(75)), "01:15");
        assert_eq!(format_duration(Duration::from_millis(59_999)), "00:59");
    }

    #[test]
    fn test_format_hours() {
        assert_eq!(format_duration(Duration::from_secs(3600)), "1:00:00");
        assert_eq!(format_duration(Duration::from_secs(3 * 3600 + 62)), "3:01:02");
    }

    #[test]
    fn test_format_secs_out_of_range() {
        assert_eq!(format_secs(90.5), "01:30");
        assert_eq!(format_secs(-1.0), "--:--");
    }

    #[test]
    fn test_absence_progress_clamped() {
        let th = Duration::from_secs(30);
        assert_eq!(absence_progress(Duration::ZERO, th), 0.0);
        assert!((absence_progress(Duration::from_secs(15), th) - 0.5).abs() < 1e-9);
        assert_eq!(absence_progress(Duration::from_secs(45), th), 1.0);
        assert_eq!(absence_progress(Duration::from_secs(1), Duration::ZERO), 1.0);
    }

    #[test]
    fn test_absence_bar_width() {
        let th = Duration::from_secs(30);
        assert_eq!(
            absence_bar(Duration::from_secs(15), th),
            format!("[{}{}]", "#".repeat(10), "-".repeat(10))
        );
        assert_eq!(absence_bar(Duration::from_secs(99), th).len(), BAR_WIDTH + 2);
    }

    #[test]
    fn test_render_status_lists_everyone() {
        let ledger = AttendanceLedger::new(["A", "B"].into_iter().map(Identity::from));
        let out = render_status(
            &ledger,
            None,
            Duration::from_secs(30),
            Some(Duration::from_millis(1500)),
        );
        assert!(out.starts_with("Attendance\n"));
        assert!(out.contains("A "));
        assert!(out.contains("B "));
        assert!(out.contains("Next in: 1s"));
    }
}
