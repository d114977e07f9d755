use anyhow::{Context, Result};
use presence_core::display::render_status;
use presence_core::{AttendanceLedger, GalleryMatcher, Roster, Tracker};
use presence_store::{open_store, AttendanceStore};
use std::io::{BufRead, BufReader};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod feed;

use config::{Config, FeedClock};

#[tokio::main]
async fn main() -> Result<()> {
    let default_level = if config::verbose_from_env() { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    tracing::info!("presenced starting");

    let config = Config::load()?;
    tracing::info!(
        roster = %config.roster_path.display(),
        store = %config.store_path.display(),
        backend = ?config.store_backend,
        clock = ?config.feed_clock,
        window_secs = config.window.as_secs_f64(),
        absent_threshold_secs = config.absent_threshold.as_secs_f64(),
        "configuration loaded"
    );

    let roster = Roster::load(&config.roster_path)
        .with_context(|| format!("loading roster {}", config.roster_path.display()))?;
    if roster.is_empty() {
        tracing::warn!("roster has no usable entries; every face will be unknown");
    }

    let mut store = match open_store(config.store_backend, &config.store_path) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::warn!(error = %e, "attendance store unavailable; totals will not be saved");
            None
        }
    };

    let mut ledger = AttendanceLedger::from_roster(&roster);
    if let Some(store) = store.as_deref() {
        restore(store, &mut ledger);
    }

    let matcher = GalleryMatcher::new(&roster, config.match_tolerance, config.fallback_tolerance)
        .single_person(config.single_person);
    let tracker = Tracker::new(ledger, config.window_config());
    let engine = engine::spawn_engine(tracker, matcher)?;

    let reader: Box<dyn BufRead + Send> = match &config.feed_path {
        Some(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("opening feed {}", path.display()))?;
            tracing::info!(path = %path.display(), "reading feed file");
            Box::new(BufReader::new(file))
        }
        None => {
            tracing::info!("reading feed from stdin");
            Box::new(BufReader::new(std::io::stdin()))
        }
    };
    let feed_done = feed::spawn_feed(reader, config.feed_clock, engine.clone())
        .context("spawning feed thread")?;

    let mut background = Vec::new();

    // Live windows must close even when no frame arrives.
    if config.feed_clock == FeedClock::Live {
        let engine = engine.clone();
        let period = (config.window / 4).max(Duration::from_millis(10));
        background.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if engine.tick(Instant::now()).await.is_err() {
                    break;
                }
            }
        }));
    }

    if let Some(period) = config.status_interval {
        let engine = engine.clone();
        let roster = roster.clone();
        let threshold = config.absent_threshold;
        let live = config.feed_clock == FeedClock::Live;
        background.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let at = live.then(Instant::now);
                match engine.status(at).await {
                    Ok(s) => {
                        tracing::debug!(frames = s.frames, "status requested");
                        let panel =
                            render_status(&s.ledger, Some(&roster), threshold, s.remaining);
                        print!("{panel}");
                    }
                    Err(_) => break,
                }
            }
        }));
    }

    tracing::info!(people = roster.len(), "presenced ready");

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            tracing::info!("interrupt received");
        }
        summary = feed_done => match summary {
            Ok(s) if s.interrupted => {
                tracing::warn!(frames = s.frames, "engine stopped before feed ended")
            }
            Ok(s) => {
                tracing::info!(frames = s.frames, skipped = s.skipped, "feed exhausted")
            }
            Err(_) => tracing::warn!("feed thread ended without a summary"),
        },
    }

    for task in background {
        task.abort();
    }

    let ledger = engine.shutdown().await?;
    print!(
        "{}",
        render_status(&ledger, Some(&roster), config.absent_threshold, None)
    );

    if let Some(store) = store.as_deref_mut() {
        persist(store, &ledger);
    }

    tracing::info!("presenced shutting down");
    Ok(())
}

/// Apply the saved totals to a fresh ledger. Failures leave it at zero.
fn restore(store: &(dyn AttendanceStore + Send), ledger: &mut AttendanceLedger) {
    match store.load() {
        Ok(Some(loaded)) => {
            if loaded.format.is_legacy() {
                tracing::info!(
                    format = ?loaded.format,
                    "legacy record found; it will be rewritten on save"
                );
            }
            let summary = ledger.load(&loaded.record);
            tracing::info!(
                location = %store.location(),
                applied = summary.applied,
                ignored = summary.ignored,
                "attendance restored"
            );
        }
        Ok(None) => {
            tracing::info!(location = %store.location(), "no saved attendance; starting fresh")
        }
        Err(e) => tracing::warn!(
            error = %e,
            location = %store.location(),
            "failed to load saved attendance; starting fresh"
        ),
    }
}

/// Save the durable totals. A failed write is logged and never aborts shutdown.
fn persist(store: &mut (dyn AttendanceStore + Send), ledger: &AttendanceLedger) -> bool {
    match store.save(&ledger.snapshot_for_persistence()) {
        Ok(()) => {
            tracing::info!(location = %store.location(), "attendance saved");
            true
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                location = %store.location(),
                "failed to save attendance"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_core::{Identity, PersonCounters};
    use presence_store::JsonFileStore;

    fn ledger() -> AttendanceLedger {
        AttendanceLedger::new(["E001", "E002"].into_iter().map(Identity::from))
    }

    #[test]
    fn test_restore_applies_saved_totals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.json");
        std::fs::write(&path, r#"{"E001": 90.0, "X9": 5.0}"#).unwrap();

        let mut l = ledger();
        restore(&JsonFileStore::new(&path), &mut l);
        assert_eq!(l.worked_time("E001"), Some(Duration::from_secs(90)));
        assert_eq!(l.total_absent_time("E001"), Some(Duration::ZERO));
        assert!(!l.contains("X9"));
    }

    #[test]
    fn test_restore_garbage_record_leaves_ledger_zeroed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.json");
        std::fs::write(&path, "\u{0}not a record").unwrap();

        let mut l = ledger();
        restore(&JsonFileStore::new(&path), &mut l);
        for (_, c) in l.iter() {
            assert_eq!(c, &PersonCounters::default());
        }
    }

    #[test]
    fn test_restore_invalid_value_leaves_ledger_zeroed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.json");
        std::fs::write(
            &path,
            concat!(
                r#"{"version": 2, "worked_time": {"E001": 10.0}, "#,
                r#""total_absent_time": {"E001": -30.0}}"#,
            ),
        )
        .unwrap();

        let mut l = ledger();
        restore(&JsonFileStore::new(&path), &mut l);
        assert_eq!(l.worked_time("E001"), Some(Duration::ZERO));
    }

    #[test]
    fn test_persist_writes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.json");
        let mut store = JsonFileStore::new(&path);

        assert!(persist(&mut store, &ledger()));
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.record.worked_time.get("E002"), Some(&0.0));
    }

    #[test]
    fn test_persist_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("occupied");
        std::fs::create_dir(&target).unwrap();

        let mut store = JsonFileStore::new(&target);
        assert!(!persist(&mut store, &ledger()));
        assert!(target.is_dir());
    }
}
