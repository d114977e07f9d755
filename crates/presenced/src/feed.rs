use crate::config::FeedClock;
use crate::engine::EngineHandle;
use presence_core::{FeedFrame, FeedReader};
use std::io::BufRead;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Counts reported when the feed thread finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedSummary {
    pub frames: u64,
    pub skipped: u64,
    /// The engine went away before the feed ended.
    pub interrupted: bool,
}

/// Maps frames to monotonic instants.
///
/// Replay places each frame at `base + t`. Timestamps that go backwards are
/// clamped to the latest instant seen so windows never run in reverse.
pub struct ClockMapper {
    clock: FeedClock,
    base: Instant,
    latest: Option<Instant>,
}

impl ClockMapper {
    pub fn new(clock: FeedClock, base: Instant) -> Self {
        Self {
            clock,
            base,
            latest: None,
        }
    }

    /// `None` when a replayed frame has no timestamp, or one too large to
    /// place on the monotonic clock.
    pub fn instant_for(&mut self, frame: &FeedFrame) -> Option<Instant> {
        let at = match self.clock {
            FeedClock::Live => Instant::now(),
            FeedClock::Replay => {
                let offset = Duration::try_from_secs_f64(frame.t?).ok()?;
                self.base.checked_add(offset)?
            }
        };
        let at = match self.latest {
            Some(latest) if at < latest => latest,
            _ => at,
        };
        self.latest = Some(at);
        Some(at)
    }
}

/// Read the feed on a plain OS thread, forwarding frames to the engine.
///
/// Malformed lines are logged and skipped. An I/O error or a closed engine
/// ends the thread. The summary is sent on the returned receiver.
pub fn spawn_feed(
    reader: Box<dyn BufRead + Send>,
    clock: FeedClock,
    engine: EngineHandle,
) -> std::io::Result<oneshot::Receiver<FeedSummary>> {
    let (done_tx, done_rx) = oneshot::channel();
    std::thread::Builder::new()
        .name("presence-feed".into())
        .spawn(move || {
            let summary = run_feed(reader, clock, &engine);
            tracing::info!(
                frames = summary.frames,
                skipped = summary.skipped,
                "feed finished"
            );
            let _ = done_tx.send(summary);
        })?;
    Ok(done_rx)
}

fn run_feed(
    reader: Box<dyn BufRead + Send>,
    clock: FeedClock,
    engine: &EngineHandle,
) -> FeedSummary {
    let mut mapper = ClockMapper::new(clock, Instant::now());
    let mut summary = FeedSummary::default();

    for item in FeedReader::new(reader) {
        let frame = match item {
            Ok(f) => f,
            Err(e) if e.is_recoverable() => {
                tracing::warn!(error = %e, "skipping feed line");
                summary.skipped += 1;
                continue;
            }
            Err(e) => {
                tracing::error!(error = %e, "feed read failed");
                break;
            }
        };

        let Some(at) = mapper.instant_for(&frame) else {
            tracing::warn!(
                t = ?frame.t,
                "skipping replayed frame without a usable timestamp"
            );
            summary.skipped += 1;
            continue;
        };

        if engine.blocking_frame(at, frame.faces).is_err() {
            summary.interrupted = true;
            break;
        }
        summary.frames += 1;
    }
    summary
}
