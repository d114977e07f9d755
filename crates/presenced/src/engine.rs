use presence_core::{AttendanceLedger, FaceSample, IdentityMatcher, Tracker, WindowEvents};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Point-in-time copy of the ledger for display.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub ledger: AttendanceLedger,
    /// Time until the next window closes; `None` before the first frame.
    pub remaining: Option<Duration>,
    pub frames: u64,
}

/// Messages sent from the feed, timers and shutdown path to the engine thread.
enum EngineRequest {
    Frame {
        at: Instant,
        faces: Vec<FaceSample>,
    },
    Tick {
        at: Instant,
    },
    Status {
        /// `None` measures against the latest frame time, for replayed feeds.
        at: Option<Instant>,
        reply: oneshot::Sender<StatusSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<AttendanceLedger>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Submit a frame from a non-async thread. Blocks while the queue is full.
    pub fn blocking_frame(&self, at: Instant, faces: Vec<FaceSample>) -> Result<(), EngineError> {
        self.tx
            .blocking_send(EngineRequest::Frame { at, faces })
            .map_err(|_| EngineError::ChannelClosed)
    }

    /// Let the engine close a window that no frame arrived to close.
    pub async fn tick(&self, at: Instant) -> Result<(), EngineError> {
        self.tx
            .send(EngineRequest::Tick { at })
            .await
            .map_err(|_| EngineError::ChannelClosed)
    }

    pub async fn status(&self, at: Option<Instant>) -> Result<StatusSnapshot, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Status {
                at,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Stop the engine after everything already queued, returning the final ledger.
    pub async fn shutdown(&self) -> Result<AttendanceLedger, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Shutdown { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the tracker and the matcher outright. Requests are
/// handled one at a time in arrival order, so identification, marking and
/// evaluation of a frame are never interleaved with another frame.
pub fn spawn_engine<M>(tracker: Tracker, matcher: M) -> Result<EngineHandle, EngineError>
where
    M: IdentityMatcher + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(64);

    std::thread::Builder::new()
        .name("presence-engine".into())
        .spawn(move || {
            tracing::info!(people = tracker.ledger().len(), "engine thread started");
            let mut tracker = tracker;
            let mut frames: u64 = 0;
            let mut latest: Option<Instant> = None;

            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Frame { at, faces } => {
                        frames += 1;
                        latest = Some(latest.map_or(at, |l| l.max(at)));
                        let observations = matcher.identify(&faces);
                        for obs in &observations {
                            tracing::trace!(
                                label = obs.recognition.label(),
                                known = obs.recognition.identity().is_some(),
                                region = ?obs.region,
                                "face observed"
                            );
                        }
                        let ids = observations.iter().filter_map(|o| o.recognition.identity());
                        if let Some(events) = tracker.observe(at, ids) {
                            log_events(&events);
                        }
                    }
                    EngineRequest::Tick { at } => {
                        if let Some(events) = tracker.tick(at) {
                            log_events(&events);
                        }
                    }
                    EngineRequest::Status { at, reply } => {
                        let remaining = at.or(latest).and_then(|now| tracker.remaining(now));
                        let _ = reply.send(StatusSnapshot {
                            ledger: tracker.ledger().clone(),
                            remaining,
                            frames,
                        });
                    }
                    EngineRequest::Shutdown { reply } => {
                        tracing::info!(frames, "engine shutting down");
                        let _ = reply.send(tracker.into_ledger());
                        return;
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

fn log_events(events: &WindowEvents) {
    if events.is_empty() {
        tracing::trace!(
            interval_secs = events.interval.as_secs_f64(),
            "window closed without transitions"
        );
        return;
    }
    for (id, d) in &events.forgiven_absences {
        tracing::info!(identity = %id, secs = d.as_secs_f64(), "absence forgiven");
    }
    for (id, d) in &events.worked_added {
        tracing::debug!(identity = %id, secs = d.as_secs_f64(), "worked time added");
    }
    for (id, d) in &events.marked_absences {
        tracing::info!(identity = %id, secs = d.as_secs_f64(), "absence marked");
    }
}
