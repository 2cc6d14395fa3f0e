//! Per-container tick scheduler.
//!
//! Exactly one scheduler drives a container. Three drive modes: manual
//! `Container::tick()` for tests, periodic play, and play-for-N-ticks.
//! Stop is level-triggered: a cancellation observed mid-tick lets the
//! current tick finish. A tick exceeding its budget (5× interval by
//! default) logs a slow-tick event; repeated consecutive overruns pause
//! the container for operator intervention.

use crate::container::{Container, ContainerStatus};
use crate::snapshot::SnapshotFrame;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Receives every published frame; implemented by the streaming fanout.
pub trait SnapshotSink: Send + Sync {
    /// Publish one frame. Must not block the tick thread.
    fn publish(&self, frame: SnapshotFrame);
}

/// Broadcast-channel sink, for wiring and tests.
impl SnapshotSink for broadcast::Sender<SnapshotFrame> {
    fn publish(&self, frame: SnapshotFrame) {
        // Lagging or absent receivers are not the scheduler's problem.
        let _ = self.send(frame);
    }
}

/// Sink that drops every frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl SnapshotSink for NullSink {
    fn publish(&self, _frame: SnapshotFrame) {}
}

/// Scheduler driving one container.
pub struct TickScheduler {
    container: Arc<Container>,
    sink: Arc<dyn SnapshotSink>,
    tick_budget: Duration,
    max_consecutive_overruns: u32,
}

impl TickScheduler {
    /// Create a scheduler for a container.
    #[must_use]
    pub fn new(
        container: Arc<Container>,
        sink: Arc<dyn SnapshotSink>,
        tick_budget_multiplier: u32,
        max_consecutive_overruns: u32,
    ) -> Self {
        let tick_budget = container.tick_interval() * tick_budget_multiplier.max(1);
        Self {
            container,
            sink,
            tick_budget,
            max_consecutive_overruns: max_consecutive_overruns.max(1),
        }
    }

    /// Drive the container at its tick interval until cancelled or, when
    /// `max_ticks` is given, until that many ticks have run.
    pub async fn run(&self, shutdown: CancellationToken, max_ticks: Option<u64>) {
        let interval_duration = self.container.tick_interval();
        let mut interval = tokio::time::interval(interval_duration);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        debug!(
            container = %self.container.id(),
            interval_ms = interval_duration.as_millis() as u64,
            "scheduler starting"
        );

        let mut ticks: u64 = 0;
        let mut consecutive_overruns: u32 = 0;

        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    debug!(
                        container = %self.container.id(),
                        ticks,
                        "scheduler received shutdown signal"
                    );
                    break;
                }

                _ = interval.tick() => {
                    match self.container.status() {
                        ContainerStatus::Running => {}
                        ContainerStatus::Paused => continue,
                        ContainerStatus::Created => continue,
                        ContainerStatus::Stopped => break,
                    }

                    let started = Instant::now();
                    match self.container.tick() {
                        Ok(frames) => {
                            for frame in frames {
                                self.sink.publish(frame);
                            }
                        }
                        Err(error) => {
                            // A stop raced the readiness check; the next
                            // iteration observes it.
                            trace!(container = %self.container.id(), %error, "tick skipped");
                            continue;
                        }
                    }
                    ticks += 1;

                    let elapsed = started.elapsed();
                    if elapsed > self.tick_budget {
                        consecutive_overruns += 1;
                        warn!(
                            container = %self.container.id(),
                            elapsed_ms = elapsed.as_millis() as u64,
                            budget_ms = self.tick_budget.as_millis() as u64,
                            consecutive_overruns,
                            "slow tick"
                        );
                        if consecutive_overruns >= self.max_consecutive_overruns {
                            warn!(
                                container = %self.container.id(),
                                "repeated tick overruns, pausing container"
                            );
                            let _ = self.container.pause();
                            consecutive_overruns = 0;
                        }
                    } else {
                        consecutive_overruns = 0;
                    }

                    if let Some(max) = max_ticks {
                        if ticks >= max {
                            debug!(
                                container = %self.container.id(),
                                ticks,
                                "scheduler completed requested ticks"
                            );
                            break;
                        }
                    }
                }
            }
        }

        debug!(container = %self.container.id(), ticks, "scheduler stopped");
    }
}

/// A running scheduler task for one container.
pub struct SchedulerHandle {
    token: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

impl SchedulerHandle {
    /// Spawn a scheduler driving the container periodically.
    #[must_use]
    pub fn spawn(
        container: Arc<Container>,
        sink: Arc<dyn SnapshotSink>,
        tick_budget_multiplier: u32,
        max_consecutive_overruns: u32,
        max_ticks: Option<u64>,
    ) -> Self {
        let token = CancellationToken::new();
        let scheduler = TickScheduler::new(
            container,
            sink,
            tick_budget_multiplier,
            max_consecutive_overruns,
        );
        let child = token.clone();
        let handle = tokio::spawn(async move {
            scheduler.run(child, max_ticks).await;
        });
        Self { token, handle }
    }

    /// Request a level-triggered stop; an in-flight tick finishes first.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Whether the scheduler task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the scheduler task to exit.
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}
