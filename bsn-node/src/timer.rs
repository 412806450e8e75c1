use std::collections::HashMap;
use std::time::Duration;

use bsn_core::{TimerHandle, Timers};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::node::NodeEvent;

struct ArmedTimer {
    cancel: CancellationToken,
    periodic: bool,
}

/// Timer service backed by tokio tasks.
///
/// Each armed timer is a task that pushes [`NodeEvent::TimerFired`] into
/// the owning node's queue. Timers are children of the node's shutdown
/// token and stop with it.
pub struct TokioTimers {
    events: mpsc::Sender<NodeEvent>,
    shutdown: CancellationToken,
    armed: HashMap<TimerHandle, ArmedTimer>,
    next: u32,
}

impl TokioTimers {
    pub fn new(events: mpsc::Sender<NodeEvent>, shutdown: CancellationToken) -> Self {
        Self {
            events,
            shutdown,
            armed: HashMap::new(),
            next: 0,
        }
    }

    /// Forget a one-shot timer once its firing has been received.
    pub fn acknowledge(&mut self, handle: TimerHandle) {
        if self.armed.get(&handle).is_some_and(|t| !t.periodic) {
            self.armed.remove(&handle);
        }
    }

    /// Number of timers still armed.
    pub fn armed(&self) -> usize {
        self.armed.len()
    }
}

impl Timers for TokioTimers {
    fn start_timer(&mut self, duration: Duration, periodic: bool) -> TimerHandle {
        self.next = self.next.wrapping_add(1);
        let handle = TimerHandle(self.next);

        let cancel = self.shutdown.child_token();
        let events = self.events.clone();
        let token = cancel.clone();

        if periodic {
            tokio::spawn(async move {
                let mut interval = tokio::time::interval_at(Instant::now() + duration, duration);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = interval.tick() => {
                            if events.send(NodeEvent::TimerFired(handle)).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        } else {
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(duration) => {
                        let _ = events.send(NodeEvent::TimerFired(handle)).await;
                    }
                }
            });
        }

        trace!(handle = handle.0, ?duration, periodic, "Timer armed");
        self.armed.insert(handle, ArmedTimer { cancel, periodic });
        handle
    }

    fn cancel_timer(&mut self, handle: TimerHandle) {
        if let Some(timer) = self.armed.remove(&handle) {
            timer.cancel.cancel();
            trace!(handle = handle.0, "Timer cancelled");
        }
    }
}

impl Drop for TokioTimers {
    fn drop(&mut self) {
        for timer in self.armed.values() {
            timer.cancel.cancel();
        }
    }
}
