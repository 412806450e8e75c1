use std::time::Duration;

/// Opaque handle identifying one armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub u32);

/// Timer service owned by one node.
///
/// A fired timer comes back to the node as an event carrying its handle.
/// Cancelling is best effort: a firing already queued may still be
/// delivered, so nodes ignore handles they no longer hold.
pub trait Timers {
    fn start_timer(&mut self, duration: Duration, periodic: bool) -> TimerHandle;
    fn cancel_timer(&mut self, handle: TimerHandle);
}
