//! Age deadline for the open batch

use std::future;
use std::pin::Pin;

use tokio::time::{self, Instant, Sleep};

/// Drives `BatchAccumulator::on_timer_tick`
///
/// Holds one deadline at a time, the moment the open batch reaches
/// `batchMaxTimeMs`. Must be created inside the runtime that polls it.
#[derive(Debug)]
pub struct FlushTimer {
    sleep: Pin<Box<Sleep>>,
    deadline: Option<Instant>,
}

impl FlushTimer {
    /// Create a disarmed timer
    pub fn new() -> Self {
        Self {
            sleep: Box::pin(time::sleep_until(Instant::now())),
            deadline: None,
        }
    }

    /// Current deadline, `None` when disarmed
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Arm for `deadline`, or disarm with `None`
    pub fn reset(&mut self, deadline: Option<Instant>) {
        if deadline == self.deadline {
            return;
        }
        if let Some(deadline) = deadline {
            self.sleep.as_mut().reset(deadline);
        }
        self.deadline = deadline;
    }

    /// Wait for the deadline and disarm; never resolves while disarmed
    ///
    /// Cancel safe: dropping the future keeps the deadline armed.
    pub async fn tick(&mut self) -> Instant {
        match self.deadline {
            Some(deadline) => {
                self.sleep.as_mut().await;
                self.deadline = None;
                deadline
            }
            None => future::pending().await,
        }
    }
}

impl Default for FlushTimer {
    fn default() -> Self {
        Self::new()
    }
}
