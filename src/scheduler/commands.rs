//! The closed set of requests other components may make of the scheduler.
//!
//! Bridges and the console hold a [`SchedulerHandle`]; the scheduler's
//! command loop is the only consumer, so requests from different sources are
//! applied one at a time in arrival order.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::state::TriggerSource;
use super::SchedulerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulerCommand {
    /// Manual start/stop button.
    Toggle,
    RequestStart { source: TriggerSource },
    RequestStop,
    /// Foreground time that elapsed while the app was away.
    ReportElapsed { elapsed_ms: u64 },
}

#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<SchedulerCommand>,
}

pub fn channel() -> (SchedulerHandle, mpsc::UnboundedReceiver<SchedulerCommand>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SchedulerHandle { tx }, rx)
}

impl SchedulerHandle {
    pub fn send(&self, command: SchedulerCommand) -> Result<(), SchedulerError> {
        self.tx.send(command).map_err(|_| SchedulerError::Closed)
    }

    pub fn toggle(&self) -> Result<(), SchedulerError> {
        self.send(SchedulerCommand::Toggle)
    }

    pub fn request_start(&self, source: TriggerSource) -> Result<(), SchedulerError> {
        self.send(SchedulerCommand::RequestStart { source })
    }

    pub fn request_stop(&self) -> Result<(), SchedulerError> {
        self.send(SchedulerCommand::RequestStop)
    }

    pub fn report_elapsed(&self, elapsed_ms: u64) -> Result<(), SchedulerError> {
        self.send(SchedulerCommand::ReportElapsed { elapsed_ms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn commands_arrive_in_order() {
        let (handle, mut rx) = channel();
        handle.request_start(TriggerSource::Notification).unwrap();
        handle.toggle().unwrap();
        handle.report_elapsed(90_000).unwrap();

        assert_eq!(
            rx.recv().await,
            Some(SchedulerCommand::RequestStart {
                source: TriggerSource::Notification
            })
        );
        assert_eq!(rx.recv().await, Some(SchedulerCommand::Toggle));
        assert_eq!(
            rx.recv().await,
            Some(SchedulerCommand::ReportElapsed { elapsed_ms: 90_000 })
        );
    }

    #[test]
    fn closed_loop_is_reported() {
        let (handle, rx) = channel();
        drop(rx);
        assert_eq!(handle.request_stop(), Err(SchedulerError::Closed));
    }
}
