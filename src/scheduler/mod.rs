pub mod commands;
pub mod controller;
pub mod duration;
pub mod state;
pub mod toast;

use thiserror::Error;

pub use commands::{SchedulerCommand, SchedulerHandle};
pub use controller::{SchedulerEvent, SessionScheduler};
pub use duration::{ThreadCount, ThrottleLevel};
pub use state::{SchedulerSnapshot, SchedulerState, SystemStatus, TriggerSource};
pub use toast::{ThreadTag, Toast};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("thread count must be at least 1, got {0}")]
    InvalidThreadCount(usize),
    #[error("thread count cannot change while a session is running")]
    SessionActive,
    #[error("scheduler command loop is no longer running")]
    Closed,
}
