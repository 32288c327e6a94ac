//! Backend push events that start a session.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::scheduler::{SchedulerHandle, TriggerSource};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub const NOTIFICATION_EVENT: &str = "cazz-notification";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendEvent {
    pub name: String,
    #[serde(default)]
    pub payload: Value,
}

impl BackendEvent {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    pub fn notification(text: impl Into<String>) -> Self {
        Self::new(NOTIFICATION_EVENT, Value::String(text.into()))
    }
}

pub struct NotificationBridge;

impl NotificationBridge {
    /// Forwards every notification as a start request. The payload is only
    /// logged; phase-end toasts are the user-facing part.
    pub fn forward(event: &BackendEvent, handle: &SchedulerHandle) -> bool {
        if event.name != NOTIFICATION_EVENT {
            log_debug!("ignoring backend event '{}'", event.name);
            return false;
        }
        log_info!("backend notification: {}", event.payload);
        match handle.request_start(TriggerSource::Notification) {
            Ok(()) => true,
            Err(err) => {
                log_warn!("dropping notification trigger: {err}");
                false
            }
        }
    }

    pub fn spawn(
        mut events: mpsc::UnboundedReceiver<BackendEvent>,
        handle: SchedulerHandle,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Some(event) => {
                            Self::forward(&event, &handle);
                        }
                        None => break,
                    },
                    _ = cancel.cancelled() => break,
                }
            }
            log_info!("notification bridge stopped");
        })
    }
}
