// libs/scheduling-cell/src/services/notifier.rs
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::models::ScheduleNotification;

/// Downstream observer of serial/time changes. Runs after the day lock is
/// released and has no write path back into the schedule.
#[async_trait]
pub trait ScheduleNotifier: Send + Sync {
    async fn notify(&self, notification: ScheduleNotification);
}

/// Logs every change; the default when no delivery channel is configured.
pub struct TracingNotifier;

#[async_trait]
impl ScheduleNotifier for TracingNotifier {
    async fn notify(&self, notification: ScheduleNotification) {
        info!(
            kind = ?notification.kind,
            doctor_id = %notification.doctor_id,
            date = %notification.date,
            visit_id = %notification.visit_id,
            serial = notification.serial,
            scheduled_time = %notification.scheduled_time,
            "Schedule notification"
        );
    }
}

/// Fans notifications out to in-process subscribers (push gateways, websockets).
pub struct BroadcastNotifier {
    sender: broadcast::Sender<ScheduleNotification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScheduleNotification> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl ScheduleNotifier for BroadcastNotifier {
    async fn notify(&self, notification: ScheduleNotification) {
        if self.sender.send(notification).is_err() {
            debug!("No schedule notification subscribers");
        }
    }
}
