//! Run failure notifications.
//!
//! When a run aborts, the importer hands a [`FailureNotification`] to its
//! [`NotificationSink`]. Delivery to people (mail, chat) is someone else's
//! job: [`ChannelSink`] passes the payload to whatever component owns that.

use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use serde::Serialize;

use crate::importer::ImportPhase;

/// Payload describing an aborted run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureNotification {
    pub error_message: String,
    /// Phase the run was in when it aborted.
    pub phase: ImportPhase,
    pub occurred_at: DateTime<Utc>,
}

impl FailureNotification {
    pub fn new(error_message: impl Into<String>, phase: ImportPhase) -> Self {
        Self {
            error_message: error_message.into(),
            phase,
            occurred_at: Utc::now(),
        }
    }
}

/// Destination for failure notifications.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: FailureNotification);
}

/// Logs the notification at `error` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, notification: FailureNotification) {
        tracing::error!(
            "Import failed during {:?} at {}: {}",
            notification.phase,
            notification.occurred_at.to_rfc3339(),
            notification.error_message
        );
    }
}

/// Hands notifications to a channel for asynchronous delivery.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<FailureNotification>,
}

impl ChannelSink {
    pub fn new(sender: Sender<FailureNotification>) -> Self {
        Self { sender }
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: FailureNotification) {
        if let Err(e) = self.sender.send(notification) {
            tracing::warn!(
                "Failure notification dropped, no receiver: {}",
                e.into_inner().error_message
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_sink_delivers() {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let sink = ChannelSink::new(sender);

        sink.notify(FailureNotification::new("manifest unreachable", ImportPhase::ListingFiles));

        let received = receiver.try_recv().unwrap();
        assert_eq!(received.error_message, "manifest unreachable");
        assert_eq!(received.phase, ImportPhase::ListingFiles);
    }

    #[test]
    fn test_channel_sink_without_receiver_does_not_panic() {
        let (sender, receiver) = crossbeam_channel::unbounded();
        drop(receiver);
        ChannelSink::new(sender).notify(FailureNotification::new("x", ImportPhase::Idle));
    }

    #[test]
    fn test_log_sink() {
        LogSink.notify(FailureNotification::new("boom", ImportPhase::ListingFiles));
    }

    #[test]
    fn test_notification_serializes() {
        let json =
            serde_json::to_value(FailureNotification::new("boom", ImportPhase::ListingFiles))
                .unwrap();
        assert_eq!(json["error_message"], "boom");
        assert_eq!(json["phase"], "listing_files");
    }
}
