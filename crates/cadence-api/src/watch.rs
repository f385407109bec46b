//! Bridge from analysis status to user-facing notifications.

use cadence_core::{NotificationId, SessionKey};
use cadence_notify::{NewNotification, NotificationSink};
use tracing::info;

use crate::poller::{PollEvent, StatusPoller};
use crate::types::AnalysisRecord;

/// How a watched analysis ended.
#[derive(Clone, Debug, PartialEq)]
pub enum WatchOutcome {
    /// The analysis finished and a success notification was posted.
    Succeeded {
        /// Final record.
        record: AnalysisRecord,
        /// Posted (or already present) notification.
        notification_id: NotificationId,
    },
    /// The analysis failed and an error notification was posted.
    Failed {
        /// Final record.
        record: AnalysisRecord,
        /// Posted (or already present) notification.
        notification_id: NotificationId,
    },
    /// The poll ended without a success or failure status.
    Stopped {
        /// Last status seen, if any.
        last: Option<AnalysisRecord>,
    },
}

/// Notification for a terminal record, or `None` when the status is
/// neither a success nor a failure.
pub fn analysis_notification(
    conversation: &SessionKey,
    record: &AnalysisRecord,
) -> Option<NewNotification> {
    let notification = if record.status.is_success() {
        let body = record
            .summary
            .clone()
            .unwrap_or_else(|| "Your conversation analysis is ready.".to_owned());
        NewNotification::success("Analysis complete", body)
            .with_link(format!("/conversations/{conversation}"))
    } else if record.status.is_failure() {
        let body = record
            .error
            .clone()
            .unwrap_or_else(|| "We could not analyze this conversation.".to_owned());
        NewNotification::error("Analysis failed", body)
    } else {
        return None;
    };
    Some(notification.for_conversation(conversation.clone()))
}

/// Poll `conversation` until it stops and post the resulting notification.
///
/// `on_event` sees every poll observation as it arrives. Notifications go
/// through [`NotificationSink::add_for_conversation`], so watching the same
/// conversation twice, or alongside the real-time channel, posts once.
pub async fn watch_analysis(
    poller: &StatusPoller,
    sink: &NotificationSink,
    conversation: &SessionKey,
    mut on_event: impl FnMut(&PollEvent),
) -> WatchOutcome {
    let mut subscription = poller.poll(conversation.as_str());
    let mut last = None;
    while let Some(event) = subscription.next_event().await {
        on_event(&event);
        if let PollEvent::Status(record) = event {
            last = Some(record);
        }
    }

    let Some(record) = last else {
        return WatchOutcome::Stopped { last: None };
    };
    if !poller.options().is_terminal(record.status) {
        return WatchOutcome::Stopped { last: Some(record) };
    }
    let Some(notification) = analysis_notification(conversation, &record) else {
        return WatchOutcome::Stopped { last: Some(record) };
    };

    let notification_id = sink.add_for_conversation(notification);
    info!(
        conversation_id = %conversation,
        status = %record.status,
        notification_id = %notification_id,
        "analysis finished"
    );
    if record.status.is_success() {
        WatchOutcome::Succeeded {
            record,
            notification_id,
        }
    } else {
        WatchOutcome::Failed {
            record,
            notification_id,
        }
    }
}
