//! Command implementations.

use std::collections::HashSet;
use std::io::Write as _;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use cadence_api::{PollEvent, WatchOutcome, watch_analysis};
use cadence_core::{MessageId, NotificationId, SessionKey};
use cadence_notify::{Notification, NotificationSink};
use cadence_realtime::{ChannelHub, ChatRole, ConnectionState, HubEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::app::App;
use crate::shutdown::ShutdownCoordinator;

/// Grace period for channel workers on exit.
const CHANNEL_GRACE: Duration = Duration::from_secs(2);

pub async fn upload(app: &App, file: &Path, watch: bool, shutdown: &ShutdownCoordinator) -> Result<()> {
    let client = app.api()?;
    let receipt = client
        .upload(file)
        .await
        .with_context(|| format!("failed to upload {}", file.display()))?;
    println!("{}", receipt.conversation_id);
    if watch {
        poll(app, receipt.conversation_id.as_str(), false, shutdown).await?;
    }
    Ok(())
}

pub async fn poll(app: &App, id: &str, stop_on_error: bool, shutdown: &ShutdownCoordinator) -> Result<()> {
    let poller = app.poller(stop_on_error)?;
    let key = SessionKey::from(id);
    let token = shutdown.token();

    let watch = watch_analysis(&poller, &app.sink, &key, |event| match event {
        PollEvent::Status(record) => match record.progress {
            Some(progress) => println!("{}: {} ({progress:.0}%)", key, record.status),
            None => println!("{}: {}", key, record.status),
        },
        PollEvent::Error(e) => eprintln!("{key}: fetch failed: {e}"),
    });

    let outcome = tokio::select! {
        () = token.cancelled() => return Ok(()),
        outcome = watch => outcome,
    };
    match outcome {
        WatchOutcome::Succeeded { notification_id, .. } => {
            if let Some(notification) = app.sink.get(&notification_id) {
                print_notification(&notification);
            }
            Ok(())
        }
        WatchOutcome::Failed { notification_id, .. } => {
            if let Some(notification) = app.sink.get(&notification_id) {
                print_notification(&notification);
            }
            bail!("analysis of {key} failed")
        }
        WatchOutcome::Stopped { last } => {
            let status = last.map_or_else(|| "no status".to_owned(), |r| r.status.to_string());
            bail!("polling {key} stopped before a final status ({status})")
        }
    }
}

pub async fn watch(app: &App, key: &str, shutdown: &ShutdownCoordinator) -> Result<()> {
    let key = SessionKey::from(key);
    let token = shutdown.token();
    let (hub, task) = app.hub(token.clone());
    let mut events = hub.subscribe();
    let mut notifications = app.sink.subscribe();
    let mut printed = HashSet::new();
    let mut exhaustion = Exhaustion::new(&hub);
    hub.open(&key);

    let result = loop {
        tokio::select! {
            () = token.cancelled() => break Ok(()),
            changed = notifications.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let snapshot = notifications.borrow_and_update().clone();
                print_new_notifications(&snapshot.items, &mut printed);
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if event.key() != &key {
                        continue;
                    }
                    match &event {
                        HubEvent::Progress { progress, stage, .. } => match stage {
                            Some(stage) => println!("progress {progress:.0}% ({stage})"),
                            None => println!("progress {progress:.0}%"),
                        },
                        HubEvent::ParticipantJoined { user_id, .. } => println!("+ {user_id}"),
                        HubEvent::ParticipantLeft { user_id, .. } => println!("- {user_id}"),
                        HubEvent::RoomMessage { message, .. } => println!(
                            "[{}] {}",
                            message.user_id.as_deref().unwrap_or("system"),
                            message.content
                        ),
                        HubEvent::StateChanged { state, .. } => {
                            eprintln!("channel {state}");
                            if let Some(err) = exhaustion.observe(&key, *state) {
                                break Err(err);
                            }
                        }
                        HubEvent::SessionEnded { .. } => {
                            print_new_notifications(&app.sink.list(), &mut printed);
                            break Ok(());
                        }
                        HubEvent::AnalysisComplete { .. }
                        | HubEvent::AnalysisFailed { .. }
                        | HubEvent::TranscriptUpdated { .. }
                        | HubEvent::ChatError { .. } => {}
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event consumer lagged"),
                Err(RecvError::Closed) => break Ok(()),
            },
        }
    };

    hub.shutdown(CHANNEL_GRACE).await;
    shutdown.graceful_shutdown(vec![task], None).await;
    result
}

pub async fn practice(app: &App, key: &str, shutdown: &ShutdownCoordinator) -> Result<()> {
    let key = SessionKey::from(key);
    let token = shutdown.token();
    let (hub, task) = app.hub(token.clone());
    let mut events = hub.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stream = ReplyPrinter::default();
    let mut exhaustion = Exhaustion::new(&hub);
    hub.open(&key);

    let result = loop {
        tokio::select! {
            () = token.cancelled() => break Ok(()),
            line = lines.next_line() => match line.context("failed to read stdin")? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => {
                    if let Err(e) = hub.send_user_message(&key, line.trim()) {
                        eprintln!("not sent: {e}");
                    }
                }
                None => break Ok(()),
            },
            event = events.recv() => match event {
                Ok(HubEvent::TranscriptUpdated { key: k, message_id, streaming }) if k == key => {
                    stream.update(&hub, &key, &message_id, streaming);
                }
                Ok(HubEvent::ChatError { key: k, message }) if k == key => {
                    stream.reset();
                    eprintln!("\nerror: {message}");
                }
                Ok(HubEvent::StateChanged { key: k, state }) if k == key => {
                    match state {
                        ConnectionState::Connected => eprintln!("connected, type a message"),
                        _ => eprintln!("channel {state}"),
                    }
                    if let Some(err) = exhaustion.observe(&key, state) {
                        break Err(err);
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event consumer lagged"),
                Err(RecvError::Closed) => break Ok(()),
            },
        }
    };

    hub.shutdown(CHANNEL_GRACE).await;
    shutdown.graceful_shutdown(vec![task], None).await;
    result
}

/// Counts disconnects since the last successful open to spot when the
/// manager stops retrying.
struct Exhaustion {
    disconnects: u32,
    max_reconnects: u32,
}

impl Exhaustion {
    fn new(hub: &ChannelHub) -> Self {
        Self {
            disconnects: 0,
            max_reconnects: hub.manager().config().max_reconnect_attempts,
        }
    }

    /// Error once the initial attempt and every reconnect have failed.
    fn observe(&mut self, key: &SessionKey, state: ConnectionState) -> Option<anyhow::Error> {
        match state {
            ConnectionState::Connected => self.disconnects = 0,
            ConnectionState::Disconnected => {
                self.disconnects += 1;
                if self.disconnects > self.max_reconnects {
                    return Some(anyhow::anyhow!(
                        "connection to {key} lost after {} reconnect attempts",
                        self.max_reconnects
                    ));
                }
            }
            ConnectionState::Connecting | ConnectionState::Error => {}
        }
        None
    }
}

/// Prints streamed assistant replies incrementally.
#[derive(Default)]
struct ReplyPrinter {
    current: Option<MessageId>,
    printed: usize,
}

impl ReplyPrinter {
    fn update(&mut self, hub: &ChannelHub, key: &SessionKey, id: &MessageId, streaming: bool) {
        let Some(view) = hub.view(key) else { return };
        let Some(message) = view.transcript.messages().iter().find(|m| &m.id == id) else {
            return;
        };
        if message.role != ChatRole::Assistant {
            return;
        }
        if self.current.as_ref() != Some(id) {
            self.current = Some(id.clone());
            self.printed = 0;
            print!("assistant: ");
        }
        if let Some(rest) = message.content.get(self.printed..) {
            print!("{rest}");
            self.printed = message.content.len();
        }
        if !streaming {
            println!();
            self.reset();
        }
        let _ = std::io::stdout().flush();
    }

    fn reset(&mut self) {
        self.current = None;
        self.printed = 0;
    }
}

fn print_new_notifications(items: &[Notification], printed: &mut HashSet<NotificationId>) {
    for notification in items.iter().rev() {
        if printed.insert(notification.id.clone()) {
            print_notification(notification);
        }
    }
}

fn print_notification(notification: &Notification) {
    let link = notification
        .link
        .as_deref()
        .map(|l| format!(" -> {l}"))
        .unwrap_or_default();
    println!(
        "[{}] {}: {}{link}",
        notification.kind.as_str(),
        notification.title,
        notification.message
    );
}

/// Number of unread notifications, for the exit summary.
pub fn unread_summary(sink: &NotificationSink) -> Option<String> {
    match sink.unread_count() {
        0 => None,
        1 => Some("1 unread notification".to_owned()),
        n => Some(format!("{n} unread notifications")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_notify::NewNotification;

    #[test]
    fn unread_summary_pluralizes() {
        let sink = NotificationSink::new(0);
        assert!(unread_summary(&sink).is_none());
        let _ = sink.add(NewNotification::info("a", ""));
        assert_eq!(unread_summary(&sink).as_deref(), Some("1 unread notification"));
        let _ = sink.add(NewNotification::info("b", ""));
        assert_eq!(unread_summary(&sink).as_deref(), Some("2 unread notifications"));
    }

    #[test]
    fn exhaustion_after_every_reconnect_fails() {
        let key = SessionKey::from("conv_1");
        let mut exhaustion = Exhaustion {
            disconnects: 0,
            max_reconnects: 2,
        };
        assert!(exhaustion.observe(&key, ConnectionState::Disconnected).is_none());
        assert!(exhaustion.observe(&key, ConnectionState::Connected).is_none());
        for _ in 0..2 {
            assert!(exhaustion.observe(&key, ConnectionState::Error).is_none());
            assert!(exhaustion.observe(&key, ConnectionState::Disconnected).is_none());
        }
        let err = exhaustion.observe(&key, ConnectionState::Disconnected).unwrap();
        assert!(err.to_string().contains("2 reconnect attempts"));
    }

    #[test]
    fn new_notifications_print_once() {
        let sink = NotificationSink::new(0);
        let _ = sink.add(NewNotification::info("a", ""));
        let mut printed = HashSet::new();
        print_new_notifications(&sink.list(), &mut printed);
        print_new_notifications(&sink.list(), &mut printed);
        assert_eq!(printed.len(), 1);
    }
}
