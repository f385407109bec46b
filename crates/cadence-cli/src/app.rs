//! Shared wiring for every command.

use std::sync::Arc;

use anyhow::{Context, Result};
use cadence_api::{ApiClient, PollOptions, StatusPoller};
use cadence_notify::{NativeNotifier, NoopNotifier, NotificationSink, WebhookNotifier};
use cadence_realtime::{ChannelConfig, ChannelHub, WsConnector};
use cadence_settings::CadenceSettings;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Services built from settings once per run.
pub struct App {
    pub settings: CadenceSettings,
    pub sink: Arc<NotificationSink>,
}

impl App {
    pub fn new(settings: CadenceSettings) -> Self {
        let native = native_notifier(&settings);
        let sink = Arc::new(NotificationSink::with_native(
            settings.notifications.max_retained,
            native,
        ));
        Self { settings, sink }
    }

    pub fn api(&self) -> Result<ApiClient> {
        ApiClient::from_settings(&self.settings.api).context("failed to build HTTP client")
    }

    pub fn poller(&self, stop_on_error: bool) -> Result<StatusPoller> {
        let options = PollOptions::from_settings(&self.settings.poller).stop_on_error(stop_on_error);
        Ok(StatusPoller::new(Arc::new(self.api()?), options))
    }

    /// Start the channel hub. The receive loop stops with `cancel`.
    pub fn hub(&self, cancel: CancellationToken) -> (Arc<ChannelHub>, JoinHandle<()>) {
        let connector = Arc::new(WsConnector::new(self.settings.realtime.ws_url.clone()));
        let config = ChannelConfig::from(&self.settings.realtime);
        info!(
            ws_url = %self.settings.realtime.ws_url,
            max_reconnects = config.max_reconnect_attempts,
            "starting channel hub"
        );
        ChannelHub::start(connector, config, self.sink.clone(), cancel)
    }
}

fn native_notifier(settings: &CadenceSettings) -> Arc<dyn NativeNotifier> {
    let notifications = &settings.notifications;
    if !notifications.native_enabled {
        return Arc::new(NoopNotifier);
    }
    let Some(url) = notifications.webhook_url.clone() else {
        warn!("native notifications enabled without a webhookUrl, skipping");
        return Arc::new(NoopNotifier);
    };
    match reqwest::Client::builder()
        .timeout(settings.api.request_timeout())
        .build()
    {
        Ok(client) => Arc::new(WebhookNotifier::new(url, client)),
        Err(e) => {
            warn!(error = %e, "failed to build webhook client, native notifications disabled");
            Arc::new(NoopNotifier)
        }
    }
}
