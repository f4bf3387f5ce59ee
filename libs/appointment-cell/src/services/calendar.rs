// libs/appointment-cell/src/services/calendar.rs
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use shared_config::AppConfig;

use crate::models::Appointment;
use crate::store::SchedulingStore;

/// Best-effort sink for external calendar sync. Calls return immediately and
/// never report failure to the caller.
pub trait CalendarNotifier: Send + Sync {
    fn notify_created(&self, appointment: &Appointment);
    fn notify_updated(&self, appointment: &Appointment);
    fn notify_deleted(&self, appointment: &Appointment);
}

/// Used when calendar sync is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCalendarNotifier;

impl CalendarNotifier for NoopCalendarNotifier {
    fn notify_created(&self, _appointment: &Appointment) {}
    fn notify_updated(&self, _appointment: &Appointment) {}
    fn notify_deleted(&self, _appointment: &Appointment) {}
}

#[derive(Debug, Clone)]
pub enum CalendarEvent {
    Created(Appointment),
    Updated(Appointment),
    Deleted(Appointment),
}

/// Remote calendar API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CalendarSyncClient: Send + Sync {
    /// Returns the remote event handle, if the calendar issued one.
    async fn create_event(&self, appointment: &Appointment) -> Result<Option<String>>;
    async fn update_event(&self, event_id: &str, appointment: &Appointment) -> Result<()>;
    async fn delete_event(&self, event_id: &str) -> Result<()>;
}

/// Hands events to a detached worker over an unbounded channel.
pub struct QueuedCalendarNotifier {
    sender: mpsc::UnboundedSender<CalendarEvent>,
}

impl QueuedCalendarNotifier {
    /// Spawn the sync worker on the current tokio runtime.
    pub fn spawn(
        client: Arc<dyn CalendarSyncClient>,
        store: Arc<dyn SchedulingStore>,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = CalendarSyncWorker { client, store, receiver };
        let handle = tokio::spawn(worker.run());

        (Self { sender }, handle)
    }

    fn enqueue(&self, event: CalendarEvent) {
        if self.sender.send(event).is_err() {
            warn!("Calendar sync worker is gone, dropping event");
        }
    }
}

impl CalendarNotifier for QueuedCalendarNotifier {
    fn notify_created(&self, appointment: &Appointment) {
        self.enqueue(CalendarEvent::Created(appointment.clone()));
    }

    fn notify_updated(&self, appointment: &Appointment) {
        self.enqueue(CalendarEvent::Updated(appointment.clone()));
    }

    fn notify_deleted(&self, appointment: &Appointment) {
        self.enqueue(CalendarEvent::Deleted(appointment.clone()));
    }
}

pub struct CalendarSyncWorker {
    client: Arc<dyn CalendarSyncClient>,
    store: Arc<dyn SchedulingStore>,
    receiver: mpsc::UnboundedReceiver<CalendarEvent>,
}

impl CalendarSyncWorker {
    /// Drains the channel until every notifier handle is dropped.
    pub async fn run(mut self) {
        info!("Calendar sync worker started");

        while let Some(event) = self.receiver.recv().await {
            self.handle(event).await;
        }

        info!("Calendar sync worker stopped");
    }

    async fn handle(&self, event: CalendarEvent) {
        match event {
            CalendarEvent::Created(appointment) => {
                match self.client.create_event(&appointment).await {
                    Ok(Some(event_id)) => {
                        debug!("Calendar event {} created for appointment {}", event_id, appointment.id);
                        if let Err(e) = self.store.set_external_event_id(appointment.id, &event_id).await {
                            error!("Failed to store calendar event id for appointment {}: {}", appointment.id, e);
                        }
                    }
                    Ok(None) => debug!("Calendar accepted appointment {} without an event id", appointment.id),
                    Err(e) => error!("Calendar create failed for appointment {}: {}", appointment.id, e),
                }
            }
            CalendarEvent::Updated(appointment) => {
                let event_id = match self.current_event_id(&appointment).await {
                    Some(event_id) => event_id,
                    None => {
                        debug!("Appointment {} has no calendar event to update", appointment.id);
                        return;
                    }
                };
                if let Err(e) = self.client.update_event(&event_id, &appointment).await {
                    error!("Calendar update failed for appointment {}: {}", appointment.id, e);
                }
            }
            CalendarEvent::Deleted(appointment) => {
                let Some(event_id) = self.current_event_id(&appointment).await else {
                    debug!("Appointment {} has no calendar event to delete", appointment.id);
                    return;
                };
                if let Err(e) = self.client.delete_event(&event_id).await {
                    error!("Calendar delete failed for appointment {}: {}", appointment.id, e);
                }
            }
        }
    }

    // The handle may have been stored after the event was queued
    async fn current_event_id(&self, appointment: &Appointment) -> Option<String> {
        if appointment.external_event_id.is_some() {
            return appointment.external_event_id.clone();
        }
        match self.store.get_appointment(appointment.id).await {
            Ok(Some(stored)) => stored.external_event_id,
            Ok(None) => None,
            Err(e) => {
                error!("Failed to reload appointment {} for calendar sync: {}", appointment.id, e);
                None
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct WebhookEventResponse {
    event_id: Option<String>,
}

/// Calendar bridge reached over a plain JSON webhook.
pub struct WebhookCalendarClient {
    client: Client,
    base_url: String,
}

impl WebhookCalendarClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn event_body(appointment: &Appointment) -> serde_json::Value {
        json!({
            "appointment_id": appointment.id,
            "professional_id": appointment.professional_id,
            "patient_id": appointment.patient_id,
            "start_time": appointment.start_time.to_rfc3339(),
            "end_time": appointment.end_time().to_rfc3339(),
            "status": appointment.status,
            "notes": appointment.notes,
        })
    }
}

#[async_trait]
impl CalendarSyncClient for WebhookCalendarClient {
    async fn create_event(&self, appointment: &Appointment) -> Result<Option<String>> {
        let response = self.client
            .post(format!("{}/events", self.base_url))
            .json(&Self::event_body(appointment))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Calendar webhook returned {}", response.status()));
        }

        let body: WebhookEventResponse = response.json().await?;
        Ok(body.event_id)
    }

    async fn update_event(&self, event_id: &str, appointment: &Appointment) -> Result<()> {
        let response = self.client
            .put(format!("{}/events/{}", self.base_url, event_id))
            .json(&Self::event_body(appointment))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Calendar webhook returned {}", response.status()));
        }
        Ok(())
    }

    async fn delete_event(&self, event_id: &str) -> Result<()> {
        let response = self.client
            .delete(format!("{}/events/{}", self.base_url, event_id))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("Calendar webhook returned {}", response.status()));
        }
        Ok(())
    }
}

/// Queued webhook sync when configured, otherwise a no-op.
pub fn calendar_notifier_from_config(
    config: &AppConfig,
    store: Arc<dyn SchedulingStore>,
) -> Arc<dyn CalendarNotifier> {
    if !config.is_calendar_sync_configured() {
        info!("Calendar sync disabled");
        return Arc::new(NoopCalendarNotifier);
    }

    info!("Calendar sync enabled via {}", config.calendar_webhook_url);
    let client = Arc::new(WebhookCalendarClient::new(&config.calendar_webhook_url));
    let (notifier, _handle) = QueuedCalendarNotifier::spawn(client, store);
    Arc::new(notifier)
}
