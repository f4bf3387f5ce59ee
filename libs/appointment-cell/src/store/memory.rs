// libs/appointment-cell/src/store/memory.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc, Weekday};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppointmentError, AppointmentResult};
use crate::models::{
    Appointment, AppointmentChanges, AppointmentStatus, AvailabilityWindow, Patient, Professional,
    RecurrenceDefinition, Service, Subscription,
};
use crate::store::{SchedulingStore, SubscriptionAccessor};

#[derive(Default)]
struct MemoryState {
    patients: HashMap<Uuid, Patient>,
    professionals: HashMap<Uuid, Professional>,
    services: HashMap<Uuid, Service>,
    subscriptions: HashMap<Uuid, Subscription>,
    windows: Vec<AvailabilityWindow>,
    appointments: HashMap<Uuid, Appointment>,
    recurrences: HashMap<Uuid, RecurrenceDefinition>,
}

/// Process-local store for tests and `SCHEDULING_STORE=memory` development runs.
#[derive(Default)]
pub struct InMemorySchedulingStore {
    state: RwLock<MemoryState>,
}

impl InMemorySchedulingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_patient(&self, patient: Patient) {
        self.state.write().await.patients.insert(patient.id, patient);
    }

    pub async fn add_professional(&self, professional: Professional) {
        self.state.write().await.professionals.insert(professional.id, professional);
    }

    pub async fn add_service(&self, service: Service) {
        self.state.write().await.services.insert(service.id, service);
    }

    pub async fn add_subscription(&self, subscription: Subscription) {
        self.state.write().await.subscriptions.insert(subscription.id, subscription);
    }

    pub async fn add_window(&self, window: AvailabilityWindow) -> AppointmentResult<()> {
        if !window.is_valid() {
            return Err(AppointmentError::rule("Availability window must start before it ends"));
        }
        self.state.write().await.windows.push(window);
        Ok(())
    }

    /// Every stored appointment, including soft-deleted ones.
    pub async fn all_appointments(&self) -> Vec<Appointment> {
        let mut appointments: Vec<Appointment> = self.state.read().await
            .appointments.values().cloned().collect();
        appointments.sort_by_key(|apt| apt.start_time);
        appointments
    }
}

#[async_trait]
impl SchedulingStore for InMemorySchedulingStore {
    async fn get_patient(&self, patient_id: Uuid) -> AppointmentResult<Option<Patient>> {
        Ok(self.state.read().await.patients.get(&patient_id).cloned())
    }

    async fn get_professional(&self, professional_id: Uuid) -> AppointmentResult<Option<Professional>> {
        Ok(self.state.read().await.professionals.get(&professional_id).cloned())
    }

    async fn get_service(&self, service_id: Uuid) -> AppointmentResult<Option<Service>> {
        Ok(self.state.read().await.services.get(&service_id).cloned())
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> AppointmentResult<Option<Appointment>> {
        Ok(self.state.read().await.appointments.get(&appointment_id).cloned())
    }

    async fn insert_appointment(&self, appointment: &Appointment) -> AppointmentResult<Appointment> {
        let mut state = self.state.write().await;
        if state.appointments.contains_key(&appointment.id) {
            return Err(AppointmentError::DatabaseError(format!(
                "Appointment {} already exists", appointment.id
            )));
        }
        state.appointments.insert(appointment.id, appointment.clone());
        debug!("Stored appointment {}", appointment.id);
        Ok(appointment.clone())
    }

    async fn transition_status(
        &self,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        status: AppointmentStatus,
    ) -> AppointmentResult<Appointment> {
        let mut state = self.state.write().await;
        let existing = state.appointments.get_mut(&appointment_id)
            .ok_or_else(|| AppointmentError::not_found("Appointment", appointment_id))?;

        if existing.status != expected {
            return Err(AppointmentError::InvalidTransition {
                current: existing.status,
                requested: status,
            });
        }

        existing.status = status;
        Ok(existing.clone())
    }

    async fn update_details(
        &self,
        appointment_id: Uuid,
        changes: &AppointmentChanges,
    ) -> AppointmentResult<Appointment> {
        let mut state = self.state.write().await;
        let existing = state.appointments.get_mut(&appointment_id)
            .ok_or_else(|| AppointmentError::not_found("Appointment", appointment_id))?;

        if existing.status.is_terminal() {
            return Err(AppointmentError::ConcurrentModification(format!(
                "Appointment {} moved to {} before the edit was saved",
                appointment_id, existing.status
            )));
        }

        existing.start_time = changes.start_time;
        existing.duration_minutes = changes.duration_minutes;
        if changes.notes.is_some() {
            existing.notes = changes.notes.clone();
        }
        Ok(existing.clone())
    }

    async fn deactivate_appointment(&self, appointment_id: Uuid) -> AppointmentResult<Appointment> {
        let mut state = self.state.write().await;
        let existing = state.appointments.get_mut(&appointment_id)
            .ok_or_else(|| AppointmentError::not_found("Appointment", appointment_id))?;

        existing.active = false;
        Ok(existing.clone())
    }

    async fn professional_appointments(
        &self,
        professional_id: Uuid,
        statuses: &[AppointmentStatus],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppointmentResult<Vec<Appointment>> {
        let state = self.state.read().await;
        let mut appointments: Vec<Appointment> = state.appointments.values()
            .filter(|apt| apt.active
                && apt.professional_id == professional_id
                && statuses.contains(&apt.status)
                && apt.start_time >= from
                && apt.start_time < to)
            .cloned()
            .collect();
        appointments.sort_by_key(|apt| apt.start_time);
        Ok(appointments)
    }

    async fn patient_appointments(&self, patient_id: Uuid) -> AppointmentResult<Vec<Appointment>> {
        let state = self.state.read().await;
        let mut appointments: Vec<Appointment> = state.appointments.values()
            .filter(|apt| apt.active && apt.patient_id == patient_id)
            .cloned()
            .collect();
        appointments.sort_by_key(|apt| apt.start_time);
        Ok(appointments)
    }

    async fn recurrence_appointments(
        &self,
        recurrence_id: Uuid,
        from: Option<DateTime<Utc>>,
        statuses: &[AppointmentStatus],
    ) -> AppointmentResult<Vec<Appointment>> {
        let state = self.state.read().await;
        let mut appointments: Vec<Appointment> = state.appointments.values()
            .filter(|apt| apt.active
                && apt.recurrence_id == Some(recurrence_id)
                && statuses.contains(&apt.status)
                && from.map_or(true, |from| apt.start_time >= from))
            .cloned()
            .collect();
        appointments.sort_by_key(|apt| apt.start_time);
        Ok(appointments)
    }

    async fn availability_windows(
        &self,
        professional_id: Uuid,
        weekday: Weekday,
    ) -> AppointmentResult<Vec<AvailabilityWindow>> {
        let state = self.state.read().await;
        let mut windows: Vec<AvailabilityWindow> = state.windows.iter()
            .filter(|w| w.active && w.professional_id == professional_id && w.weekday == weekday)
            .cloned()
            .collect();
        windows.sort_by_key(|w| w.start_time);
        Ok(windows)
    }

    async fn insert_recurrence(&self, recurrence: &RecurrenceDefinition) -> AppointmentResult<RecurrenceDefinition> {
        self.state.write().await.recurrences.insert(recurrence.id, recurrence.clone());
        Ok(recurrence.clone())
    }

    async fn get_recurrence(&self, recurrence_id: Uuid) -> AppointmentResult<Option<RecurrenceDefinition>> {
        Ok(self.state.read().await.recurrences.get(&recurrence_id).cloned())
    }

    async fn set_external_event_id(&self, appointment_id: Uuid, event_id: &str) -> AppointmentResult<()> {
        let mut state = self.state.write().await;
        let appointment = state.appointments.get_mut(&appointment_id)
            .ok_or_else(|| AppointmentError::not_found("Appointment", appointment_id))?;
        appointment.external_event_id = Some(event_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl SubscriptionAccessor for InMemorySchedulingStore {
    async fn get_subscription(&self, subscription_id: Uuid) -> AppointmentResult<Option<Subscription>> {
        Ok(self.state.read().await.subscriptions.get(&subscription_id).cloned())
    }

    async fn is_usable(&self, subscription_id: Uuid) -> AppointmentResult<bool> {
        self.get_subscription(subscription_id).await?
            .map(|sub| sub.is_usable())
            .ok_or_else(|| AppointmentError::not_found("Subscription", subscription_id))
    }

    async fn consume_session(&self, subscription_id: Uuid) -> AppointmentResult<Subscription> {
        let mut state = self.state.write().await;
        let subscription = state.subscriptions.get_mut(&subscription_id)
            .ok_or_else(|| AppointmentError::not_found("Subscription", subscription_id))?;

        if !subscription.is_usable() {
            return Err(AppointmentError::rule(format!(
                "Subscription {} has no remaining sessions", subscription_id
            )));
        }

        subscription.record_session();
        Ok(subscription.clone())
    }
}
