// libs/appointment-cell/src/store/mod.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc, Weekday};
use uuid::Uuid;

use crate::error::AppointmentResult;
use crate::models::{
    Appointment, AppointmentChanges, AppointmentStatus, AvailabilityWindow, Patient, Professional,
    RecurrenceDefinition, Service, Subscription,
};

pub mod memory;
pub mod supabase;

pub use memory::InMemorySchedulingStore;
pub use supabase::SupabaseSchedulingStore;

/// Persistence the scheduling engine reads from and writes to.
///
/// Lookups return `Ok(None)` for missing rows; callers decide whether that is
/// a `NotFound`. Appointment listings only ever return active rows.
#[async_trait]
pub trait SchedulingStore: Send + Sync {
    async fn get_patient(&self, patient_id: Uuid) -> AppointmentResult<Option<Patient>>;

    async fn get_professional(&self, professional_id: Uuid) -> AppointmentResult<Option<Professional>>;

    async fn get_service(&self, service_id: Uuid) -> AppointmentResult<Option<Service>>;

    async fn get_appointment(&self, appointment_id: Uuid) -> AppointmentResult<Option<Appointment>>;

    async fn insert_appointment(&self, appointment: &Appointment) -> AppointmentResult<Appointment>;

    /// Move to `status` only while the stored status is still `expected`.
    /// A lost race is `InvalidTransition` or `ConcurrentModification`.
    async fn transition_status(
        &self,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        status: AppointmentStatus,
    ) -> AppointmentResult<Appointment>;

    /// Write time and notes while the appointment is still scheduled or confirmed.
    async fn update_details(
        &self,
        appointment_id: Uuid,
        changes: &AppointmentChanges,
    ) -> AppointmentResult<Appointment>;

    /// Soft delete. No other column is touched.
    async fn deactivate_appointment(&self, appointment_id: Uuid) -> AppointmentResult<Appointment>;

    /// Appointments starting in `[from, to)` with one of `statuses`, ordered by start.
    async fn professional_appointments(
        &self,
        professional_id: Uuid,
        statuses: &[AppointmentStatus],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppointmentResult<Vec<Appointment>>;

    async fn patient_appointments(&self, patient_id: Uuid) -> AppointmentResult<Vec<Appointment>>;

    /// Appointments generated from a recurrence starting at or after `from`.
    async fn recurrence_appointments(
        &self,
        recurrence_id: Uuid,
        from: Option<DateTime<Utc>>,
        statuses: &[AppointmentStatus],
    ) -> AppointmentResult<Vec<Appointment>>;

    /// Active windows for one weekday, ordered by start time.
    async fn availability_windows(
        &self,
        professional_id: Uuid,
        weekday: Weekday,
    ) -> AppointmentResult<Vec<AvailabilityWindow>>;

    async fn insert_recurrence(&self, recurrence: &RecurrenceDefinition) -> AppointmentResult<RecurrenceDefinition>;

    async fn get_recurrence(&self, recurrence_id: Uuid) -> AppointmentResult<Option<RecurrenceDefinition>>;

    async fn set_external_event_id(&self, appointment_id: Uuid, event_id: &str) -> AppointmentResult<()>;
}

/// Session-package accounting used when an appointment is tied to a subscription.
#[async_trait]
pub trait SubscriptionAccessor: Send + Sync {
    async fn get_subscription(&self, subscription_id: Uuid) -> AppointmentResult<Option<Subscription>>;

    /// Active with sessions left. Missing subscriptions are `NotFound`.
    async fn is_usable(&self, subscription_id: Uuid) -> AppointmentResult<bool>;

    /// Realize one session. Fails with a business rule violation when the
    /// subscription is no longer usable.
    async fn consume_session(&self, subscription_id: Uuid) -> AppointmentResult<Subscription>;
}
