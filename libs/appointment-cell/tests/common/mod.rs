#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use uuid::Uuid;

use appointment_cell::clock::ClinicClock;
use appointment_cell::error::AppointmentResult;
use appointment_cell::models::*;
use appointment_cell::services::booking::AppointmentBookingService;
use appointment_cell::services::calendar::CalendarNotifier;
use appointment_cell::services::recurrence::RecurrenceService;
use appointment_cell::services::slots::SlotService;
use appointment_cell::store::{InMemorySchedulingStore, SchedulingStore};

/// Records calendar notifications instead of sending them.
#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<(&'static str, Uuid)>>,
}

impl RecordingNotifier {
    pub fn count(&self, kind: &str) -> usize {
        self.events.lock().unwrap().iter().filter(|(k, _)| *k == kind).count()
    }
}

impl CalendarNotifier for RecordingNotifier {
    fn notify_created(&self, appointment: &Appointment) {
        self.events.lock().unwrap().push(("created", appointment.id));
    }

    fn notify_updated(&self, appointment: &Appointment) {
        self.events.lock().unwrap().push(("updated", appointment.id));
    }

    fn notify_deleted(&self, appointment: &Appointment) {
        self.events.lock().unwrap().push(("deleted", appointment.id));
    }
}

/// Delegates to the in-memory store but pauses on every appointment read,
/// the way a network round trip would.
pub struct SlowReads {
    pub inner: Arc<InMemorySchedulingStore>,
    pub delay: Duration,
}

#[async_trait]
impl SchedulingStore for SlowReads {
    async fn get_patient(&self, patient_id: Uuid) -> AppointmentResult<Option<Patient>> {
        self.inner.get_patient(patient_id).await
    }

    async fn get_professional(&self, professional_id: Uuid) -> AppointmentResult<Option<Professional>> {
        self.inner.get_professional(professional_id).await
    }

    async fn get_service(&self, service_id: Uuid) -> AppointmentResult<Option<Service>> {
        self.inner.get_service(service_id).await
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> AppointmentResult<Option<Appointment>> {
        let appointment = self.inner.get_appointment(appointment_id).await;
        tokio::time::sleep(self.delay).await;
        appointment
    }

    async fn insert_appointment(&self, appointment: &Appointment) -> AppointmentResult<Appointment> {
        self.inner.insert_appointment(appointment).await
    }

    async fn transition_status(
        &self,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        status: AppointmentStatus,
    ) -> AppointmentResult<Appointment> {
        self.inner.transition_status(appointment_id, expected, status).await
    }

    async fn update_details(
        &self,
        appointment_id: Uuid,
        changes: &AppointmentChanges,
    ) -> AppointmentResult<Appointment> {
        self.inner.update_details(appointment_id, changes).await
    }

    async fn deactivate_appointment(&self, appointment_id: Uuid) -> AppointmentResult<Appointment> {
        self.inner.deactivate_appointment(appointment_id).await
    }

    async fn professional_appointments(
        &self,
        professional_id: Uuid,
        statuses: &[AppointmentStatus],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppointmentResult<Vec<Appointment>> {
        self.inner.professional_appointments(professional_id, statuses, from, to).await
    }

    async fn patient_appointments(&self, patient_id: Uuid) -> AppointmentResult<Vec<Appointment>> {
        self.inner.patient_appointments(patient_id).await
    }

    async fn recurrence_appointments(
        &self,
        recurrence_id: Uuid,
        from: Option<DateTime<Utc>>,
        statuses: &[AppointmentStatus],
    ) -> AppointmentResult<Vec<Appointment>> {
        self.inner.recurrence_appointments(recurrence_id, from, statuses).await
    }

    async fn availability_windows(
        &self,
        professional_id: Uuid,
        weekday: Weekday,
    ) -> AppointmentResult<Vec<AvailabilityWindow>> {
        self.inner.availability_windows(professional_id, weekday).await
    }

    async fn insert_recurrence(&self, recurrence: &RecurrenceDefinition) -> AppointmentResult<RecurrenceDefinition> {
        self.inner.insert_recurrence(recurrence).await
    }

    async fn get_recurrence(&self, recurrence_id: Uuid) -> AppointmentResult<Option<RecurrenceDefinition>> {
        self.inner.get_recurrence(recurrence_id).await
    }

    async fn set_external_event_id(&self, appointment_id: Uuid, event_id: &str) -> AppointmentResult<()> {
        self.inner.set_external_event_id(appointment_id, event_id).await
    }
}

/// "Today" for every test: Monday 2025-03-10.
pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
}

/// Next Monday, the first bookable Monday after today.
pub fn next_monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 17).unwrap()
}

pub fn monday_at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 17, hour, minute, 0).unwrap()
}

pub fn clock() -> ClinicClock {
    ClinicClock::utc().with_today(today())
}

pub struct Fixture {
    pub store: Arc<InMemorySchedulingStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub booking: Arc<AppointmentBookingService>,
    pub slots: SlotService,
    pub recurrence: RecurrenceService,
    pub patient_id: Uuid,
    pub professional_id: Uuid,
    pub service_id: Uuid,
    pub activity_id: Uuid,
}

impl Fixture {
    /// One qualified professional with a Monday 08:00-12:00 window and a
    /// 50 minute activity of the given capacity.
    pub async fn new(capacity: i32) -> Self {
        let store = Arc::new(InMemorySchedulingStore::new());
        let notifier = Arc::new(RecordingNotifier::default());

        let patient_id = Uuid::new_v4();
        let professional_id = Uuid::new_v4();
        let service_id = Uuid::new_v4();
        let activity_id = Uuid::new_v4();

        store.add_patient(Patient { id: patient_id, name: "Ana".to_string() }).await;
        store.add_professional(Professional {
            id: professional_id,
            name: "Dr. Costa".to_string(),
            activity_ids: vec![activity_id],
        }).await;
        store.add_service(Service {
            id: service_id,
            name: "Physio session".to_string(),
            plan_id: None,
            activity: Activity {
                id: activity_id,
                name: "Physiotherapy".to_string(),
                default_duration_minutes: Some(50),
                capacity,
            },
        }).await;
        store.add_window(AvailabilityWindow {
            id: Uuid::new_v4(),
            professional_id,
            weekday: Weekday::Mon,
            start_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            active: true,
        }).await.unwrap();

        let booking = Arc::new(AppointmentBookingService::new(
            store.clone(),
            store.clone(),
            notifier.clone(),
            clock(),
        ));
        let slots = SlotService::new(store.clone(), clock());
        let recurrence = RecurrenceService::new(store.clone(), booking.clone());

        Self {
            store,
            notifier,
            booking,
            slots,
            recurrence,
            patient_id,
            professional_id,
            service_id,
            activity_id,
        }
    }

    pub async fn add_patient(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.store.add_patient(Patient { id, name: "Bruno".to_string() }).await;
        id
    }

    pub async fn add_subscription(&self, realized: i32, contracted: i32) -> Uuid {
        let id = Uuid::new_v4();
        self.store.add_subscription(Subscription {
            id,
            patient_id: self.patient_id,
            status: SubscriptionStatus::Active,
            contracted_sessions: contracted,
            realized_sessions: realized,
        }).await;
        id
    }

    /// A booking service over the same data whose appointment reads are slow.
    pub fn slow_booking(&self) -> AppointmentBookingService {
        let slow = Arc::new(SlowReads {
            inner: self.store.clone(),
            delay: Duration::from_millis(30),
        });
        AppointmentBookingService::new(slow, self.store.clone(), self.notifier.clone(), clock())
    }

    pub fn request(&self, start_time: DateTime<Utc>) -> CreateAppointmentRequest {
        CreateAppointmentRequest {
            patient_id: self.patient_id,
            professional_id: self.professional_id,
            service_id: self.service_id,
            subscription_id: None,
            start_time,
            duration_minutes: None,
            notes: None,
        }
    }

    pub fn weekly_request(&self, total: u32, hour: u32) -> CreateRecurrenceRequest {
        CreateRecurrenceRequest {
            patient_id: self.patient_id,
            professional_id: self.professional_id,
            service_id: self.service_id,
            subscription_id: None,
            frequency: Frequency::Weekly,
            weekdays: vec![Weekday::Mon],
            time_of_day: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            duration_minutes: None,
            total_occurrences: Some(total),
            end_date: None,
            notes: Some("Weekly physio".to_string()),
        }
    }
}
