// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::clock::ClinicClock;
use crate::error::{AppointmentError, AppointmentResult};
use crate::models::{
    Activity, Appointment, AppointmentChanges, AppointmentStatus, CreateAppointmentRequest,
    Patient, Professional, Service, UpdateAppointmentRequest,
};
use crate::services::availability::AvailabilityService;
use crate::services::calendar::CalendarNotifier;
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::locks::BookingLocks;
use crate::store::{SchedulingStore, SubscriptionAccessor};

/// Default listing range for a professional when the caller gives no bounds.
const DEFAULT_LISTING_DAYS: i64 = 30;

/// Everything a booking needs that is resolved once from referenced entities.
#[derive(Debug, Clone)]
pub struct BookingContext {
    pub patient: Patient,
    pub professional: Professional,
    pub service: Service,
    pub duration_minutes: i32,
    pub capacity: i32,
}

/// Requested duration, or the activity's default when none was given.
pub fn resolve_duration(requested: Option<i32>, activity: &Activity) -> AppointmentResult<i32> {
    let duration = requested
        .or(activity.default_duration_minutes)
        .ok_or_else(|| AppointmentError::rule(format!(
            "No duration available: none requested and activity '{}' has no default",
            activity.name
        )))?;

    if duration <= 0 {
        return Err(AppointmentError::rule("Appointment duration must be positive"));
    }

    Ok(duration)
}

pub struct AppointmentBookingService {
    store: Arc<dyn SchedulingStore>,
    subscriptions: Arc<dyn SubscriptionAccessor>,
    conflict_service: ConflictDetectionService,
    availability_service: AvailabilityService,
    lifecycle_service: AppointmentLifecycleService,
    notifier: Arc<dyn CalendarNotifier>,
    professional_locks: BookingLocks,
    appointment_locks: BookingLocks,
    clock: ClinicClock,
}

impl AppointmentBookingService {
    pub fn new(
        store: Arc<dyn SchedulingStore>,
        subscriptions: Arc<dyn SubscriptionAccessor>,
        notifier: Arc<dyn CalendarNotifier>,
        clock: ClinicClock,
    ) -> Self {
        Self {
            conflict_service: ConflictDetectionService::new(Arc::clone(&store), clock),
            availability_service: AvailabilityService::new(Arc::clone(&store), clock),
            lifecycle_service: AppointmentLifecycleService::new(),
            professional_locks: BookingLocks::new(),
            appointment_locks: BookingLocks::new(),
            store,
            subscriptions,
            notifier,
            clock,
        }
    }

    pub fn clock(&self) -> &ClinicClock {
        &self.clock
    }

    // ==============================================================================
    // VALIDATION
    // ==============================================================================

    /// Entity lookups, qualification, subscription and duration checks shared
    /// by single bookings and recurrence requests.
    pub async fn resolve_booking_context(
        &self,
        patient_id: Uuid,
        professional_id: Uuid,
        service_id: Uuid,
        subscription_id: Option<Uuid>,
        duration_minutes: Option<i32>,
    ) -> AppointmentResult<BookingContext> {
        let patient = self.store.get_patient(patient_id).await?
            .ok_or_else(|| AppointmentError::not_found("Patient", patient_id))?;
        let professional = self.store.get_professional(professional_id).await?
            .ok_or_else(|| AppointmentError::not_found("Professional", professional_id))?;
        let service = self.store.get_service(service_id).await?
            .ok_or_else(|| AppointmentError::not_found("Service", service_id))?;

        if !professional.is_qualified_for(service.activity.id) {
            return Err(AppointmentError::rule(format!(
                "Professional {} is not qualified for activity '{}'",
                professional.name, service.activity.name
            )));
        }

        if let Some(subscription_id) = subscription_id {
            if !self.subscriptions.is_usable(subscription_id).await? {
                return Err(AppointmentError::rule(format!(
                    "Subscription {} is not active or has no remaining sessions",
                    subscription_id
                )));
            }
        }

        let duration_minutes = resolve_duration(duration_minutes, &service.activity)?;
        let capacity = service.activity.capacity;

        Ok(BookingContext {
            patient,
            professional,
            service,
            duration_minutes,
            capacity,
        })
    }

    /// Availability then capacity. Callers hold the professional's booking lock.
    async fn ensure_bookable(
        &self,
        professional_id: Uuid,
        start: DateTime<Utc>,
        duration_minutes: i32,
        capacity: i32,
        exclude_appointment_id: Option<Uuid>,
    ) -> AppointmentResult<()> {
        if !self.availability_service
            .is_within_availability(professional_id, start, duration_minutes)
            .await?
        {
            warn!("Rejected booking for professional {} at {}: outside availability", professional_id, start);
            return Err(AppointmentError::rule(format!(
                "Requested time {} is outside the professional's availability",
                self.clock.to_local(start)
            )));
        }

        if !self.conflict_service
            .can_book(professional_id, start, duration_minutes, capacity, exclude_appointment_id)
            .await?
        {
            return Err(AppointmentError::rule(format!(
                "Capacity reached: time {} conflicts with existing appointments",
                self.clock.to_local(start)
            )));
        }

        Ok(())
    }

    // ==============================================================================
    // BOOKING
    // ==============================================================================

    #[instrument(skip(self, request), fields(professional_id = %request.professional_id))]
    pub async fn create_appointment(
        &self,
        request: CreateAppointmentRequest,
    ) -> AppointmentResult<Appointment> {
        self.book(request, None).await
    }

    /// Single-booking path, also driven once per occurrence by recurrences.
    pub(crate) async fn book(
        &self,
        request: CreateAppointmentRequest,
        recurrence_id: Option<Uuid>,
    ) -> AppointmentResult<Appointment> {
        info!("Booking appointment for patient {} with professional {} at {}",
              request.patient_id, request.professional_id, request.start_time);

        let context = self.resolve_booking_context(
            request.patient_id,
            request.professional_id,
            request.service_id,
            request.subscription_id,
            request.duration_minutes,
        ).await?;

        let appointment = {
            let _guard = self.professional_locks.acquire(request.professional_id).await;

            self.ensure_bookable(
                request.professional_id,
                request.start_time,
                context.duration_minutes,
                context.capacity,
                None,
            ).await?;

            let appointment = Appointment {
                id: Uuid::new_v4(),
                patient_id: context.patient.id,
                professional_id: context.professional.id,
                service_id: context.service.id,
                subscription_id: request.subscription_id,
                start_time: request.start_time,
                duration_minutes: context.duration_minutes,
                status: AppointmentStatus::Scheduled,
                notes: request.notes,
                active: true,
                external_event_id: None,
                recurrence_id,
                created_at: Utc::now(),
            };

            self.store.insert_appointment(&appointment).await?
        };

        self.notifier.notify_created(&appointment);

        info!("Appointment {} booked for professional {} at {}",
              appointment.id, appointment.professional_id, appointment.start_time);
        Ok(appointment)
    }

    /// Edit notes or reschedule. Time changes re-run availability and capacity
    /// checks with the appointment itself excluded.
    #[instrument(skip(self, request))]
    pub async fn update_appointment(
        &self,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
    ) -> AppointmentResult<Appointment> {
        let _edit = self.appointment_locks.acquire(appointment_id).await;

        let current = self.get_appointment(appointment_id).await?;
        self.lifecycle_service.ensure_editable(current.status)?;

        let changes = AppointmentChanges {
            start_time: request.start_time.unwrap_or(current.start_time),
            duration_minutes: request.duration_minutes.unwrap_or(current.duration_minutes),
            notes: request.notes,
        };
        if changes.duration_minutes <= 0 {
            return Err(AppointmentError::rule("Appointment duration must be positive"));
        }

        let time_changed = changes.start_time != current.start_time
            || changes.duration_minutes != current.duration_minutes;

        // Appointment lock first, then the professional's; bookings only take the latter
        let guard = if time_changed {
            debug!("Rescheduling appointment {} to {} ({} min)",
                   appointment_id, changes.start_time, changes.duration_minutes);

            let service = self.store.get_service(current.service_id).await?
                .ok_or_else(|| AppointmentError::not_found("Service", current.service_id))?;

            let guard = self.professional_locks.acquire(current.professional_id).await;
            self.ensure_bookable(
                current.professional_id,
                changes.start_time,
                changes.duration_minutes,
                service.activity.capacity,
                Some(appointment_id),
            ).await?;
            Some(guard)
        } else {
            None
        };

        let saved = self.store.update_details(appointment_id, &changes).await?;
        drop(guard);

        self.notifier.notify_updated(&saved);

        info!("Appointment {} updated", appointment_id);
        Ok(saved)
    }

    // ==============================================================================
    // STATUS
    // ==============================================================================

    /// Run one state machine transition and its side effects.
    ///
    /// Completing an appointment tied to a subscription realizes exactly one
    /// session: the status write is conditional on the status read here, and
    /// the session is only consumed once that write has won. If consuming then
    /// fails the status is moved back.
    #[instrument(skip(self))]
    pub async fn change_status(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
    ) -> AppointmentResult<Appointment> {
        let _edit = self.appointment_locks.acquire(appointment_id).await;

        let current = self.get_appointment(appointment_id).await?;
        self.lifecycle_service.validate_status_transition(current.status, new_status)?;

        let subscription_id = current.subscription_id
            .filter(|_| new_status == AppointmentStatus::Completed);

        if let Some(subscription_id) = subscription_id {
            if !self.subscriptions.is_usable(subscription_id).await? {
                return Err(AppointmentError::rule(format!(
                    "Subscription {} has no remaining sessions", subscription_id
                )));
            }
        }

        let saved = self.store
            .transition_status(appointment_id, current.status, new_status)
            .await?;

        if let Some(subscription_id) = subscription_id {
            match self.subscriptions.consume_session(subscription_id).await {
                Ok(subscription) => {
                    info!("Subscription {} realized {}/{} sessions ({:?})",
                          subscription.id, subscription.realized_sessions,
                          subscription.contracted_sessions, subscription.status);
                }
                Err(e) => {
                    warn!("Session not realized for appointment {}, reverting to {}: {}",
                          appointment_id, current.status, e);
                    if let Err(revert) = self.store
                        .transition_status(appointment_id, new_status, current.status)
                        .await
                    {
                        error!("Failed to revert appointment {} to {}: {}",
                               appointment_id, current.status, revert);
                    }
                    return Err(e);
                }
            }
        }

        if new_status == AppointmentStatus::Cancelled {
            self.notifier.notify_deleted(&saved);
        } else {
            self.notifier.notify_updated(&saved);
        }

        info!("Appointment {} moved to {}", appointment_id, new_status);
        Ok(saved)
    }

    pub async fn cancel_appointment(&self, appointment_id: Uuid) -> AppointmentResult<Appointment> {
        self.change_status(appointment_id, AppointmentStatus::Cancelled).await
    }

    /// Soft delete. The row is kept for audit and drops out of listings.
    #[instrument(skip(self))]
    pub async fn delete_appointment(&self, appointment_id: Uuid) -> AppointmentResult<Appointment> {
        let _edit = self.appointment_locks.acquire(appointment_id).await;

        let current = self.get_appointment(appointment_id).await?;
        if !current.active {
            debug!("Appointment {} already deleted", appointment_id);
            return Ok(current);
        }

        let saved = self.store.deactivate_appointment(appointment_id).await?;

        self.notifier.notify_deleted(&saved);

        info!("Appointment {} deleted", appointment_id);
        Ok(saved)
    }

    // ==============================================================================
    // QUERIES
    // ==============================================================================

    pub async fn get_appointment(&self, appointment_id: Uuid) -> AppointmentResult<Appointment> {
        debug!("Fetching appointment: {}", appointment_id);

        self.store.get_appointment(appointment_id).await?
            .ok_or_else(|| AppointmentError::not_found("Appointment", appointment_id))
    }

    pub async fn patient_appointments(&self, patient_id: Uuid) -> AppointmentResult<Vec<Appointment>> {
        self.store.get_patient(patient_id).await?
            .ok_or_else(|| AppointmentError::not_found("Patient", patient_id))?;

        self.store.patient_appointments(patient_id).await
    }

    /// All statuses in `[from, to)`. Defaults to the next 30 clinic days.
    pub async fn professional_appointments(
        &self,
        professional_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> AppointmentResult<Vec<Appointment>> {
        self.store.get_professional(professional_id).await?
            .ok_or_else(|| AppointmentError::not_found("Professional", professional_id))?;

        let from = from.unwrap_or_else(|| self.clock.day_bounds(self.clock.today()).0);
        let to = to.unwrap_or(from + Duration::days(DEFAULT_LISTING_DAYS));
        if to <= from {
            return Err(AppointmentError::rule("Listing range must end after it starts"));
        }

        self.store.professional_appointments(professional_id, &AppointmentStatus::ALL, from, to).await
    }
}
