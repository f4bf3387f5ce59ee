// libs/appointment-cell/src/services/recurrence.rs
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{AppointmentError, AppointmentResult};
use crate::models::{
    Appointment, AppointmentStatus, CreateAppointmentRequest, CreateRecurrenceRequest, Frequency,
    RecurrenceDefinition, RecurrenceDetails, RecurrenceResult, RecurrenceRule, SkippedDate,
};
use crate::services::booking::AppointmentBookingService;
use crate::store::SchedulingStore;

/// Upper bound on generated occurrences, whatever the termination rule says.
pub const MAX_OCCURRENCES: usize = 52;

// ==============================================================================
// DATE GENERATION
// ==============================================================================

/// Expand a rule into clinic-local start times, searching from the day after
/// `today`. Returns at most [`MAX_OCCURRENCES`] entries; `end_date` is inclusive.
pub fn generate_dates(rule: &RecurrenceRule, today: NaiveDate) -> Vec<NaiveDateTime> {
    let limit = rule.total_occurrences
        .map_or(MAX_OCCURRENCES, |total| (total as usize).min(MAX_OCCURRENCES));
    let Some(first_day) = today.succ_opt() else {
        return vec![];
    };

    match rule.frequency {
        Frequency::Weekly | Frequency::Biweekly => weekly_dates(rule, first_day, limit),
        Frequency::Monthly => monthly_dates(rule, first_day, limit),
    }
}

fn weekly_dates(rule: &RecurrenceRule, first_day: NaiveDate, limit: usize) -> Vec<NaiveDateTime> {
    let mut weekdays: Vec<u32> = rule.weekdays.iter()
        .map(|day| day.number_from_monday())
        .collect();
    weekdays.sort_unstable();
    weekdays.dedup();

    let (Some(&cycle_first), Some(&cycle_last)) = (weekdays.first(), weekdays.last()) else {
        return vec![];
    };
    let cycle_days = rule.frequency.weeks() * 7;

    let mut dates = Vec::new();
    let mut current = first_day;

    while dates.len() < limit {
        if rule.end_date.is_some_and(|end| current > end) {
            break;
        }

        let weekday = current.weekday().number_from_monday();
        let step = if weekdays.contains(&weekday) {
            dates.push(current.and_time(rule.time_of_day));
            if weekday == cycle_last {
                // Land on the first configured weekday of the next cycle
                cycle_days - (weekday - cycle_first) as i64
            } else {
                1
            }
        } else {
            1
        };

        current = match current.checked_add_signed(Duration::days(step)) {
            Some(next) => next,
            None => break,
        };
    }

    dates
}

fn monthly_dates(rule: &RecurrenceRule, first_day: NaiveDate, limit: usize) -> Vec<NaiveDateTime> {
    let mut dates = Vec::new();
    let mut current = Some(first_day);

    while let Some(day) = current {
        if dates.len() >= limit || rule.end_date.is_some_and(|end| day > end) {
            break;
        }
        dates.push(day.and_time(rule.time_of_day));
        current = day.checked_add_months(Months::new(1));
    }

    dates
}

/// Rule checks that make a recurrence request fatal before anything is stored.
pub fn validate_rule(rule: &RecurrenceRule) -> AppointmentResult<()> {
    if !rule.has_termination() {
        return Err(AppointmentError::rule(
            "Recurrence requires total_occurrences or end_date",
        ));
    }
    if rule.total_occurrences == Some(0) {
        return Err(AppointmentError::rule("total_occurrences must be at least 1"));
    }
    if rule.frequency != Frequency::Monthly && rule.weekdays.is_empty() {
        return Err(AppointmentError::rule(format!(
            "{:?} recurrence requires at least one weekday", rule.frequency
        )));
    }
    Ok(())
}

// ==============================================================================
// RECURRENCE SERVICE
// ==============================================================================

pub struct RecurrenceService {
    store: Arc<dyn SchedulingStore>,
    booking_service: Arc<AppointmentBookingService>,
}

impl RecurrenceService {
    pub fn new(store: Arc<dyn SchedulingStore>, booking_service: Arc<AppointmentBookingService>) -> Self {
        Self { store, booking_service }
    }

    /// Dates a rule would produce right now, as UTC instants. Nothing is stored.
    pub fn preview_dates(&self, rule: &RecurrenceRule) -> AppointmentResult<Vec<DateTime<Utc>>> {
        validate_rule(rule)?;

        let clock = self.booking_service.clock();
        Ok(generate_dates(rule, clock.today())
            .into_iter()
            .map(|local| clock.to_utc(local))
            .collect())
    }

    /// Persist the definition, then book each generated date through the
    /// single-booking path. Rule violations become skipped dates; anything
    /// else stops the batch.
    #[instrument(skip(self, request), fields(professional_id = %request.professional_id))]
    pub async fn create_recurring(
        &self,
        request: CreateRecurrenceRequest,
    ) -> AppointmentResult<RecurrenceResult> {
        let rule = request.rule();
        validate_rule(&rule)?;

        let context = self.booking_service.resolve_booking_context(
            request.patient_id,
            request.professional_id,
            request.service_id,
            request.subscription_id,
            request.duration_minutes,
        ).await?;

        let definition = RecurrenceDefinition {
            id: Uuid::new_v4(),
            patient_id: context.patient.id,
            professional_id: context.professional.id,
            service_id: context.service.id,
            subscription_id: request.subscription_id,
            frequency: request.frequency,
            weekdays: request.weekdays,
            time_of_day: request.time_of_day,
            duration_minutes: context.duration_minutes,
            total_occurrences: request.total_occurrences,
            end_date: request.end_date,
            notes: request.notes,
            created_at: Utc::now(),
        };
        let definition = self.store.insert_recurrence(&definition).await?;

        let clock = self.booking_service.clock();
        let dates = generate_dates(&rule, clock.today());
        info!("Recurrence {} generated {} candidate dates", definition.id, dates.len());

        let mut created_appointments = Vec::new();
        let mut skipped_dates = Vec::new();

        for local in dates {
            let start_time = clock.to_utc(local);
            let occurrence = CreateAppointmentRequest {
                patient_id: definition.patient_id,
                professional_id: definition.professional_id,
                service_id: definition.service_id,
                subscription_id: definition.subscription_id,
                start_time,
                duration_minutes: Some(definition.duration_minutes),
                notes: definition.notes.clone(),
            };

            match self.booking_service.book(occurrence, Some(definition.id)).await {
                Ok(appointment) => created_appointments.push(appointment),
                Err(e) if e.is_business_rule_violation() => {
                    warn!("Skipping recurrence {} occurrence at {}: {}", definition.id, local, e);
                    skipped_dates.push(SkippedDate {
                        date: start_time,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        info!("Recurrence {} created {} appointments, skipped {}",
              definition.id, created_appointments.len(), skipped_dates.len());

        Ok(RecurrenceResult {
            recurrence: definition,
            created_appointments,
            skipped_dates,
        })
    }

    /// Cancel the anchor alone, or the anchor and every later open occurrence
    /// of its recurrence.
    #[instrument(skip(self))]
    pub async fn cancel_recurring(
        &self,
        anchor_appointment_id: Uuid,
        cancel_future: bool,
    ) -> AppointmentResult<Vec<Appointment>> {
        let anchor = self.booking_service.get_appointment(anchor_appointment_id).await?;

        if !cancel_future {
            let cancelled = self.booking_service.cancel_appointment(anchor.id).await?;
            return Ok(vec![cancelled]);
        }

        let recurrence_id = anchor.recurrence_id.ok_or_else(|| AppointmentError::rule(format!(
            "Appointment {} is not part of a recurrence", anchor.id
        )))?;

        let targets = self.store.recurrence_appointments(
            recurrence_id,
            Some(anchor.start_time),
            &AppointmentStatus::BLOCKING,
        ).await?;
        debug!("Cancelling {} appointments of recurrence {}", targets.len(), recurrence_id);

        let mut cancelled = Vec::with_capacity(targets.len());
        for appointment in targets {
            cancelled.push(self.booking_service.cancel_appointment(appointment.id).await?);
        }

        info!("Cancelled {} appointments of recurrence {} from {}",
              cancelled.len(), recurrence_id, anchor.start_time);
        Ok(cancelled)
    }

    pub async fn get_recurrence(&self, recurrence_id: Uuid) -> AppointmentResult<RecurrenceDetails> {
        let recurrence = self.store.get_recurrence(recurrence_id).await?
            .ok_or_else(|| AppointmentError::not_found("Recurrence", recurrence_id))?;
        let appointments = self.store
            .recurrence_appointments(recurrence_id, None, &AppointmentStatus::ALL)
            .await?;

        Ok(RecurrenceDetails { recurrence, appointments })
    }
}
