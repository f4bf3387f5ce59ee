// libs/appointment-cell/src/services/slots.rs
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::clock::ClinicClock;
use crate::error::{AppointmentError, AppointmentResult};
use crate::models::{Appointment, AvailabilityWindow};
use crate::services::booking::resolve_duration;
use crate::services::conflict::{count_overlapping, effective_capacity, ConflictDetectionService};
use crate::store::SchedulingStore;

pub struct SlotService {
    store: Arc<dyn SchedulingStore>,
    conflict_service: ConflictDetectionService,
    clock: ClinicClock,
}

impl SlotService {
    pub fn new(store: Arc<dyn SchedulingStore>, clock: ClinicClock) -> Self {
        Self {
            conflict_service: ConflictDetectionService::new(Arc::clone(&store), clock),
            store,
            clock,
        }
    }

    /// Bookable start times on `date`, stepping each window by the session length.
    pub async fn available_slots(
        &self,
        professional_id: Uuid,
        date: NaiveDate,
        duration_minutes: i32,
        capacity: i32,
    ) -> AppointmentResult<Vec<DateTime<Utc>>> {
        if duration_minutes <= 0 {
            return Err(AppointmentError::rule("Slot duration must be positive"));
        }

        let windows = self.store.availability_windows(professional_id, date.weekday()).await?;
        if windows.is_empty() {
            debug!("Professional {} has no availability on {}", professional_id, date.weekday());
            return Ok(vec![]);
        }

        let existing = self.conflict_service.day_appointments(professional_id, date).await?;
        let slots = enumerate_slots(&windows, date, duration_minutes, capacity, &existing, &self.clock);

        debug!("Found {} available slots for professional {} on {}", slots.len(), professional_id, date);
        Ok(slots)
    }

    /// Slots sized and capped by the service's activity, unless overridden.
    pub async fn available_slots_for_service(
        &self,
        professional_id: Uuid,
        date: NaiveDate,
        service_id: Uuid,
        duration_override: Option<i32>,
    ) -> AppointmentResult<Vec<DateTime<Utc>>> {
        let service = self.store.get_service(service_id).await?
            .ok_or_else(|| AppointmentError::not_found("Service", service_id))?;
        let duration = resolve_duration(duration_override, &service.activity)?;

        self.available_slots(professional_id, date, duration, service.activity.capacity).await
    }
}

/// Window order first, then grid order inside each window. No global sort.
pub fn enumerate_slots(
    windows: &[AvailabilityWindow],
    date: NaiveDate,
    duration_minutes: i32,
    capacity: i32,
    existing: &[Appointment],
    clock: &ClinicClock,
) -> Vec<DateTime<Utc>> {
    let step = Duration::minutes(duration_minutes.max(1) as i64);
    let capacity = effective_capacity(capacity);
    let mut slots = Vec::new();

    for window in windows.iter().filter(|w| w.active && w.is_valid()) {
        let window_end = date.and_time(window.end_time);
        let mut candidate = date.and_time(window.start_time);

        while candidate + step <= window_end {
            let start = clock.to_utc(candidate);
            if count_overlapping(existing, start, start + step, None) < capacity {
                slots.push(start);
            }
            candidate += step;
        }
    }

    slots
}
