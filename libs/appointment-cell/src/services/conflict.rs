// libs/appointment-cell/src/services/conflict.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clock::ClinicClock;
use crate::error::AppointmentResult;
use crate::models::{Appointment, AppointmentStatus};
use crate::store::SchedulingStore;

pub struct ConflictDetectionService {
    store: Arc<dyn SchedulingStore>,
    clock: ClinicClock,
}

impl ConflictDetectionService {
    pub fn new(store: Arc<dyn SchedulingStore>, clock: ClinicClock) -> Self {
        Self { store, clock }
    }

    /// Whether one more appointment fits at `start` without exceeding `capacity`.
    pub async fn can_book(
        &self,
        professional_id: Uuid,
        start: DateTime<Utc>,
        duration_minutes: i32,
        capacity: i32,
        exclude_appointment_id: Option<Uuid>,
    ) -> AppointmentResult<bool> {
        let overlaps = self.overlap_count(
            professional_id,
            start,
            duration_minutes,
            exclude_appointment_id,
        ).await?;

        let allowed = overlaps < effective_capacity(capacity);
        if !allowed {
            warn!("Capacity reached for professional {} at {} ({} overlapping, capacity {})",
                  professional_id, start, overlaps, capacity);
        }

        Ok(allowed)
    }

    /// Number of occupying appointments whose interval overlaps the candidate.
    pub async fn overlap_count(
        &self,
        professional_id: Uuid,
        start: DateTime<Utc>,
        duration_minutes: i32,
        exclude_appointment_id: Option<Uuid>,
    ) -> AppointmentResult<usize> {
        debug!("Checking conflicts for professional {} at {} ({} min)",
               professional_id, start, duration_minutes);

        let date = self.clock.to_local(start).date();
        let existing = self.day_appointments(professional_id, date).await?;
        let end = start + Duration::minutes(duration_minutes as i64);

        Ok(count_overlapping(&existing, start, end, exclude_appointment_id))
    }

    /// Scheduled and confirmed appointments on one clinic-local day.
    pub async fn day_appointments(
        &self,
        professional_id: Uuid,
        date: NaiveDate,
    ) -> AppointmentResult<Vec<Appointment>> {
        let (day_start, day_end) = self.clock.day_bounds(date);

        self.store.professional_appointments(
            professional_id,
            &AppointmentStatus::BLOCKING,
            day_start,
            day_end,
        ).await
    }
}

/// Half-open overlap: touching intervals do not overlap.
pub fn intervals_overlap(
    start1: DateTime<Utc>,
    end1: DateTime<Utc>,
    start2: DateTime<Utc>,
    end2: DateTime<Utc>,
) -> bool {
    start1 < end2 && end1 > start2
}

pub fn count_overlapping(
    existing: &[Appointment],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude_appointment_id: Option<Uuid>,
) -> usize {
    existing.iter()
        .filter(|apt| Some(apt.id) != exclude_appointment_id)
        .filter(|apt| apt.occupies_slot())
        .filter(|apt| intervals_overlap(start, end, apt.start_time, apt.end_time()))
        .count()
}

/// Activities without a sensible capacity book exclusively.
pub fn effective_capacity(capacity: i32) -> usize {
    capacity.max(1) as usize
}
