// libs/appointment-cell/src/services/availability.rs
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::clock::ClinicClock;
use crate::error::AppointmentResult;
use crate::models::AvailabilityWindow;
use crate::store::SchedulingStore;

pub struct AvailabilityService {
    store: Arc<dyn SchedulingStore>,
    clock: ClinicClock,
}

impl AvailabilityService {
    pub fn new(store: Arc<dyn SchedulingStore>, clock: ClinicClock) -> Self {
        Self { store, clock }
    }

    /// Whether `[start, start + duration)` lies inside one of the professional's
    /// windows for that weekday.
    pub async fn is_within_availability(
        &self,
        professional_id: Uuid,
        start: DateTime<Utc>,
        duration_minutes: i32,
    ) -> AppointmentResult<bool> {
        let local_start = self.clock.to_local(start);
        let windows = self.store
            .availability_windows(professional_id, local_start.weekday())
            .await?;

        let fits = fits_any_window(&windows, local_start, duration_minutes);
        debug!("Availability check for professional {} at {}: {} windows, fits={}",
               professional_id, local_start, windows.len(), fits);

        Ok(fits)
    }
}

pub fn fits_any_window(
    windows: &[AvailabilityWindow],
    local_start: NaiveDateTime,
    duration_minutes: i32,
) -> bool {
    let local_end = local_start + Duration::minutes(duration_minutes as i64);

    // Spanning midnight never fits a same-day window
    if local_end.date() != local_start.date() {
        return false;
    }

    windows.iter()
        .filter(|window| window.active && window.weekday == local_start.weekday())
        .any(|window| window.start_time <= local_start.time() && local_end.time() <= window.end_time)
}
