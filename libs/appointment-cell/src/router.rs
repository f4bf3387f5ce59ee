// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, patch},
};
use tracing::info;

use shared_config::AppConfig;

use crate::clock::ClinicClock;
use crate::handlers;
use crate::services::booking::AppointmentBookingService;
use crate::services::calendar::{calendar_notifier_from_config, CalendarNotifier};
use crate::services::recurrence::RecurrenceService;
use crate::services::slots::SlotService;
use crate::store::{InMemorySchedulingStore, SchedulingStore, SubscriptionAccessor, SupabaseSchedulingStore};

/// Services shared by every scheduling handler.
pub struct SchedulingState {
    pub booking_service: Arc<AppointmentBookingService>,
    pub slot_service: SlotService,
    pub recurrence_service: RecurrenceService,
}

impl SchedulingState {
    pub fn new(
        store: Arc<dyn SchedulingStore>,
        subscriptions: Arc<dyn SubscriptionAccessor>,
        notifier: Arc<dyn CalendarNotifier>,
        clock: ClinicClock,
    ) -> Self {
        let booking_service = Arc::new(AppointmentBookingService::new(
            Arc::clone(&store),
            subscriptions,
            notifier,
            clock,
        ));

        Self {
            slot_service: SlotService::new(Arc::clone(&store), clock),
            recurrence_service: RecurrenceService::new(store, Arc::clone(&booking_service)),
            booking_service,
        }
    }

    /// Pick the store and calendar notifier the configuration asks for.
    /// Must be called inside a tokio runtime when calendar sync is enabled.
    pub fn from_config(config: &AppConfig) -> Self {
        let clock = ClinicClock::from_config(config);

        if config.uses_memory_store() {
            info!("Using in-memory scheduling store");
            let store = Arc::new(InMemorySchedulingStore::new());
            let notifier = calendar_notifier_from_config(config, store.clone());
            Self::new(store.clone(), store, notifier, clock)
        } else {
            info!("Using Supabase scheduling store at {}", config.supabase_url);
            let store = Arc::new(SupabaseSchedulingStore::new(config));
            let notifier = calendar_notifier_from_config(config, store.clone());
            Self::new(store.clone(), store, notifier, clock)
        }
    }
}

pub fn scheduling_routes(state: Arc<SchedulingState>) -> Router {
    Router::new()
        // Appointments
        .route("/appointments", post(handlers::create_appointment))
        .route(
            "/appointments/{appointment_id}",
            get(handlers::get_appointment)
                .put(handlers::update_appointment)
                .delete(handlers::delete_appointment),
        )
        .route("/appointments/{appointment_id}/status", patch(handlers::change_appointment_status))
        .route("/appointments/{appointment_id}/cancel-recurring", post(handlers::cancel_recurring))

        // Listings
        .route("/appointments/patients/{patient_id}", get(handlers::get_patient_appointments))
        .route("/appointments/professionals/{professional_id}", get(handlers::get_professional_appointments))

        // Slots
        .route("/slots", get(handlers::get_available_slots))

        // Recurrences
        .route("/recurrences", post(handlers::create_recurrence))
        .route("/recurrences/preview", post(handlers::preview_recurrence))
        .route("/recurrences/{recurrence_id}", get(handlers::get_recurrence))

        .with_state(state)
}
