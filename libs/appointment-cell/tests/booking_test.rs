use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::Duration;
use tokio_test::assert_ok;

use appointment_cell::error::AppointmentError;
use appointment_cell::models::*;
use appointment_cell::services::conflict::ConflictDetectionService;
use appointment_cell::store::{SchedulingStore, SubscriptionAccessor};

mod common;
use common::{clock, monday_at, next_monday, Fixture};

// ==============================================================================
// BOOKING
// ==============================================================================

#[tokio::test]
async fn test_booking_uses_activity_default_duration() {
    let fx = Fixture::new(1).await;

    let appointment = fx.booking.create_appointment(fx.request(monday_at(9, 0))).await.unwrap();

    assert_eq!(appointment.status, AppointmentStatus::Scheduled);
    assert_eq!(appointment.duration_minutes, 50);
    assert!(appointment.active);
    assert_eq!(appointment.recurrence_id, None);
    assert_eq!(fx.notifier.count("created"), 1);
}

#[tokio::test]
async fn test_overlapping_booking_rejected_at_capacity() {
    let fx = Fixture::new(1).await;
    fx.booking.create_appointment(fx.request(monday_at(10, 0))).await.unwrap();

    let other = fx.add_patient().await;
    let mut request = fx.request(monday_at(10, 0));
    request.patient_id = other;

    let err = fx.booking.create_appointment(request).await.unwrap_err();

    assert_matches!(err, AppointmentError::BusinessRuleViolation(ref msg) if msg.contains("Capacity reached"));
    assert_eq!(fx.notifier.count("created"), 1);
}

#[tokio::test]
async fn test_back_to_back_booking_allowed() {
    let fx = Fixture::new(1).await;
    fx.booking.create_appointment(fx.request(monday_at(10, 0))).await.unwrap();

    let result = fx.booking.create_appointment(fx.request(monday_at(10, 50))).await;

    assert_ok!(result);
}

#[tokio::test]
async fn test_group_capacity_allows_exactly_n() {
    let fx = Fixture::new(3).await;

    for _ in 0..3 {
        let patient = fx.add_patient().await;
        let mut request = fx.request(monday_at(9, 0));
        request.patient_id = patient;
        fx.booking.create_appointment(request).await.unwrap();
    }

    let err = fx.booking.create_appointment(fx.request(monday_at(9, 0))).await.unwrap_err();
    assert!(err.is_business_rule_violation());
}

#[tokio::test]
async fn test_concurrent_bookings_for_last_seat() {
    let fx = Fixture::new(1).await;
    let other = fx.add_patient().await;

    let first = fx.request(monday_at(9, 0));
    let mut second = fx.request(monday_at(9, 0));
    second.patient_id = other;

    let (a, b) = tokio::join!(
        fx.booking.create_appointment(first),
        fx.booking.create_appointment(second),
    );

    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    assert_eq!(fx.store.all_appointments().await.len(), 1);
}

#[tokio::test]
async fn test_outside_availability_rejected() {
    let fx = Fixture::new(1).await;

    // 11:30 + 50 minutes runs past the 12:00 close
    let late = fx.booking.create_appointment(fx.request(monday_at(11, 30))).await.unwrap_err();
    assert_matches!(late, AppointmentError::BusinessRuleViolation(ref msg) if msg.contains("availability"));

    // No Tuesday windows at all
    let tuesday = fx.request(monday_at(9, 0) + Duration::days(1));
    assert!(fx.booking.create_appointment(tuesday).await.unwrap_err().is_business_rule_violation());
}

#[tokio::test]
async fn test_unqualified_professional_rejected() {
    let fx = Fixture::new(1).await;
    let other_service = uuid::Uuid::new_v4();
    fx.store.add_service(Service {
        id: other_service,
        name: "Nutrition".to_string(),
        plan_id: None,
        activity: Activity {
            id: uuid::Uuid::new_v4(),
            name: "Nutrition".to_string(),
            default_duration_minutes: Some(30),
            capacity: 1,
        },
    }).await;

    let mut request = fx.request(monday_at(9, 0));
    request.service_id = other_service;

    let err = fx.booking.create_appointment(request).await.unwrap_err();
    assert_matches!(err, AppointmentError::BusinessRuleViolation(ref msg) if msg.contains("not qualified"));
}

#[tokio::test]
async fn test_missing_references_are_not_found() {
    let fx = Fixture::new(1).await;

    let mut request = fx.request(monday_at(9, 0));
    request.patient_id = uuid::Uuid::new_v4();
    assert_matches!(
        fx.booking.create_appointment(request).await,
        Err(AppointmentError::NotFound { entity: "Patient", .. })
    );

    let mut request = fx.request(monday_at(9, 0));
    request.subscription_id = Some(uuid::Uuid::new_v4());
    assert_matches!(
        fx.booking.create_appointment(request).await,
        Err(AppointmentError::NotFound { entity: "Subscription", .. })
    );
}

#[tokio::test]
async fn test_exhausted_subscription_rejected() {
    let fx = Fixture::new(1).await;
    let subscription = fx.add_subscription(4, 4).await;

    let mut request = fx.request(monday_at(9, 0));
    request.subscription_id = Some(subscription);

    let err = fx.booking.create_appointment(request).await.unwrap_err();
    assert!(err.is_business_rule_violation());
}

// ==============================================================================
// STATE MACHINE
// ==============================================================================

#[tokio::test]
async fn test_completion_realizes_last_session() {
    let fx = Fixture::new(1).await;
    let subscription = fx.add_subscription(3, 4).await;
    let mut request = fx.request(monday_at(9, 0));
    request.subscription_id = Some(subscription);
    let appointment = fx.booking.create_appointment(request).await.unwrap();

    fx.booking.change_status(appointment.id, AppointmentStatus::Confirmed).await.unwrap();
    let completed = fx.booking.change_status(appointment.id, AppointmentStatus::Completed).await.unwrap();

    assert_eq!(completed.status, AppointmentStatus::Completed);
    let sub = fx.store.get_subscription(subscription).await.unwrap().unwrap();
    assert_eq!(sub.realized_sessions, 4);
    assert_eq!(sub.status, SubscriptionStatus::Finished);
}

#[tokio::test]
async fn test_completion_before_contract_keeps_subscription_active() {
    let fx = Fixture::new(1).await;
    let subscription = fx.add_subscription(1, 4).await;
    let mut request = fx.request(monday_at(9, 0));
    request.subscription_id = Some(subscription);
    let appointment = fx.booking.create_appointment(request).await.unwrap();

    fx.booking.change_status(appointment.id, AppointmentStatus::Confirmed).await.unwrap();
    fx.booking.change_status(appointment.id, AppointmentStatus::Completed).await.unwrap();

    let sub = fx.store.get_subscription(subscription).await.unwrap().unwrap();
    assert_eq!(sub.realized_sessions, 2);
    assert_eq!(sub.status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn test_completing_on_finished_subscription_fails() {
    let fx = Fixture::new(2).await;
    let subscription = fx.add_subscription(3, 4).await;

    let mut ids = Vec::new();
    for hour in [9, 10] {
        let mut request = fx.request(monday_at(hour, 0));
        request.subscription_id = Some(subscription);
        ids.push(fx.booking.create_appointment(request).await.unwrap().id);
    }
    for id in &ids {
        fx.booking.change_status(*id, AppointmentStatus::Confirmed).await.unwrap();
    }

    fx.booking.change_status(ids[0], AppointmentStatus::Completed).await.unwrap();
    let err = fx.booking.change_status(ids[1], AppointmentStatus::Completed).await.unwrap_err();

    assert!(err.is_business_rule_violation());
    let unchanged = fx.booking.get_appointment(ids[1]).await.unwrap();
    assert_eq!(unchanged.status, AppointmentStatus::Confirmed);
}

#[tokio::test]
async fn test_concurrent_completions_realize_one_session() {
    let fx = Fixture::new(1).await;
    let subscription = fx.add_subscription(1, 4).await;
    let mut request = fx.request(monday_at(9, 0));
    request.subscription_id = Some(subscription);
    let appointment = fx.booking.create_appointment(request).await.unwrap();
    fx.booking.change_status(appointment.id, AppointmentStatus::Confirmed).await.unwrap();

    let booking = fx.slow_booking();
    let (first, second) = tokio::join!(
        booking.change_status(appointment.id, AppointmentStatus::Completed),
        booking.change_status(appointment.id, AppointmentStatus::Completed),
    );

    assert_eq!(first.is_ok() as u8 + second.is_ok() as u8, 1);
    let loser = if first.is_ok() { second } else { first };
    assert_matches!(loser, Err(AppointmentError::InvalidTransition { current: AppointmentStatus::Completed, .. }));

    let sub = fx.store.get_subscription(subscription).await.unwrap().unwrap();
    assert_eq!(sub.realized_sessions, 2);
}

#[tokio::test]
async fn test_stale_status_write_is_refused() {
    let fx = Fixture::new(1).await;
    let appointment = fx.booking.create_appointment(fx.request(monday_at(9, 0))).await.unwrap();
    fx.booking.cancel_appointment(appointment.id).await.unwrap();

    // A writer that still believes the appointment is scheduled
    let err = fx.store
        .transition_status(appointment.id, AppointmentStatus::Scheduled, AppointmentStatus::Confirmed)
        .await
        .unwrap_err();

    assert_matches!(err, AppointmentError::InvalidTransition { current: AppointmentStatus::Cancelled, .. });
    let stored = fx.booking.get_appointment(appointment.id).await.unwrap();
    assert_eq!(stored.status, AppointmentStatus::Cancelled);
}

#[tokio::test]
async fn test_skipping_confirmation_is_invalid() {
    let fx = Fixture::new(1).await;
    let appointment = fx.booking.create_appointment(fx.request(monday_at(9, 0))).await.unwrap();

    let err = fx.booking.change_status(appointment.id, AppointmentStatus::Completed).await.unwrap_err();

    assert_eq!(err, AppointmentError::InvalidTransition {
        current: AppointmentStatus::Scheduled,
        requested: AppointmentStatus::Completed,
    });
}

#[tokio::test]
async fn test_terminal_appointments_are_frozen() {
    let fx = Fixture::new(1).await;
    let appointment = fx.booking.create_appointment(fx.request(monday_at(9, 0))).await.unwrap();
    fx.booking.cancel_appointment(appointment.id).await.unwrap();

    assert_matches!(
        fx.booking.change_status(appointment.id, AppointmentStatus::Confirmed).await,
        Err(AppointmentError::InvalidTransition { current: AppointmentStatus::Cancelled, .. })
    );

    let edit = UpdateAppointmentRequest {
        notes: Some("too late".to_string()),
        ..Default::default()
    };
    assert!(fx.booking.update_appointment(appointment.id, edit).await.unwrap_err().is_business_rule_violation());
}

#[tokio::test]
async fn test_cancellation_frees_the_slot_and_notifies() {
    let fx = Fixture::new(1).await;
    let appointment = fx.booking.create_appointment(fx.request(monday_at(9, 0))).await.unwrap();

    fx.booking.cancel_appointment(appointment.id).await.unwrap();

    assert_eq!(fx.notifier.count("deleted"), 1);
    assert_ok!(fx.booking.create_appointment(fx.request(monday_at(9, 0))).await);
}

// ==============================================================================
// RESCHEDULE & DELETE
// ==============================================================================

#[tokio::test]
async fn test_reschedule_excludes_itself() {
    let fx = Fixture::new(1).await;
    let appointment = fx.booking.create_appointment(fx.request(monday_at(9, 0))).await.unwrap();

    // Moving by 20 minutes overlaps only its own old interval
    let moved = fx.booking.update_appointment(appointment.id, UpdateAppointmentRequest {
        start_time: Some(monday_at(9, 20)),
        ..Default::default()
    }).await.unwrap();

    assert_eq!(moved.start_time, monday_at(9, 20));
    assert_eq!(fx.notifier.count("updated"), 1);
}

#[tokio::test]
async fn test_reschedule_into_conflict_rejected() {
    let fx = Fixture::new(1).await;
    fx.booking.create_appointment(fx.request(monday_at(9, 0))).await.unwrap();
    let second = fx.booking.create_appointment(fx.request(monday_at(10, 0))).await.unwrap();

    let err = fx.booking.update_appointment(second.id, UpdateAppointmentRequest {
        start_time: Some(monday_at(9, 30)),
        ..Default::default()
    }).await.unwrap_err();

    assert!(err.is_business_rule_violation());
    assert_eq!(fx.booking.get_appointment(second.id).await.unwrap().start_time, monday_at(10, 0));
}

#[tokio::test]
async fn test_notes_edit_skips_checks() {
    let fx = Fixture::new(1).await;
    let appointment = fx.booking.create_appointment(fx.request(monday_at(11, 10))).await.unwrap();

    let updated = fx.booking.update_appointment(appointment.id, UpdateAppointmentRequest {
        notes: Some("Bring exam results".to_string()),
        ..Default::default()
    }).await.unwrap();

    assert_eq!(updated.notes.as_deref(), Some("Bring exam results"));
}

#[tokio::test]
async fn test_edit_racing_cancellation_keeps_it_cancelled() {
    let fx = Fixture::new(1).await;
    let appointment = fx.booking.create_appointment(fx.request(monday_at(9, 0))).await.unwrap();

    let booking = fx.slow_booking();
    let edit = UpdateAppointmentRequest {
        notes: Some("bring exam results".to_string()),
        ..Default::default()
    };
    let (_, cancelled) = tokio::join!(
        booking.update_appointment(appointment.id, edit),
        booking.cancel_appointment(appointment.id),
    );

    assert_ok!(cancelled);
    let stored = fx.booking.get_appointment(appointment.id).await.unwrap();
    assert_eq!(stored.status, AppointmentStatus::Cancelled);

    // The slot is free again
    assert_ok!(fx.booking.create_appointment(fx.request(monday_at(9, 0))).await);
}

#[tokio::test]
async fn test_edit_keeps_calendar_handle() {
    let fx = Fixture::new(1).await;
    let appointment = fx.booking.create_appointment(fx.request(monday_at(9, 0))).await.unwrap();
    fx.store.set_external_event_id(appointment.id, "evt-9").await.unwrap();

    let changes = AppointmentChanges {
        start_time: appointment.start_time,
        duration_minutes: appointment.duration_minutes,
        notes: Some("moved room".to_string()),
    };
    let saved = fx.store.update_details(appointment.id, &changes).await.unwrap();

    assert_eq!(saved.external_event_id.as_deref(), Some("evt-9"));
    assert_eq!(saved.notes.as_deref(), Some("moved room"));
}

#[tokio::test]
async fn test_edit_after_terminal_status_is_refused() {
    let fx = Fixture::new(1).await;
    let appointment = fx.booking.create_appointment(fx.request(monday_at(9, 0))).await.unwrap();
    fx.booking.cancel_appointment(appointment.id).await.unwrap();

    let changes = AppointmentChanges {
        start_time: monday_at(10, 0),
        duration_minutes: 50,
        notes: None,
    };

    assert_matches!(
        fx.store.update_details(appointment.id, &changes).await,
        Err(AppointmentError::ConcurrentModification(_))
    );
}

#[tokio::test]
async fn test_soft_delete_hides_from_listings() {
    let fx = Fixture::new(1).await;
    let appointment = fx.booking.create_appointment(fx.request(monday_at(9, 0))).await.unwrap();

    let deleted = fx.booking.delete_appointment(appointment.id).await.unwrap();

    assert!(!deleted.active);
    assert!(fx.booking.patient_appointments(fx.patient_id).await.unwrap().is_empty());
    // Still retrievable by id for audit
    assert!(!fx.booking.get_appointment(appointment.id).await.unwrap().active);
    // Capacity is released
    assert!(fx.booking.create_appointment(fx.request(monday_at(9, 0))).await.is_ok());
}

#[tokio::test]
async fn test_professional_listing_range() {
    let fx = Fixture::new(1).await;
    fx.booking.create_appointment(fx.request(monday_at(9, 0))).await.unwrap();
    let cancelled = fx.booking.create_appointment(fx.request(monday_at(10, 0))).await.unwrap();
    fx.booking.cancel_appointment(cancelled.id).await.unwrap();

    let listed = fx.booking.professional_appointments(
        fx.professional_id,
        Some(monday_at(0, 0)),
        Some(monday_at(23, 0)),
    ).await.unwrap();

    assert_eq!(listed.len(), 2);
    assert!(listed[0].start_time < listed[1].start_time);

    let default_range = fx.booking.professional_appointments(fx.professional_id, None, None).await.unwrap();
    assert_eq!(default_range.len(), 2);
}

// ==============================================================================
// SLOTS
// ==============================================================================

#[tokio::test]
async fn test_slots_on_empty_day() {
    let fx = Fixture::new(1).await;

    let slots = fx.slots.available_slots(fx.professional_id, next_monday(), 50, 1).await.unwrap();

    assert_eq!(slots, vec![monday_at(8, 0), monday_at(8, 50), monday_at(9, 40), monday_at(10, 30)]);
}

#[tokio::test]
async fn test_slots_for_service_use_activity_settings() {
    let fx = Fixture::new(1).await;
    fx.booking.create_appointment(fx.request(monday_at(8, 50))).await.unwrap();

    let slots = fx.slots
        .available_slots_for_service(fx.professional_id, next_monday(), fx.service_id, None)
        .await
        .unwrap();

    assert_eq!(slots, vec![monday_at(8, 0), monday_at(9, 40), monday_at(10, 30)]);
}

#[tokio::test]
async fn test_no_windows_means_no_slots() {
    let fx = Fixture::new(1).await;
    let tuesday = next_monday().succ_opt().unwrap();

    assert!(fx.slots.available_slots(fx.professional_id, tuesday, 50, 1).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_every_listed_slot_is_bookable() {
    let fx = Fixture::new(2).await;
    for (hour, minute) in [(8, 0), (8, 0), (9, 15), (10, 45)] {
        let patient = fx.add_patient().await;
        let mut request = fx.request(monday_at(hour, minute));
        request.patient_id = patient;
        request.duration_minutes = Some(30);
        fx.booking.create_appointment(request).await.unwrap();
    }

    let conflicts = ConflictDetectionService::new(fx.store.clone(), clock());
    let slots = fx.slots.available_slots(fx.professional_id, next_monday(), 40, 2).await.unwrap();

    assert!(!slots.is_empty());
    for slot in slots {
        assert!(conflicts.can_book(fx.professional_id, slot, 40, 2, None).await.unwrap(), "slot {} not bookable", slot);
    }
}

#[tokio::test]
async fn test_capacity_never_exceeded_after_bookings() {
    let fx = Fixture::new(2).await;

    for minute in (0..180).step_by(10) {
        let patient = fx.add_patient().await;
        let mut request = fx.request(monday_at(8, 0) + Duration::minutes(minute));
        request.patient_id = patient;
        let _ = fx.booking.create_appointment(request).await;
    }

    let booked = fx.store
        .professional_appointments(fx.professional_id, &AppointmentStatus::BLOCKING, monday_at(0, 0), monday_at(23, 59))
        .await
        .unwrap();
    let conflicts = ConflictDetectionService::new(Arc::clone(&fx.store) as Arc<dyn SchedulingStore>, clock());
    for apt in &booked {
        let overlapping = conflicts.overlap_count(fx.professional_id, apt.start_time, apt.duration_minutes, None)
            .await
            .unwrap();
        assert!(overlapping <= 2);
    }
}
