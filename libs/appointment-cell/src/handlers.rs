// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::error::AppError;

use crate::error::AppointmentError;
use crate::models::{
    AppointmentRangeQuery, CancelRecurringRequest, CreateAppointmentRequest,
    CreateRecurrenceRequest, RecurrenceRule, SlotQuery, StatusChangeRequest,
    UpdateAppointmentRequest,
};
use crate::router::SchedulingState;

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound { .. } => AppError::NotFound(err.to_string()),
            AppointmentError::BusinessRuleViolation(msg) => AppError::ValidationError(msg),
            AppointmentError::InvalidTransition { .. } => AppError::Conflict(err.to_string()),
            AppointmentError::ConcurrentModification(_) => AppError::Conflict(err.to_string()),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<Arc<SchedulingState>>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.booking_service.create_appointment(request).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment booked successfully"
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<SchedulingState>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.booking_service.get_appointment(appointment_id).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<SchedulingState>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.booking_service.update_appointment(appointment_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment updated successfully"
    })))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<Arc<SchedulingState>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.booking_service.delete_appointment(appointment_id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment deleted"
    })))
}

#[axum::debug_handler]
pub async fn change_appointment_status(
    State(state): State<Arc<SchedulingState>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<StatusChangeRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.booking_service.change_status(appointment_id, request.status).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": format!("Appointment is now {}", appointment.status)
    })))
}

#[axum::debug_handler]
pub async fn cancel_recurring(
    State(state): State<Arc<SchedulingState>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<CancelRecurringRequest>,
) -> Result<Json<Value>, AppError> {
    let cancelled = state.recurrence_service
        .cancel_recurring(appointment_id, request.cancel_future)
        .await?;

    Ok(Json(json!({
        "success": true,
        "cancelled_appointments": cancelled,
        "total": cancelled.len()
    })))
}

// ==============================================================================
// LISTINGS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_patient_appointments(
    State(state): State<Arc<SchedulingState>>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointments = state.booking_service.patient_appointments(patient_id).await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_professional_appointments(
    State(state): State<Arc<SchedulingState>>,
    Path(professional_id): Path<Uuid>,
    Query(range): Query<AppointmentRangeQuery>,
) -> Result<Json<Value>, AppError> {
    let appointments = state.booking_service
        .professional_appointments(professional_id, range.from, range.to)
        .await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

// ==============================================================================
// SLOTS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<Arc<SchedulingState>>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, AppError> {
    let slots = match query.service_id {
        Some(service_id) => {
            state.slot_service.available_slots_for_service(
                query.professional_id,
                query.date,
                service_id,
                query.duration_minutes,
            ).await?
        }
        None => {
            let duration = query.duration_minutes.ok_or_else(|| {
                AppError::BadRequest("Either service_id or duration_minutes is required".to_string())
            })?;
            state.slot_service.available_slots(
                query.professional_id,
                query.date,
                duration,
                query.capacity.unwrap_or(1),
            ).await?
        }
    };

    Ok(Json(json!({
        "professional_id": query.professional_id,
        "date": query.date,
        "slots": slots,
        "total": slots.len()
    })))
}

// ==============================================================================
// RECURRENCES
// ==============================================================================

#[axum::debug_handler]
pub async fn create_recurrence(
    State(state): State<Arc<SchedulingState>>,
    Json(request): Json<CreateRecurrenceRequest>,
) -> Result<Json<Value>, AppError> {
    let result = state.recurrence_service.create_recurring(request).await?;

    Ok(Json(json!({
        "success": true,
        "recurrence": result.recurrence,
        "created_appointments": result.created_appointments,
        "skipped_dates": result.skipped_dates,
        "message": format!(
            "{} appointments created, {} dates skipped",
            result.created_appointments.len(),
            result.skipped_dates.len()
        )
    })))
}

#[axum::debug_handler]
pub async fn preview_recurrence(
    State(state): State<Arc<SchedulingState>>,
    Json(rule): Json<RecurrenceRule>,
) -> Result<Json<Value>, AppError> {
    let dates = state.recurrence_service.preview_dates(&rule)?;

    Ok(Json(json!({
        "dates": dates,
        "total": dates.len()
    })))
}

#[axum::debug_handler]
pub async fn get_recurrence(
    State(state): State<Arc<SchedulingState>>,
    Path(recurrence_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let details = state.recurrence_service.get_recurrence(recurrence_id).await?;

    Ok(Json(json!(details)))
}
