// libs/appointment-cell/src/store/supabase.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc, Weekday};
use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::error::{AppointmentError, AppointmentResult};
use crate::models::{
    Activity, Appointment, AppointmentChanges, AppointmentStatus, AvailabilityWindow, Patient, Professional,
    RecurrenceDefinition, Service, Subscription,
};
use crate::store::{SchedulingStore, SubscriptionAccessor};

#[derive(Debug, Deserialize)]
struct ProfessionalRow {
    id: Uuid,
    name: String,
    #[serde(default)]
    professional_activities: Vec<ActivityLink>,
}

#[derive(Debug, Deserialize)]
struct ActivityLink {
    activity_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct ServiceRow {
    id: Uuid,
    name: String,
    plan_id: Option<Uuid>,
    activity: Activity,
}

/// `SchedulingStore` backed by the Supabase PostgREST API.
pub struct SupabaseSchedulingStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseSchedulingStore {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_client(Arc::new(SupabaseClient::new(config)))
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn fetch_rows<T: DeserializeOwned>(&self, path: &str) -> AppointmentResult<Vec<T>> {
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            path,
            None,
            None,
        ).await?;

        let rows = result.into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<T>, _>>()?;

        Ok(rows)
    }

    async fn fetch_one<T: DeserializeOwned>(&self, path: &str) -> AppointmentResult<Option<T>> {
        Ok(self.fetch_rows::<T>(path).await?.into_iter().next())
    }

    async fn write_one<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Value,
    ) -> AppointmentResult<Option<T>> {
        let result: Vec<Value> = self.supabase.request_with_headers(
            method,
            path,
            None,
            Some(body),
            Some(SupabaseClient::return_representation()),
        ).await?;

        match result.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }

    /// A guarded PATCH matched no row: either it is gone or its status moved.
    async fn missed_write(&self, appointment_id: Uuid) -> AppointmentError {
        match self.get_appointment(appointment_id).await {
            Ok(Some(current)) => AppointmentError::ConcurrentModification(format!(
                "Appointment {} is now {}", appointment_id, current.status
            )),
            Ok(None) => AppointmentError::not_found("Appointment", appointment_id),
            Err(e) => e,
        }
    }
}

fn encode_time(instant: DateTime<Utc>) -> String {
    urlencoding::encode(&instant.to_rfc3339()).into_owned()
}

fn status_filter(statuses: &[AppointmentStatus]) -> String {
    let values: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
    format!("status=in.({})", values.join(","))
}

#[async_trait]
impl SchedulingStore for SupabaseSchedulingStore {
    async fn get_patient(&self, patient_id: Uuid) -> AppointmentResult<Option<Patient>> {
        self.fetch_one(&format!("/rest/v1/patients?id=eq.{}&select=id,name", patient_id)).await
    }

    async fn get_professional(&self, professional_id: Uuid) -> AppointmentResult<Option<Professional>> {
        let path = format!(
            "/rest/v1/professionals?id=eq.{}&select=id,name,professional_activities(activity_id)",
            professional_id
        );
        let row: Option<ProfessionalRow> = self.fetch_one(&path).await?;

        Ok(row.map(|row| Professional {
            id: row.id,
            name: row.name,
            activity_ids: row.professional_activities.into_iter().map(|link| link.activity_id).collect(),
        }))
    }

    async fn get_service(&self, service_id: Uuid) -> AppointmentResult<Option<Service>> {
        let path = format!(
            "/rest/v1/services?id=eq.{}&select=id,name,plan_id,activity:activities(*)",
            service_id
        );
        let row: Option<ServiceRow> = self.fetch_one(&path).await?;

        Ok(row.map(|row| Service {
            id: row.id,
            name: row.name,
            plan_id: row.plan_id,
            activity: row.activity,
        }))
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> AppointmentResult<Option<Appointment>> {
        self.fetch_one(&format!("/rest/v1/appointments?id=eq.{}", appointment_id)).await
    }

    async fn insert_appointment(&self, appointment: &Appointment) -> AppointmentResult<Appointment> {
        debug!("Inserting appointment {}", appointment.id);
        self.write_one(Method::POST, "/rest/v1/appointments", serde_json::to_value(appointment)?)
            .await?
            .ok_or_else(|| AppointmentError::DatabaseError("Failed to create appointment".to_string()))
    }

    async fn transition_status(
        &self,
        appointment_id: Uuid,
        expected: AppointmentStatus,
        status: AppointmentStatus,
    ) -> AppointmentResult<Appointment> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}",
            appointment_id,
            expected.as_str()
        );
        let updated: Option<Appointment> = self.write_one(
            Method::PATCH,
            &path,
            json!({ "status": status }),
        ).await?;

        match updated {
            Some(appointment) => Ok(appointment),
            None => Err(self.missed_write(appointment_id).await),
        }
    }

    async fn update_details(
        &self,
        appointment_id: Uuid,
        changes: &AppointmentChanges,
    ) -> AppointmentResult<Appointment> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&{}",
            appointment_id,
            status_filter(&AppointmentStatus::BLOCKING)
        );
        let updated: Option<Appointment> = self.write_one(
            Method::PATCH,
            &path,
            serde_json::to_value(changes)?,
        ).await?;

        match updated {
            Some(appointment) => Ok(appointment),
            None => Err(self.missed_write(appointment_id).await),
        }
    }

    async fn deactivate_appointment(&self, appointment_id: Uuid) -> AppointmentResult<Appointment> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        self.write_one(Method::PATCH, &path, json!({ "active": false }))
            .await?
            .ok_or_else(|| AppointmentError::not_found("Appointment", appointment_id))
    }

    async fn professional_appointments(
        &self,
        professional_id: Uuid,
        statuses: &[AppointmentStatus],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppointmentResult<Vec<Appointment>> {
        let path = format!(
            "/rest/v1/appointments?professional_id=eq.{}&active=eq.true&{}&start_time=gte.{}&start_time=lt.{}&order=start_time.asc",
            professional_id,
            status_filter(statuses),
            encode_time(from),
            encode_time(to),
        );
        self.fetch_rows(&path).await
    }

    async fn patient_appointments(&self, patient_id: Uuid) -> AppointmentResult<Vec<Appointment>> {
        let path = format!(
            "/rest/v1/appointments?patient_id=eq.{}&active=eq.true&order=start_time.asc",
            patient_id
        );
        self.fetch_rows(&path).await
    }

    async fn recurrence_appointments(
        &self,
        recurrence_id: Uuid,
        from: Option<DateTime<Utc>>,
        statuses: &[AppointmentStatus],
    ) -> AppointmentResult<Vec<Appointment>> {
        let mut path = format!(
            "/rest/v1/appointments?recurrence_id=eq.{}&active=eq.true&{}",
            recurrence_id,
            status_filter(statuses),
        );
        if let Some(from) = from {
            path.push_str(&format!("&start_time=gte.{}", encode_time(from)));
        }
        path.push_str("&order=start_time.asc");

        self.fetch_rows(&path).await
    }

    async fn availability_windows(
        &self,
        professional_id: Uuid,
        weekday: Weekday,
    ) -> AppointmentResult<Vec<AvailabilityWindow>> {
        let path = format!(
            "/rest/v1/availability_windows?professional_id=eq.{}&weekday=eq.{}&active=eq.true&order=start_time.asc",
            professional_id,
            weekday,
        );
        let windows: Vec<AvailabilityWindow> = self.fetch_rows(&path).await?;

        Ok(windows.into_iter()
            .filter(|window| {
                if !window.is_valid() {
                    warn!("Ignoring availability window {} that ends before it starts", window.id);
                }
                window.is_valid()
            })
            .collect())
    }

    async fn insert_recurrence(&self, recurrence: &RecurrenceDefinition) -> AppointmentResult<RecurrenceDefinition> {
        self.write_one(Method::POST, "/rest/v1/recurrence_definitions", serde_json::to_value(recurrence)?)
            .await?
            .ok_or_else(|| AppointmentError::DatabaseError("Failed to create recurrence".to_string()))
    }

    async fn get_recurrence(&self, recurrence_id: Uuid) -> AppointmentResult<Option<RecurrenceDefinition>> {
        self.fetch_one(&format!("/rest/v1/recurrence_definitions?id=eq.{}", recurrence_id)).await
    }

    async fn set_external_event_id(&self, appointment_id: Uuid, event_id: &str) -> AppointmentResult<()> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let _: Option<Appointment> = self.write_one(
            Method::PATCH,
            &path,
            json!({ "external_event_id": event_id }),
        ).await?;
        Ok(())
    }
}

#[async_trait]
impl SubscriptionAccessor for SupabaseSchedulingStore {
    async fn get_subscription(&self, subscription_id: Uuid) -> AppointmentResult<Option<Subscription>> {
        self.fetch_one(&format!("/rest/v1/subscriptions?id=eq.{}", subscription_id)).await
    }

    async fn is_usable(&self, subscription_id: Uuid) -> AppointmentResult<bool> {
        self.get_subscription(subscription_id).await?
            .map(|sub| sub.is_usable())
            .ok_or_else(|| AppointmentError::not_found("Subscription", subscription_id))
    }

    async fn consume_session(&self, subscription_id: Uuid) -> AppointmentResult<Subscription> {
        let mut subscription = self.get_subscription(subscription_id).await?
            .ok_or_else(|| AppointmentError::not_found("Subscription", subscription_id))?;

        if !subscription.is_usable() {
            return Err(AppointmentError::rule(format!(
                "Subscription {} has no remaining sessions", subscription_id
            )));
        }

        let previous_count = subscription.realized_sessions;
        subscription.record_session();

        // Guard on the previous count so a concurrent consumption cannot be lost
        let path = format!(
            "/rest/v1/subscriptions?id=eq.{}&realized_sessions=eq.{}",
            subscription_id, previous_count
        );
        let updated: Option<Subscription> = self.write_one(
            Method::PATCH,
            &path,
            json!({
                "realized_sessions": subscription.realized_sessions,
                "status": subscription.status,
            }),
        ).await?;

        updated.ok_or_else(|| AppointmentError::DatabaseError(format!(
            "Subscription {} was modified concurrently", subscription_id
        )))
    }
}
