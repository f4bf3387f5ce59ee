use std::sync::Arc;

use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_key: String,
    pub clinic_utc_offset_minutes: i32,
    pub scheduling_store: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            supabase_service_key: "test-service-key".to_string(),
            clinic_utc_offset_minutes: 0,
            scheduling_store: "supabase".to_string(),
        }
    }
}

impl TestConfig {
    /// Point the Supabase client at a mock server.
    pub fn with_supabase_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self {
            scheduling_store: "memory".to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_service_key: self.supabase_service_key.clone(),
            clinic_utc_offset_minutes: self.clinic_utc_offset_minutes,
            scheduling_store: self.scheduling_store.clone(),
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

/// PostgREST row fixtures shaped like the clinic tables.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn patient_response(patient_id: Uuid) -> Value {
        json!({
            "id": patient_id,
            "name": "Test Patient"
        })
    }

    pub fn professional_response(professional_id: Uuid, activity_ids: &[Uuid]) -> Value {
        let links: Vec<Value> = activity_ids.iter()
            .map(|id| json!({ "activity_id": id }))
            .collect();

        json!({
            "id": professional_id,
            "name": "Test Professional",
            "professional_activities": links
        })
    }

    pub fn service_response(service_id: Uuid, activity_id: Uuid, default_duration: Option<i32>, capacity: i32) -> Value {
        json!({
            "id": service_id,
            "name": "Test Service",
            "plan_id": null,
            "activity": {
                "id": activity_id,
                "name": "Physiotherapy",
                "default_duration_minutes": default_duration,
                "capacity": capacity
            }
        })
    }

    pub fn availability_window_response(professional_id: Uuid, weekday: &str, start: &str, end: &str) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "professional_id": professional_id,
            "weekday": weekday,
            "start_time": start,
            "end_time": end,
            "active": true
        })
    }

    pub fn appointment_response(appointment_id: Uuid, professional_id: Uuid, start_time: &str, status: &str) -> Value {
        json!({
            "id": appointment_id,
            "patient_id": Uuid::new_v4(),
            "professional_id": professional_id,
            "service_id": Uuid::new_v4(),
            "subscription_id": null,
            "start_time": start_time,
            "duration_minutes": 50,
            "status": status,
            "notes": null,
            "active": true,
            "external_event_id": null,
            "recurrence_id": null,
            "created_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn subscription_response(subscription_id: Uuid, realized: i32, contracted: i32, status: &str) -> Value {
        json!({
            "id": subscription_id,
            "patient_id": Uuid::new_v4(),
            "status": status,
            "contracted_sessions": contracted,
            "realized_sessions": realized
        })
    }

    pub fn recurrence_response(recurrence_id: Uuid, professional_id: Uuid) -> Value {
        json!({
            "id": recurrence_id,
            "patient_id": Uuid::new_v4(),
            "professional_id": professional_id,
            "service_id": Uuid::new_v4(),
            "subscription_id": null,
            "frequency": "WEEKLY",
            "weekdays": ["Mon"],
            "time_of_day": "09:00:00",
            "duration_minutes": 50,
            "total_occurrences": 4,
            "end_date": null,
            "notes": null,
            "created_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn empty_response() -> Value {
        json!([])
    }
}
