use std::env;

use chrono::{FixedOffset, Offset, Utc};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_key: String,
    pub clinic_utc_offset_minutes: i32,
    pub scheduling_store: String,
    pub calendar_sync_enabled: bool,
    pub calendar_webhook_url: String,
    pub api_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_key: String::new(),
            clinic_utc_offset_minutes: 0,
            scheduling_store: "supabase".to_string(),
            calendar_sync_enabled: false,
            calendar_webhook_url: String::new(),
            api_port: 3000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                    String::new()
                }),
            clinic_utc_offset_minutes: env::var("CLINIC_UTC_OFFSET_MINUTES")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or_else(|| {
                    warn!("CLINIC_UTC_OFFSET_MINUTES not set or invalid, using UTC");
                    defaults.clinic_utc_offset_minutes
                }),
            scheduling_store: env::var("SCHEDULING_STORE")
                .unwrap_or_else(|_| defaults.scheduling_store.clone()),
            calendar_sync_enabled: env::var("CALENDAR_SYNC_ENABLED")
                .map(|value| matches!(value.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            calendar_webhook_url: env::var("CALENDAR_WEBHOOK_URL")
                .unwrap_or_default(),
            api_port: env::var("API_PORT")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(defaults.api_port),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        if config.calendar_sync_enabled && !config.is_calendar_sync_configured() {
            warn!("CALENDAR_SYNC_ENABLED is set but CALENDAR_WEBHOOK_URL is empty, calendar sync disabled");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
    }

    pub fn is_calendar_sync_configured(&self) -> bool {
        self.calendar_sync_enabled && !self.calendar_webhook_url.is_empty()
    }

    pub fn uses_memory_store(&self) -> bool {
        self.scheduling_store.eq_ignore_ascii_case("memory")
    }

    /// Fixed offset of the clinic's local time. Out-of-range values fall back to UTC.
    pub fn clinic_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.clinic_utc_offset_minutes * 60).unwrap_or_else(|| {
            warn!("Invalid clinic UTC offset {} minutes, using UTC", self.clinic_utc_offset_minutes);
            Utc.fix()
        })
    }
}
