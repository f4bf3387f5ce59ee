// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use std::fmt;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub professional_id: Uuid,
    pub service_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    pub external_event_id: Option<String>,
    pub recurrence_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + Duration::minutes(self.duration_minutes as i64)
    }

    /// Active, non-terminal appointments occupy capacity.
    pub fn occupies_slot(&self) -> bool {
        self.active && self.status.is_blocking()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Statuses that count against capacity.
    pub const BLOCKING: [AppointmentStatus; 2] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::Confirmed,
    ];

    pub const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }

    pub fn is_blocking(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "SCHEDULED",
            AppointmentStatus::Confirmed => "CONFIRMED",
            AppointmentStatus::Completed => "COMPLETED",
            AppointmentStatus::Cancelled => "CANCELLED",
            AppointmentStatus::NoShow => "NO_SHOW",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn default_true() -> bool {
    true
}

// ==============================================================================
// REFERENCED ENTITIES (owned by other cells, read-only here)
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Professional {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub activity_ids: Vec<Uuid>,
}

impl Professional {
    pub fn is_qualified_for(&self, activity_id: Uuid) -> bool {
        self.activity_ids.contains(&activity_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    pub id: Uuid,
    pub name: String,
    pub default_duration_minutes: Option<i32>,
    #[serde(default = "default_capacity")]
    pub capacity: i32,
}

fn default_capacity() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub plan_id: Option<Uuid>,
    pub activity: Activity,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    Finished,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub status: SubscriptionStatus,
    pub contracted_sessions: i32,
    pub realized_sessions: i32,
}

impl Subscription {
    pub fn is_usable(&self) -> bool {
        self.status == SubscriptionStatus::Active && self.realized_sessions < self.contracted_sessions
    }

    /// Count one realized session, finishing the package once the contract is met.
    pub fn record_session(&mut self) {
        self.realized_sessions += 1;
        if self.realized_sessions >= self.contracted_sessions {
            self.status = SubscriptionStatus::Finished;
        }
    }
}

// ==============================================================================
// AVAILABILITY
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailabilityWindow {
    pub id: Uuid,
    pub professional_id: Uuid,
    pub weekday: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl AvailabilityWindow {
    pub fn is_valid(&self) -> bool {
        self.start_time < self.end_time
    }
}

// ==============================================================================
// RECURRENCE MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Frequency {
    Weekly,
    Biweekly,
    Monthly,
}

impl Frequency {
    /// Length of one cycle in weeks; monthly rules do not walk weeks.
    pub fn weeks(&self) -> i64 {
        match self {
            Frequency::Weekly => 1,
            Frequency::Biweekly => 2,
            Frequency::Monthly => 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecurrenceDefinition {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub professional_id: Uuid,
    pub service_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub frequency: Frequency,
    #[serde(default)]
    pub weekdays: Vec<Weekday>,
    pub time_of_day: NaiveTime,
    pub duration_minutes: i32,
    pub total_occurrences: Option<u32>,
    pub end_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RecurrenceDefinition {
    pub fn rule(&self) -> RecurrenceRule {
        RecurrenceRule {
            frequency: self.frequency,
            weekdays: self.weekdays.clone(),
            time_of_day: self.time_of_day,
            total_occurrences: self.total_occurrences,
            end_date: self.end_date,
        }
    }
}

/// The date-generating part of a recurrence, independent of who is booked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    #[serde(default)]
    pub weekdays: Vec<Weekday>,
    pub time_of_day: NaiveTime,
    pub total_occurrences: Option<u32>,
    pub end_date: Option<NaiveDate>,
}

impl RecurrenceRule {
    pub fn has_termination(&self) -> bool {
        self.total_occurrences.is_some() || self.end_date.is_some()
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: Uuid,
    pub professional_id: Uuid,
    pub service_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub start_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub notes: Option<String>,
}

/// Column values written by an edit. Status and calendar handle are never part of it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppointmentChanges {
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChangeRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRecurringRequest {
    #[serde(default)]
    pub cancel_future: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRecurrenceRequest {
    pub patient_id: Uuid,
    pub professional_id: Uuid,
    pub service_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub frequency: Frequency,
    #[serde(default)]
    pub weekdays: Vec<Weekday>,
    pub time_of_day: NaiveTime,
    pub duration_minutes: Option<i32>,
    pub total_occurrences: Option<u32>,
    pub end_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl CreateRecurrenceRequest {
    pub fn rule(&self) -> RecurrenceRule {
        RecurrenceRule {
            frequency: self.frequency,
            weekdays: self.weekdays.clone(),
            time_of_day: self.time_of_day,
            total_occurrences: self.total_occurrences,
            end_date: self.end_date,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedDate {
    pub date: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrenceResult {
    pub recurrence: RecurrenceDefinition,
    pub created_appointments: Vec<Appointment>,
    pub skipped_dates: Vec<SkippedDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrenceDetails {
    pub recurrence: RecurrenceDefinition,
    pub appointments: Vec<Appointment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotQuery {
    pub professional_id: Uuid,
    pub date: NaiveDate,
    pub service_id: Option<Uuid>,
    pub duration_minutes: Option<i32>,
    pub capacity: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentRangeQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}
