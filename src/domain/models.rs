use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Google,
    Microsoft,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Microsoft => "microsoft",
        }
    }

    /// Parses a provider identifier. The set is closed: anything other than
    /// the two supported backends is rejected up front.
    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "microsoft" => Ok(Self::Microsoft),
            other => Err(format!("unsupported calendar provider: {other}")),
        }
    }
}

/// Derives the stable connection key for one provider account. Re-auth of
/// the same account must land on the same id so the stored record is
/// overwritten, never duplicated.
pub fn connection_id(provider: Provider, provider_user_id: &str) -> String {
    format!("{}-{}", provider.as_str(), provider_user_id.trim())
}

/// One persisted credential for a connected calendar account. Mirrors the
/// `calendar_connections` row (snake_case on the wire).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarConnection {
    pub id: String,
    pub provider: Provider,
    pub email: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub connected_at: DateTime<Utc>,
}

impl CalendarConnection {
    pub fn is_token_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "connection.id")?;
        validate_non_empty(&self.email, "connection.email")?;
        validate_non_empty(&self.access_token, "connection.access_token")?;
        Ok(())
    }
}

/// A normalized, provider-agnostic calendar event. Transient: recomputed on
/// every fetch, never written to the database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub is_all_day: bool,
    pub description: Option<String>,
    pub location: Option<String>,
    pub provider: Provider,
}

/// Half-open query window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, String> {
        if end <= start {
            return Err("range end must be after range start".to_string());
        }
        Ok(Self { start, end })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeBlock {
    pub id: Option<i64>,
    pub date: String,
    pub start_minutes: i32,
    pub duration_minutes: i32,
    pub title: String,
    pub color: String,
    pub tags: Vec<String>,
    pub notes: Option<String>,
}

impl TimeBlock {
    pub fn validate(&self) -> Result<(), String> {
        validate_date(&self.date, "block.date")?;
        validate_non_empty(&self.title, "block.title")?;
        if !(0..1440).contains(&self.start_minutes) {
            return Err("block.start_minutes must be within 0..1440".to_string());
        }
        if self.duration_minutes <= 0 {
            return Err("block.duration_minutes must be > 0".to_string());
        }
        if self.start_minutes + self.duration_minutes > 1440 {
            return Err("block must end on the same day".to_string());
        }
        Ok(())
    }

    pub fn start_time_formatted(&self) -> String {
        minutes_to_time_string(self.start_minutes)
    }

    pub fn end_time_formatted(&self) -> String {
        minutes_to_time_string(self.start_minutes + self.duration_minutes)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Priority {
    pub id: Option<i64>,
    pub date: String,
    pub content: String,
    pub completed: bool,
    pub priority_order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrainDump {
    pub date: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeInterval {
    pub minutes: i32,
    pub label: String,
}

pub fn minutes_to_time_string(minutes: i32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

pub fn interval_label(minutes: i32) -> String {
    if minutes >= 60 {
        let hours = minutes / 60;
        let remainder = minutes % 60;
        if remainder == 0 {
            format!("{} hour{}", hours, if hours > 1 { "s" } else { "" })
        } else {
            format!("{hours}h {remainder}m")
        }
    } else {
        format!("{minutes} min")
    }
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

fn validate_date(value: &str, field_name: &str) -> Result<(), String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("{field_name} must be YYYY-MM-DD"))?;
    Ok(())
}
