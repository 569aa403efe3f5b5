use crate::domain::models::{CalendarEvent, DateRange, Provider};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use url::Url;

const GOOGLE_EVENTS_ENDPOINT: &str =
    "https://www.googleapis.com/calendar/v3/calendars/primary/events";
const MICROSOFT_CALENDAR_VIEW_ENDPOINT: &str = "https://graph.microsoft.com/v1.0/me/calendarview";
const OUTLOOK_TIMEZONE_HEADER: &str = r#"outlook.timezone="UTC""#;

/// Placeholder used when a provider returns an event with no subject.
pub const UNTITLED_EVENT: &str = "(No Title)";

/// Read-only query seam against the two provider REST APIs. Returns events
/// already normalized into the provider-agnostic shape.
#[async_trait]
pub trait CalendarApiClient: Send + Sync {
    async fn fetch_events(
        &self,
        provider: Provider,
        access_token: &str,
        range: DateRange,
    ) -> Result<Vec<CalendarEvent>, InfraError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestCalendarApiClient {
    client: Client,
}

impl ReqwestCalendarApiClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::InvalidConfig(format!(
                "{field} must not be empty"
            )));
        }
        Ok(())
    }

    fn http_error(status: reqwest::StatusCode, body: String) -> InfraError {
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return InfraError::Unauthorized;
        }
        InfraError::Provider {
            status: status.as_u16(),
            body,
        }
    }

    async fn get_json(&self, url: Url, access_token: &str, provider: Provider) -> Result<String, InfraError> {
        let mut request = self.client.get(url).bearer_auth(access_token);
        if provider == Provider::Microsoft {
            request = request.header("Prefer", OUTLOOK_TIMEZONE_HEADER);
        }

        let response = request.send().await.map_err(|error| {
            InfraError::Network(format!("calendar request failed: {error}"))
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::Network(format!("failed reading calendar response: {error}"))
        })?;

        if !status.is_success() {
            return Err(Self::http_error(status, body));
        }
        Ok(body)
    }

    async fn fetch_google(
        &self,
        access_token: &str,
        range: DateRange,
    ) -> Result<Vec<CalendarEvent>, InfraError> {
        let mut url = Url::parse(GOOGLE_EVENTS_ENDPOINT)
            .map_err(|error| InfraError::InvalidConfig(format!("invalid events endpoint: {error}")))?;
        url.query_pairs_mut()
            .append_pair("timeMin", &range.start.to_rfc3339())
            .append_pair("timeMax", &range.end.to_rfc3339())
            // Recurring events are expanded server-side, never locally.
            .append_pair("singleEvents", "true")
            .append_pair("orderBy", "startTime");

        let body = self.get_json(url, access_token, Provider::Google).await?;
        let page: GoogleEventsPage = serde_json::from_str(&body).map_err(|error| {
            InfraError::Network(format!("invalid google events payload: {error}; body={body}"))
        })?;

        Ok(page
            .items
            .unwrap_or_default()
            .iter()
            .filter_map(|item| normalize_google_event(item).ok())
            .collect())
    }

    async fn fetch_microsoft(
        &self,
        access_token: &str,
        range: DateRange,
    ) -> Result<Vec<CalendarEvent>, InfraError> {
        let mut url = Url::parse(MICROSOFT_CALENDAR_VIEW_ENDPOINT)
            .map_err(|error| InfraError::InvalidConfig(format!("invalid events endpoint: {error}")))?;
        url.query_pairs_mut()
            .append_pair("startDateTime", &range.start.to_rfc3339())
            .append_pair("endDateTime", &range.end.to_rfc3339());

        let body = self
            .get_json(url, access_token, Provider::Microsoft)
            .await?;
        let page: MicrosoftEventsPage = serde_json::from_str(&body).map_err(|error| {
            InfraError::Network(format!(
                "invalid microsoft events payload: {error}; body={body}"
            ))
        })?;

        Ok(page
            .value
            .unwrap_or_default()
            .iter()
            .filter_map(|item| normalize_microsoft_event(item).ok())
            .collect())
    }
}

#[async_trait]
impl CalendarApiClient for ReqwestCalendarApiClient {
    async fn fetch_events(
        &self,
        provider: Provider,
        access_token: &str,
        range: DateRange,
    ) -> Result<Vec<CalendarEvent>, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        match provider {
            Provider::Google => self.fetch_google(access_token, range).await,
            Provider::Microsoft => self.fetch_microsoft(access_token, range).await,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct GoogleEventsPage {
    pub items: Option<Vec<GoogleEventItem>>,
}

#[derive(Debug, serde::Deserialize)]
pub struct GoogleEventItem {
    pub id: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: GoogleEventTime,
    pub end: GoogleEventTime,
}

#[derive(Debug, serde::Deserialize)]
pub struct GoogleEventTime {
    /// Present for timed events.
    #[serde(rename = "dateTime")]
    pub date_time: Option<String>,
    /// Present (date only) for all-day events.
    pub date: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
pub struct MicrosoftEventsPage {
    pub value: Option<Vec<MicrosoftEventItem>>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicrosoftEventItem {
    pub id: String,
    pub subject: Option<String>,
    /// Pre-truncated by the provider; passed through as-is.
    pub body_preview: Option<String>,
    pub is_all_day: Option<bool>,
    pub location: Option<MicrosoftLocation>,
    pub start: MicrosoftEventTime,
    pub end: MicrosoftEventTime,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicrosoftLocation {
    pub display_name: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicrosoftEventTime {
    pub date_time: String,
}

fn title_or_placeholder(value: Option<&str>) -> String {
    match value.map(str::trim).filter(|title| !title.is_empty()) {
        Some(title) => title.to_string(),
        None => UNTITLED_EVENT.to_string(),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(ToOwned::to_owned)
}

fn parse_rfc3339_utc(value: &str, field: &str) -> Result<DateTime<Utc>, InfraError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| InfraError::Network(format!("invalid event {field} '{value}': {error}")))
}

fn parse_date_utc(value: &str, field: &str) -> Result<NaiveDate, InfraError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|error| InfraError::Network(format!("invalid event {field} '{value}': {error}")))
}

/// Graph returns local datetimes without an offset; the `Prefer` header
/// pins them to UTC, so a missing offset is interpreted as UTC.
fn parse_graph_datetime(value: &str, field: &str) -> Result<DateTime<Utc>, InfraError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|error| InfraError::Network(format!("invalid event {field} '{value}': {error}")))
}

/// Google all-day detection: the start object carries a date-only field
/// instead of a date-time. All-day spans keep the original mapping of
/// `date`T00:00:00 through end-`date`T23:59:59.
pub fn normalize_google_event(item: &GoogleEventItem) -> Result<CalendarEvent, InfraError> {
    let (start, end, is_all_day) = match (item.start.date_time.as_deref(), item.start.date.as_deref())
    {
        (Some(start_raw), _) => {
            let end_raw = item.end.date_time.as_deref().ok_or_else(|| {
                InfraError::Network("google event is missing end.dateTime".to_string())
            })?;
            (
                parse_rfc3339_utc(start_raw, "start.dateTime")?,
                parse_rfc3339_utc(end_raw, "end.dateTime")?,
                false,
            )
        }
        (None, Some(start_date)) => {
            let end_date = item.end.date.as_deref().ok_or_else(|| {
                InfraError::Network("google event is missing end.date".to_string())
            })?;
            let start = parse_date_utc(start_date, "start.date")?
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| InfraError::Network("invalid all-day start".to_string()))?
                .and_utc();
            let end = parse_date_utc(end_date, "end.date")?
                .and_hms_opt(23, 59, 59)
                .ok_or_else(|| InfraError::Network("invalid all-day end".to_string()))?
                .and_utc();
            (start, end, true)
        }
        (None, None) => {
            return Err(InfraError::Network(
                "google event has neither start.dateTime nor start.date".to_string(),
            ));
        }
    };

    Ok(CalendarEvent {
        id: format!("{}:{}", Provider::Google.as_str(), item.id),
        title: title_or_placeholder(item.summary.as_deref()),
        start,
        end,
        is_all_day,
        description: non_empty(item.description.as_deref()),
        location: non_empty(item.location.as_deref()),
        provider: Provider::Google,
    })
}

/// Microsoft all-day detection uses the explicit `isAllDay` flag; the
/// description comes from `bodyPreview` and the location from the nested
/// display name, both of which may be absent.
pub fn normalize_microsoft_event(item: &MicrosoftEventItem) -> Result<CalendarEvent, InfraError> {
    Ok(CalendarEvent {
        id: format!("{}:{}", Provider::Microsoft.as_str(), item.id),
        title: title_or_placeholder(item.subject.as_deref()),
        start: parse_graph_datetime(&item.start.date_time, "start.dateTime")?,
        end: parse_graph_datetime(&item.end.date_time, "end.dateTime")?,
        is_all_day: item.is_all_day.unwrap_or(false),
        description: non_empty(item.body_preview.as_deref()),
        location: non_empty(
            item.location
                .as_ref()
                .and_then(|location| location.display_name.as_deref()),
        ),
        provider: Provider::Microsoft,
    })
}
