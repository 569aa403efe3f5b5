use crate::application::aggregator::{EventAggregator, PollOutcome};
use crate::application::bootstrap::bootstrap_workspace;
use crate::application::connections::{CalendarConnectionManager, ConnectOutcome};
use crate::application::fetch::{EventFetchService, NoopTokenRefresher};
use crate::domain::models::{
    BrainDump, CalendarConnection, CalendarEvent, DateRange, Priority, Provider, TimeBlock,
    TimeInterval, interval_label,
};
use crate::infrastructure::calendar_client::ReqwestCalendarApiClient;
use crate::infrastructure::config::{
    read_auth_settings, read_poll_interval_seconds, read_supports_embedded_popup, read_timezone,
};
use crate::infrastructure::credential_store::SqliteCredentialStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::planner_store::SqlitePlannerStore;
use crate::infrastructure::provider_auth::ExternalBrowserAuthAdapter;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

type AppConnectionManager =
    CalendarConnectionManager<SqliteCredentialStore, ExternalBrowserAuthAdapter>;
type AppEventAggregator = EventAggregator<
    SqliteCredentialStore,
    ExternalBrowserAuthAdapter,
    ReqwestCalendarApiClient,
    NoopTokenRefresher,
>;

pub struct AppState {
    config_dir: PathBuf,
    logs_dir: PathBuf,
    planner: SqlitePlannerStore,
    connections: Arc<AppConnectionManager>,
    aggregator: Arc<AppEventAggregator>,
    log_guard: Mutex<()>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let config_dir = workspace_root.join("config");
        let logs_dir = workspace_root.join("logs");

        let auth_settings = read_auth_settings(&config_dir)?;
        let supports_embedded_popup = read_supports_embedded_popup(&config_dir)?;

        let store = Arc::new(SqliteCredentialStore::new(&bootstrap.database_path));
        let auth = Arc::new(ExternalBrowserAuthAdapter::new(
            auth_settings.client_id,
            auth_settings.redirect_uri,
        ));
        let connections = Arc::new(CalendarConnectionManager::new(
            store,
            auth,
            supports_embedded_popup,
        ));
        let fetcher = Arc::new(EventFetchService::new(
            Arc::new(ReqwestCalendarApiClient::new()),
            Arc::new(NoopTokenRefresher),
        ));
        let aggregator = Arc::new(EventAggregator::new(Arc::clone(&connections), fetcher));

        Ok(Self {
            config_dir,
            planner: SqlitePlannerStore::new(&bootstrap.database_path),
            logs_dir,
            connections,
            aggregator,
            log_guard: Mutex::new(()),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Recoverable sign-in failures are expected user-facing outcomes, so
    /// they log at warn; everything else is an error.
    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        if error.is_recoverable() {
            self.log_warn(command, &error.to_string());
        } else {
            self.log_error(command, &error.to_string());
        }
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_warn(&self, command: &str, message: &str) {
        self.append_log("warn", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

fn parse_provider(provider: &str) -> Result<Provider, InfraError> {
    Provider::parse(provider)
        .map_err(|_| InfraError::UnsupportedProvider(provider.trim().to_string()))
}

fn parse_timestamp(raw: &str, field: &str) -> Result<DateTime<Utc>, InfraError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| InfraError::InvalidConfig(format!("invalid {field} '{raw}': {error}")))
}

#[derive(Debug, Serialize)]
pub struct AppConfigResponse {
    pub timezone: Option<String>,
    pub poll_interval_seconds: u64,
    pub supports_embedded_popup: bool,
}

#[derive(Debug, Serialize)]
pub struct ConnectCalendarResponse {
    pub status: &'static str,
    pub connection: Option<CalendarConnection>,
}

#[derive(Debug, Serialize)]
pub struct CalendarEventsResponse {
    pub status: &'static str,
    pub events: Vec<CalendarEvent>,
}

/// App-level settings the webview needs before it can run its polling
/// loop and pick a sign-in strategy.
pub fn get_app_config_impl(state: &AppState) -> Result<AppConfigResponse, InfraError> {
    let config_dir = state.config_dir();
    Ok(AppConfigResponse {
        timezone: read_timezone(config_dir)?,
        poll_interval_seconds: read_poll_interval_seconds(config_dir)?,
        supports_embedded_popup: read_supports_embedded_popup(config_dir)?,
    })
}

pub async fn initialize_calendar_connections_impl(state: &AppState) -> Result<(), InfraError> {
    state.connections.initialize().await?;
    state.log_info("initialize_calendar_connections", "connections loaded");
    Ok(())
}

pub async fn connect_calendar_impl(
    state: &AppState,
    provider: String,
) -> Result<ConnectCalendarResponse, InfraError> {
    let provider = parse_provider(&provider)?;
    let outcome = state.connections.connect(provider).await?;

    let response = match outcome {
        ConnectOutcome::Connected(connection) => {
            state.log_info("connect_calendar", &format!("connected {}", connection.id));
            ConnectCalendarResponse {
                status: "connected",
                connection: Some(connection),
            }
        }
        ConnectOutcome::RedirectPending => ConnectCalendarResponse {
            status: "redirect_pending",
            connection: None,
        },
        ConnectOutcome::ManualTokenRequired => ConnectCalendarResponse {
            status: "manual_token_required",
            connection: None,
        },
    };
    Ok(response)
}

pub fn submit_manual_calendar_token_impl(
    state: &AppState,
    provider: String,
    token: String,
) -> Result<CalendarConnection, InfraError> {
    let provider = parse_provider(&provider)?;
    let connection = state.connections.process_manual_token(provider, &token)?;
    state.log_info(
        "submit_manual_calendar_token",
        &format!("connected {}", connection.id),
    );
    Ok(connection)
}

pub fn disconnect_calendar_impl(
    state: &AppState,
    connection_id: String,
) -> Result<bool, InfraError> {
    state.connections.disconnect(&connection_id)?;
    state.log_info("disconnect_calendar", &format!("removed {connection_id}"));
    Ok(true)
}

pub fn list_calendar_connections_impl(
    state: &AppState,
) -> Result<Vec<CalendarConnection>, InfraError> {
    state.connections.list_connections()
}

pub async fn get_all_calendar_events_impl(
    state: &AppState,
    start: String,
    end: String,
) -> Result<CalendarEventsResponse, InfraError> {
    let range = DateRange::new(
        parse_timestamp(&start, "start")?,
        parse_timestamp(&end, "end")?,
    )
    .map_err(InfraError::InvalidConfig)?;

    match state.aggregator.poll_events(range).await? {
        PollOutcome::Completed(events) => Ok(CalendarEventsResponse {
            status: "completed",
            events,
        }),
        PollOutcome::SkippedBusy => Ok(CalendarEventsResponse {
            status: "skipped_busy",
            events: Vec::new(),
        }),
    }
}

pub fn get_time_blocks_impl(state: &AppState, date: String) -> Result<Vec<TimeBlock>, InfraError> {
    state.planner.list_time_blocks(&date)
}

pub fn save_time_block_impl(state: &AppState, block: TimeBlock) -> Result<TimeBlock, InfraError> {
    state.planner.save_time_block(&block)
}

pub fn delete_time_block_impl(state: &AppState, id: i64) -> Result<bool, InfraError> {
    state.planner.delete_time_block(id)?;
    Ok(true)
}

pub fn get_priorities_impl(state: &AppState, date: String) -> Result<Vec<Priority>, InfraError> {
    state.planner.list_priorities(&date)
}

pub fn save_priorities_impl(
    state: &AppState,
    date: String,
    priorities: Vec<Priority>,
) -> Result<Vec<Priority>, InfraError> {
    state.planner.replace_priorities(&date, &priorities)?;
    state.planner.list_priorities(&date)
}

pub fn get_brain_dump_impl(state: &AppState, date: String) -> Result<BrainDump, InfraError> {
    state.planner.load_brain_dump(&date)
}

pub fn save_brain_dump_impl(
    state: &AppState,
    date: String,
    content: String,
) -> Result<BrainDump, InfraError> {
    let dump = BrainDump { date, content };
    state.planner.save_brain_dump(&dump)?;
    state.planner.load_brain_dump(&dump.date)
}

pub fn get_settings_impl(state: &AppState) -> Result<HashMap<String, String>, InfraError> {
    state.planner.settings()
}

pub fn update_setting_impl(
    state: &AppState,
    key: String,
    value: String,
) -> Result<bool, InfraError> {
    state.planner.update_setting(&key, &value)?;
    Ok(true)
}

pub fn get_available_intervals_impl(state: &AppState) -> Result<Vec<TimeInterval>, InfraError> {
    let intervals = state.planner.available_intervals()?;
    Ok(intervals
        .into_iter()
        .map(|minutes| TimeInterval {
            minutes,
            label: interval_label(minutes),
        })
        .collect())
}
