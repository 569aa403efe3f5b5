mod application;
mod domain;
mod infrastructure;

use application::bootstrap::bootstrap_workspace;
use application::commands::{
    AppConfigResponse, AppState, CalendarEventsResponse, ConnectCalendarResponse,
    connect_calendar_impl, delete_time_block_impl, disconnect_calendar_impl,
    get_all_calendar_events_impl, get_app_config_impl, get_available_intervals_impl,
    get_brain_dump_impl, get_priorities_impl, get_settings_impl, get_time_blocks_impl,
    initialize_calendar_connections_impl, list_calendar_connections_impl, save_brain_dump_impl,
    save_priorities_impl, save_time_block_impl, submit_manual_calendar_token_impl,
    update_setting_impl,
};
use domain::models::{BrainDump, CalendarConnection, Priority, TimeBlock, TimeInterval};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
struct BootstrapResponse {
    workspace_root: String,
    database_path: String,
}

#[tauri::command]
fn bootstrap(root: Option<String>) -> Result<BootstrapResponse, String> {
    let workspace_root = match root {
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir().map_err(|error| error.to_string())?,
    };

    let result = bootstrap_workspace(&workspace_root).map_err(|error| error.to_string())?;
    Ok(BootstrapResponse {
        workspace_root: result.workspace_root.display().to_string(),
        database_path: result.database_path.display().to_string(),
    })
}

#[tauri::command]
fn ping() -> &'static str {
    "pong"
}

#[tauri::command]
fn get_app_config(state: tauri::State<'_, AppState>) -> Result<AppConfigResponse, String> {
    get_app_config_impl(state.inner())
        .map_err(|error| state.command_error("get_app_config", &error))
}

#[tauri::command]
async fn initialize_calendar_connections(
    state: tauri::State<'_, AppState>,
) -> Result<(), String> {
    initialize_calendar_connections_impl(state.inner())
        .await
        .map_err(|error| state.command_error("initialize_calendar_connections", &error))
}

#[tauri::command]
async fn connect_calendar(
    state: tauri::State<'_, AppState>,
    provider: String,
) -> Result<ConnectCalendarResponse, String> {
    connect_calendar_impl(state.inner(), provider)
        .await
        .map_err(|error| state.command_error("connect_calendar", &error))
}

#[tauri::command]
fn submit_manual_calendar_token(
    state: tauri::State<'_, AppState>,
    provider: String,
    token: String,
) -> Result<CalendarConnection, String> {
    submit_manual_calendar_token_impl(state.inner(), provider, token)
        .map_err(|error| state.command_error("submit_manual_calendar_token", &error))
}

#[tauri::command]
fn disconnect_calendar(
    state: tauri::State<'_, AppState>,
    connection_id: String,
) -> Result<bool, String> {
    disconnect_calendar_impl(state.inner(), connection_id)
        .map_err(|error| state.command_error("disconnect_calendar", &error))
}

#[tauri::command]
fn list_calendar_connections(
    state: tauri::State<'_, AppState>,
) -> Result<Vec<CalendarConnection>, String> {
    list_calendar_connections_impl(state.inner())
        .map_err(|error| state.command_error("list_calendar_connections", &error))
}

#[tauri::command]
async fn get_all_calendar_events(
    state: tauri::State<'_, AppState>,
    start: String,
    end: String,
) -> Result<CalendarEventsResponse, String> {
    get_all_calendar_events_impl(state.inner(), start, end)
        .await
        .map_err(|error| state.command_error("get_all_calendar_events", &error))
}

#[tauri::command]
fn get_time_blocks(
    state: tauri::State<'_, AppState>,
    date: String,
) -> Result<Vec<TimeBlock>, String> {
    get_time_blocks_impl(state.inner(), date)
        .map_err(|error| state.command_error("get_time_blocks", &error))
}

#[tauri::command]
fn save_time_block(
    state: tauri::State<'_, AppState>,
    block: TimeBlock,
) -> Result<TimeBlock, String> {
    save_time_block_impl(state.inner(), block)
        .map_err(|error| state.command_error("save_time_block", &error))
}

#[tauri::command]
fn delete_time_block(state: tauri::State<'_, AppState>, id: i64) -> Result<bool, String> {
    delete_time_block_impl(state.inner(), id)
        .map_err(|error| state.command_error("delete_time_block", &error))
}

#[tauri::command]
fn get_priorities(
    state: tauri::State<'_, AppState>,
    date: String,
) -> Result<Vec<Priority>, String> {
    get_priorities_impl(state.inner(), date)
        .map_err(|error| state.command_error("get_priorities", &error))
}

#[tauri::command]
fn save_priorities(
    state: tauri::State<'_, AppState>,
    date: String,
    priorities: Vec<Priority>,
) -> Result<Vec<Priority>, String> {
    save_priorities_impl(state.inner(), date, priorities)
        .map_err(|error| state.command_error("save_priorities", &error))
}

#[tauri::command]
fn get_brain_dump(state: tauri::State<'_, AppState>, date: String) -> Result<BrainDump, String> {
    get_brain_dump_impl(state.inner(), date)
        .map_err(|error| state.command_error("get_brain_dump", &error))
}

#[tauri::command]
fn save_brain_dump(
    state: tauri::State<'_, AppState>,
    date: String,
    content: String,
) -> Result<BrainDump, String> {
    save_brain_dump_impl(state.inner(), date, content)
        .map_err(|error| state.command_error("save_brain_dump", &error))
}

#[tauri::command]
fn get_settings(state: tauri::State<'_, AppState>) -> Result<HashMap<String, String>, String> {
    get_settings_impl(state.inner()).map_err(|error| state.command_error("get_settings", &error))
}

#[tauri::command]
fn update_setting(
    state: tauri::State<'_, AppState>,
    key: String,
    value: String,
) -> Result<bool, String> {
    update_setting_impl(state.inner(), key, value)
        .map_err(|error| state.command_error("update_setting", &error))
}

#[tauri::command]
fn get_available_intervals(
    state: tauri::State<'_, AppState>,
) -> Result<Vec<TimeInterval>, String> {
    get_available_intervals_impl(state.inner())
        .map_err(|error| state.command_error("get_available_intervals", &error))
}

pub fn run() {
    let workspace_root = std::env::current_dir().expect("failed to resolve current directory");
    let app_state = AppState::new(workspace_root).expect("failed to initialize app state");

    tauri::Builder::default()
        .manage(app_state)
        .invoke_handler(tauri::generate_handler![
            ping,
            bootstrap,
            get_app_config,
            initialize_calendar_connections,
            connect_calendar,
            submit_manual_calendar_token,
            disconnect_calendar,
            list_calendar_connections,
            get_all_calendar_events,
            get_time_blocks,
            save_time_block,
            delete_time_block,
            get_priorities,
            save_priorities,
            get_brain_dump,
            save_brain_dump,
            get_settings,
            update_setting,
            get_available_intervals
        ])
        .run(tauri::generate_context!())
        .expect("failed to run tauri app");
}
