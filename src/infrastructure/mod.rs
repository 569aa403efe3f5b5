pub mod calendar_client;
pub mod config;
pub mod credential_store;
pub mod error;
pub mod manual_token;
pub mod planner_store;
pub mod provider_auth;
pub mod storage;
