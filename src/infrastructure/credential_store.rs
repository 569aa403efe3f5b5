use crate::domain::models::{CalendarConnection, Provider};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Persistence seam for connected calendar accounts. One record per
/// `(provider, provider-user-id)` pair; `upsert` replaces by id, `remove`
/// is idempotent.
pub trait CredentialStore: Send + Sync {
    fn list(&self) -> Result<Vec<CalendarConnection>, InfraError>;
    fn upsert(&self, connection: &CalendarConnection) -> Result<(), InfraError>;
    fn remove(&self, connection_id: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteCredentialStore {
    db_path: PathBuf,
}

impl SqliteCredentialStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }

    fn parse_timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>, InfraError> {
        DateTime::parse_from_rfc3339(raw)
            .map(|value| value.with_timezone(&Utc))
            .map_err(|error| {
                InfraError::Credential(format!(
                    "invalid calendar_connections.{column} '{raw}': {error}"
                ))
            })
    }
}

impl CredentialStore for SqliteCredentialStore {
    fn list(&self) -> Result<Vec<CalendarConnection>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT id, provider, email, access_token, refresh_token, expires_at, connected_at
             FROM calendar_connections
             ORDER BY connected_at",
        )?;

        let rows = statement.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut connections = Vec::new();
        for row in rows {
            let (id, provider_raw, email, access_token, refresh_token, expires_raw, connected_raw) =
                row?;
            let provider = Provider::parse(&provider_raw).map_err(InfraError::Credential)?;
            connections.push(CalendarConnection {
                id,
                provider,
                email,
                access_token,
                refresh_token,
                expires_at: Self::parse_timestamp(&expires_raw, "expires_at")?,
                connected_at: Self::parse_timestamp(&connected_raw, "connected_at")?,
            });
        }
        Ok(connections)
    }

    fn upsert(&self, record: &CalendarConnection) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO calendar_connections
               (id, provider, email, access_token, refresh_token, expires_at, connected_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
               email = excluded.email,
               access_token = excluded.access_token,
               refresh_token = excluded.refresh_token,
               expires_at = excluded.expires_at",
            params![
                record.id,
                record.provider.as_str(),
                record.email,
                record.access_token,
                record.refresh_token,
                record.expires_at.to_rfc3339(),
                record.connected_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn remove(&self, connection_id: &str) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "DELETE FROM calendar_connections WHERE id = ?1",
            params![connection_id],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    records: Mutex<Vec<CalendarConnection>>,
}

impl CredentialStore for InMemoryCredentialStore {
    fn list(&self) -> Result<Vec<CalendarConnection>, InfraError> {
        let records = self
            .records
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))?;
        Ok(records.clone())
    }

    fn upsert(&self, connection: &CalendarConnection) -> Result<(), InfraError> {
        let mut records = self
            .records
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))?;
        if let Some(existing) = records.iter_mut().find(|record| record.id == connection.id) {
            *existing = connection.clone();
        } else {
            records.push(connection.clone());
        }
        Ok(())
    }

    fn remove(&self, connection_id: &str) -> Result<(), InfraError> {
        let mut records = self
            .records
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))?;
        records.retain(|record| record.id != connection_id);
        Ok(())
    }
}
