use crate::domain::models::{BrainDump, Priority, TimeBlock};
use crate::infrastructure::error::InfraError;
use rusqlite::{Connection, params};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Sqlite-backed storage for the daily planner: time blocks, priorities,
/// the per-day brain dump, and the settings key-value table.
#[derive(Debug, Clone)]
pub struct SqlitePlannerStore {
    db_path: PathBuf,
}

impl SqlitePlannerStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }

    fn decode_tags(raw: Option<String>) -> Vec<String> {
        raw.as_deref()
            .and_then(|value| serde_json::from_str(value).ok())
            .unwrap_or_default()
    }

    pub fn list_time_blocks(&self, date: &str) -> Result<Vec<TimeBlock>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT id, date, start_minutes, duration_minutes, title, color, tags, notes
             FROM time_blocks
             WHERE date = ?1
             ORDER BY start_minutes",
        )?;

        let rows = statement.query_map(params![date], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i32>(2)?,
                row.get::<_, i32>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<String>>(7)?,
            ))
        })?;

        let mut blocks = Vec::new();
        for row in rows {
            let (id, date, start_minutes, duration_minutes, title, color, tags, notes) = row?;
            blocks.push(TimeBlock {
                id: Some(id),
                date,
                start_minutes,
                duration_minutes,
                title,
                color,
                tags: Self::decode_tags(tags),
                notes,
            });
        }
        Ok(blocks)
    }

    /// Inserts when the block has no id, updates otherwise. Returns the
    /// saved block with its id filled in.
    pub fn save_time_block(&self, block: &TimeBlock) -> Result<TimeBlock, InfraError> {
        block.validate().map_err(InfraError::InvalidConfig)?;
        let tags = serde_json::to_string(&block.tags)?;
        let connection = self.connect()?;

        let mut saved = block.clone();
        match block.id {
            Some(id) => {
                connection.execute(
                    "UPDATE time_blocks SET
                       date = ?1, start_minutes = ?2, duration_minutes = ?3,
                       title = ?4, color = ?5, tags = ?6, notes = ?7,
                       updated_at = CURRENT_TIMESTAMP
                     WHERE id = ?8",
                    params![
                        block.date,
                        block.start_minutes,
                        block.duration_minutes,
                        block.title,
                        block.color,
                        tags,
                        block.notes,
                        id,
                    ],
                )?;
            }
            None => {
                connection.execute(
                    "INSERT INTO time_blocks
                       (date, start_minutes, duration_minutes, title, color, tags, notes)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        block.date,
                        block.start_minutes,
                        block.duration_minutes,
                        block.title,
                        block.color,
                        tags,
                        block.notes,
                    ],
                )?;
                saved.id = Some(connection.last_insert_rowid());
            }
        }
        Ok(saved)
    }

    pub fn delete_time_block(&self, id: i64) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute("DELETE FROM time_blocks WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn list_priorities(&self, date: &str) -> Result<Vec<Priority>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT id, date, content, completed, priority_order
             FROM priorities
             WHERE date = ?1
             ORDER BY priority_order",
        )?;

        let rows = statement.query_map(params![date], |row| {
            Ok(Priority {
                id: Some(row.get(0)?),
                date: row.get(1)?,
                content: row.get(2)?,
                completed: row.get::<_, i64>(3)? != 0,
                priority_order: row.get(4)?,
            })
        })?;

        let mut priorities = Vec::new();
        for row in rows {
            priorities.push(row?);
        }
        Ok(priorities)
    }

    /// Replaces the full priority list for one day. Order in the slice is
    /// the stored order.
    pub fn replace_priorities(
        &self,
        date: &str,
        priorities: &[Priority],
    ) -> Result<(), InfraError> {
        let mut connection = self.connect()?;
        let transaction = connection.transaction()?;
        transaction.execute("DELETE FROM priorities WHERE date = ?1", params![date])?;
        for (index, priority) in priorities.iter().enumerate() {
            transaction.execute(
                "INSERT INTO priorities (date, content, completed, priority_order)
                 VALUES (?1, ?2, ?3, ?4)",
                params![date, priority.content, priority.completed, index as i64],
            )?;
        }
        transaction.commit()?;
        Ok(())
    }

    pub fn load_brain_dump(&self, date: &str) -> Result<BrainDump, InfraError> {
        let connection = self.connect()?;
        let content = connection
            .query_row(
                "SELECT content FROM brain_dumps WHERE date = ?1",
                params![date],
                |row| row.get::<_, String>(0),
            )
            .map(Some)
            .or_else(|error| match error {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        Ok(BrainDump {
            date: date.to_string(),
            content: content.unwrap_or_default(),
        })
    }

    /// Empty content clears the row instead of storing an empty note.
    pub fn save_brain_dump(&self, dump: &BrainDump) -> Result<(), InfraError> {
        let connection = self.connect()?;
        if dump.content.trim().is_empty() {
            connection.execute("DELETE FROM brain_dumps WHERE date = ?1", params![dump.date])?;
            return Ok(());
        }
        connection.execute(
            "INSERT INTO brain_dumps (date, content) VALUES (?1, ?2)
             ON CONFLICT(date) DO UPDATE SET
               content = excluded.content,
               updated_at = CURRENT_TIMESTAMP",
            params![dump.date, dump.content],
        )?;
        Ok(())
    }

    pub fn settings(&self) -> Result<HashMap<String, String>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare("SELECT key, value FROM settings")?;
        let rows = statement.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut settings = HashMap::new();
        for row in rows {
            let (key, value) = row?;
            settings.insert(key, value);
        }
        Ok(settings)
    }

    pub fn update_setting(&self, key: &str, value: &str) -> Result<(), InfraError> {
        if key.trim().is_empty() {
            return Err(InfraError::InvalidConfig(
                "setting key must not be empty".to_string(),
            ));
        }
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET
               value = excluded.value,
               updated_at = CURRENT_TIMESTAMP",
            params![key, value],
        )?;
        Ok(())
    }

    /// Interval sizes offered by the block editor, read from settings.
    pub fn available_intervals(&self) -> Result<Vec<i32>, InfraError> {
        let settings = self.settings()?;
        let raw = settings
            .get("available_intervals")
            .cloned()
            .unwrap_or_else(|| "[5, 15, 30, 60]".to_string());
        serde_json::from_str(&raw).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid available_intervals '{raw}': {error}"))
        })
    }
}
