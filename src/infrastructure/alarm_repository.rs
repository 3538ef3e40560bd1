use crate::domain::models::Alarm;
use crate::infrastructure::error::InfraError;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Persisted alarm set behind a per-alarm API. Implementations replace the
/// whole set on every write; callers never rely on partial updates.
pub trait AlarmRepository: Send + Sync {
    fn get(&self, alarm_id: i64) -> Result<Option<Alarm>, InfraError>;
    fn upsert(&self, alarm: &Alarm) -> Result<(), InfraError>;
    fn delete(&self, alarm_id: i64) -> Result<bool, InfraError>;
    fn all(&self) -> Result<Vec<Alarm>, InfraError>;
}

/// SQLite-backed repository storing the alarm set as a single JSON document
/// row, preserving whole-set replace semantics.
#[derive(Debug, Clone)]
pub struct SqliteAlarmRepository {
    db_path: PathBuf,
}

impl SqliteAlarmRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }

    fn load_set(&self, connection: &Connection) -> Result<Vec<Alarm>, InfraError> {
        let payload: Option<String> = connection
            .query_row("SELECT payload FROM alarm_set WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        let Some(payload) = payload else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&payload).map_err(InfraError::from)
    }

    fn save_set(&self, connection: &Connection, alarms: &[Alarm]) -> Result<(), InfraError> {
        let payload = serde_json::to_string(alarms)?;
        connection.execute(
            "INSERT INTO alarm_set (id, payload)
             VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET
               payload = excluded.payload",
            params![payload],
        )?;
        Ok(())
    }
}

impl AlarmRepository for SqliteAlarmRepository {
    fn get(&self, alarm_id: i64) -> Result<Option<Alarm>, InfraError> {
        let connection = self.connect()?;
        let alarms = self.load_set(&connection)?;
        Ok(alarms.into_iter().find(|alarm| alarm.id == alarm_id))
    }

    fn upsert(&self, alarm: &Alarm) -> Result<(), InfraError> {
        let connection = self.connect()?;
        let mut alarms = self.load_set(&connection)?;
        match alarms.iter_mut().find(|existing| existing.id == alarm.id) {
            Some(existing) => *existing = alarm.clone(),
            None => alarms.push(alarm.clone()),
        }
        self.save_set(&connection, &alarms)
    }

    fn delete(&self, alarm_id: i64) -> Result<bool, InfraError> {
        let connection = self.connect()?;
        let mut alarms = self.load_set(&connection)?;
        let before = alarms.len();
        alarms.retain(|alarm| alarm.id != alarm_id);
        if alarms.len() == before {
            return Ok(false);
        }
        self.save_set(&connection, &alarms)?;
        Ok(true)
    }

    fn all(&self) -> Result<Vec<Alarm>, InfraError> {
        let connection = self.connect()?;
        self.load_set(&connection)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAlarmRepository {
    alarms: Mutex<Vec<Alarm>>,
}

impl InMemoryAlarmRepository {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Alarm>>, InfraError> {
        self.alarms
            .lock()
            .map_err(|error| InfraError::Storage(format!("alarm set lock poisoned: {error}")))
    }
}

impl AlarmRepository for InMemoryAlarmRepository {
    fn get(&self, alarm_id: i64) -> Result<Option<Alarm>, InfraError> {
        let alarms = self.lock()?;
        Ok(alarms.iter().find(|alarm| alarm.id == alarm_id).cloned())
    }

    fn upsert(&self, alarm: &Alarm) -> Result<(), InfraError> {
        let mut alarms = self.lock()?;
        match alarms.iter_mut().find(|existing| existing.id == alarm.id) {
            Some(existing) => *existing = alarm.clone(),
            None => alarms.push(alarm.clone()),
        }
        Ok(())
    }

    fn delete(&self, alarm_id: i64) -> Result<bool, InfraError> {
        let mut alarms = self.lock()?;
        let before = alarms.len();
        alarms.retain(|alarm| alarm.id != alarm_id);
        Ok(alarms.len() != before)
    }

    fn all(&self) -> Result<Vec<Alarm>, InfraError> {
        let alarms = self.lock()?;
        Ok(alarms.clone())
    }
}
