use rusqlite::Connection;

use caseboard_core::{ChangeSet, Entity, EntityKey, FieldValue, Record};

use crate::error::StorageError;
use crate::traits::PersistenceGateway;

/// SQLite-backed gateway over dynamic records.
///
/// One row per (record, field); field values are MessagePack blobs. This is
/// the store the desktop host persists boards into, so the gateway speaks
/// `Record` rather than a compile-time entity kind.
pub struct SqliteGateway {
    conn: Connection,
}

impl SqliteGateway {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Insert or replace a whole record, field by field.
    pub fn insert_record(&mut self, record: &Record) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        let key = record.key();
        for (name, value) in record.fields() {
            let blob = value
                .to_msgpack()
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            tx.execute(
                "INSERT INTO records (record_key, field_key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT (record_key, field_key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = CAST(unixepoch('now','subsec') * 1000 AS INTEGER)",
                rusqlite::params![key.as_str(), name, blob],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Remove a record entirely. Returns how many field rows were deleted.
    pub fn delete_record(&mut self, key: &EntityKey) -> Result<usize, StorageError> {
        let deleted = self.conn.execute(
            "DELETE FROM records WHERE record_key = ?1",
            rusqlite::params![key.as_str()],
        )?;
        Ok(deleted)
    }

    /// Every stored record, ordered by key.
    pub fn snapshot(&self) -> Result<Vec<Record>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT record_key, field_key, value FROM records ORDER BY record_key, field_key",
        )?;
        let rows: Vec<(String, String, Vec<u8>)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records: Vec<Record> = Vec::new();
        for (record_key, field_key, blob) in rows {
            let value = FieldValue::from_msgpack(&blob)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            match records.last_mut() {
                Some(last) if last.key() == EntityKey::from(record_key.as_str()) => {
                    last.set_field(&field_key, value);
                }
                _ => {
                    records.push(Record::new(record_key).with_field(field_key, value));
                }
            }
        }
        Ok(records)
    }

    fn record_exists(&self, key: &EntityKey) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE record_key = ?1",
            rusqlite::params![key.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

impl PersistenceGateway<Record> for SqliteGateway {
    fn get(&self, key: &EntityKey) -> Result<Option<Record>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT field_key, value FROM records WHERE record_key = ?1")?;
        let rows: Vec<(String, Vec<u8>)> = stmt
            .query_map(rusqlite::params![key.as_str()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut record = Record::new(key.clone());
        for (field_key, blob) in rows {
            let value = FieldValue::from_msgpack(&blob)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            record.set_field(&field_key, value);
        }
        Ok(Some(record))
    }

    fn update(
        &mut self,
        key: &EntityKey,
        changes: &ChangeSet<Record>,
    ) -> Result<usize, StorageError> {
        if !self.record_exists(key)? {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        for (name, value) in changes.fields() {
            let blob = value
                .to_msgpack()
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            tx.execute(
                "INSERT INTO records (record_key, field_key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT (record_key, field_key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = CAST(unixepoch('now','subsec') * 1000 AS INTEGER)",
                rusqlite::params![key.as_str(), name, blob],
            )?;
        }
        tx.commit()?;
        Ok(1)
    }
}
