use crate::models::DeviceRow;
use crate::{Database, OptionalExt};
use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::Connection;

impl Database {
    pub fn find_device_by_key(&self, device_key: &str) -> Result<Option<DeviceRow>> {
        self.with_conn(|conn| query_device_by_key(conn, device_key))
    }

    /// Inserts the device unless its key is already registered, then returns the
    /// stored row. Concurrent callers with the same key converge on one row.
    pub fn insert_device_if_absent(
        &self,
        device_key: &str,
        platform: &str,
        now: DateTime<Utc>,
    ) -> Result<(DeviceRow, bool)> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO devices (device_key, platform, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(device_key) DO NOTHING",
                rusqlite::params![device_key, platform, now],
            )?;

            let row = query_device_by_key(conn, device_key)?
                .ok_or_else(|| anyhow!("Device vanished after upsert: {}", device_key))?;
            Ok((row, inserted == 1))
        })
    }

    pub fn set_device_platform(&self, device_id: i64, platform: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE devices SET platform = ?1 WHERE id = ?2",
                rusqlite::params![platform, device_id],
            )?;
            Ok(())
        })
    }

    /// Creates the (user, device) link if it does not exist yet.
    /// Returns true when a new link was written.
    pub fn link_user_device(
        &self,
        user_id: i64,
        device_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO user_devices (user_id, device_id, linked_at)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![user_id, device_id, now],
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn count_device_links(&self, device_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM user_devices WHERE device_id = ?1",
                [device_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    pub fn count_devices(&self) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row("SELECT COUNT(*) FROM devices", [], |row| row.get(0))?;
            Ok(count)
        })
    }
}

fn query_device_by_key(conn: &Connection, device_key: &str) -> Result<Option<DeviceRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, device_key, platform, created_at FROM devices WHERE device_key = ?1",
    )?;

    let row = stmt
        .query_row([device_key], |row| {
            Ok(DeviceRow {
                id: row.get(0)?,
                device_key: row.get(1)?,
                platform: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewUser;

    #[test]
    fn insert_if_absent_keeps_first_row() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();

        let (first, created) = db.insert_device_if_absent("key-1", "ios", now).unwrap();
        assert!(created);
        let (second, created) = db.insert_device_if_absent("key-1", "android", now).unwrap();
        assert!(!created);

        assert_eq!(first.id, second.id);
        assert_eq!(second.platform, "ios");
        assert_eq!(db.count_devices().unwrap(), 1);
    }

    #[test]
    fn link_is_written_once() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let user_id = db
            .create_user(&NewUser {
                email: "a@x.com",
                normalized_email: "a@x.com",
                name: None,
                password_hash: None,
                email_confirmed: false,
                created_at: now,
            })
            .unwrap()
            .unwrap();
        let (device, _) = db.insert_device_if_absent("key-1", "ios", now).unwrap();

        assert!(db.link_user_device(user_id, device.id, now).unwrap());
        assert!(!db.link_user_device(user_id, device.id, now).unwrap());
        assert_eq!(db.count_device_links(device.id).unwrap(), 1);
    }
}
