use crate::Database;
use anyhow::Result;
use chrono::{DateTime, Utc};

impl Database {
    /// Stores the reset code for an email, replacing any previous one and
    /// clearing its failed attempts.
    pub fn upsert_reset_code(
        &self,
        normalized_email: &str,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO password_reset_codes
                    (normalized_email, code_hash, expires_at, attempts)
                 VALUES (?1, ?2, ?3, 0)
                 ON CONFLICT(normalized_email) DO UPDATE SET
                    code_hash = excluded.code_hash,
                    expires_at = excluded.expires_at,
                    attempts = 0",
                rusqlite::params![normalized_email, code_hash, expires_at],
            )?;
            Ok(())
        })
    }

    /// Deletes the code if it matches, has not expired and has fewer than
    /// `max_attempts` failed guesses. A mismatch counts as a failed guess; the
    /// code is dropped once the limit is reached.
    pub fn consume_reset_code(
        &self,
        normalized_email: &str,
        code_hash: &str,
        now: DateTime<Utc>,
        max_attempts: i64,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let consumed = tx.execute(
                "DELETE FROM password_reset_codes
                 WHERE normalized_email = ?1 AND code_hash = ?2
                   AND expires_at > ?3 AND attempts < ?4",
                rusqlite::params![normalized_email, code_hash, now, max_attempts],
            )?;

            if consumed == 0 {
                tx.execute(
                    "UPDATE password_reset_codes SET attempts = attempts + 1
                     WHERE normalized_email = ?1",
                    rusqlite::params![normalized_email],
                )?;
                tx.execute(
                    "DELETE FROM password_reset_codes
                     WHERE normalized_email = ?1 AND attempts >= ?2",
                    rusqlite::params![normalized_email, max_attempts],
                )?;
            }

            tx.commit()?;
            Ok(consumed == 1)
        })
    }

    pub fn purge_expired_reset_codes(&self, now: DateTime<Utc>) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute(
                "DELETE FROM password_reset_codes WHERE expires_at <= ?1",
                rusqlite::params![now],
            )?;
            Ok(deleted)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const MAX: i64 = 5;

    #[test]
    fn code_is_consumed_once() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        db.upsert_reset_code("a@x.com", "h", now + Duration::minutes(15)).unwrap();

        assert!(!db.consume_reset_code("a@x.com", "wrong", now, MAX).unwrap());
        assert!(db.consume_reset_code("a@x.com", "h", now, MAX).unwrap());
        assert!(!db.consume_reset_code("a@x.com", "h", now, MAX).unwrap());
    }

    #[test]
    fn newer_code_overwrites_older() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        db.upsert_reset_code("a@x.com", "old", now + Duration::minutes(15)).unwrap();
        db.upsert_reset_code("a@x.com", "new", now + Duration::minutes(15)).unwrap();

        assert!(!db.consume_reset_code("a@x.com", "old", now, MAX).unwrap());
        assert!(db.consume_reset_code("a@x.com", "new", now, MAX).unwrap());
    }

    #[test]
    fn expired_codes_are_rejected_and_purged() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        db.upsert_reset_code("a@x.com", "h", now - Duration::seconds(1)).unwrap();

        assert!(!db.consume_reset_code("a@x.com", "h", now, MAX).unwrap());
        assert_eq!(db.purge_expired_reset_codes(now).unwrap(), 1);
    }

    #[test]
    fn code_is_dropped_after_too_many_wrong_guesses() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        db.upsert_reset_code("a@x.com", "h", now + Duration::minutes(15)).unwrap();

        for _ in 0..MAX {
            assert!(!db.consume_reset_code("a@x.com", "wrong", now, MAX).unwrap());
        }
        assert!(!db.consume_reset_code("a@x.com", "h", now, MAX).unwrap());

        let remaining: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM password_reset_codes", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn new_code_clears_failed_attempts() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        db.upsert_reset_code("a@x.com", "h", now + Duration::minutes(15)).unwrap();
        for _ in 0..MAX - 1 {
            db.consume_reset_code("a@x.com", "wrong", now, MAX).unwrap();
        }

        db.upsert_reset_code("a@x.com", "h2", now + Duration::minutes(15)).unwrap();
        for _ in 0..MAX - 1 {
            db.consume_reset_code("a@x.com", "wrong", now, MAX).unwrap();
        }
        assert!(db.consume_reset_code("a@x.com", "h2", now, MAX).unwrap());
    }
}
