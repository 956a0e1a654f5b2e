use crate::models::RefreshTokenRow;
use crate::{Database, OptionalExt};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};

const TOKEN_COLUMNS: &str =
    "id, user_id, device_id, token_hash, created_at, expires_at, revoked_at, replaced_by_id";

impl Database {
    pub fn insert_refresh_token(
        &self,
        user_id: i64,
        device_id: Option<i64>,
        token_hash: &str,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshTokenRow> {
        self.with_conn_mut(|conn| {
            insert_token(conn, user_id, device_id, token_hash, created_at, expires_at)
        })
    }

    pub fn get_refresh_token_by_hash(&self, token_hash: &str) -> Result<Option<RefreshTokenRow>> {
        self.with_conn(|conn| query_token(conn, "token_hash = ?1", rusqlite::params![token_hash]))
    }

    pub fn get_refresh_token(&self, id: i64) -> Result<Option<RefreshTokenRow>> {
        self.with_conn(|conn| query_token(conn, "id = ?1", rusqlite::params![id]))
    }

    /// Replaces `old_id` with a freshly inserted successor in one transaction.
    ///
    /// The predecessor is revoked with a conditional update on `revoked_at IS NULL`.
    /// If another writer revoked it first nothing is committed and `None` is returned.
    pub fn rotate_refresh_token(
        &self,
        old_id: i64,
        user_id: i64,
        device_id: Option<i64>,
        new_hash: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let successor = insert_token(&tx, user_id, device_id, new_hash, now, expires_at)?;

            let revoked = tx.execute(
                "UPDATE refresh_tokens SET revoked_at = ?1, replaced_by_id = ?2
                 WHERE id = ?3 AND revoked_at IS NULL",
                rusqlite::params![now, successor.id, old_id],
            )?;

            if revoked == 0 {
                tx.rollback()?;
                return Ok(None);
            }

            tx.commit()?;
            Ok(Some(successor))
        })
    }

    /// Sets `revoked_at` unless already set. Returns true when this call revoked it.
    pub fn revoke_refresh_token(&self, id: i64, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let revoked = conn.execute(
                "UPDATE refresh_tokens SET revoked_at = ?1 WHERE id = ?2 AND revoked_at IS NULL",
                rusqlite::params![now, id],
            )?;
            Ok(revoked == 1)
        })
    }

    /// Follows `replaced_by_id` links starting at `id`, oldest first.
    #[cfg(test)]
    pub fn refresh_token_chain(&self, id: i64) -> Result<Vec<RefreshTokenRow>> {
        self.with_conn(|conn| {
            let mut chain = Vec::new();
            let mut next = Some(id);
            while let Some(current) = next {
                let row = query_token(conn, "id = ?1", rusqlite::params![current])?
                    .ok_or_else(|| anyhow::anyhow!("Broken refresh token chain at {}", current))?;
                next = row.replaced_by_id;
                chain.push(row);
            }
            Ok(chain)
        })
    }
}

fn insert_token(
    conn: &Connection,
    user_id: i64,
    device_id: Option<i64>,
    token_hash: &str,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<RefreshTokenRow> {
    conn.execute(
        "INSERT INTO refresh_tokens (user_id, device_id, token_hash, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![user_id, device_id, token_hash, created_at, expires_at],
    )?;

    Ok(RefreshTokenRow {
        id: conn.last_insert_rowid(),
        user_id,
        device_id,
        token_hash: token_hash.to_string(),
        created_at,
        expires_at,
        revoked_at: None,
        replaced_by_id: None,
    })
}

fn query_token(
    conn: &Connection,
    predicate: &str,
    params: impl rusqlite::Params,
) -> Result<Option<RefreshTokenRow>> {
    let sql = format!("SELECT {} FROM refresh_tokens WHERE {}", TOKEN_COLUMNS, predicate);
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row(params, map_token).optional()?;
    Ok(row)
}

fn map_token(row: &Row<'_>) -> rusqlite::Result<RefreshTokenRow> {
    Ok(RefreshTokenRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        device_id: row.get(2)?,
        token_hash: row.get(3)?,
        created_at: row.get(4)?,
        expires_at: row.get(5)?,
        revoked_at: row.get(6)?,
        replaced_by_id: row.get(7)?,
    })
}
