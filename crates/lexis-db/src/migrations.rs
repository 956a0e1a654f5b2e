use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (accounts and sessions)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                email               TEXT NOT NULL,
                normalized_email    TEXT NOT NULL UNIQUE,
                name                TEXT,
                password_hash       TEXT,
                email_confirmed     INTEGER NOT NULL DEFAULT 0,
                created_at          TEXT NOT NULL,
                last_seen           TEXT
            );

            CREATE TABLE roles (
                id      INTEGER PRIMARY KEY AUTOINCREMENT,
                name    TEXT NOT NULL UNIQUE
            );

            CREATE TABLE user_roles (
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                role_id INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
                PRIMARY KEY (user_id, role_id)
            );

            CREATE TABLE user_logins (
                provider        TEXT NOT NULL,
                provider_key    TEXT NOT NULL,
                user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                PRIMARY KEY (provider, provider_key)
            );

            CREATE INDEX idx_user_logins_user ON user_logins(user_id);

            CREATE TABLE devices (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                device_key  TEXT NOT NULL UNIQUE,
                platform    TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE user_devices (
                user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                device_id   INTEGER NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
                linked_at   TEXT NOT NULL,
                PRIMARY KEY (user_id, device_id)
            );

            CREATE INDEX idx_user_devices_device ON user_devices(device_id);

            CREATE TABLE refresh_tokens (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                device_id       INTEGER REFERENCES devices(id) ON DELETE SET NULL,
                token_hash      TEXT NOT NULL UNIQUE,
                created_at      TEXT NOT NULL,
                expires_at      TEXT NOT NULL,
                revoked_at      TEXT,
                replaced_by_id  INTEGER REFERENCES refresh_tokens(id)
            );

            CREATE INDEX idx_refresh_tokens_user ON refresh_tokens(user_id);
            CREATE INDEX idx_refresh_tokens_device ON refresh_tokens(device_id);

            CREATE TABLE password_reset_codes (
                normalized_email    TEXT PRIMARY KEY,
                code_hash           TEXT NOT NULL,
                expires_at          TEXT NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (reset code attempts)");
        conn.execute_batch(
            "
            ALTER TABLE password_reset_codes ADD COLUMN attempts INTEGER NOT NULL DEFAULT 0;

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
