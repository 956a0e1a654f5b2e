use crate::models::{NewUser, UserRow};
use crate::{Database, OptionalExt};
use anyhow::Result;
use rusqlite::{Connection, Row};

const USER_COLUMNS: &str =
    "id, email, name, password_hash, email_confirmed, created_at, last_seen";

impl Database {
    // -- Users --

    /// Inserts a user. Returns `None` when the normalized email is already taken.
    pub fn create_user(&self, user: &NewUser<'_>) -> Result<Option<i64>> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users
                    (email, normalized_email, name, password_hash, email_confirmed, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(normalized_email) DO NOTHING",
                rusqlite::params![
                    user.email,
                    user.normalized_email,
                    user.name,
                    user.password_hash,
                    user.email_confirmed,
                    user.created_at,
                ],
            )?;

            if inserted == 0 {
                return Ok(None);
            }
            Ok(Some(conn.last_insert_rowid()))
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", rusqlite::params![id]))
    }

    pub fn get_user_by_normalized_email(&self, normalized_email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(conn, "normalized_email = ?1", rusqlite::params![normalized_email])
        })
    }

    /// Returns false when the user row does not exist.
    pub fn set_user_name(&self, id: i64, name: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE users SET name = ?1 WHERE id = ?2",
                rusqlite::params![name, id],
            )?;
            Ok(updated == 1)
        })
    }

    pub fn set_password_hash(&self, id: i64, password_hash: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE users SET password_hash = ?1 WHERE id = ?2",
                rusqlite::params![password_hash, id],
            )?;
            Ok(updated == 1)
        })
    }

    // -- Roles --

    pub fn get_user_roles(&self, user_id: i64) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.name FROM roles r
                 JOIN user_roles ur ON ur.role_id = r.id
                 WHERE ur.user_id = ?1
                 ORDER BY r.name",
            )?;
            let roles = stmt
                .query_map([user_id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(roles)
        })
    }

    /// Grants a role, creating the role row on first use. Roles are managed
    /// outside this service; only tests seed them.
    #[cfg(test)]
    pub fn add_user_role(&self, user_id: i64, role: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute("INSERT OR IGNORE INTO roles (name) VALUES (?1)", [role])?;
            tx.execute(
                "INSERT OR IGNORE INTO user_roles (user_id, role_id)
                 SELECT ?1, id FROM roles WHERE name = ?2",
                rusqlite::params![user_id, role],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    // -- External logins --

    pub fn find_user_by_login(
        &self,
        provider: &str,
        provider_key: &str,
    ) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(
                conn,
                "id = (SELECT user_id FROM user_logins WHERE provider = ?1 AND provider_key = ?2)",
                rusqlite::params![provider, provider_key],
            )
        })
    }

    /// Links an external identity. Returns false if the (provider, key) pair is
    /// already linked, to this or any other user.
    pub fn add_user_login(&self, user_id: i64, provider: &str, provider_key: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO user_logins (provider, provider_key, user_id)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![provider, provider_key, user_id],
            )?;
            Ok(inserted == 1)
        })
    }
}

fn query_user(
    conn: &Connection,
    predicate: &str,
    params: impl rusqlite::Params,
) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, predicate);
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row(params, map_user).optional()?;
    Ok(row)
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        password_hash: row.get(3)?,
        email_confirmed: row.get(4)?,
        created_at: row.get(5)?,
        last_seen: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn new_user<'a>(email: &'a str, normalized: &'a str) -> NewUser<'a> {
        NewUser {
            email,
            normalized_email: normalized,
            name: Some("Ann"),
            password_hash: None,
            email_confirmed: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn duplicate_normalized_email_is_rejected() {
        let db = Database::open_in_memory().unwrap();

        let first = db.create_user(&new_user("A@x.com", "a@x.com")).unwrap();
        assert!(first.is_some());

        let second = db.create_user(&new_user("a@x.com", "a@x.com")).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn user_lookup_by_email_and_id() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_user(&new_user("A@x.com", "a@x.com")).unwrap().unwrap();

        let by_email = db.get_user_by_normalized_email("a@x.com").unwrap().unwrap();
        assert_eq!(by_email.id, id);
        assert_eq!(by_email.email, "A@x.com");
        assert_eq!(by_email.name.as_deref(), Some("Ann"));

        assert!(db.get_user_by_id(id).unwrap().is_some());
        assert!(db.get_user_by_id(id + 1).unwrap().is_none());
    }

    #[test]
    fn roles_are_sorted_and_deduplicated() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_user(&new_user("a@x.com", "a@x.com")).unwrap().unwrap();

        db.add_user_role(id, "Student").unwrap();
        db.add_user_role(id, "Admin").unwrap();
        db.add_user_role(id, "Admin").unwrap();

        assert_eq!(db.get_user_roles(id).unwrap(), vec!["Admin", "Student"]);
    }

    #[test]
    fn external_login_links_once() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_user(&new_user("a@x.com", "a@x.com")).unwrap().unwrap();

        assert!(db.add_user_login(id, "Google", "sub-1").unwrap());
        assert!(!db.add_user_login(id, "Google", "sub-1").unwrap());

        let found = db.find_user_by_login("Google", "sub-1").unwrap().unwrap();
        assert_eq!(found.id, id);
        assert!(db.find_user_by_login("Google", "sub-2").unwrap().is_none());
    }
}
