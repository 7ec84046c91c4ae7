use rusqlite::{ErrorCode, OptionalExtension, params};
use uuid::Uuid;

use pollhub_core::{PollError, Result, UserRecord, UserRepository};

use crate::Database;
use crate::models::UserRow;
use crate::polls::{format_timestamp, parse_timestamp};

impl UserRepository for Database {
    fn insert(&self, user: &UserRecord) -> Result<()> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, username, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    user.id.to_string(),
                    user.username,
                    user.password_digest,
                    format_timestamp(user.created_at),
                ],
            );

            match inserted {
                Ok(_) => Ok(Ok(())),
                // Lost a registration race for the same username.
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation
                        && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
                {
                    Ok(Err(PollError::DuplicateUsername))
                }
                Err(e) => Err(e.into()),
            }
        })?
    }

    fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        self.find_user("username = ?1", username)
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>> {
        self.find_user("id = ?1", &id.to_string())
    }
}

impl Database {
    fn find_user(&self, filter: &'static str, value: &str) -> Result<Option<UserRecord>> {
        let sql = format!(
            "SELECT id, username, password, created_at FROM users WHERE {}",
            filter
        );
        let row = self.with_conn(|conn| {
            let row = conn
                .query_row(&sql, [value], |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        password: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })
                .optional()?;
            Ok(row)
        })?;

        let Some(row) = row else {
            return Ok(None);
        };

        let record = UserRecord {
            id: Uuid::parse_str(&row.id).map_err(anyhow::Error::from)?,
            username: row.username,
            password_digest: row.password,
            created_at: parse_timestamp(&row.created_at)?,
        };
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn record(username: &str) -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_digest: "$argon2id$stub".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn insert_and_lookup() {
        let db = Database::open_in_memory().unwrap();
        let user = record("trent");
        db.insert(&user).unwrap();

        let found = db.find_by_username("trent").unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(found.password_digest, "$argon2id$stub");
        assert_eq!(found.created_at.timestamp_micros(), user.created_at.timestamp_micros());

        assert!(db.find_by_username("nobody").unwrap().is_none());
    }

    #[test]
    fn lookup_by_id() {
        let db = Database::open_in_memory().unwrap();
        let user = record("victor");
        db.insert(&user).unwrap();

        let found = db.find_by_id(user.id).unwrap().unwrap();
        assert_eq!(found.username, "victor");
        assert!(db.find_by_id(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn duplicate_username_maps_to_domain_error() {
        let db = Database::open_in_memory().unwrap();
        db.insert(&record("uma")).unwrap();

        let err = db.insert(&record("uma")).unwrap_err();
        assert!(matches!(err, PollError::DuplicateUsername));
    }
}
