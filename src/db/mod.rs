//! SQLite persistence for authorization state, encrypted tokens, and the
//! chatbot subscriber roster.
//!
//! All timestamps are stored as RFC 3339 text. Token ciphertext is opaque
//! to this layer; encryption happens above it.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// A pending authorization state row.
#[derive(Clone, Debug, PartialEq)]
pub struct StateRow {
    pub user_id: String,
    pub state: String,
    pub provider: String,
    pub purpose: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// An encrypted token row addressed by (user, provider, purpose, kind).
#[derive(Clone, Debug)]
pub struct TokenRow {
    pub user_id: String,
    pub provider: String,
    pub purpose: String,
    pub token_type: String,
    pub ciphertext: String,
    pub provider_user_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Ciphertext and identity read back for a token key.
#[derive(Clone, Debug)]
pub struct StoredToken {
    pub ciphertext: String,
    pub provider_user_id: String,
}

/// SQLite-backed persistence.
///
/// # Thread Safety
/// The connection is wrapped in a Mutex; SQLite itself runs in serialized
/// mode, so concurrent use from async handlers is safe.
pub struct Database {
    conn: Mutex<Connection>,
}

// Fixed-width fractional seconds keep the stored text lexicographically
// ordered, so SQL string comparison against expires_at is chronological.
fn to_sql_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn from_sql_time(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

impl Database {
    /// Opens (or creates) the database and ensures the schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open database")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS oauth_states (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                state TEXT NOT NULL UNIQUE,
                provider TEXT NOT NULL,
                purpose TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_states_expiry ON oauth_states(expires_at);

            CREATE TABLE IF NOT EXISTS oauth_tokens (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                purpose TEXT NOT NULL,
                token_type TEXT NOT NULL,
                token TEXT NOT NULL,
                provider_user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                UNIQUE(user_id, provider, purpose, token_type)
            );

            CREATE TABLE IF NOT EXISTS subscribers (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .context("Failed to create schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Inserts a new authorization state row.
    pub fn insert_state(&self, row: &StateRow) -> rusqlite::Result<()> {
        self.conn.lock().unwrap().execute(
            r#"
            INSERT INTO oauth_states (user_id, state, provider, purpose, created_at, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                row.user_id,
                row.state,
                row.provider,
                row.purpose,
                to_sql_time(row.created_at),
                to_sql_time(row.expires_at),
            ],
        )?;
        Ok(())
    }

    /// Atomically deletes and returns the state row matching `(user_id,
    /// state)`, excluding expired rows. Returns `None` when no live row
    /// matches; a single DELETE..RETURNING keeps concurrent callbacks from
    /// both consuming the same state.
    pub fn take_state(&self, user_id: &str, state: &str) -> rusqlite::Result<Option<StateRow>> {
        let now = to_sql_time(Utc::now());
        self.conn
            .lock()
            .unwrap()
            .query_row(
                r#"
                DELETE FROM oauth_states
                WHERE user_id = ?1 AND state = ?2 AND expires_at > ?3
                RETURNING user_id, state, provider, purpose, created_at, expires_at
                "#,
                params![user_id, state, now],
                |row| {
                    Ok(StateRow {
                        user_id: row.get(0)?,
                        state: row.get(1)?,
                        provider: row.get(2)?,
                        purpose: row.get(3)?,
                        created_at: from_sql_time(&row.get::<_, String>(4)?)?,
                        expires_at: from_sql_time(&row.get::<_, String>(5)?)?,
                    })
                },
            )
            .optional()
    }

    /// Deletes every state row whose expiry has passed. Returns the number
    /// of rows removed.
    pub fn sweep_states(&self, now: DateTime<Utc>) -> rusqlite::Result<usize> {
        self.conn.lock().unwrap().execute(
            "DELETE FROM oauth_states WHERE expires_at <= ?1",
            params![to_sql_time(now)],
        )
    }

    /// Upserts a token row on its `(user_id, provider, purpose,
    /// token_type)` key.
    pub fn upsert_token(&self, row: &TokenRow) -> rusqlite::Result<()> {
        let now = to_sql_time(Utc::now());
        self.conn.lock().unwrap().execute(
            r#"
            INSERT INTO oauth_tokens (
                user_id, provider, purpose, token_type,
                token, provider_user_id, created_at, expires_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(user_id, provider, purpose, token_type) DO UPDATE SET
                token = excluded.token,
                provider_user_id = excluded.provider_user_id,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at
            "#,
            params![
                row.user_id,
                row.provider,
                row.purpose,
                row.token_type,
                row.ciphertext,
                row.provider_user_id,
                now,
                to_sql_time(row.expires_at),
            ],
        )?;
        Ok(())
    }

    /// Point lookup of a token row by its full key.
    pub fn get_token(
        &self,
        user_id: &str,
        provider: &str,
        purpose: &str,
        token_type: &str,
    ) -> rusqlite::Result<Option<StoredToken>> {
        self.conn
            .lock()
            .unwrap()
            .query_row(
                r#"
                SELECT token, provider_user_id FROM oauth_tokens
                WHERE user_id = ?1 AND provider = ?2 AND purpose = ?3 AND token_type = ?4
                "#,
                params![user_id, provider, purpose, token_type],
                |row| {
                    Ok(StoredToken {
                        ciphertext: row.get(0)?,
                        provider_user_id: row.get(1)?,
                    })
                },
            )
            .optional()
    }

    /// Enrolls a user in the chatbot subscriber roster. Idempotent.
    pub fn add_subscriber(&self, user_id: &str) -> rusqlite::Result<()> {
        self.conn.lock().unwrap().execute(
            "INSERT OR IGNORE INTO subscribers (user_id, created_at) VALUES (?1, ?2)",
            params![user_id, to_sql_time(Utc::now())],
        )?;
        Ok(())
    }

    /// Returns the full subscriber roster.
    pub fn list_subscribers(&self) -> rusqlite::Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT user_id FROM subscribers ORDER BY id")?;
        let users = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_db() -> Database {
        Database::open(":memory:").expect("Failed to open test database")
    }

    fn state_row(user_id: &str, state: &str, ttl_seconds: i64) -> StateRow {
        let now = Utc::now();
        StateRow {
            user_id: user_id.to_string(),
            state: state.to_string(),
            provider: "twitch".to_string(),
            purpose: "chatbot".to_string(),
            created_at: now,
            expires_at: now + Duration::seconds(ttl_seconds),
        }
    }

    #[test]
    fn test_take_state_consumes_once() {
        let db = test_db();
        db.insert_state(&state_row("u1", "abc123", 300)).unwrap();

        let taken = db.take_state("u1", "abc123").unwrap().unwrap();
        assert_eq!(taken.provider, "twitch");
        assert_eq!(taken.purpose, "chatbot");

        // Row was deleted by the first take
        assert!(db.take_state("u1", "abc123").unwrap().is_none());
    }

    #[test]
    fn test_take_state_requires_matching_user() {
        let db = test_db();
        db.insert_state(&state_row("u1", "abc123", 300)).unwrap();

        assert!(db.take_state("u2", "abc123").unwrap().is_none());
        // Still present for the right user
        assert!(db.take_state("u1", "abc123").unwrap().is_some());
    }

    #[test]
    fn test_take_state_excludes_expired() {
        let db = test_db();
        db.insert_state(&state_row("u1", "old", -10)).unwrap();

        assert!(db.take_state("u1", "old").unwrap().is_none());
    }

    #[test]
    fn test_sweep_states_removes_only_expired() {
        let db = test_db();
        db.insert_state(&state_row("u1", "old", -10)).unwrap();
        db.insert_state(&state_row("u1", "older", -600)).unwrap();
        db.insert_state(&state_row("u2", "live", 300)).unwrap();

        let swept = db.sweep_states(Utc::now()).unwrap();
        assert_eq!(swept, 2);

        assert!(db.take_state("u2", "live").unwrap().is_some());
    }

    #[test]
    fn test_token_upsert_overwrites_on_key_conflict() {
        let db = test_db();
        let mut row = TokenRow {
            user_id: "u1".to_string(),
            provider: "twitch".to_string(),
            purpose: "chatbot".to_string(),
            token_type: "access_token".to_string(),
            ciphertext: "blob-one".to_string(),
            provider_user_id: "pid-1".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        };
        db.upsert_token(&row).unwrap();

        row.ciphertext = "blob-two".to_string();
        db.upsert_token(&row).unwrap();

        let stored = db
            .get_token("u1", "twitch", "chatbot", "access_token")
            .unwrap()
            .unwrap();
        assert_eq!(stored.ciphertext, "blob-two");
        assert_eq!(stored.provider_user_id, "pid-1");
    }

    #[test]
    fn test_token_keyed_by_all_four_parts() {
        let db = test_db();
        let base = TokenRow {
            user_id: "u1".to_string(),
            provider: "twitch".to_string(),
            purpose: "chatbot".to_string(),
            token_type: "access_token".to_string(),
            ciphertext: "access-blob".to_string(),
            provider_user_id: "pid-1".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        };
        db.upsert_token(&base).unwrap();
        db.upsert_token(&TokenRow {
            token_type: "refresh_token".to_string(),
            ciphertext: "refresh-blob".to_string(),
            ..base.clone()
        })
        .unwrap();

        let access = db
            .get_token("u1", "twitch", "chatbot", "access_token")
            .unwrap()
            .unwrap();
        let refresh = db
            .get_token("u1", "twitch", "chatbot", "refresh_token")
            .unwrap()
            .unwrap();
        assert_eq!(access.ciphertext, "access-blob");
        assert_eq!(refresh.ciphertext, "refresh-blob");

        assert!(db
            .get_token("u1", "discord", "chatbot", "access_token")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_subscriber_roster_is_idempotent() {
        let db = test_db();
        db.add_subscriber("u1").unwrap();
        db.add_subscriber("u2").unwrap();
        db.add_subscriber("u1").unwrap();

        let roster = db.list_subscribers().unwrap();
        assert_eq!(roster, vec!["u1".to_string(), "u2".to_string()]);
    }

    #[test]
    fn test_time_format_is_fixed_width() {
        // String comparison in SQL relies on this
        let formatted = to_sql_time(Utc::now());
        assert_eq!(formatted.len(), "2026-01-01T00:00:00.000Z".len());
        assert!(formatted.ends_with('Z'));
    }
}
