use chrono::{DateTime, Utc};
use rusqlite::{types::Type, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::models::{AudioQuery, ConnectionConfig, DbType, Session, User};

/// SQLite storage for users, sessions, connections and voice queries
/// Uses tokio::Mutex for async-friendly locking
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

fn parse_timestamp(idx: usize, value: &str) -> SqliteResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_db_type(idx: usize, value: &str) -> SqliteResult<DbType> {
    DbType::from_str(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())),
        )
    })
}

const CONNECTION_COLUMNS: &str =
    "id, owner_id, db_type, host, port, username, password, database_name, custom_prompt, created_at";

fn connection_from_row(row: &Row<'_>) -> SqliteResult<ConnectionConfig> {
    Ok(ConnectionConfig {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        db_type: parse_db_type(2, &row.get::<_, String>(2)?)?,
        host: row.get(3)?,
        port: row.get(4)?,
        username: row.get(5)?,
        password: row.get(6)?,
        database_name: row.get(7)?,
        custom_prompt: row.get(8)?,
        created_at: parse_timestamp(9, &row.get::<_, String>(9)?)?,
    })
}

fn user_from_row(row: &Row<'_>) -> SqliteResult<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        created_at: parse_timestamp(3, &row.get::<_, String>(3)?)?,
    })
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        // Handle SQLite URL format (sqlite:./path or sqlite://path)
        let path_str = db_path.as_ref().to_string_lossy();
        let clean_path: &str = if path_str.starts_with("sqlite:") {
            let mut cleaned = path_str.trim_start_matches("sqlite:");
            cleaned = cleaned.trim_start_matches("//");
            cleaned
        } else {
            path_str.as_ref()
        };

        let conn = Connection::open(clean_path)?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Initialize database schema
    async fn init_schema(&self) -> SqliteResult<()> {
        let conn = self.conn.lock().await;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS connections (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                db_type TEXT NOT NULL,
                host TEXT NOT NULL,
                port INTEGER NOT NULL,
                username TEXT NOT NULL,
                password TEXT NOT NULL,
                database_name TEXT NOT NULL,
                custom_prompt TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                connection_id TEXT,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (connection_id) REFERENCES connections(id) ON DELETE SET NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS audio_queries (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                audio_path TEXT NOT NULL,
                transcript TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_connections_owner ON connections(owner_id, created_at DESC)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_audio_queries_owner ON audio_queries(owner_id, created_at DESC)",
            [],
        )?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub async fn create_user(&self, user: &User) -> SqliteResult<()> {
        let db_conn = self.conn.lock().await;
        db_conn.execute(
            "INSERT INTO users (id, username, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                user.id,
                user.username,
                user.password_hash,
                user.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub async fn get_user_by_username(&self, username: &str) -> SqliteResult<Option<User>> {
        let db_conn = self.conn.lock().await;
        db_conn
            .query_row(
                "SELECT id, username, password_hash, created_at FROM users WHERE username = ?1",
                rusqlite::params![username],
                user_from_row,
            )
            .optional()
    }

    pub async fn get_user(&self, id: &str) -> SqliteResult<Option<User>> {
        let db_conn = self.conn.lock().await;
        db_conn
            .query_row(
                "SELECT id, username, password_hash, created_at FROM users WHERE id = ?1",
                rusqlite::params![id],
                user_from_row,
            )
            .optional()
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    pub async fn create_session(&self, session: &Session) -> SqliteResult<()> {
        let db_conn = self.conn.lock().await;
        db_conn.execute(
            r#"
            INSERT INTO sessions (id, user_id, connection_id, created_at, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            rusqlite::params![
                session.id,
                session.user_id,
                session.connection_id,
                session.created_at.to_rfc3339(),
                session.expires_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub async fn get_session(&self, id: &str) -> SqliteResult<Option<Session>> {
        let db_conn = self.conn.lock().await;
        db_conn
            .query_row(
                "SELECT id, user_id, connection_id, created_at, expires_at FROM sessions WHERE id = ?1",
                rusqlite::params![id],
                |row| {
                    Ok(Session {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        connection_id: row.get(2)?,
                        created_at: parse_timestamp(3, &row.get::<_, String>(3)?)?,
                        expires_at: parse_timestamp(4, &row.get::<_, String>(4)?)?,
                    })
                },
            )
            .optional()
    }

    /// Store the selected connection on the session
    pub async fn set_session_connection(
        &self,
        session_id: &str,
        connection_id: Option<&str>,
    ) -> SqliteResult<bool> {
        let db_conn = self.conn.lock().await;
        let rows_affected = db_conn.execute(
            "UPDATE sessions SET connection_id = ?1 WHERE id = ?2",
            rusqlite::params![connection_id, session_id],
        )?;
        Ok(rows_affected > 0)
    }

    /// Remove sessions that expired before `now`
    pub async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> SqliteResult<usize> {
        let db_conn = self.conn.lock().await;
        db_conn.execute(
            "DELETE FROM sessions WHERE julianday(expires_at) < julianday(?1)",
            rusqlite::params![now.to_rfc3339()],
        )
    }

    pub async fn delete_session(&self, id: &str) -> SqliteResult<bool> {
        let db_conn = self.conn.lock().await;
        let rows_affected = db_conn.execute("DELETE FROM sessions WHERE id = ?1", rusqlite::params![id])?;
        Ok(rows_affected > 0)
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    /// Save a connection to the database
    pub async fn save_connection(&self, conn: &ConnectionConfig) -> SqliteResult<()> {
        let db_conn = self.conn.lock().await;
        db_conn.execute(
            r#"
            INSERT OR REPLACE INTO connections
            (id, owner_id, db_type, host, port, username, password, database_name, custom_prompt, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            rusqlite::params![
                conn.id,
                conn.owner_id,
                conn.db_type.as_str(),
                conn.host,
                conn.port,
                conn.username,
                conn.password,
                conn.database_name,
                conn.custom_prompt,
                conn.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get a connection by ID, only if it belongs to `owner_id`
    pub async fn get_connection_for_owner(
        &self,
        id: &str,
        owner_id: &str,
    ) -> SqliteResult<Option<ConnectionConfig>> {
        let db_conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {} FROM connections WHERE id = ?1 AND owner_id = ?2",
            CONNECTION_COLUMNS
        );
        db_conn
            .query_row(&sql, rusqlite::params![id, owner_id], connection_from_row)
            .optional()
    }

    /// List a user's connections, newest first
    pub async fn list_connections(&self, owner_id: &str) -> SqliteResult<Vec<ConnectionConfig>> {
        let db_conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {} FROM connections WHERE owner_id = ?1 ORDER BY created_at DESC",
            CONNECTION_COLUMNS
        );
        let mut stmt = db_conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params![owner_id], connection_from_row)?;

        let mut connections = Vec::new();
        for row in rows {
            connections.push(row?);
        }
        Ok(connections)
    }

    pub async fn update_custom_prompt(
        &self,
        id: &str,
        owner_id: &str,
        custom_prompt: &str,
    ) -> SqliteResult<bool> {
        let db_conn = self.conn.lock().await;
        let rows_affected = db_conn.execute(
            "UPDATE connections SET custom_prompt = ?1 WHERE id = ?2 AND owner_id = ?3",
            rusqlite::params![custom_prompt, id, owner_id],
        )?;
        Ok(rows_affected > 0)
    }

    // ------------------------------------------------------------------
    // Audio queries
    // ------------------------------------------------------------------

    pub async fn save_audio_query(&self, query: &AudioQuery) -> SqliteResult<()> {
        let db_conn = self.conn.lock().await;
        db_conn.execute(
            r#"
            INSERT OR REPLACE INTO audio_queries (id, owner_id, audio_path, transcript, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            rusqlite::params![
                query.id,
                query.owner_id,
                query.audio_path,
                query.transcript,
                query.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub async fn list_audio_queries(&self, owner_id: &str) -> SqliteResult<Vec<AudioQuery>> {
        let db_conn = self.conn.lock().await;
        let mut stmt = db_conn.prepare(
            "SELECT id, owner_id, audio_path, transcript, created_at FROM audio_queries WHERE owner_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(rusqlite::params![owner_id], |row| {
            Ok(AudioQuery {
                id: row.get(0)?,
                owner_id: row.get(1)?,
                audio_path: row.get(2)?,
                transcript: row.get(3)?,
                created_at: parse_timestamp(4, &row.get::<_, String>(4)?)?,
            })
        })?;

        let mut queries = Vec::new();
        for row in rows {
            queries.push(row?);
        }
        Ok(queries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateConnectionRequest;

    async fn storage_with_user() -> (SqliteStorage, User) {
        let storage = SqliteStorage::new(":memory:").await.unwrap();
        let user = User::new("alice".to_string(), "salt$hash".to_string());
        storage.create_user(&user).await.unwrap();
        (storage, user)
    }

    fn connection(owner_id: &str) -> ConnectionConfig {
        ConnectionConfig::new(
            owner_id.to_string(),
            CreateConnectionRequest {
                db_type: DbType::Postgres,
                host: "localhost".to_string(),
                port: 5432,
                username: "app".to_string(),
                password: "secret".to_string(),
                database_name: "dvdrental".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_user_roundtrip() {
        let (storage, user) = storage_with_user().await;
        let loaded = storage.get_user_by_username("alice").await.unwrap().unwrap();
        assert_eq!(loaded.id, user.id);
        assert_eq!(loaded.password_hash, "salt$hash");
        assert!(storage.get_user_by_username("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_connection_ownership() {
        let (storage, user) = storage_with_user().await;
        let other = User::new("mallory".to_string(), "x$y".to_string());
        storage.create_user(&other).await.unwrap();

        let conn = connection(&user.id);
        storage.save_connection(&conn).await.unwrap();

        let loaded = storage
            .get_connection_for_owner(&conn.id, &user.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.password, "secret");
        assert_eq!(loaded.db_type, DbType::Postgres);

        assert!(storage
            .get_connection_for_owner(&conn.id, &other.id)
            .await
            .unwrap()
            .is_none());
        assert!(storage.list_connections(&other.id).await.unwrap().is_empty());
        assert_eq!(storage.list_connections(&user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_custom_prompt_update() {
        let (storage, user) = storage_with_user().await;
        let conn = connection(&user.id);
        storage.save_connection(&conn).await.unwrap();

        assert!(storage
            .update_custom_prompt(&conn.id, &user.id, "Use film table for movies")
            .await
            .unwrap());
        assert!(!storage
            .update_custom_prompt(&conn.id, "someone-else", "x")
            .await
            .unwrap());

        let loaded = storage
            .get_connection_for_owner(&conn.id, &user.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.prompt_suffix(), "Use film table for movies");
    }

    #[tokio::test]
    async fn test_session_connection_selection() {
        let (storage, user) = storage_with_user().await;
        let conn = connection(&user.id);
        storage.save_connection(&conn).await.unwrap();

        let session = Session::new(user.id.clone(), 1);
        storage.create_session(&session).await.unwrap();
        assert!(storage
            .set_session_connection(&session.id, Some(&conn.id))
            .await
            .unwrap());

        let loaded = storage.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.connection_id.as_deref(), Some(conn.id.as_str()));

        assert!(storage.delete_session(&session.id).await.unwrap());
        assert!(storage.get_session(&session.id).await.unwrap().is_none());

        let live = Session::new(user.id.clone(), 1);
        let expired = Session::new(user.id.clone(), -1);
        storage.create_session(&live).await.unwrap();
        storage.create_session(&expired).await.unwrap();
        assert_eq!(storage.delete_expired_sessions(Utc::now()).await.unwrap(), 1);
        assert!(storage.get_session(&live.id).await.unwrap().is_some());
        assert!(storage.get_session(&expired.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_audio_queries_are_kept() {
        let (storage, user) = storage_with_user().await;
        let mut query = AudioQuery::new(user.id.clone(), "media/voice_queries/a.wav".to_string());
        storage.save_audio_query(&query).await.unwrap();

        query.transcript = Some("how many films".to_string());
        storage.save_audio_query(&query).await.unwrap();

        let queries = storage.list_audio_queries(&user.id).await.unwrap();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].transcript.as_deref(), Some("how many films"));
    }
}
