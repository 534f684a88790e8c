use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: String, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            username,
            password_hash,
            created_at: Utc::now(),
        }
    }
}

/// Server-side session; carries the selected connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub connection_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: String, lifetime_hours: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            connection_id: None,
            created_at: now,
            expires_at: now + Duration::hours(lifetime_hours),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

/// Uploaded voice question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioQuery {
    pub id: String,
    pub owner_id: String,
    pub audio_path: String,
    pub transcript: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AudioQuery {
    pub fn new(owner_id: String, audio_path: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id,
            audio_path,
            transcript: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_expiry() {
        let session = Session::new("u".to_string(), 1);
        assert!(!session.is_expired());
        assert!(session.connection_id.is_none());

        let expired = Session::new("u".to_string(), 0);
        assert!(expired.is_expired());
    }
}
