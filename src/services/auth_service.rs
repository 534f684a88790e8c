use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::api::middleware::AppError;
use crate::config::AuthConfig;
use crate::models::{LoginRequest, LoginResponse, Session, User};
use crate::storage::SqliteStorage;

const HASH_SCHEME: &str = "pbkdf2_sha256";
const HASH_ROUNDS: u32 = if cfg!(test) { 1_000 } else { 260_000 };

/// Token payload: user id, session id and expiry (unix seconds)
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub sid: String,
    pub exp: i64,
}

fn derive(password: &str, salt: &str, rounds: u32) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), rounds, &mut key);
    key
}

/// Stored as `pbkdf2_sha256$<rounds>$<salt>$<hex key>`
pub fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    let key = derive(password, &salt, HASH_ROUNDS);
    format!("{}${}${}${}", HASH_SCHEME, HASH_ROUNDS, salt, hex::encode(key))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.splitn(4, '$');
    let (Some(HASH_SCHEME), Some(rounds), Some(salt), Some(expected)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let (Ok(rounds), Ok(expected)) = (rounds.parse::<u32>(), hex::decode(expected)) else {
        return false;
    };
    if rounds == 0 {
        return false;
    }
    derive(password, salt, rounds)[..].ct_eq(&expected[..]).into()
}

pub struct AuthService {
    storage: Arc<SqliteStorage>,
    jwt_secret: String,
    session_hours: i64,
}

impl AuthService {
    pub fn new(storage: Arc<SqliteStorage>, config: &AuthConfig) -> Self {
        Self {
            storage,
            jwt_secret: config.jwt_secret.clone(),
            session_hours: config.session_hours,
        }
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<User, AppError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AppError::Validation("Username and password are required".to_string()));
        }
        if self.storage.get_user_by_username(username).await?.is_some() {
            return Err(AppError::Validation(format!("User '{}' already exists", username)));
        }

        let user = User::new(username.to_string(), hash_password(password));
        self.storage.create_user(&user).await?;
        tracing::info!("Created user {}", user.username);
        Ok(user)
    }

    /// Seed the configured account unless it already exists
    pub async fn ensure_user(&self, username: &str, password: &str) -> Result<(), AppError> {
        if self.storage.get_user_by_username(username.trim()).await?.is_none() {
            self.register(username, password).await?;
        }
        Ok(())
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, AppError> {
        let invalid = || AppError::Unauthorized("Invalid username or password".to_string());

        let user = self
            .storage
            .get_user_by_username(request.username.trim())
            .await?
            .ok_or_else(invalid)?;
        if !verify_password(&request.password, &user.password_hash) {
            tracing::warn!("Failed login for {}", user.username);
            return Err(invalid());
        }

        let purged = self.storage.delete_expired_sessions(chrono::Utc::now()).await?;
        if purged > 0 {
            tracing::debug!("Purged {} expired sessions", purged);
        }

        let session = Session::new(user.id.clone(), self.session_hours);
        self.storage.create_session(&session).await?;

        let claims = Claims {
            sub: user.id.clone(),
            sid: session.id.clone(),
            exp: session.expires_at.timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))?;

        tracing::info!("User {} logged in", user.username);
        Ok(LoginResponse {
            token,
            expires_at: session.expires_at,
            user,
        })
    }

    /// Resolve a token to its live session and user
    pub async fn authenticate(&self, token: &str) -> Result<(User, Session), AppError> {
        let unauthorized = |msg: &str| AppError::Unauthorized(msg.to_string());

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| unauthorized("Invalid or expired token"))?
        .claims;

        let session = self
            .storage
            .get_session(&claims.sid)
            .await?
            .filter(|s| s.user_id == claims.sub && !s.is_expired())
            .ok_or_else(|| unauthorized("Session has ended"))?;

        let user = self
            .storage
            .get_user(&session.user_id)
            .await?
            .ok_or_else(|| unauthorized("Unknown user"))?;

        Ok((user, session))
    }

    pub async fn logout(&self, session_id: &str) -> Result<bool, AppError> {
        Ok(self.storage.delete_session(session_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service() -> AuthService {
        let storage = Arc::new(SqliteStorage::new(":memory:").await.unwrap());
        AuthService::new(
            storage,
            &AuthConfig {
                jwt_secret: "test-secret".to_string(),
                session_hours: 2,
                bootstrap_user: None,
                bootstrap_password: None,
            },
        )
    }

    fn login(username: &str, password: &str) -> LoginRequest {
        LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_password_hashing() {
        let stored = hash_password("sakila");
        let parts: Vec<&str> = stored.split('$').collect();
        assert_eq!(parts[0], "pbkdf2_sha256");
        assert_eq!(parts[1], HASH_ROUNDS.to_string());
        assert_eq!(parts[3].len(), 64);
        assert!(verify_password("sakila", &stored));
        assert!(!verify_password("Sakila", &stored));
        assert_ne!(stored, hash_password("sakila"));

        assert!(!verify_password("sakila", "plain"));
        assert!(!verify_password("sakila", &stored.replacen("pbkdf2_sha256", "sha256", 1)));
        assert!(!verify_password("sakila", &format!("pbkdf2_sha256$0${}${}", parts[2], parts[3])));
        assert!(!verify_password("sakila", &format!("pbkdf2_sha256${}${}$zz", parts[1], parts[2])));
        // Truncated key never matches
        assert!(!verify_password("sakila", &stored[..stored.len() - 2]));
    }

    #[test]
    fn test_rounds_are_read_from_the_stored_hash() {
        let salt = "fixedsalt";
        let stored = format!("pbkdf2_sha256$7${}${}", salt, hex::encode(derive("pw", salt, 7)));
        assert!(verify_password("pw", &stored));
        assert!(!verify_password("pw", &stored.replacen("$7$", "$8$", 1)));
    }

    #[tokio::test]
    async fn test_login_purges_expired_sessions() {
        let auth = service().await;
        let user = auth.register("admin", "secret").await.unwrap();

        let stale = Session::new(user.id.clone(), -1);
        auth.storage.create_session(&stale).await.unwrap();
        assert!(auth.storage.get_session(&stale.id).await.unwrap().is_some());

        let response = auth.login(&login("admin", "secret")).await.unwrap();
        assert!(auth.storage.get_session(&stale.id).await.unwrap().is_none());
        assert!(auth.authenticate(&response.token).await.is_ok());
    }

    #[tokio::test]
    async fn test_login_authenticate_logout() {
        let auth = service().await;
        auth.ensure_user("admin", "secret").await.unwrap();
        auth.ensure_user("admin", "other").await.unwrap();

        assert!(auth.login(&login("admin", "other")).await.is_err());
        let response = auth.login(&login("admin", "secret")).await.unwrap();
        assert_eq!(response.user.username, "admin");

        let (user, session) = auth.authenticate(&response.token).await.unwrap();
        assert_eq!(user.id, response.user.id);
        assert!(session.connection_id.is_none());

        assert!(auth.logout(&session.id).await.unwrap());
        let err = auth.authenticate(&response.token).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_rejects_foreign_tokens() {
        let auth = service().await;
        assert!(auth.authenticate("not-a-token").await.is_err());

        let forged = encode(
            &Header::default(),
            &Claims {
                sub: "u".to_string(),
                sid: "s".to_string(),
                exp: chrono::Utc::now().timestamp() + 3600,
            },
            &EncodingKey::from_secret(b"another-secret"),
        )
        .unwrap();
        assert!(auth.authenticate(&forged).await.is_err());
        assert!(auth.register(" ", "x").await.is_err());
    }
}
