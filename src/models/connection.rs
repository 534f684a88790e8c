use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::middleware::AppError;

/// Database vendors a stored connection can point at
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    Postgres,
    Mysql,
    Sqlite,
}

impl DbType {
    pub fn from_str(s: &str) -> Result<Self, AppError> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(DbType::Postgres),
            "mysql" | "mariadb" => Ok(DbType::Mysql),
            "sqlite" => Ok(DbType::Sqlite),
            _ => Err(AppError::Validation(format!("Unsupported DB type: {}", s))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DbType::Postgres => "postgres",
            DbType::Mysql => "mysql",
            DbType::Sqlite => "sqlite",
        }
    }

    /// URL scheme used by the connection-string builder
    pub fn scheme(&self) -> &'static str {
        match self {
            DbType::Postgres => "postgresql",
            DbType::Mysql => "mysql",
            DbType::Sqlite => "sqlite",
        }
    }
}

/// Stored credential record owned by a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub id: String,
    pub owner_id: String,
    pub db_type: DbType,
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub database_name: String,
    pub custom_prompt: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ConnectionConfig {
    pub fn new(owner_id: String, request: CreateConnectionRequest) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id,
            db_type: request.db_type,
            host: request.host,
            port: request.port,
            username: request.username,
            password: request.password,
            database_name: request.database_name,
            custom_prompt: None,
            created_at: Utc::now(),
        }
    }

    /// Prompt suffix, empty when unset
    pub fn prompt_suffix(&self) -> &str {
        self.custom_prompt.as_deref().unwrap_or("")
    }
}

impl std::fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.database_name)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateConnectionRequest {
    pub db_type: DbType,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub database_name: String,
}

impl CreateConnectionRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.database_name.trim().is_empty() {
            return Err(AppError::Validation("Database name cannot be empty".to_string()));
        }
        if self.db_type != DbType::Sqlite {
            if self.host.trim().is_empty() {
                return Err(AppError::Validation("Host cannot be empty".to_string()));
            }
            if self.port == 0 {
                return Err(AppError::Validation("Port must be between 1 and 65535".to_string()));
            }
            if self.username.trim().is_empty() {
                return Err(AppError::Validation("Username cannot be empty".to_string()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct SelectConnectionRequest {
    pub connection_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePromptRequest {
    #[serde(default)]
    pub custom_prompt: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(db_type: DbType) -> CreateConnectionRequest {
        CreateConnectionRequest {
            db_type,
            host: "localhost".to_string(),
            port: 5432,
            username: "app".to_string(),
            password: "secret".to_string(),
            database_name: "dvdrental".to_string(),
        }
    }

    #[test]
    fn test_db_type_parsing() {
        assert_eq!(DbType::from_str("postgresql").unwrap(), DbType::Postgres);
        assert_eq!(DbType::from_str("MariaDB").unwrap(), DbType::Mysql);
        assert_eq!(DbType::from_str("sqlite").unwrap(), DbType::Sqlite);
        assert!(DbType::from_str("oracle").is_err());
    }

    #[test]
    fn test_password_not_serialized() {
        let conn = ConnectionConfig::new("user-1".to_string(), request(DbType::Postgres));
        let json = serde_json::to_value(&conn).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["db_type"], "postgres");
        assert_eq!(conn.to_string(), "dvdrental");
    }

    #[test]
    fn test_request_validation() {
        assert!(request(DbType::Postgres).validate().is_ok());

        let mut missing_host = request(DbType::Mysql);
        missing_host.host = " ".to_string();
        assert!(missing_host.validate().is_err());

        let sqlite = CreateConnectionRequest {
            db_type: DbType::Sqlite,
            host: String::new(),
            port: 0,
            username: String::new(),
            password: String::new(),
            database_name: "/tmp/app.db".to_string(),
        };
        assert!(sqlite.validate().is_ok());
    }
}
