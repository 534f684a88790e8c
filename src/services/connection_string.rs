use url::Url;

use crate::api::middleware::AppError;
use crate::models::{ConnectionConfig, DbType};

/// Build the driver URL for a stored connection
pub fn conn_str_for(conn: &ConnectionConfig) -> Result<String, AppError> {
    match conn.db_type {
        DbType::Sqlite => Ok(format!("sqlite://{}", conn.database_name)),
        DbType::Postgres | DbType::Mysql => {
            let base = format!("{}://{}:{}", conn.db_type.scheme(), conn.host, conn.port);
            let mut url = Url::parse(&base).map_err(|e| {
                AppError::Validation(format!("Invalid host or port for {}: {}", conn, e))
            })?;

            url.set_username(&conn.username)
                .map_err(|_| AppError::Validation("Invalid username".to_string()))?;
            if !conn.password.is_empty() {
                url.set_password(Some(&conn.password))
                    .map_err(|_| AppError::Validation("Invalid password".to_string()))?;
            }
            url.path_segments_mut()
                .map_err(|_| AppError::Validation("Invalid database name".to_string()))?
                .push(&conn.database_name);

            Ok(url.to_string())
        }
    }
}

/// Mask credentials in a connection URL for safe logging
pub fn mask_credentials(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => {
            let mut masked = parsed.clone();
            if parsed.password().is_some() {
                let _ = masked.set_password(Some("***"));
            }
            masked.to_string()
        }
        Err(_) => "[invalid-url]".to_string(),
    }
}
