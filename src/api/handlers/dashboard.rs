use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::api::handlers::auth::AuthSession;
use crate::api::handlers::connection::AppState;
use crate::api::middleware::AppError;
use crate::services::connection_string::conn_str_for;
use crate::services::database::connect_db;

/// Connection status and table names for the selected connection
pub async fn dashboard(State(state): State<AppState>, auth: AuthSession) -> Result<Json<Value>, AppError> {
    let connection = state.selected_connection(&auth).await?;

    let probe = async {
        let conn_str = conn_str_for(&connection)?;
        let adapter = connect_db(&conn_str, &state.pool_manager).await?;
        Ok::<_, AppError>(adapter.list_tables().await?)
    };

    let (status, tables) = match probe.await {
        Ok(tables) => ("Connected".to_string(), tables),
        Err(e) => {
            tracing::warn!("Dashboard connection test failed for {}: {}", connection.id, e);
            (format!("Error: {}", e.message()), Vec::new())
        }
    };

    Ok(Json(json!({
        "connection": connection,
        "status": status,
        "tables": tables,
    })))
}
