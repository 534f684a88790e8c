use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::api::handlers::auth::AuthSession;
use crate::api::handlers::connection::AppState;
use crate::api::middleware::AppError;
use crate::models::{FormValues, TableForm, TableRows};

pub async fn list_rows(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(table): Path<String>,
) -> Result<Json<TableRows>, AppError> {
    let (_, _, adapter) = state.open_selected(&auth).await?;
    Ok(Json(state.crud().list(adapter.as_ref(), &table).await?))
}

pub async fn new_form(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(table): Path<String>,
) -> Result<Json<TableForm>, AppError> {
    let (_, _, adapter) = state.open_selected(&auth).await?;
    Ok(Json(state.crud().form_fields(adapter.as_ref(), &table, None).await?))
}

pub async fn edit_form(
    State(state): State<AppState>,
    auth: AuthSession,
    Path((table, pk)): Path<(String, String)>,
) -> Result<Json<TableForm>, AppError> {
    let (_, _, adapter) = state.open_selected(&auth).await?;
    Ok(Json(state.crud().form_fields(adapter.as_ref(), &table, Some(&pk)).await?))
}

pub async fn insert_row(
    State(state): State<AppState>,
    auth: AuthSession,
    Path(table): Path<String>,
    Json(form): Json<FormValues>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let (_, _, adapter) = state.open_selected(&auth).await?;
    let inserted = state.crud().add(adapter.as_ref(), &table, &form).await?;
    Ok((StatusCode::CREATED, Json(json!({ "table_name": table, "inserted": inserted }))))
}

pub async fn update_row(
    State(state): State<AppState>,
    auth: AuthSession,
    Path((table, pk)): Path<(String, String)>,
    Json(form): Json<FormValues>,
) -> Result<Json<Value>, AppError> {
    let (_, _, adapter) = state.open_selected(&auth).await?;
    let updated = state.crud().edit(adapter.as_ref(), &table, &pk, &form).await?;
    Ok(Json(json!({ "table_name": table, "updated": updated })))
}

pub async fn delete_row(
    State(state): State<AppState>,
    auth: AuthSession,
    Path((table, pk)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let (_, _, adapter) = state.open_selected(&auth).await?;
    let deleted = state.crud().delete(adapter.as_ref(), &table, &pk).await?;
    Ok(Json(json!({ "table_name": table, "deleted": deleted })))
}
