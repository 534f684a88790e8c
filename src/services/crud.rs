//! Generic list/add/edit/delete over any table of the connected database.

use regex::Regex;
use serde_json::Value;

use crate::api::middleware::AppError;
use crate::models::{Column, FormField, FormValues, TableForm, TableRows};
use crate::services::database::DatabaseAdapter;

/// Columns never offered in forms besides the primary key
const READ_ONLY_COLUMNS: &[&str] = &["last_update"];

/// Table schema resolved against the live database
struct TableInfo {
    name: String,
    columns: Vec<Column>,
}

impl TableInfo {
    fn key_column(&self) -> Result<&Column, AppError> {
        self.columns.iter().find(|c| c.is_primary_key).ok_or_else(|| {
            AppError::Validation(format!("Table '{}' has no primary key", self.name))
        })
    }

    fn editable_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns
            .iter()
            .filter(|c| !c.is_primary_key && !READ_ONLY_COLUMNS.contains(&c.name.as_str()))
    }
}

/// Current value as shown in an input of the column's kind
pub fn format_field_value(value: &Value, column: &Column) -> String {
    let text = match value {
        Value::Null => return String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    if column.is_datetime() {
        let text = text.replacen(' ', "T", 1);
        text.chars().take(16).collect()
    } else if column.is_date() {
        text.chars().take(10).collect()
    } else {
        text
    }
}

/// Submitted text to a bound value; blank means NULL
pub fn parse_submitted_value(raw: Option<&String>, column: &Column) -> Result<Option<String>, AppError> {
    let raw = raw.map(|s| s.trim()).unwrap_or_default();
    if raw.is_empty() {
        return Ok(None);
    }

    if column.is_datetime() {
        let minutes = Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}$")
            .map_err(|e| AppError::Internal(e.to_string()))?;
        if minutes.is_match(raw) {
            return Ok(Some(format!("{}:00", raw)));
        }
    }
    Ok(Some(raw.to_string()))
}

pub struct CrudService {
    timeout_secs: u64,
}

impl CrudService {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }

    async fn table_info(&self, adapter: &dyn DatabaseAdapter, table: &str) -> Result<TableInfo, AppError> {
        let tables = adapter.list_tables().await?;
        if !tables.iter().any(|t| t == table) {
            return Err(AppError::NotFound(format!("Table '{}' not found", table)));
        }
        Ok(TableInfo {
            name: table.to_string(),
            columns: adapter.get_columns(table).await?,
        })
    }

    /// All rows of `table` in column order
    pub async fn list(&self, adapter: &dyn DatabaseAdapter, table: &str) -> Result<TableRows, AppError> {
        let info = self.table_info(adapter, table).await?;
        let select_list = info
            .columns
            .iter()
            .map(|c| adapter.quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("SELECT {} FROM {}", select_list, adapter.quote_ident(&info.name));
        let result = adapter.query(&sql, &[], self.timeout_secs).await?;

        Ok(TableRows {
            table_name: info.name,
            columns: info.columns.into_iter().map(|c| c.name).collect(),
            rows: result.rows,
        })
    }

    /// Form fields for a new row, or prefilled from the row keyed by `pk`
    pub async fn form_fields(
        &self,
        adapter: &dyn DatabaseAdapter,
        table: &str,
        pk: Option<&str>,
    ) -> Result<TableForm, AppError> {
        let info = self.table_info(adapter, table).await?;

        let current = match pk {
            Some(pk) => Some(self.fetch_row(adapter, &info, pk).await?),
            None => None,
        };

        let fields = info
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_primary_key && !READ_ONLY_COLUMNS.contains(&c.name.as_str()))
            .map(|(idx, column)| FormField {
                name: column.name.clone(),
                value: current
                    .as_ref()
                    .and_then(|row| row.get(idx))
                    .map(|v| format_field_value(v, column))
                    .unwrap_or_default(),
                is_date: column.is_date(),
                is_datetime: column.is_datetime(),
            })
            .collect();

        Ok(TableForm {
            table_name: info.name,
            fields,
            is_edit: pk.is_some(),
            pk: pk.map(str::to_string),
        })
    }

    async fn fetch_row(
        &self,
        adapter: &dyn DatabaseAdapter,
        info: &TableInfo,
        pk: &str,
    ) -> Result<Vec<Value>, AppError> {
        let key = info.key_column()?;
        let select_list = info
            .columns
            .iter()
            .map(|c| adapter.quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = {}",
            select_list,
            adapter.quote_ident(&info.name),
            adapter.quote_ident(&key.name),
            adapter.placeholder(1, Some(key))
        );
        let result = adapter
            .query(&sql, &[Some(pk.to_string())], self.timeout_secs)
            .await?;
        result
            .rows
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("Row '{}' not found in '{}'", pk, info.name)))
    }

    fn submitted<'a>(info: &'a TableInfo, form: &FormValues) -> Result<Vec<(&'a Column, Option<String>)>, AppError> {
        let values = info
            .editable_columns()
            .map(|c| parse_submitted_value(form.get(&c.name), c).map(|v| (c, v)))
            .collect::<Result<Vec<_>, AppError>>()?;
        if values.is_empty() {
            return Err(AppError::Validation(format!("Table '{}' has no editable columns", info.name)));
        }
        Ok(values)
    }

    pub async fn add(&self, adapter: &dyn DatabaseAdapter, table: &str, form: &FormValues) -> Result<u64, AppError> {
        let info = self.table_info(adapter, table).await?;
        let values = Self::submitted(&info, form)?;

        let columns = values
            .iter()
            .map(|(c, _)| adapter.quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = values
            .iter()
            .enumerate()
            .map(|(i, (c, _))| adapter.placeholder(i + 1, Some(c)))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            adapter.quote_ident(&info.name),
            columns,
            placeholders
        );
        let params: Vec<Option<String>> = values.into_iter().map(|(_, v)| v).collect();

        let affected = adapter.execute(&sql, &params).await?;
        tracing::info!("Inserted {} row(s) into {}", affected, info.name);
        Ok(affected)
    }

    pub async fn edit(
        &self,
        adapter: &dyn DatabaseAdapter,
        table: &str,
        pk: &str,
        form: &FormValues,
    ) -> Result<u64, AppError> {
        let info = self.table_info(adapter, table).await?;
        let key = info.key_column()?;
        let values = Self::submitted(&info, form)?;

        let assignments = values
            .iter()
            .enumerate()
            .map(|(i, (c, _))| format!("{} = {}", adapter.quote_ident(&c.name), adapter.placeholder(i + 1, Some(c))))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = {}",
            adapter.quote_ident(&info.name),
            assignments,
            adapter.quote_ident(&key.name),
            adapter.placeholder(values.len() + 1, Some(key))
        );
        let mut params: Vec<Option<String>> = values.into_iter().map(|(_, v)| v).collect();
        params.push(Some(pk.to_string()));

        let affected = adapter.execute(&sql, &params).await?;
        tracing::info!("Updated {} row(s) in {} where {} = {}", affected, info.name, key.name, pk);
        Ok(affected)
    }

    pub async fn delete(&self, adapter: &dyn DatabaseAdapter, table: &str, pk: &str) -> Result<u64, AppError> {
        let info = self.table_info(adapter, table).await?;
        let key = info.key_column()?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = {}",
            adapter.quote_ident(&info.name),
            adapter.quote_ident(&key.name),
            adapter.placeholder(1, Some(key))
        );

        let affected = adapter.execute(&sql, &[Some(pk.to_string())]).await?;
        tracing::info!("Deleted {} row(s) from {} where {} = {}", affected, info.name, key.name, pk);
        Ok(affected)
    }
}

impl Default for CrudService {
    fn default() -> Self {
        Self::new(30)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::database::adapter::test_support::column;
    use crate::services::database::SqliteAdapter;
    use serde_json::json;
    use tempfile::NamedTempFile;

    fn adapter() -> (NamedTempFile, SqliteAdapter) {
        let file = NamedTempFile::new().unwrap();
        let conn = rusqlite::Connection::open(file.path()).unwrap();
        conn.execute_batch(
            "CREATE TABLE actor (
                actor_id INTEGER PRIMARY KEY,
                first_name TEXT NOT NULL,
                birth_date DATE,
                signed_at DATETIME,
                last_update TIMESTAMP DEFAULT CURRENT_TIMESTAMP
             );
             INSERT INTO actor (first_name, birth_date, signed_at) VALUES
                ('PENELOPE', '1970-03-01', '2006-02-15 04:34:33'),
                ('NICK', NULL, NULL);
             CREATE TABLE film_actor (actor_id INTEGER, film_id INTEGER);",
        )
        .unwrap();
        let adapter = SqliteAdapter::new(&format!("sqlite://{}", file.path().display())).unwrap();
        (file, adapter)
    }

    fn form(pairs: &[(&str, &str)]) -> FormValues {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_value_formatting() {
        let date = column("birth_date", "date", false);
        let datetime = column("signed_at", "timestamp without time zone", false);
        let text = column("name", "text", false);

        assert_eq!(format_field_value(&json!("2006-02-15T04:34:33"), &datetime), "2006-02-15T04:34");
        assert_eq!(format_field_value(&json!("2006-02-15 04:34:33"), &datetime), "2006-02-15T04:34");
        assert_eq!(format_field_value(&json!("1970-03-01"), &date), "1970-03-01");
        assert_eq!(format_field_value(&Value::Null, &text), "");
        assert_eq!(format_field_value(&json!(42), &text), "42");

        let raw = "2024-05-01T10:30".to_string();
        assert_eq!(
            parse_submitted_value(Some(&raw), &datetime).unwrap(),
            Some("2024-05-01T10:30:00".to_string())
        );
        assert_eq!(parse_submitted_value(Some(&"   ".to_string()), &text).unwrap(), None);
        assert_eq!(parse_submitted_value(None, &date).unwrap(), None);
        assert_eq!(
            parse_submitted_value(Some(&" ED ".to_string()), &text).unwrap(),
            Some("ED".to_string())
        );
    }

    #[tokio::test]
    async fn test_list_and_forms() {
        let (_file, adapter) = adapter();
        let crud = CrudService::default();

        let rows = crud.list(&adapter, "actor").await.unwrap();
        assert_eq!(rows.columns, vec!["actor_id", "first_name", "birth_date", "signed_at", "last_update"]);
        assert_eq!(rows.rows.len(), 2);

        let blank = crud.form_fields(&adapter, "actor", None).await.unwrap();
        let names: Vec<&str> = blank.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["first_name", "birth_date", "signed_at"]);
        assert!(blank.fields.iter().all(|f| f.value.is_empty()));
        assert!(!blank.is_edit);

        let edit = crud.form_fields(&adapter, "actor", Some("1")).await.unwrap();
        assert!(edit.is_edit);
        assert_eq!(edit.fields[0].value, "PENELOPE");
        assert_eq!(edit.fields[1], FormField {
            name: "birth_date".to_string(),
            value: "1970-03-01".to_string(),
            is_date: true,
            is_datetime: false,
        });
        assert_eq!(edit.fields[2].value, "2006-02-15T04:34");
        assert!(edit.fields[2].is_datetime);

        assert!(matches!(
            crud.form_fields(&adapter, "actor", Some("99")).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(matches!(crud.list(&adapter, "missing").await.unwrap_err(), AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_add_edit_delete() {
        let (_file, adapter) = adapter();
        let crud = CrudService::default();

        let added = crud
            .add(&adapter, "actor", &form(&[("first_name", " ED "), ("signed_at", "2024-05-01T10:30")]))
            .await
            .unwrap();
        assert_eq!(added, 1);

        let rows = crud.list(&adapter, "actor").await.unwrap();
        assert_eq!(rows.rows[2][1], json!("ED"));
        assert_eq!(rows.rows[2][2], Value::Null);
        assert_eq!(rows.rows[2][3], json!("2024-05-01T10:30:00"));

        let updated = crud
            .edit(&adapter, "actor", "3", &form(&[("first_name", "EDDIE"), ("birth_date", "1980-01-02")]))
            .await
            .unwrap();
        assert_eq!(updated, 1);
        let form = crud.form_fields(&adapter, "actor", Some("3")).await.unwrap();
        assert_eq!(form.fields[0].value, "EDDIE");
        assert_eq!(form.fields[1].value, "1980-01-02");
        assert_eq!(form.fields[2].value, "");

        assert_eq!(crud.delete(&adapter, "actor", "3").await.unwrap(), 1);
        assert_eq!(crud.list(&adapter, "actor").await.unwrap().rows.len(), 2);
    }

    #[tokio::test]
    async fn test_tables_without_primary_key_are_read_only() {
        let (_file, adapter) = adapter();
        let crud = CrudService::default();

        assert!(crud.list(&adapter, "film_actor").await.is_ok());
        let err = crud.delete(&adapter, "film_actor", "1").await.unwrap_err();
        assert_eq!(err.message(), "Table 'film_actor' has no primary key");
        assert!(crud.edit(&adapter, "film_actor", "1", &form(&[])).await.is_err());
    }
}
