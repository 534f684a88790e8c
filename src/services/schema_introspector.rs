use std::fmt::Write;

use crate::api::middleware::AppError;
use crate::models::{Column, SchemaDocument, Table};
use crate::services::database::DatabaseAdapter;

/// Every table of the target database with its columns, in table-name order
pub async fn introspect_tables(adapter: &dyn DatabaseAdapter) -> Result<Vec<Table>, AppError> {
    let mut tables = Vec::new();
    for name in adapter.list_tables().await? {
        let columns = adapter.get_columns(&name).await?;
        tables.push(Table { name, columns });
    }
    tracing::debug!("Introspected {} tables", tables.len());
    Ok(tables)
}

/// One plain-text document per table, the unit the retriever embeds
pub fn table_document(table: &Table) -> SchemaDocument {
    let mut content = format!("Table: {}\nColumns:\n", table.name);
    for Column {
        name,
        data_type,
        comment,
        ..
    } in &table.columns
    {
        let _ = write!(content, " - {} ({})", name, data_type);
        if let Some(comment) = comment.as_deref().filter(|c| !c.trim().is_empty()) {
            let _ = write!(content, " -- {}", comment.trim());
        }
        content.push('\n');
    }
    SchemaDocument {
        table: table.name.clone(),
        content,
    }
}

pub async fn build_schema_documents(
    adapter: &dyn DatabaseAdapter,
) -> Result<Vec<SchemaDocument>, AppError> {
    let tables = introspect_tables(adapter).await?;
    Ok(tables.iter().map(table_document).collect())
}

/// Compact schema, one `Table: t Columns: a, b` line per table
pub fn tables_to_text(tables: &[Table]) -> String {
    tables
        .iter()
        .map(|t| {
            let columns = t.columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>();
            format!("Table: {} Columns: {}", t.name, columns.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DbType, QueryResult};
    use crate::services::database::adapter::test_support::{column, StaticAdapter};

    fn adapter() -> StaticAdapter {
        let mut title = column("title", "character varying", false);
        title.comment = Some("Film title".to_string());
        StaticAdapter {
            db_type: DbType::Postgres,
            tables: vec![
                ("actor".to_string(), vec![column("actor_id", "integer", true), column("first_name", "text", false)]),
                ("film".to_string(), vec![column("film_id", "integer", true), title]),
            ],
            result: QueryResult::default(),
        }
    }

    #[tokio::test]
    async fn test_schema_documents() {
        let docs = build_schema_documents(&adapter()).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].table, "actor");
        assert_eq!(
            docs[1].content,
            "Table: film\nColumns:\n - film_id (integer)\n - title (character varying) -- Film title\n"
        );
    }

    #[tokio::test]
    async fn test_tables_to_text() {
        let text = tables_to_text(&introspect_tables(&adapter()).await.unwrap());
        assert_eq!(
            text,
            "Table: actor Columns: actor_id, first_name\nTable: film Columns: film_id, title"
        );
    }
}
