use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: String,
    /// Vendor type name usable in a cast (postgres `udt_name`), same as `data_type` elsewhere
    pub native_type: String,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub default_value: Option<String>,
    pub comment: Option<String>,
}

impl Column {
    fn type_lower(&self) -> String {
        self.data_type.to_lowercase()
    }

    pub fn is_date(&self) -> bool {
        self.type_lower() == "date"
    }

    pub fn is_datetime(&self) -> bool {
        let t = self.type_lower();
        t.starts_with("timestamp") || t.starts_with("datetime")
    }
}

/// Plain-text description of one table, the unit the retriever embeds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchemaDocument {
    pub table: String,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(data_type: &str) -> Column {
        Column {
            name: "c".to_string(),
            data_type: data_type.to_string(),
            native_type: data_type.to_string(),
            is_nullable: true,
            is_primary_key: false,
            default_value: None,
            comment: None,
        }
    }

    #[test]
    fn test_temporal_classification() {
        assert!(column("date").is_date());
        assert!(!column("date").is_datetime());
        assert!(column("timestamp without time zone").is_datetime());
        assert!(column("DATETIME").is_datetime());
        assert!(!column("time").is_datetime());
    }
}
