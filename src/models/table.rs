use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRows {
    pub table_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// One editable input of the add/edit form
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormField {
    pub name: String,
    pub value: String,
    pub is_date: bool,
    pub is_datetime: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableForm {
    pub table_name: String,
    pub fields: Vec<FormField>,
    pub is_edit: bool,
    pub pk: Option<String>,
}

/// Submitted form values keyed by column name
pub type FormValues = HashMap<String, String>;
