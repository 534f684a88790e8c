pub mod auth;
pub mod chat;
pub mod connection;
pub mod dashboard;
pub mod table;
pub mod tools;
