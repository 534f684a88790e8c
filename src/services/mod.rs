pub mod auth_service;
pub mod chart;
pub mod connection_pool;
pub mod connection_string;
pub mod crud;
pub mod database; // Adapters for the supported vendors
pub mod embedding;
pub mod llm_service;
pub mod query_service;
pub mod rag_pipeline;
pub mod schema_introspector;
pub mod tools; // Chart tools and the /call client
pub mod transcription;
pub mod vector_store;

pub use auth_service::AuthService;
pub use connection_pool::*;
pub use crud::CrudService;
pub use llm_service::*;
pub use query_service::*;
pub use rag_pipeline::*;
pub use transcription::{Transcriber, WhisperTranscriber};
