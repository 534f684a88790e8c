pub mod chart;
pub mod connection;
pub mod metadata;
pub mod query;
pub mod table;
pub mod tool;
pub mod user;

pub use chart::*;
pub use connection::*;
pub use metadata::*;
pub use query::*;
pub use table::*;
pub use tool::*;
pub use user::*;
