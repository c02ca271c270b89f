pub mod config;
pub mod database;
pub mod sqlite_store;
pub mod store;

pub use config::*;
pub use database::*;
pub use sqlite_store::*;
pub use store::*;
