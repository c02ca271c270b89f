pub mod error;
pub mod ids;
pub mod models;

pub use error::*;
pub use ids::*;
pub use models::*;
