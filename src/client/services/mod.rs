pub mod inbox_service;
pub mod privacy;
pub mod realtime;

pub use inbox_service::*;
pub use privacy::*;
pub use realtime::*;
