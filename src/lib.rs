pub mod client;
pub mod common;
pub mod server;
pub mod utils;
