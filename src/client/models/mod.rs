pub mod conversation;
pub mod message_view;
pub mod quick_prompt;
pub mod typing;

pub use conversation::*;
pub use message_view::*;
pub use quick_prompt::*;
pub use typing::*;
