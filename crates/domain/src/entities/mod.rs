pub mod connection;
pub mod message;
pub mod token;

pub use connection::ConnectionInfo;
pub use message::ChatMessage;
pub use token::{Claims, TokenError, UserRole};
