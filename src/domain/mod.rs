pub mod credential;
pub mod message;

pub use credential::Credential;
pub use message::{MessageDetail, MessageId, MessagePage, MessagePart, MessageSummary, PartBody};
