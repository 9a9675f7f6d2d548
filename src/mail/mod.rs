pub mod decoders;
pub mod gmail;
pub mod paginator;
pub mod provider;
pub mod query;

pub use gmail::GmailClient;
pub use paginator::SearchPaginator;
pub use provider::{Mailbox, ProviderError};
pub use query::SearchQuery;
