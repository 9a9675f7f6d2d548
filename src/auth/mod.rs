pub mod callback;
pub mod oauth;
pub mod token_manager;
pub mod token_store;

pub use oauth::AuthorizationFlow;
pub use token_manager::{TokenManager, TokenSource};
pub use token_store::TokenStore;
