pub mod auth;
pub mod config;
pub mod domain;
pub mod mail;
pub mod scan;
pub mod shutdown;
pub mod store;
