// Propsearch client - library root

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod http_client;
pub mod models;

pub use auth::Session;
pub use error::{ApiError, ErrorEnvelope};
pub use http_client::{ApiClient, RequestOptions};
