// Typed endpoint groups built on top of ApiClient

pub mod auth;
pub mod properties;

pub use auth::AuthApi;
pub use properties::PropertiesApi;
