// Data models for the property-search API

pub mod auth;
pub mod property;

pub use auth::{LoginRequest, RegisterRequest, TokenResponse, UserProfile};
pub use property::{PropertyCount, PropertyFilter, PropertySummary, ShortListing};
