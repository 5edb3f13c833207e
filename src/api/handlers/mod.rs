pub mod error;
pub mod health;
pub mod sites;
pub mod types;

pub use self::error::ApiError;
