#[cfg(feature = "reqwest")]
pub mod auth;

pub mod firebase;

pub mod token_store;

pub mod transport;

pub mod types;

#[cfg(feature = "reqwest")]
pub use auth::Authenticator;
