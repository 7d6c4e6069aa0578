//! Google Search Console access: authentication, the query client and
//! an offline stand-in.

pub mod auth;
pub mod client;
pub(crate) mod common;
pub mod mock;

pub use auth::{select_credentials, AuthError, Authenticator, TokenSource};
pub use client::SearchConsoleClient;
pub use mock::MockSource;
