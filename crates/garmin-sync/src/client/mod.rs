//! Garmin Connect client: SSO login, OAuth token handling and API access

pub mod api;
mod connect;
pub mod oauth1;
pub mod sso;
pub mod tokens;

pub use api::ConnectApi;
pub use connect::GarminConnect;
pub use oauth1::OAuth1Signer;
pub use sso::{SsoClient, SsoEndpoints};
pub use tokens::{OAuth1Token, OAuth2Token, SessionTokens};
