//! Bearer-authenticated access to the Garmin Connect API

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::client::tokens::OAuth2Token;
use crate::error::{Result, SyncError};

/// User agent for Connect API requests
pub(crate) const API_USER_AGENT: &str = "GCM-iOS-5.7.2.1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Thin JSON client over `connectapi.<domain>`
#[derive(Clone)]
pub struct ConnectApi {
    client: Client,
    base_url: String,
}

impl ConnectApi {
    /// Create a client for the given Garmin domain (`garmin.com`, `garmin.cn`)
    pub fn new(domain: &str) -> Result<Self> {
        Self::with_base_url(&format!("https://connectapi.{}", domain))
    }

    /// Create a client against an arbitrary base URL (mock servers in tests)
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(SyncError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn build_headers(&self, token: &OAuth2Token) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(API_USER_AGENT));
        let auth = HeaderValue::from_str(&token.authorization_header())
            .map_err(|_| SyncError::auth("Access token contains invalid header characters"))?;
        headers.insert(AUTHORIZATION, auth);
        Ok(headers)
    }

    /// Authenticated GET returning the raw response after status checks
    pub async fn get(&self, token: &OAuth2Token, path: &str) -> Result<Response> {
        let url = self.build_url(path);
        tracing::debug!(%url, "GET");

        let response = self
            .client
            .get(&url)
            .headers(self.build_headers(token)?)
            .send()
            .await
            .map_err(SyncError::Http)?;

        check_status(response, path).await
    }

    /// Authenticated GET, deserializing the JSON body into `T`
    pub async fn get_json<T: DeserializeOwned>(&self, token: &OAuth2Token, path: &str) -> Result<T> {
        let response = self.get(token, path).await?;
        let body = response.text().await.map_err(SyncError::Http)?;
        // An empty body (204) means no data for that day
        let body = if body.trim().is_empty() { "null" } else { body.as_str() };
        serde_json::from_str(body).map_err(|e| {
            SyncError::invalid_response(format!("Unexpected JSON from {}: {}", path, e))
        })
    }
}

async fn check_status(response: Response, path: &str) -> Result<Response> {
    let status = response.status();
    match status {
        StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED | StatusCode::NO_CONTENT => {
            Ok(response)
        }
        StatusCode::UNAUTHORIZED => Err(SyncError::NotAuthenticated),
        StatusCode::TOO_MANY_REQUESTS => Err(SyncError::RateLimited),
        StatusCode::NOT_FOUND => Err(SyncError::NotFound(path.to_string())),
        _ => {
            let message = response.text().await.unwrap_or_default();
            Err(SyncError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}
