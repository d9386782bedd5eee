//! Garmin SSO login
//!
//! Flow: fetch the embedded sign-in widget for a CSRF token, post the
//! credentials, pull the service ticket out of the success page, trade it for
//! an OAuth1 token, then trade that for an OAuth2 bearer token.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use reqwest::cookie::Jar;
use reqwest::header::{CONTENT_TYPE, REFERER, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;

use crate::client::api::API_USER_AGENT;
use crate::client::oauth1::{parse_oauth_response, OAuth1Signer};
use crate::client::tokens::{OAuth1Token, OAuth2Token, SessionTokens, DEFAULT_DOMAIN};
use crate::error::{Result, SyncError};

/// User agent of the Android app, expected by the OAuth service
const MOBILE_USER_AGENT: &str = "com.garmin.android.apps.connectmobile";

/// Consumer key/secret published for the Garmin Connect mobile app
const OAUTH_CONSUMER_URL: &str = "https://thegarth.s3.amazonaws.com/oauth_consumer.json";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct OAuthConsumer {
    consumer_key: String,
    consumer_secret: String,
}

/// Where each leg of the login flow lives
#[derive(Debug, Clone)]
pub struct SsoEndpoints {
    /// `https://sso.<domain>/sso`
    pub sso_base: String,
    /// `https://connectapi.<domain>`
    pub connect_api: String,
    pub consumer_url: String,
}

impl SsoEndpoints {
    pub fn for_domain(domain: &str) -> Self {
        Self {
            sso_base: format!("https://sso.{}/sso", domain),
            connect_api: format!("https://connectapi.{}", domain),
            consumer_url: OAUTH_CONSUMER_URL.to_string(),
        }
    }

    fn embed(&self) -> String {
        format!("{}/embed", self.sso_base)
    }
}

enum SigninOutcome {
    Ticket(String),
    MfaRequired,
}

/// SSO client; holds the cookie jar for one login attempt
pub struct SsoClient {
    http: Client,
    domain: String,
    endpoints: SsoEndpoints,
}

impl SsoClient {
    pub fn new(domain: Option<&str>) -> Result<Self> {
        let domain = domain.unwrap_or(DEFAULT_DOMAIN);
        Self::with_endpoints(domain, SsoEndpoints::for_domain(domain))
    }

    pub fn with_endpoints(domain: &str, endpoints: SsoEndpoints) -> Result<Self> {
        let http = Client::builder()
            .cookie_provider(Arc::new(Jar::default()))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(SyncError::Http)?;

        Ok(Self {
            http,
            domain: domain.to_string(),
            endpoints,
        })
    }

    /// Full credential login
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionTokens> {
        let (csrf, referer) = self.fetch_csrf().await?;

        let ticket = match self.submit_credentials(email, password, &csrf, &referer).await? {
            SigninOutcome::Ticket(ticket) => ticket,
            SigninOutcome::MfaRequired => return Err(SyncError::MfaRequired),
        };

        let consumer = self.fetch_consumer().await?;
        let oauth1 = self.preauthorize(&consumer, &ticket).await?;
        let oauth2 = self.exchange(&consumer, &oauth1).await?;

        Ok(SessionTokens { oauth1, oauth2 })
    }

    /// Mint a fresh OAuth2 token from a still-valid OAuth1 token
    pub async fn refresh(&self, oauth1: &OAuth1Token) -> Result<OAuth2Token> {
        let consumer = self.fetch_consumer().await?;
        self.exchange(&consumer, oauth1).await
    }

    fn signin_params(&self) -> Vec<(&'static str, String)> {
        let embed = self.endpoints.embed();
        vec![
            ("id", "gauth-widget".to_string()),
            ("embedWidget", "true".to_string()),
            ("gauthHost", embed.clone()),
            ("service", embed.clone()),
            ("source", embed.clone()),
            ("redirectAfterAccountLoginUrl", embed.clone()),
            ("redirectAfterAccountCreationUrl", embed),
        ]
    }

    async fn fetch_csrf(&self) -> Result<(String, String)> {
        // Prime the session cookies
        self.http
            .get(self.endpoints.embed())
            .query(&[
                ("id", "gauth-widget"),
                ("embedWidget", "true"),
                ("gauthHost", self.endpoints.sso_base.as_str()),
            ])
            .header(USER_AGENT, API_USER_AGENT)
            .send()
            .await
            .map_err(SyncError::Http)?
            .text()
            .await
            .map_err(SyncError::Http)?;

        let response = self
            .http
            .get(format!("{}/signin", self.endpoints.sso_base))
            .query(&self.signin_params())
            .header(USER_AGENT, API_USER_AGENT)
            .send()
            .await
            .map_err(SyncError::Http)?;

        let referer = response.url().to_string();
        let html = response.text().await.map_err(SyncError::Http)?;
        Ok((extract_csrf_token(&html)?, referer))
    }

    async fn submit_credentials(
        &self,
        email: &str,
        password: &str,
        csrf: &str,
        referer: &str,
    ) -> Result<SigninOutcome> {
        let form = [
            ("username", email),
            ("password", password),
            ("embed", "true"),
            ("_csrf", csrf),
        ];

        let response = self
            .http
            .post(format!("{}/signin", self.endpoints.sso_base))
            .query(&self.signin_params())
            .header(USER_AGENT, API_USER_AGENT)
            .header(REFERER, referer)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(&form)
            .send()
            .await
            .map_err(SyncError::Http)?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SyncError::RateLimited);
        }

        let html = response.text().await.map_err(SyncError::Http)?;
        let title = extract_title(&html)?;

        if title.contains("MFA") {
            Ok(SigninOutcome::MfaRequired)
        } else if title == "Success" {
            Ok(SigninOutcome::Ticket(extract_ticket(&html)?))
        } else {
            Err(SyncError::auth(format!("Login rejected ({})", title)))
        }
    }

    async fn fetch_consumer(&self) -> Result<OAuthConsumer> {
        self.http
            .get(&self.endpoints.consumer_url)
            .send()
            .await
            .map_err(SyncError::Http)?
            .json()
            .await
            .map_err(|e| SyncError::invalid_response(format!("Bad OAuth consumer: {}", e)))
    }

    /// OAuth requests go out without the SSO cookie jar
    fn bare_client(&self) -> Result<Client> {
        Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(SyncError::Http)
    }

    async fn preauthorize(&self, consumer: &OAuthConsumer, ticket: &str) -> Result<OAuth1Token> {
        let url = format!(
            "{}/oauth-service/oauth/preauthorized?ticket={}&login-url={}&accepts-mfa-tokens=true",
            self.endpoints.connect_api,
            ticket,
            self.endpoints.embed()
        );
        let auth = OAuth1Signer::new(&consumer.consumer_key, &consumer.consumer_secret)
            .sign("GET", &url, &[])?;

        let response = self
            .bare_client()?
            .get(&url)
            .header(USER_AGENT, MOBILE_USER_AGENT)
            .header("Authorization", auth)
            .send()
            .await
            .map_err(SyncError::Http)?;

        if !response.status().is_success() {
            return Err(SyncError::auth(format!(
                "Ticket exchange failed: {}",
                response.status()
            )));
        }

        let body = response.text().await.map_err(SyncError::Http)?;
        let mut params = parse_oauth_response(&body);

        let token = params
            .remove("oauth_token")
            .ok_or_else(|| SyncError::invalid_response("Missing oauth_token"))?;
        let secret = params
            .remove("oauth_token_secret")
            .ok_or_else(|| SyncError::invalid_response("Missing oauth_token_secret"))?;

        let mut oauth1 = OAuth1Token::new(token, secret).with_domain(&self.domain);
        if let Some(mfa) = params.remove("mfa_token") {
            oauth1 = oauth1.with_mfa(mfa, None);
        }
        Ok(oauth1)
    }

    async fn exchange(&self, consumer: &OAuthConsumer, oauth1: &OAuth1Token) -> Result<OAuth2Token> {
        let url = format!(
            "{}/oauth-service/oauth/exchange/user/2.0",
            self.endpoints.connect_api
        );

        let body: Vec<(&str, &str)> = oauth1
            .mfa_token
            .as_deref()
            .map(|mfa| vec![("mfa_token", mfa)])
            .unwrap_or_default();

        let auth = OAuth1Signer::new(&consumer.consumer_key, &consumer.consumer_secret)
            .with_token(&oauth1.oauth_token, &oauth1.oauth_token_secret)
            .sign("POST", &url, &body)?;

        let response = self
            .bare_client()?
            .post(&url)
            .header(USER_AGENT, MOBILE_USER_AGENT)
            .header("Authorization", auth)
            .form(&body)
            .send()
            .await
            .map_err(SyncError::Http)?;

        if !response.status().is_success() {
            return Err(SyncError::auth(format!(
                "OAuth2 exchange failed: {}",
                response.status()
            )));
        }

        let mut token: OAuth2Token = response
            .json()
            .await
            .map_err(|e| SyncError::invalid_response(format!("Bad OAuth2 token: {}", e)))?;
        token.stamp_expiry(chrono::Utc::now().timestamp());
        Ok(token)
    }
}

fn capture(html: &str, re: &'static OnceLock<Regex>, pattern: &str, what: &str) -> Result<String> {
    re.get_or_init(|| Regex::new(pattern).expect("static regex"))
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| SyncError::invalid_response(format!("Could not find {}", what)))
}

fn extract_csrf_token(html: &str) -> Result<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    capture(html, &RE, r#"name="_csrf"\s+value="([^"]+)""#, "CSRF token")
}

fn extract_title(html: &str) -> Result<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    capture(html, &RE, r"<title>([^<]+)</title>", "page title")
}

fn extract_ticket(html: &str) -> Result<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    capture(html, &RE, r#"embed\?ticket=([^"]+)""#, "service ticket")
}
