//! Garmin Connect as a [`HealthSource`]

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::client::api::ConnectApi;
use crate::client::sso::SsoClient;
use crate::client::tokens::{OAuth2Token, SessionTokens};
use crate::error::{Result, SyncError};
use crate::models::{ActivitySummary, DailySummary, HeartRateDay, Payload, SleepData, StressDay};
use crate::sync::HealthSource;

/// Page size for the daily activity search; more than anyone records in a day
const ACTIVITY_PAGE_SIZE: u32 = 100;

/// An authenticated Garmin Connect session for one account
pub struct GarminConnect {
    api: ConnectApi,
    sso: SsoClient,
    email: String,
    password: String,
    tokens: Option<SessionTokens>,
    display_name: Option<String>,
}

impl GarminConnect {
    /// Session against `connectapi.<domain>` and `sso.<domain>`
    pub fn new(domain: &str, email: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        Ok(Self::with_clients(
            ConnectApi::new(domain)?,
            SsoClient::new(Some(domain))?,
            email,
            password,
        ))
    }

    pub fn with_clients(
        api: ConnectApi,
        sso: SsoClient,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            api,
            sso,
            email: email.into(),
            password: password.into(),
            tokens: None,
            display_name: None,
        }
    }

    /// Start from tokens cached by an earlier run
    pub fn with_tokens(mut self, tokens: Option<SessionTokens>) -> Self {
        self.tokens = tokens;
        self
    }

    /// Tokens of the current session, to be cached for the next run
    pub fn tokens(&self) -> Option<&SessionTokens> {
        self.tokens.as_ref()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    fn token(&self) -> Result<&OAuth2Token> {
        self.tokens
            .as_ref()
            .map(|t| &t.oauth2)
            .ok_or(SyncError::NotAuthenticated)
    }

    fn profile_name(&self) -> Result<&str> {
        self.display_name.as_deref().ok_or(SyncError::NotAuthenticated)
    }

    /// Bring cached tokens up to date, refreshing the access token if needed
    async fn resume(&self, cached: SessionTokens) -> Result<SessionTokens> {
        if !cached.oauth2.is_expired() {
            return Ok(cached);
        }
        debug!("access token expired, refreshing");
        let oauth2 = self.sso.refresh(&cached.oauth1).await?;
        Ok(SessionTokens {
            oauth1: cached.oauth1,
            oauth2,
        })
    }

    /// Resume the cached session. `Ok(false)` means it is unusable and a
    /// password login is needed.
    async fn try_cached_session(&mut self) -> Result<bool> {
        let Some(cached) = self.tokens.take() else {
            return Ok(false);
        };

        match self.resume(cached).await {
            Ok(tokens) => self.tokens = Some(tokens),
            Err(e) => {
                warn!(error = %e, "cached session could not be refreshed");
                return Ok(false);
            }
        }

        match self.fetch_display_name().await {
            Ok(()) => Ok(true),
            Err(e) if e.is_session_error() => {
                warn!(error = %e, "cached session was rejected");
                self.tokens = None;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_display_name(&mut self) -> Result<()> {
        let profile: serde_json::Value = self
            .api
            .get_json(self.token()?, "/userprofile-service/socialProfile")
            .await?;

        let name = profile
            .get("displayName")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SyncError::invalid_response("Could not get display name"))?;

        self.display_name = Some(name.to_string());
        Ok(())
    }

    async fn fetch<T>(&self, path: &str) -> Result<Payload<T>>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        let raw: serde_json::Value = self.api.get_json(self.token()?, path).await?;
        Payload::from_value(raw)
    }
}

#[async_trait]
impl HealthSource for GarminConnect {
    async fn login(&mut self) -> Result<()> {
        if self.try_cached_session().await? {
            info!("resumed cached Garmin session");
            return Ok(());
        }

        info!(email = %self.email, "logging in with password");
        let tokens = self.sso.login(&self.email, &self.password).await?;
        self.tokens = Some(tokens);
        self.fetch_display_name().await
    }

    async fn daily_summary(&mut self, date: NaiveDate) -> Result<Payload<DailySummary>> {
        let path = format!(
            "/usersummary-service/usersummary/daily/{}?calendarDate={}",
            self.profile_name()?,
            date
        );
        self.fetch(&path).await
    }

    async fn heart_rate(&mut self, date: NaiveDate) -> Result<Payload<HeartRateDay>> {
        let path = format!(
            "/wellness-service/wellness/dailyHeartRate/{}?date={}",
            self.profile_name()?,
            date
        );
        self.fetch(&path).await
    }

    async fn sleep(&mut self, date: NaiveDate) -> Result<Payload<SleepData>> {
        let path = format!(
            "/wellness-service/wellness/dailySleepData/{}?date={}&nonSleepBufferMinutes=60",
            self.profile_name()?,
            date
        );
        self.fetch(&path).await
    }

    async fn activities(&mut self, date: NaiveDate) -> Result<Vec<Payload<ActivitySummary>>> {
        let path = format!(
            "/activitylist-service/activities/search/activities?startDate={}&endDate={}&start=0&limit={}",
            date, date, ACTIVITY_PAGE_SIZE
        );
        let raw: serde_json::Value = self.api.get_json(self.token()?, &path).await?;

        match raw {
            serde_json::Value::Null => Ok(Vec::new()),
            serde_json::Value::Array(items) => items.into_iter().map(Payload::from_value).collect(),
            _ => Err(SyncError::invalid_response("Expected an activity list")),
        }
    }

    async fn stress(&mut self, date: NaiveDate) -> Result<Payload<StressDay>> {
        self.fetch(&format!("/wellness-service/wellness/dailyStress/{}", date))
            .await
    }
}
