//! OAuth1 (HMAC-SHA1) request signing
//!
//! Garmin's OAuth service still speaks OAuth1 for the ticket exchange and for
//! minting OAuth2 tokens, so both calls need a signed `Authorization` header.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::Rng;
use sha1::Sha1;
use url::Url;

use crate::error::{Result, SyncError};

/// RFC 3986 unreserved characters stay literal; everything else is escaped.
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Signs requests with consumer credentials and, once known, a user token
#[derive(Debug, Clone)]
pub struct OAuth1Signer {
    consumer_key: String,
    consumer_secret: String,
    token: Option<(String, String)>,
}

impl OAuth1Signer {
    pub fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            token: None,
        }
    }

    /// Attach user token credentials (`oauth_token`, `oauth_token_secret`)
    pub fn with_token(mut self, token: impl Into<String>, secret: impl Into<String>) -> Self {
        self.token = Some((token.into(), secret.into()));
        self
    }

    /// Build the `Authorization` header for a request.
    ///
    /// Query parameters embedded in `url` and any form `body_params` are
    /// folded into the signature base string.
    pub fn sign(&self, method: &str, url: &str, body_params: &[(&str, &str)]) -> Result<String> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        self.sign_at(method, url, body_params, &timestamp, &nonce())
    }

    pub(crate) fn sign_at(
        &self,
        method: &str,
        url: &str,
        body_params: &[(&str, &str)],
        timestamp: &str,
        nonce: &str,
    ) -> Result<String> {
        let parsed = Url::parse(url)
            .map_err(|e| SyncError::invalid_param(format!("Cannot sign URL {}: {}", url, e)))?;
        let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();
        let base_url = format!(
            "{}://{}{}{}",
            parsed.scheme(),
            parsed.host_str().unwrap_or_default(),
            port,
            parsed.path()
        );

        let mut header_params: BTreeMap<String, String> = BTreeMap::new();
        header_params.insert("oauth_consumer_key".into(), self.consumer_key.clone());
        header_params.insert("oauth_nonce".into(), nonce.to_string());
        header_params.insert("oauth_signature_method".into(), "HMAC-SHA1".into());
        header_params.insert("oauth_timestamp".into(), timestamp.to_string());
        header_params.insert("oauth_version".into(), "1.0".into());
        if let Some((token, _)) = &self.token {
            header_params.insert("oauth_token".into(), token.clone());
        }

        let mut signed_params = header_params.clone();
        signed_params.extend(
            parsed
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned())),
        );
        signed_params.extend(
            body_params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );

        let signature = self.signature(method, &base_url, &signed_params);
        header_params.insert("oauth_signature".into(), signature);

        let fields: Vec<String> = header_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, encode(v)))
            .collect();
        Ok(format!("OAuth {}", fields.join(", ")))
    }

    fn signature(&self, method: &str, base_url: &str, params: &BTreeMap<String, String>) -> String {
        let param_string = params
            .iter()
            .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let base_string = format!(
            "{}&{}&{}",
            method.to_uppercase(),
            encode(base_url),
            encode(&param_string)
        );

        let token_secret = self.token.as_ref().map(|(_, s)| s.as_str()).unwrap_or("");
        let key = format!("{}&{}", encode(&self.consumer_secret), encode(token_secret));

        let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes())
            .expect("HMAC accepts keys of any size");
        mac.update(base_string.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }
}

fn encode(s: &str) -> String {
    utf8_percent_encode(s, OAUTH_ENCODE_SET).to_string()
}

fn nonce() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Parse an OAuth1 form-encoded response body (`k=v&k2=v2`)
pub fn parse_oauth_response(body: &str) -> BTreeMap<String, String> {
    body.trim()
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            Some((
                urlencoding::decode(key).ok()?.into_owned(),
                urlencoding::decode(value).ok()?.into_owned(),
            ))
        })
        .collect()
}
