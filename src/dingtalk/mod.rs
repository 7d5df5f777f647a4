//! DingTalk open API client
//!
//! One `reqwest` client shared by:
//! - `NotableStore`: the [`TableStore`](crate::gateway::TableStore) over Notable records
//! - `WorkflowForms`: process instance details used to enrich form fields
//! - `failed_events`: the push-failed callback feed replayed at startup
//!
//! Access tokens are cached until shortly before expiry and dropped on any
//! authentication failure so the next call fetches a new one.

pub mod auth;
pub mod callback;
pub mod notable;
pub mod workflow;

use std::time::Duration;

use reqwest::{Client, Method, Response, Url};
use serde_json::{Value, json};
use tokio::sync::Mutex;

pub use auth::{CachedToken, TokenResponse};
pub use callback::{FailedEventBatch, parse_failed_events};
pub use notable::NotableStore;
pub use workflow::WorkflowForms;

use crate::config::DingTalkConfig;
use crate::error::{Result, SyncError};
use crate::gateway::{GatewayError, parse_retry_after};

/// Header carrying the access token on v1.0 calls
const TOKEN_HEADER: &str = "x-acs-dingtalk-access-token";

/// oapi errcodes meaning the token is invalid or expired
const OAPI_AUTH_ERRCODES: [i64; 2] = [40014, 42001];

/// oapi errcode for "system busy"
const OAPI_BUSY_ERRCODE: i64 = -1;

/// Authenticated access to api.dingtalk.com and oapi.dingtalk.com
pub struct DingTalkClient {
    client: Client,
    app_key: String,
    app_secret: String,
    api_base: Url,
    oapi_base: Url,
    token: Mutex<Option<CachedToken>>,
}

impl DingTalkClient {
    pub fn from_config(config: &DingTalkConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| SyncError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let parse = |name: &str, raw: &str| {
            Url::parse(raw).map_err(|e| SyncError::Config(format!("dingtalk.{} is not a URL ({}): {}", name, raw, e)))
        };

        Ok(Self {
            client,
            app_key: config.app_key.clone(),
            app_secret: config.app_secret.clone(),
            api_base: parse("api_base_url", &config.api_base_url)?,
            oapi_base: parse("oapi_base_url", &config.oapi_base_url)?,
            token: Mutex::new(None),
        })
    }

    /// A valid access token, fetching a new one when the cache is stale
    pub async fn access_token(&self) -> std::result::Result<String, GatewayError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        let url = self.api_url(&["v1.0", "oauth2", "accessToken"])?;
        let response = self
            .client
            .post(url)
            .json(&json!({ "appKey": self.app_key, "appSecret": self.app_secret }))
            .send()
            .await?;
        let body = classify_response(response).await?;
        let token: TokenResponse =
            serde_json::from_value(body).map_err(|e| GatewayError::InvalidResponse(format!("access token: {}", e)))?;

        log::debug!("Fetched DingTalk access token (expires in {:?}s)", token.expire_in);
        let token = CachedToken::from_response(token);
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    /// Forget the cached token
    pub async fn invalidate_token(&self) {
        if self.token.lock().await.take().is_some() {
            log::info!("Dropped cached DingTalk access token");
        }
    }

    /// Build a v1.0 URL from path segments; segments are percent-encoded
    pub fn api_url(&self, segments: &[&str]) -> std::result::Result<Url, GatewayError> {
        join_segments(&self.api_base, segments)
    }

    /// Build an oapi URL from path segments
    pub fn oapi_url(&self, segments: &[&str]) -> std::result::Result<Url, GatewayError> {
        join_segments(&self.oapi_base, segments)
    }

    /// Call a v1.0 endpoint with the token header and return its JSON body
    pub async fn call_api(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> std::result::Result<Value, GatewayError> {
        let token = self.access_token().await?;
        let mut request = self.client.request(method, url).header(TOKEN_HEADER, token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let result = match request.send().await {
            Ok(response) => classify_response(response).await,
            Err(e) => Err(GatewayError::from(e)),
        };
        if matches!(&result, Err(e) if e.is_auth()) {
            self.invalidate_token().await;
        }
        result
    }

    /// Call a legacy oapi endpoint (token in the query) and check `errcode`
    pub async fn call_oapi(&self, mut url: Url) -> std::result::Result<Value, GatewayError> {
        let token = self.access_token().await?;
        url.query_pairs_mut().append_pair("access_token", &token);

        let response = self.client.get(url).send().await?;
        let body = classify_response(response).await?;
        let result = check_oapi_errcode(body);
        if matches!(&result, Err(e) if e.is_auth()) {
            self.invalidate_token().await;
        }
        result
    }
}

impl std::fmt::Debug for DingTalkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DingTalkClient")
            .field("app_key", &self.app_key)
            .field("api_base", &self.api_base.as_str())
            .field("oapi_base", &self.oapi_base.as_str())
            .finish()
    }
}

fn join_segments(base: &Url, segments: &[&str]) -> std::result::Result<Url, GatewayError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| GatewayError::InvalidResponse(format!("base URL cannot take a path: {}", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Map an HTTP response to its JSON body or a classified error
async fn classify_response(response: Response) -> std::result::Result<Value, GatewayError> {
    let status = response.status();
    if status.is_success() {
        let body: Value = response.json().await?;
        return check_body_errcode(body);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|h| h.to_str().ok())
        .and_then(parse_retry_after);
    let text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
    Err(classify_status(status.as_u16(), text, retry_after))
}

/// Classify a failed status; DingTalk reports QPS throttling as 403
fn classify_status(status: u16, body: String, retry_after: Option<Duration>) -> GatewayError {
    if status == 403 && body.contains("QpsLimit") {
        return GatewayError::RateLimited { retry_after };
    }
    GatewayError::from_status(status, body, retry_after)
}

/// A 2xx v1.0 body can still carry a non-zero `errcode`
fn check_body_errcode(body: Value) -> std::result::Result<Value, GatewayError> {
    match body.get("errcode").and_then(Value::as_i64) {
        Some(code) if code != 0 => Err(oapi_error(code, &body)),
        _ => Ok(body),
    }
}

fn check_oapi_errcode(body: Value) -> std::result::Result<Value, GatewayError> {
    match body.get("errcode").and_then(Value::as_i64) {
        None | Some(0) => Ok(body),
        Some(code) => Err(oapi_error(code, &body)),
    }
}

fn oapi_error(code: i64, body: &Value) -> GatewayError {
    let message = format!(
        "errcode {}: {}",
        code,
        body.get("errmsg").and_then(Value::as_str).unwrap_or("unknown error")
    );
    if code == OAPI_BUSY_ERRCODE {
        GatewayError::Server { status: 200, message }
    } else if OAPI_AUTH_ERRCODES.contains(&code) {
        GatewayError::Auth(message)
    } else {
        GatewayError::Rejected { status: 200, message }
    }
}
