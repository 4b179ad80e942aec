//! Client for the remote token service.
//!
//! Stateless: callers decide what to persist from the returned values.

use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::config::Config;
use crate::error::{AuthError, Result, TypeAssistError, INVALID_TOKEN};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub email: String,
    pub remaining_credits: u64,
    pub total_credits: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditUse {
    pub remaining_credits: u64,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub remaining_credits: u64,
    pub total_credits: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CredentialRequest<'a> {
    token: &'a str,
    device_id: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ApiResponse {
    valid: bool,
    success: bool,
    email: Option<String>,
    remaining_credits: Option<u64>,
    total_credits: Option<u64>,
    message: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VerificationClient {
    http: Client,
    base_url: String,
}

impl VerificationClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TypeAssistError::Auth(AuthError::network(e.to_string())))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.api_url.clone(), config.request_timeout)
    }

    /// `POST /api/token/verify`
    pub async fn verify(&self, token: &str, device_id: &str) -> std::result::Result<Verification, AuthError> {
        let url = self.endpoint(&["verify"])?;
        let body = self.post(url, token, device_id).await.inspect_err(|e| {
            tracing::warn!(kind = %e.kind(), "Token verification failed");
        })?;

        if body.valid || body.success {
            Ok(Verification {
                email: body.email.unwrap_or_default(),
                remaining_credits: body.remaining_credits.unwrap_or(0),
                total_credits: body.total_credits,
            })
        } else {
            Err(AuthError::InvalidToken(
                body.error.unwrap_or_else(|| INVALID_TOKEN.to_string()),
            ))
        }
    }

    /// `POST /api/token/use-credit`: deducts one credit server-side.
    pub async fn use_credit(&self, token: &str, device_id: &str) -> std::result::Result<CreditUse, AuthError> {
        let url = self.endpoint(&["use-credit"])?;
        tracing::debug!(
            has_token = !token.is_empty(),
            token_len = token.len(),
            has_device_id = !device_id.is_empty(),
            "Using credit"
        );
        let body = self.post(url, token, device_id).await.inspect_err(|e| {
            tracing::warn!(kind = %e.kind(), "Credit usage failed");
        })?;

        if body.success {
            Ok(CreditUse {
                remaining_credits: body.remaining_credits.unwrap_or(0),
                message: body.message,
            })
        } else {
            Err(AuthError::Rejected {
                status: 200,
                message: body.error.unwrap_or_else(|| "Failed to use credit".to_string()),
            })
        }
    }

    /// `GET /api/token/balance/{token}`
    pub async fn balance(&self, token: &str) -> std::result::Result<Balance, AuthError> {
        let url = self.endpoint(&["balance", token])?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(transport_error)?;
        let body = read_body(response).await.inspect_err(|e| {
            tracing::warn!(kind = %e.kind(), "Balance check failed");
        })?;

        if body.success {
            Ok(Balance {
                remaining_credits: body.remaining_credits.unwrap_or(0),
                total_credits: body.total_credits,
            })
        } else {
            Err(AuthError::Rejected {
                status: 200,
                message: body.error.unwrap_or_else(|| "Failed to get balance".to_string()),
            })
        }
    }

    async fn post(&self, url: Url, token: &str, device_id: &str) -> std::result::Result<ApiResponse, AuthError> {
        let response = self
            .http
            .post(url)
            .json(&CredentialRequest { token, device_id })
            .send()
            .await
            .map_err(transport_error)?;
        read_body(response).await
    }

    /// `{base_url}/api/token/<segments>` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> std::result::Result<Url, AuthError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| AuthError::network(format!("invalid API URL '{}': {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| AuthError::network(format!("API URL '{}' cannot have a path", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "token"])
            .extend(segments);
        Ok(url)
    }
}

fn transport_error(error: reqwest::Error) -> AuthError {
    tracing::debug!(error = %error, timeout = error.is_timeout(), connect = error.is_connect(), "Request got no response");
    AuthError::network(error.to_string())
}

impl ApiResponse {
    /// Field-by-field read that keeps whatever is well-typed.
    fn salvage(value: &Value) -> Self {
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
        let count = |key: &str| value.get(key).and_then(Value::as_u64);
        let flag = |key: &str| value.get(key).and_then(Value::as_bool).unwrap_or(false);
        Self {
            valid: flag("valid"),
            success: flag("success"),
            email: text("email"),
            remaining_credits: count("remainingCredits"),
            total_credits: count("totalCredits"),
            message: text("message"),
            error: text("error"),
        }
    }
}

async fn read_body(response: Response) -> std::result::Result<ApiResponse, AuthError> {
    let status = response.status();
    let body = match response.json::<Value>().await {
        Ok(value) => serde_json::from_value::<ApiResponse>(value.clone()).unwrap_or_else(|e| {
            tracing::warn!(%status, error = %e, "Response body has unexpected field types");
            ApiResponse::salvage(&value)
        }),
        Err(e) => {
            tracing::warn!(%status, error = %e, "Response body was not JSON");
            ApiResponse::default()
        }
    };

    if status.is_success() {
        Ok(body)
    } else {
        Err(AuthError::from_status(status.as_u16(), body.error))
    }
}
