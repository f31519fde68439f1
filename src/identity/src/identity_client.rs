// Copyright 2025 Azure Identity for Rust Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The HTTP client used by all the credentials.
//!
//! Requests are grouped by correlation id, so cancelling a token request
//! aborts exactly the HTTP requests issued on its behalf.

use crate::Result;
use crate::authority::{DEFAULT_AUTHORITY_HOST, token_endpoint_suffix};
use crate::constants::{NO_CORRELATION_ID, REFRESH_TOKEN_GRANT_TYPE, SDK_VERSION};
use crate::errors::{CredentialsError, is_retryable};
use crate::retry::ExponentialBackoff;
use crate::token::{AccessToken, now_millis, parse_date_millis};
use base64::Engine as _;
use http::{HeaderMap, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const ABORTED_MESSAGE: &str = "The operation was aborted.";

type AbortControllers = Arc<Mutex<HashMap<String, Vec<(u64, CancellationToken)>>>>;

#[derive(Clone, Debug)]
pub(crate) struct IdentityClient {
    inner: reqwest::Client,
    authority_host: String,
    backoff: ExponentialBackoff,
    allow_logging_account_identifiers: bool,
    abort_controllers: AbortControllers,
    next_id: Arc<AtomicU64>,
}

pub(crate) struct Builder {
    authority_host: Option<String>,
    allow_insecure_connection: bool,
    allow_logging_account_identifiers: bool,
    backoff: ExponentialBackoff,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            authority_host: None,
            allow_insecure_connection: false,
            allow_logging_account_identifiers: false,
            backoff: ExponentialBackoff::default(),
        }
    }
}

impl Builder {
    pub(crate) fn with_authority_host<T: Into<String>>(mut self, v: T) -> Self {
        self.authority_host = Some(v.into());
        self
    }

    /// Accept self-signed certificates.
    ///
    /// Only the Service Fabric managed identity endpoint uses this.
    pub(crate) fn with_allow_insecure_connection(mut self, v: bool) -> Self {
        self.allow_insecure_connection = v;
        self
    }

    pub(crate) fn with_allow_logging_account_identifiers(mut self, v: bool) -> Self {
        self.allow_logging_account_identifiers = v;
        self
    }

    /// The retry schedule for transient failures.
    pub(crate) fn with_backoff(mut self, v: ExponentialBackoff) -> Self {
        self.backoff = v;
        self
    }

    pub(crate) fn build(self) -> Result<IdentityClient> {
        let inner = reqwest::Client::builder()
            .user_agent(format!("azsdk-rust-identity/{SDK_VERSION}"))
            .danger_accept_invalid_certs(self.allow_insecure_connection)
            .build()
            .map_err(|e| {
                CredentialsError::configuration_from_source("cannot create the HTTP client", e)
            })?;
        Ok(IdentityClient {
            inner,
            authority_host: self
                .authority_host
                .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string()),
            backoff: self.backoff,
            allow_logging_account_identifiers: self.allow_logging_account_identifiers,
            abort_controllers: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        })
    }
}

/// Per-request options.
#[derive(Clone, Debug, Default)]
pub(crate) struct RequestOptions {
    pub(crate) correlation_id: Option<String>,
    pub(crate) abort_signal: Option<CancellationToken>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) disable_retry: bool,
}

impl RequestOptions {
    pub(crate) fn with_correlation_id(mut self, v: Option<String>) -> Self {
        self.correlation_id = v;
        self
    }

    pub(crate) fn with_abort_signal(mut self, v: Option<CancellationToken>) -> Self {
        self.abort_signal = v;
        self
    }

    pub(crate) fn with_timeout(mut self, v: Duration) -> Self {
        self.timeout = Some(v);
        self
    }

    pub(crate) fn with_disable_retry(mut self, v: bool) -> Self {
        self.disable_retry = v;
        self
    }
}

/// A fully received HTTP response.
#[derive(Clone, Debug)]
pub(crate) struct HttpResponse {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: String,
}

impl HttpResponse {
    pub(crate) fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

/// The access token, and possibly a refresh token, from a token endpoint.
#[derive(Clone, PartialEq)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: AccessToken,
    pub(crate) refresh_token: Option<String>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &self.access_token)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[censored]"),
            )
            .finish()
    }
}

// Removes the abort signal of a request once the request completes.
struct AbortRegistration {
    controllers: AbortControllers,
    key: String,
    id: u64,
}

impl Drop for AbortRegistration {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.controllers.lock() {
            if let Some(v) = guard.get_mut(&self.key) {
                v.retain(|(id, _)| *id != self.id);
                if v.is_empty() {
                    guard.remove(&self.key);
                }
            }
        }
    }
}

impl IdentityClient {
    pub(crate) fn builder() -> Builder {
        Builder::default()
    }

    pub(crate) fn authority_host(&self) -> &str {
        &self.authority_host
    }

    pub(crate) fn get<U: reqwest::IntoUrl>(&self, url: U) -> reqwest::RequestBuilder {
        self.inner.get(url)
    }

    pub(crate) fn post<U: reqwest::IntoUrl>(&self, url: U) -> reqwest::RequestBuilder {
        self.inner.post(url)
    }

    fn generate_abort_signal(
        &self,
        correlation_id: &str,
        parent: Option<&CancellationToken>,
    ) -> (CancellationToken, AbortRegistration) {
        let token = parent.map_or_else(CancellationToken::new, |p| p.child_token());
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut guard) = self.abort_controllers.lock() {
            guard
                .entry(correlation_id.to_string())
                .or_default()
                .push((id, token.clone()));
        }
        let registration = AbortRegistration {
            controllers: self.abort_controllers.clone(),
            key: correlation_id.to_string(),
            id,
        };
        (token, registration)
    }

    /// Aborts the in-flight requests of `correlation_id`.
    ///
    /// Requests sent without a correlation id are aborted too.
    pub(crate) fn abort_requests(&self, correlation_id: Option<&str>) {
        let key = correlation_id.unwrap_or(NO_CORRELATION_ID);
        let Ok(mut guard) = self.abort_controllers.lock() else {
            return;
        };
        let mut controllers = guard.remove(key).unwrap_or_default();
        if key != NO_CORRELATION_ID {
            controllers.extend(guard.get(NO_CORRELATION_ID).cloned().unwrap_or_default());
        }
        for (_, c) in controllers {
            c.cancel();
        }
    }

    /// Sends a request, retrying transient failures.
    pub(crate) async fn send_request(
        &self,
        request: reqwest::RequestBuilder,
        options: &RequestOptions,
    ) -> Result<HttpResponse> {
        let request = request
            .build()
            .map_err(|e| CredentialsError::configuration_from_source("invalid request", e))?;
        let key = options
            .correlation_id
            .as_deref()
            .unwrap_or(NO_CORRELATION_ID);
        let (signal, _registration) = self.generate_abort_signal(key, options.abort_signal.as_ref());

        let mut delays = self.backoff.delays();
        loop {
            let mut attempt = request.try_clone().ok_or_else(|| {
                CredentialsError::transport_from_msg("cannot clone the request for a retry")
            })?;
            if let Some(timeout) = options.timeout {
                *attempt.timeout_mut() = Some(timeout);
            }
            let sent = tokio::select! {
                _ = signal.cancelled() => return Err(CredentialsError::aborted(ABORTED_MESSAGE)),
                r = self.inner.execute(attempt) => r,
            };
            let retry = !options.disable_retry;
            let response = match sent {
                Ok(r) => r,
                Err(e) if retry && e.is_connect() => match delays.next() {
                    Some(d) => {
                        tracing::debug!("retrying request to {} after {e}", request.url());
                        tokio::time::sleep(d).await;
                        continue;
                    }
                    None => return Err(transport_error(e)),
                },
                Err(e) => return Err(transport_error(e)),
            };
            let status = response.status();
            if retry && is_retryable(status) {
                if let Some(d) = delays.next() {
                    tracing::debug!("retrying request to {} after {status}", request.url());
                    tokio::time::sleep(d).await;
                    continue;
                }
            }
            let headers = response.headers().clone();
            let body = tokio::select! {
                _ = signal.cancelled() => return Err(CredentialsError::aborted(ABORTED_MESSAGE)),
                b = response.text() => b.map_err(transport_error)?,
            };
            return Ok(HttpResponse {
                status,
                headers,
                body,
            });
        }
    }

    /// Sends a request to a token endpoint.
    ///
    /// Returns `None` if the response does not contain an access token, and
    /// an authentication error for any status other than 200 or 201.
    pub(crate) async fn send_token_request(
        &self,
        request: reqwest::RequestBuilder,
        options: &RequestOptions,
    ) -> Result<Option<TokenResponse>> {
        let url = request
            .try_clone()
            .and_then(|r| r.build().ok())
            .map(|r| r.url().to_string())
            .unwrap_or_default();
        tracing::info!("IdentityClient: sending token request to [{url}]");
        let response = self.send_request(request, options).await?;
        if !response.body.is_empty()
            && (response.status == StatusCode::OK || response.status == StatusCode::CREATED)
        {
            let parsed = serde_json::from_str::<Value>(&response.body).map_err(|e| {
                CredentialsError::transport("cannot parse the token response", e)
            })?;
            let Some(token) = parsed.get("access_token").and_then(Value::as_str) else {
                return Ok(None);
            };
            self.log_identifiers(&parsed);
            let expires_on_timestamp = parse_expiration_timestamp(&parsed)?;
            let response = TokenResponse {
                access_token: AccessToken::new(token, expires_on_timestamp),
                refresh_token: parsed
                    .get("refresh_token")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            };
            tracing::info!(
                "IdentityClient: [{url}] token acquired, expires on {expires_on_timestamp}"
            );
            return Ok(Some(response));
        }
        let error = CredentialsError::authentication(response.status.as_u16(), &response.body);
        tracing::warn!(
            "IdentityClient: authentication error. HTTP status: {}, {}",
            response.status.as_u16(),
            error
                .error_response()
                .map(|r| r.error_description.as_str())
                .unwrap_or_default()
        );
        Err(error)
    }

    /// Exchanges a refresh token for a new access token.
    ///
    /// `extra_params` carries the client authentication of confidential
    /// clients, and any claims. Returns `None` when there is no refresh token,
    /// or when the refresh token can no longer be used and the user must sign
    /// in again.
    pub(crate) async fn refresh_access_token(
        &self,
        tenant_id: &str,
        client_id: &str,
        scopes: &str,
        refresh_token: Option<&str>,
        extra_params: &[(&str, &str)],
        options: &RequestOptions,
    ) -> Result<Option<TokenResponse>> {
        let Some(refresh_token) = refresh_token else {
            return Ok(None);
        };
        tracing::info!(
            "IdentityClient: refreshing access token with client ID: {client_id}, scopes: {scopes} started"
        );
        let mut params = vec![
            ("grant_type", REFRESH_TOKEN_GRANT_TYPE),
            ("client_id", client_id),
            ("refresh_token", refresh_token),
            ("scope", scopes),
        ];
        params.extend_from_slice(extra_params);
        let url = format!(
            "{}/{tenant_id}/{}",
            self.authority_host.trim_end_matches('/'),
            token_endpoint_suffix(tenant_id)
        );
        let mut request = self
            .post(url)
            .header(http::header::ACCEPT, "application/json")
            .form(&params);
        if let Some(id) = &options.correlation_id {
            request = request.header("client-request-id", id);
        }
        match self.send_token_request(request, options).await {
            Ok(response) => {
                tracing::info!("IdentityClient: refreshed token for client ID: {client_id}");
                Ok(response)
            }
            Err(e)
                if e.error_response()
                    .is_some_and(|r| r.error == "interaction_required") =>
            {
                tracing::info!("IdentityClient: interaction required for client ID: {client_id}");
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(
                    "IdentityClient: failed refreshing token for client ID: {client_id}: {e}"
                );
                Err(e)
            }
        }
    }

    fn log_identifiers(&self, body: &Value) {
        if !self.allow_logging_account_identifiers {
            return;
        }
        let Some(token) = body.get("access_token").and_then(Value::as_str) else {
            return;
        };
        let Some(claims) = decode_jwt_payload(token) else {
            tracing::warn!(
                "allowLoggingAccountIdentifiers was set, but we couldn't log the account information."
            );
            return;
        };
        let field = |name: &str| {
            claims
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        tracing::info!(
            "[Authenticated account] Client ID: {}. Tenant ID: {}. User Principal Name: {}. Object ID (user): {}",
            field("appid").unwrap_or_default(),
            field("tid").unwrap_or_default(),
            field("upn").unwrap_or_else(|| "No User Principal Name available".to_string()),
            field("oid").unwrap_or_default(),
        );
    }
}

fn transport_error(e: reqwest::Error) -> CredentialsError {
    let message = if e.is_connect() {
        format!("cannot connect to the endpoint: {e}")
    } else {
        format!("the request failed: {e}")
    };
    CredentialsError::transport(message, e)
}

/// Decodes the payload of a JSON Web Token, without validating it.
pub(crate) fn decode_jwt_payload(token: &str) -> Option<Value> {
    let payload = token.split('.').nth(1)?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Returns the expiration of a token response in milliseconds since the
/// epoch.
///
/// `expires_on` takes precedence over `expires_in`. The identity endpoints
/// use a number of seconds, a string with the number of seconds, or a date
/// for `expires_on`.
pub(crate) fn parse_expiration_timestamp(body: &Value) -> Result<i64> {
    match body.get("expires_on") {
        Some(Value::Number(n)) => {
            if let Some(v) = n.as_f64().and_then(seconds_to_millis) {
                return Ok(v);
            }
        }
        Some(Value::String(s)) => {
            let seconds = s.trim().parse::<f64>().ok();
            if let Some(v) = seconds.and_then(seconds_to_millis) {
                return Ok(v);
            }
            if let Some(v) = parse_date_millis(s) {
                return Ok(v);
            }
        }
        _ => {}
    }
    let expires_in = body
        .get("expires_in")
        .and_then(Value::as_f64)
        .and_then(seconds_to_millis)
        .and_then(|v| now_millis().checked_add(v));
    if let Some(v) = expires_in {
        return Ok(v);
    }
    let show = |name: &str| match body.get(name) {
        None => "undefined".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(v) => v.to_string(),
    };
    Err(CredentialsError::transport_from_msg(format!(
        "Failed to parse token expiration from body. expires_in=\"{}\", expires_on=\"{}\"",
        show("expires_in"),
        show("expires_on")
    )))
}

// `NaN`, infinities and values beyond the millisecond range are not
// timestamps.
fn seconds_to_millis(seconds: f64) -> Option<i64> {
    let millis = seconds * 1000.0;
    (millis.is_finite() && millis.abs() < i64::MAX as f64).then_some(millis as i64)
}
