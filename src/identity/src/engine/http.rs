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

use super::cache::{CacheEntry, TokenCache};
use super::{
    AuthenticationResult, AuthorizationCodeRequest, AuthorizationUrlRequest, ClientCredential,
    DeviceCodeInfo, DeviceCodePromptCallback, EngineAccount, EngineConfig, EngineError,
    EngineErrorKind, EngineResult, TokenEngine, TokenRequest,
};
use crate::authority::token_endpoint_suffix;
use crate::constants::{
    AUTHORIZATION_CODE_GRANT_TYPE, CLIENT_CREDENTIALS_GRANT_TYPE, DEVICE_CODE_GRANT_TYPE,
    JWT_BEARER_ASSERTION_TYPE, JWT_BEARER_GRANT_TYPE, PASSWORD_GRANT_TYPE,
};
use crate::errors::CredentialsError;
use crate::identity_client::{RequestOptions, decode_jwt_payload, parse_expiration_timestamp};
use base64::prelude::{BASE64_URL_SAFE_NO_PAD, Engine as _};
use serde_json::{Value, json};
use std::time::Duration;

// Scopes added to every user flow, to obtain an id token and a refresh token.
const USER_FLOW_SCOPES: [&str; 3] = ["openid", "profile", "offline_access"];

// Hosts that support regional token endpoints.
const REGIONAL_HOSTS: [&str; 2] = ["login.microsoftonline.com", "login.microsoft.com"];

const DEFAULT_POLLING_INTERVAL_SECS: u64 = 5;
const SLOW_DOWN_INCREMENT_SECS: u64 = 5;

/// A [TokenEngine] using the OAuth 2.0 endpoints of the Microsoft identity
/// platform.
#[derive(Debug)]
pub struct HttpTokenEngine {
    config: EngineConfig,
    cache: TokenCache,
}

// The outcome of a request to a token endpoint.
enum Reply {
    Success(Value),
    Error {
        status: u16,
        error: CredentialsError,
    },
}

impl Reply {
    // The OAuth error code of failed requests.
    fn error_code(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Error { error, .. } => error.error_response().map(|r| r.error.as_str()),
        }
    }

    fn into_success(self) -> EngineResult<Value> {
        match self {
            Self::Success(v) => Ok(v),
            Self::Error { status, error } => Err(server_error(status, &error)),
        }
    }
}

fn server_error(status: u16, error: &CredentialsError) -> EngineError {
    let code = error
        .error_response()
        .map(|r| r.error.as_str())
        .unwrap_or_default();
    let kind = match code {
        "interaction_required" => EngineErrorKind::InteractionRequired,
        "consent_required" => EngineErrorKind::ConsentRequired,
        "login_required" => EngineErrorKind::LoginRequired,
        _ => return EngineError::server(status, error.to_string()),
    };
    EngineError::new(kind, error.to_string())
}

fn transport_error(error: CredentialsError) -> EngineError {
    if error.is_aborted() {
        return EngineError::new(EngineErrorKind::Abort, error.to_string());
    }
    if error.is_connect() {
        return EngineError::new(
            EngineErrorKind::EndpointsResolution,
            format!("Endpoints cannot be resolved: {error}"),
        );
    }
    EngineError::new(EngineErrorKind::Network, error.to_string())
}

fn configuration_error<T: Into<String>>(message: T) -> EngineError {
    EngineError::new(EngineErrorKind::ClientConfiguration, message)
}

fn request_options(request: &TokenRequest) -> RequestOptions {
    RequestOptions::default()
        .with_correlation_id(request.correlation_id.clone())
        .with_abort_signal(request.abort_signal.clone())
}

fn user_scopes(scopes: &[String]) -> String {
    scopes
        .iter()
        .map(String::as_str)
        .chain(USER_FLOW_SCOPES)
        .collect::<Vec<_>>()
        .join(" ")
}

// The tenant is the last path segment of the authority.
fn tenant_of(authority: &str) -> &str {
    authority
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}

fn string_claim(claims: &Value, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|n| claims.get(*n).and_then(Value::as_str))
        .map(str::to_string)
}

impl HttpTokenEngine {
    /// Creates a new engine.
    ///
    /// Fails if the authority is not a valid URL.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        url::Url::parse(&config.authority).map_err(|e| {
            configuration_error(format!("invalid authority {}: {e}", config.authority))
        })?;
        let cache = TokenCache::new(config.cache_name.clone(), config.persistence.clone());
        Ok(Self { config, cache })
    }

    fn authority<'a>(&'a self, request: &'a TokenRequest) -> &'a str {
        request
            .authority
            .as_deref()
            .unwrap_or(&self.config.authority)
            .trim_end_matches('/')
    }

    fn environment(&self, authority: &str) -> String {
        url::Url::parse(authority)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default()
    }

    fn token_endpoint(&self, authority: &str) -> String {
        let tenant = tenant_of(authority);
        format!("{authority}/{}", token_endpoint_suffix(tenant))
    }

    // Client credential flows use the regional endpoint when a region is
    // configured and the cloud supports it.
    fn client_credential_endpoint(&self, authority: &str) -> String {
        let Some(region) = &self.config.azure_region else {
            return self.token_endpoint(authority);
        };
        let host = self.environment(authority);
        if !REGIONAL_HOSTS.contains(&host.as_str()) {
            return self.token_endpoint(authority);
        }
        let tenant = tenant_of(authority);
        format!(
            "https://{region}.login.microsoft.com/{tenant}/{}",
            token_endpoint_suffix(tenant)
        )
    }

    /// The claims of a request, with the client capabilities merged in.
    fn claims(&self, claims: Option<&str>) -> Option<String> {
        if self.config.client_capabilities.is_empty() {
            return claims.map(str::to_string);
        }
        let mut merged = claims
            .and_then(|c| serde_json::from_str::<Value>(c).ok())
            .filter(Value::is_object)
            .unwrap_or_else(|| json!({}));
        if !merged["access_token"].is_object() {
            merged["access_token"] = json!({});
        }
        merged["access_token"]["xms_cc"] = json!({ "values": self.config.client_capabilities });
        Some(merged.to_string())
    }

    fn common_params(&self, request: &TokenRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![("client_id", self.config.client_id.clone())];
        if let Some(claims) = self.claims(request.claims.as_deref()) {
            params.push(("claims", claims));
        }
        params
    }

    async fn client_auth_params(
        &self,
        audience: &str,
    ) -> EngineResult<Vec<(&'static str, String)>> {
        let params = match &self.config.client_credential {
            None => Vec::new(),
            Some(ClientCredential::Secret(secret)) => vec![("client_secret", secret.clone())],
            Some(ClientCredential::Certificate(key)) => vec![
                ("client_assertion_type", JWT_BEARER_ASSERTION_TYPE.to_string()),
                (
                    "client_assertion",
                    key.client_assertion(&self.config.client_id, audience)?,
                ),
            ],
            Some(ClientCredential::Assertion(provider)) => {
                let assertion = provider.get_assertion().await.map_err(|e| {
                    configuration_error(format!("cannot obtain the client assertion: {e}"))
                })?;
                vec![
                    ("client_assertion_type", JWT_BEARER_ASSERTION_TYPE.to_string()),
                    ("client_assertion", assertion),
                ]
            }
        };
        Ok(params)
    }

    async fn post(
        &self,
        endpoint: &str,
        params: &[(&'static str, String)],
        request: &TokenRequest,
    ) -> EngineResult<Reply> {
        let client = &self.config.identity_client;
        let mut builder = client
            .post(endpoint)
            .header(http::header::ACCEPT, "application/json")
            .form(params);
        if let Some(id) = &request.correlation_id {
            builder = builder.header("client-request-id", id);
        }
        let response = client
            .send_request(builder, &request_options(request))
            .await
            .map_err(transport_error)?;
        let status = response.status.as_u16();
        if response.status.is_success() {
            let body = response.json().ok_or_else(|| {
                EngineError::new(
                    EngineErrorKind::Network,
                    format!("cannot parse the token response from {endpoint}"),
                )
            })?;
            return Ok(Reply::Success(body));
        }
        Ok(Reply::Error {
            status,
            error: CredentialsError::authentication(status, &response.body),
        })
    }

    fn account(&self, authority: &str, body: &Value) -> Option<EngineAccount> {
        let claims = body
            .get("id_token")
            .and_then(Value::as_str)
            .and_then(decode_jwt_payload)?;
        let local_account_id = string_claim(&claims, &["oid", "sub"]).unwrap_or_default();
        let tenant_id = string_claim(&claims, &["tid"])
            .unwrap_or_else(|| tenant_of(authority).to_string());
        let home_account_id = body
            .get("client_info")
            .and_then(Value::as_str)
            .and_then(|c| BASE64_URL_SAFE_NO_PAD.decode(c.trim_end_matches('=')).ok())
            .and_then(|b| serde_json::from_slice::<Value>(&b).ok())
            .and_then(|info| {
                let uid = info.get("uid").and_then(Value::as_str)?;
                let utid = info.get("utid").and_then(Value::as_str)?;
                Some(format!("{uid}.{utid}"))
            })
            .unwrap_or_else(|| format!("{local_account_id}.{tenant_id}"));
        Some(EngineAccount {
            home_account_id,
            local_account_id,
            environment: self.environment(authority),
            tenant_id,
            username: string_claim(&claims, &["preferred_username", "upn", "email"])
                .unwrap_or_default(),
        })
    }

    /// Converts a successful token response into a result, caching it.
    async fn complete(
        &self,
        request: &TokenRequest,
        body: Value,
        account: Option<EngineAccount>,
        cache: bool,
    ) -> AuthenticationResult {
        let authority = self.authority(request);
        let access_token = body
            .get("access_token")
            .and_then(Value::as_str)
            .map(str::to_string);
        let expires_on = parse_expiration_timestamp(&body).ok();
        let account = self.account(authority, &body).or(account);
        if let (true, Some(token), Some(expires_on)) = (cache, &access_token, expires_on) {
            self.cache
                .save(CacheEntry {
                    account: account.as_ref(),
                    tenant: tenant_of(authority),
                    scopes: &request.scopes,
                    access_token: token,
                    expires_on,
                    refresh_token: body.get("refresh_token").and_then(Value::as_str),
                })
                .await;
        }
        AuthenticationResult {
            access_token,
            expires_on,
            account,
        }
    }

    async fn poll_device_code(
        &self,
        request: &TokenRequest,
        endpoint: &str,
        device_code: &str,
        mut interval: u64,
        deadline: tokio::time::Instant,
    ) -> EngineResult<Value> {
        let mut params = self.common_params(request);
        params.push(("grant_type", DEVICE_CODE_GRANT_TYPE.to_string()));
        params.push(("device_code", device_code.to_string()));
        params.extend(self.client_auth_params(endpoint).await?);
        let cancelled = || {
            EngineError::new(
                EngineErrorKind::DeviceCodePollingCancelled,
                "Device code polling was cancelled.",
            )
        };
        loop {
            if request.abort_signal.as_ref().is_some_and(|s| s.is_cancelled()) {
                return Err(cancelled());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(EngineError::server(
                    400,
                    "expired_token: the device code expired before the user completed the sign-in",
                ));
            }
            let sleep = tokio::time::sleep(Duration::from_secs(interval));
            match &request.abort_signal {
                Some(signal) => tokio::select! {
                    _ = signal.cancelled() => return Err(cancelled()),
                    _ = sleep => {},
                },
                None => sleep.await,
            }
            let reply = self.post(endpoint, &params, request).await?;
            match reply.error_code() {
                Some("authorization_pending") => continue,
                Some("slow_down") => {
                    interval += SLOW_DOWN_INCREMENT_SECS;
                    continue;
                }
                _ => return reply.into_success(),
            }
        }
    }
}

#[async_trait::async_trait]
impl TokenEngine for HttpTokenEngine {
    async fn acquire_token_silent(
        &self,
        account: &EngineAccount,
        request: &TokenRequest,
    ) -> EngineResult<Option<AuthenticationResult>> {
        let authority = self.authority(request);
        let tenant = tenant_of(authority);
        if request.claims.is_none() {
            if let Some((token, expires_on)) = self
                .cache
                .access_token(Some(&account.home_account_id), tenant, &request.scopes)
                .await
            {
                return Ok(Some(AuthenticationResult {
                    access_token: Some(token),
                    expires_on: Some(expires_on),
                    account: Some(account.clone()),
                }));
            }
        }
        let Some(refresh_token) = self.cache.refresh_token(&account.home_account_id).await else {
            return Err(EngineError::new(
                EngineErrorKind::NoTokensFound,
                "No refresh token found in the cache.",
            ));
        };

        let endpoint = self.token_endpoint(authority);
        let mut extra = self.client_auth_params(&endpoint).await?;
        if let Some(claims) = self.claims(request.claims.as_deref()) {
            extra.push(("claims", claims));
        }
        let extra = extra
            .iter()
            .map(|(k, v)| (*k, v.as_str()))
            .collect::<Vec<_>>();
        let refreshed = self
            .config
            .identity_client
            .refresh_access_token(
                tenant,
                &self.config.client_id,
                &user_scopes(&request.scopes),
                Some(&refresh_token),
                &extra,
                &request_options(request),
            )
            .await
            .map_err(|e| match e.status_code() {
                Some(status) if e.is_authentication_error() => server_error(status, &e),
                _ => transport_error(e),
            })?;
        let Some(refreshed) = refreshed else {
            return Err(EngineError::new(
                EngineErrorKind::InteractionRequired,
                "The refresh token can no longer be used, interaction is required.",
            ));
        };
        self.cache
            .save(CacheEntry {
                account: Some(account),
                tenant,
                scopes: &request.scopes,
                access_token: &refreshed.access_token.token,
                expires_on: refreshed.access_token.expires_on_timestamp,
                refresh_token: refreshed.refresh_token.as_deref(),
            })
            .await;
        Ok(Some(AuthenticationResult {
            access_token: Some(refreshed.access_token.token),
            expires_on: Some(refreshed.access_token.expires_on_timestamp),
            account: Some(account.clone()),
        }))
    }

    async fn acquire_token_by_client_credential(
        &self,
        request: &TokenRequest,
    ) -> EngineResult<Option<AuthenticationResult>> {
        if !self.config.is_confidential() {
            return Err(configuration_error(
                "the client credential flow requires a confidential client",
            ));
        }
        let authority = self.authority(request);
        if request.claims.is_none() {
            if let Some((token, expires_on)) = self
                .cache
                .access_token(None, tenant_of(authority), &request.scopes)
                .await
            {
                return Ok(Some(AuthenticationResult {
                    access_token: Some(token),
                    expires_on: Some(expires_on),
                    account: None,
                }));
            }
        }
        let endpoint = self.client_credential_endpoint(authority);
        let mut params = self.common_params(request);
        params.push(("grant_type", CLIENT_CREDENTIALS_GRANT_TYPE.to_string()));
        params.push(("scope", request.scopes.join(" ")));
        params.extend(self.client_auth_params(&endpoint).await?);
        let body = self
            .post(&endpoint, &params, request)
            .await?
            .into_success()?;
        Ok(Some(self.complete(request, body, None, true).await))
    }

    async fn acquire_token_by_device_code(
        &self,
        request: &TokenRequest,
        prompt: DeviceCodePromptCallback,
    ) -> EngineResult<Option<AuthenticationResult>> {
        let authority = self.authority(request);
        let mut params = vec![("client_id", self.config.client_id.clone())];
        params.push(("scope", user_scopes(&request.scopes)));
        let body = self
            .post(&format!("{authority}/oauth2/v2.0/devicecode"), &params, request)
            .await?
            .into_success()?;
        let info = serde_json::from_value::<DeviceCodeInfo>(body.clone()).map_err(|e| {
            EngineError::new(
                EngineErrorKind::Network,
                format!("cannot parse the device code response: {e}"),
            )
        })?;
        let device_code = body
            .get("device_code")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let interval = body
            .get("interval")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_POLLING_INTERVAL_SECS);
        let expires_in = body
            .get("expires_in")
            .and_then(Value::as_u64)
            .unwrap_or(900);
        let deadline = tokio::time::Instant::now()
            .checked_add(Duration::from_secs(expires_in))
            .ok_or_else(|| {
                EngineError::new(
                    EngineErrorKind::Network,
                    format!("cannot parse the device code response: expires_in={expires_in} is out of range"),
                )
            })?;
        prompt(&info);

        let endpoint = self.token_endpoint(authority);
        let body = self
            .poll_device_code(request, &endpoint, &device_code, interval, deadline)
            .await?;
        Ok(Some(self.complete(request, body, None, true).await))
    }

    async fn acquire_token_by_code(
        &self,
        request: &TokenRequest,
        code: &AuthorizationCodeRequest,
    ) -> EngineResult<Option<AuthenticationResult>> {
        let endpoint = self.token_endpoint(self.authority(request));
        let mut params = self.common_params(request);
        params.push(("grant_type", AUTHORIZATION_CODE_GRANT_TYPE.to_string()));
        params.push(("code", code.code.clone()));
        params.push(("redirect_uri", code.redirect_uri.clone()));
        params.push(("scope", user_scopes(&request.scopes)));
        params.push(("client_info", "1".to_string()));
        if let Some(verifier) = &code.code_verifier {
            params.push(("code_verifier", verifier.clone()));
        }
        params.extend(self.client_auth_params(&endpoint).await?);
        let body = self
            .post(&endpoint, &params, request)
            .await?
            .into_success()?;
        Ok(Some(self.complete(request, body, None, true).await))
    }

    async fn acquire_token_on_behalf_of(
        &self,
        request: &TokenRequest,
        user_assertion: &str,
    ) -> EngineResult<Option<AuthenticationResult>> {
        if !self.config.is_confidential() {
            return Err(configuration_error(
                "the on-behalf-of flow requires a confidential client",
            ));
        }
        let endpoint = self.token_endpoint(self.authority(request));
        let mut params = self.common_params(request);
        params.push(("grant_type", JWT_BEARER_GRANT_TYPE.to_string()));
        params.push(("requested_token_use", "on_behalf_of".to_string()));
        params.push(("assertion", user_assertion.to_string()));
        params.push(("scope", user_scopes(&request.scopes)));
        params.push(("client_info", "1".to_string()));
        params.extend(self.client_auth_params(&endpoint).await?);
        let body = self
            .post(&endpoint, &params, request)
            .await?
            .into_success()?;
        // Tokens obtained on behalf of a user are bound to the assertion, they
        // are not reusable from the account cache.
        Ok(Some(self.complete(request, body, None, false).await))
    }

    async fn acquire_token_by_username_password(
        &self,
        request: &TokenRequest,
        username: &str,
        password: &str,
    ) -> EngineResult<Option<AuthenticationResult>> {
        let endpoint = self.token_endpoint(self.authority(request));
        let mut params = self.common_params(request);
        params.push(("grant_type", PASSWORD_GRANT_TYPE.to_string()));
        params.push(("username", username.to_string()));
        params.push(("password", password.to_string()));
        params.push(("scope", user_scopes(&request.scopes)));
        params.push(("client_info", "1".to_string()));
        params.extend(self.client_auth_params(&endpoint).await?);
        let body = self
            .post(&endpoint, &params, request)
            .await?
            .into_success()?;
        Ok(Some(self.complete(request, body, None, true).await))
    }

    fn authorization_url(
        &self,
        request: &TokenRequest,
        params: &AuthorizationUrlRequest,
    ) -> EngineResult<String> {
        let endpoint = format!("{}/oauth2/v2.0/authorize", self.authority(request));
        let mut query = vec![
            ("client_id", self.config.client_id.clone()),
            ("response_type", "code".to_string()),
            ("response_mode", "query".to_string()),
            ("redirect_uri", params.redirect_uri.clone()),
            ("scope", user_scopes(&request.scopes)),
        ];
        if let Some(challenge) = &params.code_challenge {
            query.push(("code_challenge", challenge.clone()));
            query.push(("code_challenge_method", "S256".to_string()));
        }
        let optional = [
            ("state", &params.state),
            ("login_hint", &params.login_hint),
            ("prompt", &params.prompt),
            ("client-request-id", &request.correlation_id),
        ];
        for (name, value) in optional {
            if let Some(v) = value {
                query.push((name, v.clone()));
            }
        }
        if let Some(claims) = self.claims(request.claims.as_deref()) {
            query.push(("claims", claims));
        }
        let url = url::Url::parse_with_params(&endpoint, &query)
            .map_err(|e| configuration_error(format!("invalid authorize endpoint: {e}")))?;
        Ok(url.to_string())
    }

    async fn accounts(&self) -> EngineResult<Vec<EngineAccount>> {
        Ok(self.cache.accounts().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::tests::scopes;
    use crate::identity_client::tests::test_client;
    use crate::token::now_millis;
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use std::sync::{Arc, Mutex};
    use tokio_util::sync::CancellationToken;

    type TestResult = anyhow::Result<()>;

    const ID_TOKEN_CLAIMS: &str =
        r#"{"oid":"test-oid","tid":"test-tid","preferred_username":"user@contoso.com"}"#;

    fn id_token() -> String {
        format!(
            "e30.{}.c2ln",
            BASE64_URL_SAFE_NO_PAD.encode(ID_TOKEN_CLAIMS)
        )
    }

    fn client_info() -> String {
        BASE64_URL_SAFE_NO_PAD.encode(r#"{"uid":"test-uid","utid":"test-utid"}"#)
    }

    fn config(server: &Server, credential: Option<ClientCredential>) -> EngineConfig {
        EngineConfig {
            client_id: "test-client-id".into(),
            authority: server.url_str("/tenant"),
            known_authorities: Vec::new(),
            client_capabilities: Vec::new(),
            client_credential: credential,
            azure_region: None,
            cache_name: "test.nocae".into(),
            persistence: None,
            identity_client: test_client(server),
        }
    }

    fn request(v: &[&str]) -> TokenRequest {
        TokenRequest {
            scopes: scopes(v),
            correlation_id: Some("test-correlation-id".into()),
            ..Default::default()
        }
    }

    fn user_token_response() -> Value {
        json!({
            "access_token": "user-token",
            "refresh_token": "user-refresh",
            "expires_in": 3600,
            "id_token": id_token(),
            "client_info": client_info(),
        })
    }

    #[tokio::test]
    async fn client_credential_secret_and_cache() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/tenant/oauth2/v2.0/token"),
                request::headers(contains(("client-request-id", "test-correlation-id"))),
                request::body(url_decoded(contains(("grant_type", "client_credentials")))),
                request::body(url_decoded(contains(("client_secret", "test-secret")))),
                request::body(url_decoded(contains(("scope", "https://vault.azure.net/.default")))),
            ])
            .times(1)
            .respond_with(json_encoded(json!({"access_token": "app-token", "expires_in": 3600}))),
        );
        let engine = HttpTokenEngine::new(config(
            &server,
            Some(ClientCredential::Secret("test-secret".into())),
        ))?;
        let request = request(&["https://vault.azure.net/.default"]);
        for _ in 0..2 {
            let got = engine
                .acquire_token_by_client_credential(&request)
                .await?
                .unwrap();
            assert_eq!(got.access_token.as_deref(), Some("app-token"));
            assert!(got.expires_on.is_some_and(|e| e > now_millis()));
            assert!(got.account.is_none());
        }
        Ok(())
    }

    #[tokio::test]
    async fn client_credential_claims_bypass_cache() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/tenant/oauth2/v2.0/token"))
                .times(2)
                .respond_with(json_encoded(json!({"access_token": "t", "expires_in": 3600}))),
        );
        let engine = HttpTokenEngine::new(config(
            &server,
            Some(ClientCredential::Secret("test-secret".into())),
        ))?;
        let mut request = request(&["a"]);
        engine.acquire_token_by_client_credential(&request).await?;
        request.claims = Some(r#"{"access_token":{"acrs":{"essential":true}}}"#.into());
        engine.acquire_token_by_client_credential(&request).await?;
        Ok(())
    }

    #[tokio::test]
    async fn client_credential_requires_confidential_client() -> TestResult {
        let server = Server::run();
        let engine = HttpTokenEngine::new(config(&server, None))?;
        let err = engine
            .acquire_token_by_client_credential(&request(&["a"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), EngineErrorKind::ClientConfiguration);
        Ok(())
    }

    #[tokio::test]
    async fn client_credential_certificate() -> TestResult {
        let pem = include_str!("../../testdata/certificate.pem");
        let certificate = super::super::parse_certificate(pem, None, false)?;
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/tenant/oauth2/v2.0/token"),
                request::body(url_decoded(contains(("client_assertion_type", JWT_BEARER_ASSERTION_TYPE)))),
                request::body(url_decoded(contains(key("client_assertion")))),
            ])
            .respond_with(json_encoded(json!({"access_token": "t", "expires_in": 3600}))),
        );
        let engine = HttpTokenEngine::new(config(
            &server,
            Some(ClientCredential::Certificate(certificate)),
        ))?;
        let got = engine
            .acquire_token_by_client_credential(&request(&["a"]))
            .await?
            .unwrap();
        assert_eq!(got.access_token.as_deref(), Some("t"));
        Ok(())
    }

    #[tokio::test]
    async fn cae_capabilities_merge_claims() -> TestResult {
        let server = Server::run();
        let want = json!({
            "access_token": {"nbf": {"essential": true}, "xms_cc": {"values": ["cp1"]}}
        });
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/tenant/oauth2/v2.0/token"),
                request::body(url_decoded(contains(("claims", want.to_string())))),
            ])
            .respond_with(json_encoded(json!({"access_token": "t", "expires_in": 3600}))),
        );
        let mut config = config(&server, Some(ClientCredential::Secret("s".into())));
        config.client_capabilities = vec!["cp1".into()];
        let engine = HttpTokenEngine::new(config)?;
        let mut request = request(&["a"]);
        request.claims = Some(r#"{"access_token":{"nbf":{"essential":true}}}"#.into());
        engine.acquire_token_by_client_credential(&request).await?;
        Ok(())
    }

    #[test]
    fn cae_capabilities_without_claims() {
        let server = Server::run();
        let mut config = config(&server, None);
        config.client_capabilities = vec!["cp1".into()];
        let engine = HttpTokenEngine::new(config).unwrap();
        assert_eq!(
            engine.claims(None).as_deref(),
            Some(r#"{"access_token":{"xms_cc":{"values":["cp1"]}}}"#)
        );
        assert_eq!(engine.claims(Some("not json")).as_deref(), engine.claims(None).as_deref());
    }

    #[test]
    fn regional_endpoint() {
        let server = Server::run();
        let mut config = config(&server, Some(ClientCredential::Secret("s".into())));
        config.azure_region = Some("westus2".into());
        let engine = HttpTokenEngine::new(config).unwrap();
        assert_eq!(
            engine.client_credential_endpoint("https://login.microsoftonline.com/tenant"),
            "https://westus2.login.microsoft.com/tenant/oauth2/v2.0/token"
        );
        // Sovereign clouds and custom hosts use the global endpoint.
        assert_eq!(
            engine.client_credential_endpoint("https://login.chinacloudapi.cn/tenant"),
            "https://login.chinacloudapi.cn/tenant/oauth2/v2.0/token"
        );
        assert_eq!(
            engine.token_endpoint("https://adfs.contoso.com/adfs"),
            "https://adfs.contoso.com/adfs/oauth2/token"
        );
    }

    #[tokio::test]
    async fn server_errors() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/tenant/oauth2/v2.0/token"))
                .respond_with(cycle![
                    status_code(401).body(
                        json!({"error": "invalid_client", "error_description": "bad secret"})
                            .to_string()
                    ),
                    status_code(400).body(json!({"error": "consent_required"}).to_string()),
                ]),
        );
        let engine = HttpTokenEngine::new(config(
            &server,
            Some(ClientCredential::Secret("s".into())),
        ))?;
        let err = engine
            .acquire_token_by_client_credential(&request(&["a"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), EngineErrorKind::Server);
        assert_eq!(err.status(), Some(401));
        assert!(err.message().contains("bad secret"), "{err}");

        let err = engine
            .acquire_token_by_client_credential(&request(&["a"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), EngineErrorKind::ConsentRequired);
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_authority() -> TestResult {
        let server = Server::run();
        let mut config = config(&server, Some(ClientCredential::Secret("s".into())));
        config.authority = "http://127.0.0.1:1/tenant".into();
        let engine = HttpTokenEngine::new(config)?;
        let err = engine
            .acquire_token_by_client_credential(&request(&["a"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), EngineErrorKind::EndpointsResolution, "{err}");
        Ok(())
    }

    #[test]
    fn invalid_authority() {
        let server = Server::run();
        let mut config = config(&server, None);
        config.authority = "not a url".into();
        let err = HttpTokenEngine::new(config).unwrap_err();
        assert_eq!(err.kind(), EngineErrorKind::ClientConfiguration);
    }

    #[tokio::test]
    async fn username_password_then_silent() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/tenant/oauth2/v2.0/token"),
                request::body(url_decoded(contains(("grant_type", "password")))),
                request::body(url_decoded(contains(("username", "user@contoso.com")))),
                request::body(url_decoded(contains(("password", "test-password")))),
            ])
            .times(1)
            .respond_with(json_encoded(user_token_response())),
        );
        let engine = HttpTokenEngine::new(config(&server, None))?;
        let request = request(&["https://graph.microsoft.com/.default"]);
        let got = engine
            .acquire_token_by_username_password(&request, "user@contoso.com", "test-password")
            .await?
            .unwrap();
        let account = got.account.unwrap();
        assert_eq!(account.home_account_id, "test-uid.test-utid");
        assert_eq!(account.local_account_id, "test-oid");
        assert_eq!(account.tenant_id, "test-tid");
        assert_eq!(account.username, "user@contoso.com");
        assert_eq!(account.environment, "127.0.0.1");
        assert_eq!(engine.accounts().await?, vec![account.clone()]);

        // The cached token is returned without any requests.
        let got = engine.acquire_token_silent(&account, &request).await?.unwrap();
        assert_eq!(got.access_token.as_deref(), Some("user-token"));
        Ok(())
    }

    #[tokio::test]
    async fn silent_refresh() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/tenant/oauth2/v2.0/token"),
                request::body(url_decoded(contains(("grant_type", "password")))),
            ])
            .respond_with(json_encoded(user_token_response())),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/tenant/oauth2/v2.0/token"),
                request::body(url_decoded(contains(("grant_type", "refresh_token")))),
                request::body(url_decoded(contains(("refresh_token", "user-refresh")))),
            ])
            .times(1)
            .respond_with(json_encoded(json!({
                "access_token": "refreshed-token",
                "refresh_token": "new-refresh",
                "expires_in": 3600,
            }))),
        );
        let engine = HttpTokenEngine::new(config(&server, None))?;
        let account = engine
            .acquire_token_by_username_password(&request(&["a"]), "u", "p")
            .await?
            .and_then(|r| r.account)
            .unwrap();
        // A different scope is not in the cache, the engine uses the refresh token.
        let got = engine
            .acquire_token_silent(&account, &request(&["b"]))
            .await?
            .unwrap();
        assert_eq!(got.access_token.as_deref(), Some("refreshed-token"));
        assert_eq!(got.account.as_ref(), Some(&account));
        Ok(())
    }

    #[tokio::test]
    async fn silent_without_tokens() -> TestResult {
        let server = Server::run();
        let engine = HttpTokenEngine::new(config(&server, None))?;
        let err = engine
            .acquire_token_silent(&EngineAccount::default(), &request(&["a"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), EngineErrorKind::NoTokensFound);
        Ok(())
    }

    #[tokio::test]
    async fn authorization_code() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/tenant/oauth2/v2.0/token"),
                request::body(url_decoded(contains(("grant_type", "authorization_code")))),
                request::body(url_decoded(contains(("code", "test-code")))),
                request::body(url_decoded(contains(("redirect_uri", "http://localhost:8400")))),
                request::body(url_decoded(contains(("code_verifier", "test-verifier")))),
                request::body(url_decoded(contains(("client_secret", "s")))),
            ])
            .respond_with(json_encoded(user_token_response())),
        );
        let engine = HttpTokenEngine::new(config(
            &server,
            Some(ClientCredential::Secret("s".into())),
        ))?;
        let code = AuthorizationCodeRequest {
            code: "test-code".into(),
            redirect_uri: "http://localhost:8400".into(),
            code_verifier: Some("test-verifier".into()),
        };
        let got = engine
            .acquire_token_by_code(&request(&["a"]), &code)
            .await?
            .unwrap();
        assert_eq!(got.access_token.as_deref(), Some("user-token"));
        assert!(got.account.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn on_behalf_of() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/tenant/oauth2/v2.0/token"),
                request::body(url_decoded(contains(("grant_type", JWT_BEARER_GRANT_TYPE)))),
                request::body(url_decoded(contains(("requested_token_use", "on_behalf_of")))),
                request::body(url_decoded(contains(("assertion", "user-assertion")))),
            ])
            .times(2)
            .respond_with(json_encoded(json!({"access_token": "obo", "expires_in": 3600}))),
        );
        let engine = HttpTokenEngine::new(config(
            &server,
            Some(ClientCredential::Secret("s".into())),
        ))?;
        for _ in 0..2 {
            let got = engine
                .acquire_token_on_behalf_of(&request(&["a"]), "user-assertion")
                .await?
                .unwrap();
            assert_eq!(got.access_token.as_deref(), Some("obo"));
        }
        Ok(())
    }

    #[tokio::test]
    async fn incomplete_response() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/tenant/oauth2/v2.0/token"))
                .respond_with(json_encoded(json!({"access_token": "t"}))),
        );
        let engine = HttpTokenEngine::new(config(
            &server,
            Some(ClientCredential::Secret("s".into())),
        ))?;
        let got = engine
            .acquire_token_by_client_credential(&request(&["a"]))
            .await?
            .unwrap();
        assert_eq!(got.access_token.as_deref(), Some("t"));
        assert_eq!(got.expires_on, None);
        Ok(())
    }

    #[tokio::test]
    async fn device_code() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/tenant/oauth2/v2.0/devicecode"),
                request::body(url_decoded(contains(("scope", "a openid profile offline_access")))),
            ])
            .respond_with(json_encoded(json!({
                "user_code": "ABCD",
                "device_code": "test-device-code",
                "verification_uri": "https://microsoft.com/devicelogin",
                "message": "enter ABCD",
                "expires_in": 900,
                "interval": 0,
            }))),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/tenant/oauth2/v2.0/token"),
                request::body(url_decoded(contains(("device_code", "test-device-code")))),
            ])
            .times(3)
            .respond_with(cycle![
                status_code(400).body(json!({"error": "authorization_pending"}).to_string()),
                status_code(400).body(json!({"error": "authorization_pending"}).to_string()),
                json_encoded(user_token_response()),
            ]),
        );
        let engine = HttpTokenEngine::new(config(&server, None))?;
        let seen = Arc::new(Mutex::new(None));
        let captured = seen.clone();
        let got = engine
            .acquire_token_by_device_code(
                &request(&["a"]),
                Arc::new(move |info: &DeviceCodeInfo| {
                    *captured.lock().unwrap() = Some(info.clone());
                }),
            )
            .await?
            .unwrap();
        assert_eq!(got.access_token.as_deref(), Some("user-token"));
        let info = seen.lock().unwrap().clone().unwrap();
        assert_eq!(info.user_code, "ABCD");
        assert_eq!(info.verification_uri, "https://microsoft.com/devicelogin");
        assert_eq!(info.message, "enter ABCD");
        Ok(())
    }

    #[tokio::test]
    async fn device_code_expiration_out_of_range() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/tenant/oauth2/v2.0/devicecode"))
                .respond_with(json_encoded(json!({
                    "user_code": "ABCD",
                    "device_code": "test-device-code",
                    "verification_uri": "https://microsoft.com/devicelogin",
                    "message": "enter ABCD",
                    "expires_in": u64::MAX,
                    "interval": 0,
                }))),
        );
        server.expect(
            Expectation::matching(request::method_path("POST", "/tenant/oauth2/v2.0/token"))
                .times(0)
                .respond_with(status_code(500)),
        );
        let engine = HttpTokenEngine::new(config(&server, None))?;
        let prompted = Arc::new(Mutex::new(false));
        let captured = prompted.clone();
        let err = engine
            .acquire_token_by_device_code(
                &request(&["a"]),
                Arc::new(move |_: &DeviceCodeInfo| *captured.lock().unwrap() = true),
            )
            .await
            .unwrap_err();
        assert!(err.message().contains("out of range"), "{err:?}");
        assert!(!*prompted.lock().unwrap());
        Ok(())
    }

    #[tokio::test]
    async fn device_code_cancelled() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/tenant/oauth2/v2.0/devicecode"))
                .respond_with(json_encoded(json!({
                    "user_code": "ABCD",
                    "device_code": "test-device-code",
                    "verification_uri": "https://microsoft.com/devicelogin",
                    "expires_in": 900,
                    "interval": 60,
                }))),
        );
        let engine = HttpTokenEngine::new(config(&server, None))?;
        let signal = CancellationToken::new();
        let mut request = request(&["a"]);
        request.abort_signal = Some(signal.clone());
        let err = engine
            .acquire_token_by_device_code(
                &request,
                Arc::new(move |_: &DeviceCodeInfo| signal.cancel()),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), EngineErrorKind::DeviceCodePollingCancelled);
        Ok(())
    }

    #[test]
    fn authorization_url() -> TestResult {
        let server = Server::run();
        let engine = HttpTokenEngine::new(config(&server, None))?;
        let params = AuthorizationUrlRequest {
            redirect_uri: "http://localhost:8400".into(),
            code_challenge: Some("test-challenge".into()),
            state: Some("test-state".into()),
            login_hint: Some("user@contoso.com".into()),
            prompt: Some("select_account".into()),
        };
        let got = engine.authorization_url(&request(&["a"]), &params)?;
        let url = url::Url::parse(&got)?;
        assert_eq!(url.path(), "/tenant/oauth2/v2.0/authorize");
        let query = url.query_pairs().into_owned().collect::<Vec<_>>();
        let has = |k: &str, v: &str| query.iter().any(|(a, b)| a == k && b == v);
        assert!(has("client_id", "test-client-id"), "{query:?}");
        assert!(has("response_type", "code"), "{query:?}");
        assert!(has("redirect_uri", "http://localhost:8400"), "{query:?}");
        assert!(has("code_challenge", "test-challenge"), "{query:?}");
        assert!(has("code_challenge_method", "S256"), "{query:?}");
        assert!(has("state", "test-state"), "{query:?}");
        assert!(has("login_hint", "user@contoso.com"), "{query:?}");
        assert!(has("prompt", "select_account"), "{query:?}");
        assert!(has("client-request-id", "test-correlation-id"), "{query:?}");
        assert!(has("scope", "a openid profile offline_access"), "{query:?}");
        Ok(())
    }
}
