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

//! The token engine.
//!
//! The credentials in this crate delegate the OAuth 2.0 protocol exchanges,
//! and the caching of tokens and accounts, to a [TokenEngine]. The crate
//! includes a default implementation, [HttpTokenEngine], which talks to the
//! Microsoft identity platform directly. Applications with special needs can
//! provide their own engine using an [EngineFactory], see
//! [TokenCredentialOptions::with_engine_factory].
//!
//! Token caches can be persisted with a [TokenCachePersistence] plugin, see
//! [TokenCredentialOptions::with_token_cache_persistence].
//!
//! [TokenCredentialOptions::with_engine_factory]: crate::credentials::TokenCredentialOptions::with_engine_factory
//! [TokenCredentialOptions::with_token_cache_persistence]: crate::credentials::TokenCredentialOptions::with_token_cache_persistence

pub(crate) mod cache;
mod http;
mod jws;

pub use http::HttpTokenEngine;
pub use jws::CertificateKey;
pub(crate) use jws::parse_certificate;

use crate::credentials::client_assertion::ClientAssertionProvider;
use crate::identity_client::IdentityClient;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The result of engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// An account known to the token engine.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct EngineAccount {
    /// The account id across tenants, typically `{object id}.{tenant id}`.
    pub home_account_id: String,
    /// The account id in the tenant.
    pub local_account_id: String,
    /// The host of the authority, for example `login.microsoftonline.com`.
    pub environment: String,
    /// The tenant of the account.
    pub tenant_id: String,
    /// The user name of the account.
    pub username: String,
}

/// The result of a successful engine operation.
///
/// Engines may return incomplete results, the credentials reject results
/// without a token or an expiration.
#[derive(Clone, Default, PartialEq)]
pub struct AuthenticationResult {
    /// The access token.
    pub access_token: Option<String>,
    /// The expiration, in milliseconds since the epoch.
    pub expires_on: Option<i64>,
    /// The account of user flows.
    pub account: Option<EngineAccount>,
}

impl std::fmt::Debug for AuthenticationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationResult")
            .field("access_token", &self.access_token.as_ref().map(|_| "[censored]"))
            .field("expires_on", &self.expires_on)
            .field("account", &self.account)
            .finish()
    }
}

/// The categories of engine errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum EngineErrorKind {
    /// The authority endpoints could not be resolved.
    EndpointsResolution,
    /// The caller cancelled a device code flow.
    DeviceCodePollingCancelled,
    /// The user must interact with the identity provider.
    InteractionRequired,
    /// The user must consent to the requested scopes.
    ConsentRequired,
    /// The user must sign in again.
    LoginRequired,
    /// The cache has no usable tokens for the account.
    NoTokensFound,
    /// The engine configuration is invalid.
    ClientConfiguration,
    /// The browser, or the local redirect listener, are misconfigured.
    BrowserConfiguration,
    /// The caller cancelled the operation.
    Abort,
    /// The identity provider rejected the request.
    Server,
    /// The request could not be sent.
    Network,
}

impl EngineErrorKind {
    /// The error code used by the identity platform for this category.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EndpointsResolution => "endpoints_resolution_error",
            Self::DeviceCodePollingCancelled => "device_code_polling_cancelled",
            Self::InteractionRequired => "interaction_required",
            Self::ConsentRequired => "consent_required",
            Self::LoginRequired => "login_required",
            Self::NoTokensFound => "no_tokens_found",
            Self::ClientConfiguration => "client_configuration_error",
            Self::BrowserConfiguration => "browser_configuration_error",
            Self::Abort => "abort",
            Self::Server => "server_error",
            Self::Network => "network_error",
        }
    }
}

/// An error reported by a [TokenEngine].
#[derive(thiserror::Error, Clone, Debug)]
#[error("{kind:?}: {message}")]
pub struct EngineError {
    kind: EngineErrorKind,
    message: String,
    status: Option<u16>,
}

impl EngineError {
    /// Creates a new error.
    pub fn new<T: Into<String>>(kind: EngineErrorKind, message: T) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    /// Creates an error for an identity provider response.
    pub fn server<T: Into<String>>(status: u16, message: T) -> Self {
        Self {
            kind: EngineErrorKind::Server,
            message: message.into(),
            status: Some(status),
        }
    }

    /// The category of the error.
    pub fn kind(&self) -> EngineErrorKind {
        self.kind
    }

    /// The human readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The HTTP status of server errors.
    pub fn status(&self) -> Option<u16> {
        self.status
    }
}

/// Information presented to the user in the device code flow.
#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
pub struct DeviceCodeInfo {
    /// The code the user enters on the verification page.
    pub user_code: String,
    /// The page where the user enters the code.
    pub verification_uri: String,
    /// A message with instructions for the user.
    #[serde(default)]
    pub message: String,
}

/// Receives the device code details.
pub type DeviceCodePromptCallback = Arc<dyn Fn(&DeviceCodeInfo) + Send + Sync>;

/// The common parameters of a token request.
#[derive(Clone, Debug, Default)]
pub struct TokenRequest {
    /// The requested scopes.
    pub scopes: Vec<String>,
    /// The authority for this request, including the tenant.
    pub authority: Option<String>,
    /// The correlation id of this request.
    pub correlation_id: Option<String>,
    /// Claims required in the token.
    pub claims: Option<String>,
    /// Cancels the request.
    pub abort_signal: Option<CancellationToken>,
}

/// The parameters to redeem an authorization code.
#[derive(Clone, Default, PartialEq)]
pub struct AuthorizationCodeRequest {
    /// The authorization code.
    pub code: String,
    /// The redirect URI used to obtain the code.
    pub redirect_uri: String,
    /// The PKCE code verifier, if a code challenge was used.
    pub code_verifier: Option<String>,
}

impl std::fmt::Debug for AuthorizationCodeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationCodeRequest")
            .field("code", &"[censored]")
            .field("redirect_uri", &self.redirect_uri)
            .field("code_verifier", &self.code_verifier.as_ref().map(|_| "[censored]"))
            .finish()
    }
}

/// The parameters of an authorization URL.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AuthorizationUrlRequest {
    /// The redirect URI.
    pub redirect_uri: String,
    /// The PKCE code challenge, using the `S256` method.
    pub code_challenge: Option<String>,
    /// An opaque value returned in the redirect.
    pub state: Option<String>,
    /// Prefills the user name.
    pub login_hint: Option<String>,
    /// The kind of interaction, for example `select_account`.
    pub prompt: Option<String>,
}

/// The secret material of confidential clients.
#[derive(Clone)]
pub enum ClientCredential {
    /// A client secret.
    Secret(String),
    /// A certificate and its private key.
    Certificate(CertificateKey),
    /// A client assertion, produced on demand.
    Assertion(Arc<dyn ClientAssertionProvider>),
}

impl std::fmt::Debug for ClientCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Secret(_) => f.debug_tuple("Secret").field(&"[censored]").finish(),
            Self::Certificate(c) => f.debug_tuple("Certificate").field(c).finish(),
            Self::Assertion(a) => f.debug_tuple("Assertion").field(a).finish(),
        }
    }
}

/// The configuration of an engine application.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// The client (application) id.
    pub client_id: String,
    /// The default authority, including the tenant.
    pub authority: String,
    /// Authorities trusted without instance discovery.
    pub known_authorities: Vec<String>,
    /// The client capabilities, `cp1` for continuous access evaluation.
    pub client_capabilities: Vec<String>,
    /// The client credential of confidential applications.
    pub client_credential: Option<ClientCredential>,
    /// The Azure region of regional token endpoints.
    pub azure_region: Option<String>,
    /// The name of the token cache, distinct for CAE and non-CAE
    /// applications.
    pub cache_name: String,
    /// Persists the token cache.
    pub persistence: Option<Arc<dyn TokenCachePersistence>>,
    pub(crate) identity_client: IdentityClient,
}

impl EngineConfig {
    /// True if this is a confidential client application.
    pub fn is_confidential(&self) -> bool {
        self.client_credential.is_some()
    }
}

/// The operations of a token engine.
///
/// Each method returns `Ok(None)` if the engine produced no result without
/// failing.
#[async_trait::async_trait]
pub trait TokenEngine: std::fmt::Debug + Send + Sync {
    /// Obtains a token for `account` from the cache, refreshing it if needed.
    async fn acquire_token_silent(
        &self,
        account: &EngineAccount,
        request: &TokenRequest,
    ) -> EngineResult<Option<AuthenticationResult>>;

    /// Obtains a token for the application itself.
    async fn acquire_token_by_client_credential(
        &self,
        request: &TokenRequest,
    ) -> EngineResult<Option<AuthenticationResult>>;

    /// Runs the device code flow.
    async fn acquire_token_by_device_code(
        &self,
        request: &TokenRequest,
        prompt: DeviceCodePromptCallback,
    ) -> EngineResult<Option<AuthenticationResult>>;

    /// Redeems an authorization code.
    async fn acquire_token_by_code(
        &self,
        request: &TokenRequest,
        code: &AuthorizationCodeRequest,
    ) -> EngineResult<Option<AuthenticationResult>>;

    /// Exchanges a user assertion for a token on behalf of that user.
    async fn acquire_token_on_behalf_of(
        &self,
        request: &TokenRequest,
        user_assertion: &str,
    ) -> EngineResult<Option<AuthenticationResult>>;

    /// Exchanges a user name and password for a token.
    async fn acquire_token_by_username_password(
        &self,
        request: &TokenRequest,
        username: &str,
        password: &str,
    ) -> EngineResult<Option<AuthenticationResult>>;

    /// Returns the URL of the authorization endpoint for an interactive
    /// sign-in.
    fn authorization_url(
        &self,
        request: &TokenRequest,
        params: &AuthorizationUrlRequest,
    ) -> EngineResult<String>;

    /// Returns the accounts in the token cache.
    async fn accounts(&self) -> EngineResult<Vec<EngineAccount>>;
}

/// Creates token engines.
pub trait EngineFactory: std::fmt::Debug + Send + Sync {
    /// Creates an engine for `config`.
    fn create(&self, config: EngineConfig) -> EngineResult<Arc<dyn TokenEngine>>;
}

/// Creates [HttpTokenEngine] instances.
#[derive(Clone, Debug, Default)]
pub struct HttpEngineFactory;

impl EngineFactory for HttpEngineFactory {
    fn create(&self, config: EngineConfig) -> EngineResult<Arc<dyn TokenEngine>> {
        Ok(Arc::new(HttpTokenEngine::new(config)?))
    }
}

/// Loads and stores serialized token caches.
///
/// Implementations typically use an encrypted store of the operating system.
/// Each credential uses two caches, with `.cae` and `.nocae` suffixes.
#[async_trait::async_trait]
pub trait TokenCachePersistence: std::fmt::Debug + Send + Sync {
    /// Returns the serialized cache named `name`, if any.
    async fn load(&self, name: &str) -> crate::credentials::Result<Option<String>>;

    /// Replaces the serialized cache named `name`.
    async fn store(&self, name: &str, contents: &str) -> crate::credentials::Result<()>;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use mockall::mock;

    mock! {
        #[derive(Debug)]
        pub Engine {}

        #[async_trait::async_trait]
        impl TokenEngine for Engine {
            async fn acquire_token_silent(&self, account: &EngineAccount, request: &TokenRequest) -> EngineResult<Option<AuthenticationResult>>;
            async fn acquire_token_by_client_credential(&self, request: &TokenRequest) -> EngineResult<Option<AuthenticationResult>>;
            async fn acquire_token_by_device_code(&self, request: &TokenRequest, prompt: DeviceCodePromptCallback) -> EngineResult<Option<AuthenticationResult>>;
            async fn acquire_token_by_code(&self, request: &TokenRequest, code: &AuthorizationCodeRequest) -> EngineResult<Option<AuthenticationResult>>;
            async fn acquire_token_on_behalf_of(&self, request: &TokenRequest, user_assertion: &str) -> EngineResult<Option<AuthenticationResult>>;
            async fn acquire_token_by_username_password(&self, request: &TokenRequest, username: &str, password: &str) -> EngineResult<Option<AuthenticationResult>>;
            fn authorization_url(&self, request: &TokenRequest, params: &AuthorizationUrlRequest) -> EngineResult<String>;
            async fn accounts(&self) -> EngineResult<Vec<EngineAccount>>;
        }
    }

    mock! {
        #[derive(Debug)]
        pub Factory {}

        impl EngineFactory for Factory {
            fn create(&self, config: EngineConfig) -> EngineResult<Arc<dyn TokenEngine>>;
        }
    }

    mock! {
        #[derive(Debug)]
        pub Persistence {}

        #[async_trait::async_trait]
        impl TokenCachePersistence for Persistence {
            async fn load(&self, name: &str) -> crate::credentials::Result<Option<String>>;
            async fn store(&self, name: &str, contents: &str) -> crate::credentials::Result<()>;
        }
    }

    /// A successful result expiring in one hour.
    pub(crate) fn result(token: &str) -> AuthenticationResult {
        AuthenticationResult {
            access_token: Some(token.to_string()),
            expires_on: Some(crate::token::now_millis() + 3_600_000),
            account: None,
        }
    }

    /// A factory that returns the same engine for every application.
    pub(crate) fn factory(engine: MockEngine) -> MockFactory {
        let engine: Arc<dyn TokenEngine> = Arc::new(engine);
        let mut factory = MockFactory::new();
        factory
            .expect_create()
            .returning(move |_| Ok(engine.clone()));
        factory
    }

    static_assertions::assert_impl_all!(EngineConfig: Send, Sync, Clone);
    static_assertions::assert_impl_all!(EngineError: Send, Sync, Clone);

    #[test]
    fn error_accessors() {
        let e = EngineError::new(EngineErrorKind::EndpointsResolution, "cannot resolve");
        assert_eq!(e.kind(), EngineErrorKind::EndpointsResolution);
        assert_eq!(e.message(), "cannot resolve");
        assert_eq!(e.status(), None);
        assert_eq!(e.kind().error_code(), "endpoints_resolution_error");

        let e = EngineError::server(400, "invalid_grant");
        assert_eq!(e.kind(), EngineErrorKind::Server);
        assert_eq!(e.status(), Some(400));
    }

    #[test]
    fn debug_censors_secrets() {
        let result = result("secret-token");
        let got = format!("{result:?}");
        assert!(!got.contains("secret-token"), "{got}");

        let credential = ClientCredential::Secret("secret-value".into());
        let got = format!("{credential:?}");
        assert!(!got.contains("secret-value"), "{got}");

        let code = AuthorizationCodeRequest {
            code: "secret-code".into(),
            redirect_uri: "http://localhost".into(),
            code_verifier: Some("secret-verifier".into()),
        };
        let got = format!("{code:?}");
        assert!(!got.contains("secret-code"), "{got}");
        assert!(!got.contains("secret-verifier"), "{got}");
    }
}
