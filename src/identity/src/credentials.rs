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

//! Types and functions to obtain access tokens.
//!
//! Each sub-module implements one way to obtain tokens, and each exposes a
//! `Builder` that returns a type implementing [TokenCredential]. The
//! credentials share a common set of options, [TokenCredentialOptions].
//!
//! ```
//! # use azure_identity::credentials::{GetTokenOptions, TokenCredential};
//! # use azure_identity::credentials::client_secret::Builder;
//! # tokio_test::block_on(async {
//! let credential = Builder::new("my-tenant", "my-client-id", "my-secret").build()?;
//! let options = GetTokenOptions::default().with_enable_cae(true);
//! # let _ = (credential, options);
//! # Ok::<(), azure_identity::build_errors::Error>(())
//! # });
//! ```

pub mod authorization_code;
pub mod azure_cli;
pub mod azure_developer_cli;
pub mod azure_powershell;
pub mod chained;
pub mod client_assertion;
pub mod client_certificate;
pub mod client_secret;
pub mod default;
pub mod device_code;
pub mod environment;
pub mod interactive_browser;
pub mod managed_identity;
pub mod on_behalf_of;
pub mod username_password;
pub mod visual_studio_code;
pub mod workload_identity;

use crate::BuildResult;
use crate::engine::{EngineFactory, HttpEngineFactory, TokenCachePersistence};
use crate::env::Environment;
use crate::token::AccessToken;
use visual_studio_code::VsCodeCredentialFinder;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use crate::errors::CredentialsError;

/// The result of a [TokenCredential] operation.
pub type Result<T> = std::result::Result<T, CredentialsError>;

/// Obtains access tokens for a set of scopes.
///
/// Implementations are long-lived: applications create a credential once and
/// call `get_token()` as needed. Credentials may cache tokens, accounts, and
/// environment lookups between calls.
#[async_trait::async_trait]
pub trait TokenCredential: std::fmt::Debug + Send + Sync {
    /// Obtains a token for `scopes`.
    ///
    /// # Parameters
    /// * `scopes` - the scopes requested, for example
    ///   `["https://vault.azure.net/.default"]`.
    /// * `options` - per-request options, such as the tenant.
    async fn get_token(&self, scopes: &[String], options: &GetTokenOptions)
    -> Result<AccessToken>;
}

#[async_trait::async_trait]
impl<T> TokenCredential for Arc<T>
where
    T: TokenCredential + ?Sized,
{
    async fn get_token(
        &self,
        scopes: &[String],
        options: &GetTokenOptions,
    ) -> Result<AccessToken> {
        self.as_ref().get_token(scopes, options).await
    }
}

/// Options for a single token request.
#[derive(Clone, Debug, Default)]
pub struct GetTokenOptions {
    /// Request a token for this tenant instead of the credential's tenant.
    ///
    /// The tenant must be allowed by the credential, see
    /// [TokenCredentialOptions::with_additionally_allowed_tenants].
    pub tenant_id: Option<String>,
    /// Additional claims required in the token, typically returned by a
    /// resource in a claims challenge.
    pub claims: Option<String>,
    /// Request a token that supports continuous access evaluation.
    pub enable_cae: bool,
    /// Groups the HTTP requests of this token request.
    ///
    /// The credential generates a random id when this is not set.
    pub correlation_id: Option<String>,
    /// Cancels the request.
    pub abort_signal: Option<CancellationToken>,
}

impl GetTokenOptions {
    /// Sets the tenant for this request.
    pub fn with_tenant_id<T: Into<String>>(mut self, v: T) -> Self {
        self.tenant_id = Some(v.into());
        self
    }

    /// Sets the claims for this request.
    pub fn with_claims<T: Into<String>>(mut self, v: T) -> Self {
        self.claims = Some(v.into());
        self
    }

    /// Enables continuous access evaluation for this request.
    pub fn with_enable_cae(mut self, v: bool) -> Self {
        self.enable_cae = v;
        self
    }

    /// Sets the correlation id for this request.
    pub fn with_correlation_id<T: Into<String>>(mut self, v: T) -> Self {
        self.correlation_id = Some(v.into());
        self
    }

    /// Sets the cancellation token for this request.
    pub fn with_abort_signal(mut self, v: CancellationToken) -> Self {
        self.abort_signal = Some(v);
        self
    }

    /// Returns an error if the request was cancelled.
    pub(crate) fn check_aborted(&self) -> crate::Result<()> {
        match &self.abort_signal {
            Some(s) if s.is_cancelled() => Err(CredentialsError::aborted(
                "The authentication has been aborted by the caller.",
            )),
            _ => Ok(()),
        }
    }
}

/// Options shared by all the credentials in this crate.
#[derive(Clone, Debug, Default)]
pub struct TokenCredentialOptions {
    pub(crate) authority_host: Option<String>,
    pub(crate) additionally_allowed_tenants: Vec<String>,
    pub(crate) disable_instance_discovery: bool,
    pub(crate) allow_logging_account_identifiers: bool,
    pub(crate) environment: Option<Environment>,
    pub(crate) token_cache_persistence: Option<Arc<dyn TokenCachePersistence>>,
    pub(crate) engine_factory: Option<Arc<dyn EngineFactory>>,
    pub(crate) vs_code_credential_finder: Option<Arc<dyn VsCodeCredentialFinder>>,
}

impl TokenCredentialOptions {
    /// Sets the authority host, for example
    /// [AzureAuthorityHosts::AzureGovernment][crate::authority::AzureAuthorityHosts].
    ///
    /// The default is `AZURE_AUTHORITY_HOST`, or the public cloud if that is
    /// not set.
    pub fn with_authority_host<T: Into<String>>(mut self, v: T) -> Self {
        self.authority_host = Some(v.into());
        self
    }

    /// Tenants, in addition to the configured tenant, for which the
    /// credential may acquire tokens.
    ///
    /// Use `"*"` to allow any tenant.
    pub fn with_additionally_allowed_tenants<I, S>(mut self, v: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.additionally_allowed_tenants = crate::tenant::resolve_additionally_allowed_tenant_ids(v);
        self
    }

    /// Skips instance discovery and authority validation.
    ///
    /// Use this option for private clouds and Azure Stack, where the
    /// authority cannot be validated.
    pub fn with_disable_instance_discovery(mut self, v: bool) -> Self {
        self.disable_instance_discovery = v;
        self
    }

    /// Logs the client, tenant, and object ids of authenticated accounts.
    pub fn with_allow_logging_account_identifiers(mut self, v: bool) -> Self {
        self.allow_logging_account_identifiers = v;
        self
    }

    /// Uses `v` instead of the process environment.
    pub fn with_environment(mut self, v: Environment) -> Self {
        self.environment = Some(v);
        self
    }

    /// Persists the token cache using `v`.
    pub fn with_token_cache_persistence<T>(mut self, v: T) -> Self
    where
        T: TokenCachePersistence + 'static,
    {
        self.token_cache_persistence = Some(Arc::new(v));
        self
    }

    /// Reads the Visual Studio Code credential store using `v`.
    ///
    /// [VisualStudioCodeCredential][visual_studio_code::VisualStudioCodeCredential]
    /// is unavailable without a finder.
    pub fn with_vs_code_credential_finder<T>(mut self, v: T) -> Self
    where
        T: VsCodeCredentialFinder + 'static,
    {
        self.vs_code_credential_finder = Some(Arc::new(v));
        self
    }

    /// Replaces the token engine.
    pub fn with_engine_factory<T>(mut self, v: T) -> Self
    where
        T: EngineFactory + 'static,
    {
        self.engine_factory = Some(Arc::new(v));
        self
    }

    /// The environment snapshot used by the credentials.
    pub(crate) fn environment(&self) -> Environment {
        self.environment
            .clone()
            .unwrap_or_else(Environment::from_process)
    }

    pub(crate) fn resolve_authority_host(&self, env: &Environment) -> BuildResult<String> {
        crate::authority::resolve_authority_host(self.authority_host.as_deref(), env)
    }

    pub(crate) fn engine_factory(&self) -> Arc<dyn EngineFactory> {
        self.engine_factory
            .clone()
            .unwrap_or_else(|| Arc::new(HttpEngineFactory))
    }
}
