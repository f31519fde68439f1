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

//! [Managed identity] credentials.
//!
//! Azure compute services provide an identity to the workloads they run
//! through a local endpoint. The endpoint, and how to call it, depend on the
//! hosting environment. [ManagedIdentityCredential] detects the environment
//! on the first request, trying these sources in order:
//!
//! 1. Azure Arc
//! 2. Service Fabric
//! 3. App Service and Azure Functions (2019-08-01 API)
//! 4. App Service and Azure Functions (2017-09-01 API)
//! 5. Cloud Shell
//! 6. Workload identity token exchange, used in Kubernetes
//! 7. The Azure Instance Metadata Service (IMDS), used in virtual machines
//!
//! The first source that is available is used for the lifetime of the
//! credential.
//!
//! ```
//! # use azure_identity::credentials::managed_identity::Builder;
//! # use azure_identity::credentials::{GetTokenOptions, TokenCredential};
//! # tokio_test::block_on(async {
//! // A user-assigned identity.
//! let credential = Builder::default()
//!     .with_client_id("00000000-0000-0000-0000-000000000000")
//!     .build()?;
//! # Ok::<(), azure_identity::build_errors::Error>(())
//! # });
//! ```
//!
//! [Managed identity]: https://learn.microsoft.com/entra/identity/managed-identities-azure-resources/overview

mod app_service_2017;
mod app_service_2019;
mod arc;
mod cloud_shell;
mod fabric;
mod imds;
mod token_exchange;

use crate::BuildResult;
use crate::build_errors::Error as BuildError;
use crate::cli::scope_resource;
use crate::constants::ORGANIZATIONS_TENANT_ID;
use crate::credentials::{GetTokenOptions, Result, TokenCredential, TokenCredentialOptions};
use crate::engine::cache::{CacheEntry, TokenCache};
use crate::env::Environment;
use crate::errors::{AuthenticationErrorResponse, CredentialsError};
use crate::identity_client::{IdentityClient, RequestOptions};
use crate::logging::{CredentialLogger, format_error, format_success};
use crate::retry::ExponentialBackoff;
use crate::token::AccessToken;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const CREDENTIAL_NAME: &str = "ManagedIdentityCredential";
const CACHE_NAME: &str = "managed-identity";

/// A builder for [ManagedIdentityCredential].
#[derive(Default)]
pub struct Builder {
    client_id: Option<String>,
    resource_id: Option<String>,
    options: TokenCredentialOptions,
}

impl Builder {
    /// Use the user-assigned identity with this client id.
    ///
    /// The default is the system-assigned identity.
    pub fn with_client_id<V: Into<String>>(mut self, v: V) -> Self {
        self.client_id = Some(v.into());
        self
    }

    /// Use the user-assigned identity with this Azure resource id.
    ///
    /// The resource id and the client id are mutually exclusive.
    pub fn with_resource_id<V: Into<String>>(mut self, v: V) -> Self {
        self.resource_id = Some(v.into());
        self
    }

    /// Sets the options shared by all credentials.
    pub fn with_options(mut self, v: TokenCredentialOptions) -> Self {
        self.options = v;
        self
    }

    /// Creates the credential.
    ///
    /// Fails if both a client id and a resource id are configured.
    pub fn build(self) -> BuildResult<ManagedIdentityCredential> {
        self.build_with_sources(None)
    }

    fn build_with_sources(
        self,
        sources: Option<Vec<Arc<dyn MsiSource>>>,
    ) -> BuildResult<ManagedIdentityCredential> {
        if self.client_id.is_some() && self.resource_id.is_some() {
            return Err(BuildError::conflict(format!(
                "{CREDENTIAL_NAME} - Client Id and Resource Id can't be provided at the same time."
            )));
        }
        let env = self.options.environment();
        let client = |insecure: bool, backoff: ExponentialBackoff| {
            IdentityClient::builder()
                .with_allow_insecure_connection(insecure)
                .with_allow_logging_account_identifiers(
                    self.options.allow_logging_account_identifiers,
                )
                .with_backoff(backoff)
                .build()
                .map_err(BuildError::loading)
        };
        let clients = MsiClients {
            default: client(false, ExponentialBackoff::default())?,
            ping: client(false, ExponentialBackoff::new(0, Duration::ZERO))?,
            insecure: client(true, ExponentialBackoff::default())?,
        };
        let sources = sources.unwrap_or_else(|| default_sources(&self.options));
        Ok(ManagedIdentityCredential {
            logger: CredentialLogger::new(CREDENTIAL_NAME),
            client_id: self.client_id,
            resource_id: self.resource_id,
            env,
            clients,
            sources,
            selected: Mutex::new(None),
            endpoint_unavailable: Mutex::new(None),
            cache: TokenCache::new(CACHE_NAME.to_string(), None),
        })
    }
}

fn default_sources(options: &TokenCredentialOptions) -> Vec<Arc<dyn MsiSource>> {
    vec![
        Arc::new(arc::AzureArc),
        Arc::new(fabric::ServiceFabric),
        Arc::new(app_service_2019::AppService2019),
        Arc::new(app_service_2017::AppService2017),
        Arc::new(cloud_shell::CloudShell),
        Arc::new(token_exchange::TokenExchange::new(options.clone())),
        Arc::new(imds::Imds::default()),
    ]
}

/// The HTTP clients used by the sources.
#[derive(Clone, Debug)]
pub(crate) struct MsiClients {
    /// Retries transient errors.
    pub(crate) default: IdentityClient,
    /// Does not retry, used to ping the endpoints.
    pub(crate) ping: IdentityClient,
    /// Accepts self-signed certificates.
    pub(crate) insecure: IdentityClient,
}

/// What a source needs to check its endpoint and request tokens.
#[derive(Clone, Copy, Debug)]
pub(crate) struct MsiContext<'a> {
    pub(crate) scopes: &'a [String],
    pub(crate) client_id: Option<&'a str>,
    pub(crate) resource_id: Option<&'a str>,
    pub(crate) env: &'a Environment,
    pub(crate) clients: &'a MsiClients,
    pub(crate) options: &'a GetTokenOptions,
}

impl MsiContext<'_> {
    /// The resource for the requested scopes, if there is exactly one scope.
    pub(crate) fn resource(&self) -> Option<&str> {
        match self.scopes {
            [scope] => Some(scope_resource(scope)),
            _ => None,
        }
    }

    /// The resource, or an error naming the source.
    pub(crate) fn require_resource(&self, source: &str) -> Result<&str> {
        self.resource().ok_or_else(|| {
            CredentialsError::unavailable(format!("{source}: Multiple scopes are not supported."))
        })
    }

    pub(crate) fn request_options(&self) -> RequestOptions {
        RequestOptions::default()
            .with_correlation_id(self.options.correlation_id.clone())
            .with_abort_signal(self.options.abort_signal.clone())
    }

    /// Sends a request for a token and extracts the access token.
    pub(crate) async fn send_token_request(
        &self,
        client: &IdentityClient,
        request: reqwest::RequestBuilder,
    ) -> Result<Option<AccessToken>> {
        let response = client
            .send_token_request(request, &self.request_options())
            .await?;
        Ok(response.map(|r| r.access_token))
    }
}

/// One of the environments that provide managed identities.
#[async_trait::async_trait]
pub(crate) trait MsiSource: std::fmt::Debug + Send + Sync {
    /// The name used in log messages.
    fn name(&self) -> &'static str;

    /// Returns true if the credential runs in this environment.
    async fn is_available(&self, context: &MsiContext<'_>) -> bool;

    /// Requests a token from the endpoint of this environment.
    ///
    /// Returns `None` if the endpoint answered without a token.
    async fn get_token(&self, context: &MsiContext<'_>) -> Result<Option<AccessToken>>;

    /// Whether tokens from this source go through the credential's token
    /// cache.
    fn uses_cache(&self) -> bool {
        true
    }
}

/// Authenticates with the managed identity of the hosting environment.
#[derive(Debug)]
pub struct ManagedIdentityCredential {
    logger: CredentialLogger,
    client_id: Option<String>,
    resource_id: Option<String>,
    env: Environment,
    clients: MsiClients,
    sources: Vec<Arc<dyn MsiSource>>,
    selected: Mutex<Option<Arc<dyn MsiSource>>>,
    endpoint_unavailable: Mutex<Option<bool>>,
    cache: TokenCache,
}

impl ManagedIdentityCredential {
    fn context<'a>(&'a self, scopes: &'a [String], options: &'a GetTokenOptions) -> MsiContext<'a> {
        MsiContext {
            scopes,
            client_id: self.client_id.as_deref(),
            resource_id: self.resource_id.as_deref(),
            env: &self.env,
            clients: &self.clients,
            options,
        }
    }

    fn selected(&self) -> Option<Arc<dyn MsiSource>> {
        self.selected.lock().ok().and_then(|s| s.clone())
    }

    // Checks the sources in order, remembering the first available one.
    async fn available_source(&self, context: &MsiContext<'_>) -> Result<Arc<dyn MsiSource>> {
        if let Some(source) = self.selected() {
            return Ok(source);
        }
        for source in &self.sources {
            if source.is_available(context).await {
                self.logger
                    .info(format!("Using the {} source", source.name()));
                if let Ok(mut selected) = self.selected.lock() {
                    *selected = Some(source.clone());
                }
                return Ok(source.clone());
            }
        }
        Err(CredentialsError::unavailable(format!(
            "{CREDENTIAL_NAME} - No MSI credential available"
        )))
    }

    fn endpoint_unavailable(&self) -> Option<bool> {
        self.endpoint_unavailable.lock().ok().and_then(|v| *v)
    }

    fn set_endpoint_unavailable(&self, v: bool) {
        if let Ok(mut guard) = self.endpoint_unavailable.lock() {
            *guard = Some(v);
        }
    }

    async fn authenticate(
        &self,
        scopes: &[String],
        options: &GetTokenOptions,
    ) -> Result<Option<AccessToken>> {
        let context = self.context(scopes, options);
        let source = self.available_source(&context).await?;
        if !source.uses_cache() {
            return source.get_token(&context).await;
        }
        let tenant = options
            .tenant_id
            .as_deref()
            .unwrap_or(ORGANIZATIONS_TENANT_ID);
        if options.claims.is_none() {
            if let Some((token, expires_on)) = self.cache.access_token(None, tenant, scopes).await {
                return Ok(Some(AccessToken::new(token, expires_on)));
            }
        }
        let token = source.get_token(&context).await?;
        if let Some(t) = &token {
            self.cache
                .save(CacheEntry {
                    tenant,
                    scopes,
                    access_token: &t.token,
                    expires_on: t.expires_on_timestamp,
                    ..Default::default()
                })
                .await;
        }
        Ok(token)
    }

    async fn try_get_token(
        &self,
        scopes: &[String],
        options: &GetTokenOptions,
    ) -> Result<AccessToken> {
        if self.endpoint_unavailable() == Some(true) {
            return Err(CredentialsError::unavailable(
                "The managed identity endpoint is not currently available",
            ));
        }
        match self.authenticate(scopes, options).await? {
            Some(token) => {
                self.set_endpoint_unavailable(false);
                Ok(token)
            }
            None => {
                self.set_endpoint_unavailable(true);
                Err(CredentialsError::unavailable(
                    "The managed identity endpoint was reached, yet no tokens were received.",
                ))
            }
        }
    }
}

// Maps the failures of the sources to errors a chain can act on.
fn normalize_error(e: CredentialsError) -> CredentialsError {
    if e.is_unavailable() || e.is_authentication_required() || e.is_aborted() {
        return e;
    }
    if e.is_connect() {
        return CredentialsError::unavailable(format!(
            "{CREDENTIAL_NAME}: Unavailable. No managed identity endpoint found. Message: {e}"
        ));
    }
    match e.status_code() {
        Some(400) => CredentialsError::unavailable(format!(
            "{CREDENTIAL_NAME}: The managed identity endpoint is indicating there's no available identity. Message: {e}"
        )),
        None => CredentialsError::unavailable(format!(
            "{CREDENTIAL_NAME}: Authentication failed. Message {e}"
        )),
        Some(status) => CredentialsError::authentication_from_response(
            status,
            AuthenticationErrorResponse::new(
                format!("{CREDENTIAL_NAME} authentication failed."),
                e.to_string(),
            ),
        ),
    }
}

#[async_trait::async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn get_token(
        &self,
        scopes: &[String],
        options: &GetTokenOptions,
    ) -> Result<AccessToken> {
        let logger = self.logger.get_token();
        match self.try_get_token(scopes, options).await {
            Ok(token) => {
                logger.info(format_success(scopes));
                Ok(token)
            }
            Err(e) => {
                let error = normalize_error(e);
                logger.info(format_error(Some(scopes), &error));
                Err(error)
            }
        }
    }
}
