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

//! The token acquisition state machine shared by the engine-backed
//! credentials.
//!
//! Each credential owns an [EngineAdapter] and the [TokenFlow] implementing
//! its interactive (or non-interactive) mechanism. The adapter resolves the
//! tenant, lazily creates the engine applications, tries the cache first, and
//! falls back to the flow. Engine results and errors are normalized into
//! [AccessToken] and [CredentialsError].

use crate::BuildResult;
use crate::auth_record::AuthenticationRecord;
use crate::authority::{RegionalAuthority, get_authority, get_known_authorities};
use crate::constants::{
    CACHE_CAE_SUFFIX, CACHE_NON_CAE_SUFFIX, CAE_CLIENT_CAPABILITY, DEFAULT_CACHE_NAME,
};
use crate::credentials::{GetTokenOptions, TokenCredentialOptions};
use crate::engine::{
    AuthenticationResult, ClientCredential, EngineConfig, EngineError, EngineErrorKind,
    EngineFactory, TokenCachePersistence, TokenEngine, TokenRequest,
};
use crate::env::{AZURE_REGIONAL_AUTHORITY_NAME, REGION_NAME};
use crate::errors::CredentialsError;
use crate::identity_client::IdentityClient;
use crate::logging::{CredentialLogger, format_error, format_success};
use crate::tenant::{self, TenantRequest};
use crate::token::AccessToken;
use crate::Result;
use std::sync::{Arc, Mutex};

const NO_ACCOUNT_MESSAGE: &str =
    "Silent authentication failed. We couldn't retrieve an active account from the cache.";
const AUTOMATIC_AUTHENTICATION_DISABLED_MESSAGE: &str =
    "Automatic authentication has been disabled. You may call the authentication() method.";
const MISSING_CONFIDENTIAL_CREDENTIAL_MESSAGE: &str = "Unable to generate the MSAL confidential client. Missing either the client's secret, certificate or assertion.";
const MULTIPLE_ACCOUNTS_MESSAGE: &str = "More than one account was found authenticated for this Client ID and Tenant ID.\nHowever, no \"authenticationRecord\" has been provided for this credential,\ntherefore we're unable to pick between these accounts.\nA new login attempt will be requested, to ensure the correct account is picked.\nTo work with multiple accounts for the same Client ID and Tenant ID, please provide an \"authenticationRecord\" when initializing a credential to prevent this from happening.";

/// The errors of a [TokenFlow].
///
/// Flows fail with engine errors, normalized by the adapter, or with errors
/// already in the crate taxonomy, returned unchanged.
#[derive(Debug)]
pub(crate) enum FlowError {
    Engine(EngineError),
    Credentials(CredentialsError),
}

impl From<EngineError> for FlowError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

impl From<CredentialsError> for FlowError {
    fn from(value: CredentialsError) -> Self {
        Self::Credentials(value)
    }
}

pub(crate) type FlowResult = std::result::Result<Option<AuthenticationResult>, FlowError>;

/// One mechanism to acquire tokens when the cache cannot be used.
#[async_trait::async_trait]
pub(crate) trait TokenFlow: std::fmt::Debug + Send + Sync {
    /// True if the flow cannot run without a client credential.
    fn requires_confidential_client(&self) -> bool {
        false
    }

    /// Acquires a token using `engine`.
    async fn do_get_token(&self, engine: &dyn TokenEngine, request: &TokenRequest) -> FlowResult;
}

/// The client credential grant, shared by the secret, certificate, and
/// assertion credentials.
#[derive(Debug, Default)]
pub(crate) struct ClientCredentialFlow;

#[async_trait::async_trait]
impl TokenFlow for ClientCredentialFlow {
    fn requires_confidential_client(&self) -> bool {
        true
    }

    async fn do_get_token(&self, engine: &dyn TokenEngine, request: &TokenRequest) -> FlowResult {
        Ok(engine.acquire_token_by_client_credential(request).await?)
    }
}

/// The configuration of an [EngineAdapter], assembled by each credential
/// builder.
#[derive(Clone, Debug)]
pub(crate) struct AdapterConfig {
    pub(crate) logger: CredentialLogger,
    pub(crate) client_id: String,
    /// The configured tenant, already resolved to its default.
    pub(crate) tenant_id: String,
    pub(crate) client_credential: Option<ClientCredential>,
    pub(crate) regional_authority: Option<RegionalAuthority>,
    pub(crate) disable_automatic_authentication: bool,
    pub(crate) authentication_record: Option<AuthenticationRecord>,
    pub(crate) options: TokenCredentialOptions,
}

impl AdapterConfig {
    pub(crate) fn new<C, T>(logger: CredentialLogger, client_id: C, tenant_id: T) -> Self
    where
        C: Into<String>,
        T: Into<String>,
    {
        Self {
            logger,
            client_id: client_id.into(),
            tenant_id: tenant_id.into(),
            client_credential: None,
            regional_authority: None,
            disable_automatic_authentication: false,
            authentication_record: None,
            options: TokenCredentialOptions::default(),
        }
    }

    pub(crate) fn with_client_credential(mut self, v: ClientCredential) -> Self {
        self.client_credential = Some(v);
        self
    }

    pub(crate) fn with_regional_authority(mut self, v: Option<RegionalAuthority>) -> Self {
        self.regional_authority = v;
        self
    }

    pub(crate) fn with_disable_automatic_authentication(mut self, v: bool) -> Self {
        self.disable_automatic_authentication = v;
        self
    }

    pub(crate) fn with_authentication_record(mut self, v: Option<AuthenticationRecord>) -> Self {
        self.authentication_record = v;
        self
    }

    pub(crate) fn with_options(mut self, v: TokenCredentialOptions) -> Self {
        self.options = v;
        self
    }
}

// The engine applications of one mode, standard or CAE.
#[derive(Clone, Debug)]
struct Applications {
    public: Arc<dyn TokenEngine>,
    confidential: Option<Arc<dyn TokenEngine>>,
}

impl Applications {
    // The confidential application if there is one, else the public one.
    fn preferred(&self) -> &dyn TokenEngine {
        self.confidential.as_deref().unwrap_or(self.public.as_ref())
    }
}

#[derive(Debug, Default)]
struct AdapterState {
    account: Option<AuthenticationRecord>,
    cached_claims: Option<String>,
    standard: Option<Applications>,
    cae: Option<Applications>,
}

/// Drives a [TokenFlow] through the silent-then-interactive state machine.
#[derive(Debug)]
pub(crate) struct EngineAdapter<F> {
    flow: F,
    logger: CredentialLogger,
    client_id: String,
    tenant_id: String,
    additionally_allowed_tenants: Vec<String>,
    multi_tenant_disabled: bool,
    authority_host: String,
    known_authorities: Vec<String>,
    azure_region: Option<String>,
    client_credential: Option<ClientCredential>,
    disable_automatic_authentication: bool,
    cache_name: String,
    persistence: Option<Arc<dyn TokenCachePersistence>>,
    factory: Arc<dyn EngineFactory>,
    identity_client: IdentityClient,
    state: Mutex<AdapterState>,
}

impl<F: TokenFlow> EngineAdapter<F> {
    pub(crate) fn new(config: AdapterConfig, flow: F) -> BuildResult<Self> {
        let env = config.options.environment();
        let authority_host = config.options.resolve_authority_host(&env)?;
        let authority = get_authority(&config.tenant_id, Some(&authority_host));
        let mut additionally_allowed_tenants = config.options.additionally_allowed_tenants.clone();
        additionally_allowed_tenants.extend(env.additionally_allowed_tenants());
        let additionally_allowed_tenants =
            tenant::resolve_additionally_allowed_tenant_ids(additionally_allowed_tenants);
        let regional_authority = config.regional_authority.clone().or_else(|| {
            env.get(AZURE_REGIONAL_AUTHORITY_NAME)
                .map(RegionalAuthority::from_name)
        });
        let azure_region = match regional_authority {
            None => None,
            Some(RegionalAuthority::AutoDiscoverRegion) => env.get_string(REGION_NAME),
            Some(r) => Some(r.as_str().to_string()),
        };
        let identity_client = IdentityClient::builder()
            .with_authority_host(authority_host.clone())
            .with_allow_logging_account_identifiers(
                config.options.allow_logging_account_identifiers,
            )
            .build()
            .map_err(crate::build_errors::Error::loading)?;
        Ok(Self {
            flow,
            logger: config.logger,
            known_authorities: get_known_authorities(
                &config.tenant_id,
                &authority,
                config.options.disable_instance_discovery,
            ),
            client_id: config.client_id,
            tenant_id: config.tenant_id,
            additionally_allowed_tenants,
            multi_tenant_disabled: env.multi_tenant_disabled(),
            authority_host,
            azure_region,
            client_credential: config.client_credential,
            disable_automatic_authentication: config.disable_automatic_authentication,
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            persistence: config.options.token_cache_persistence.clone(),
            factory: config.options.engine_factory(),
            identity_client,
            state: Mutex::new(AdapterState {
                account: config.authentication_record,
                ..Default::default()
            }),
        })
    }

    pub(crate) fn flow(&self) -> &F {
        &self.flow
    }

    pub(crate) fn logger(&self) -> &CredentialLogger {
        &self.logger
    }

    #[cfg(test)]
    pub(crate) fn client_id(&self) -> &str {
        &self.client_id
    }

    /// The account of the last successful authentication, if any.
    pub(crate) fn active_account(&self) -> Option<AuthenticationRecord> {
        self.state.lock().ok().and_then(|s| s.account.clone())
    }

    fn set_account(&self, account: AuthenticationRecord) {
        if let Ok(mut state) = self.state.lock() {
            state.account = Some(account);
        }
    }

    /// Acquires a token, silently if possible.
    pub(crate) async fn get_token(
        &self,
        scopes: &[String],
        options: &GetTokenOptions,
    ) -> Result<AccessToken> {
        self.acquire(scopes, options, self.disable_automatic_authentication)
            .await
    }

    /// Acquires a token, running the flow even if automatic authentication
    /// is disabled, and returns the record of the authenticated account.
    pub(crate) async fn authenticate(
        &self,
        scopes: &[String],
        options: &GetTokenOptions,
    ) -> Result<Option<AuthenticationRecord>> {
        self.acquire(scopes, options, false).await?;
        Ok(self.active_account())
    }

    async fn acquire(
        &self,
        scopes: &[String],
        options: &GetTokenOptions,
        disable_automatic_authentication: bool,
    ) -> Result<AccessToken> {
        let logger = self.logger.get_token();
        let tenant_id = tenant::resolve(
            TenantRequest {
                configured: Some(&self.tenant_id),
                requested: options.tenant_id.as_deref(),
                additionally_allowed: &self.additionally_allowed_tenants,
                multi_tenant_disabled: self.multi_tenant_disabled,
            },
            &logger,
        )?
        .unwrap_or_else(|| self.tenant_id.clone());
        let correlation_id = options
            .correlation_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let _abort_watch = options
            .abort_signal
            .as_ref()
            .map(|signal| self.watch_abort(signal, &correlation_id));
        options.check_aborted()?;

        let request = TokenRequest {
            scopes: scopes.to_vec(),
            authority: Some(get_authority(&tenant_id, Some(&self.authority_host))),
            correlation_id: Some(correlation_id),
            claims: self.claims(options.claims.as_deref()),
            abort_signal: options.abort_signal.clone(),
        };
        let applications = self.init(options.enable_cae)?;

        match self
            .get_token_silent(&applications, &request, scopes, options)
            .await
        {
            Err(e) if e.is_authentication_required() => {
                if disable_automatic_authentication {
                    return Err(CredentialsError::authentication_required(
                        AUTOMATIC_AUTHENTICATION_DISABLED_MESSAGE,
                        scopes,
                        options,
                    ));
                }
                logger.info(format!(
                    "Silent authentication failed, falling back to interactive method. {e}"
                ));
                let result = self
                    .flow
                    .do_get_token(applications.preferred(), &request)
                    .await
                    .map_err(|e| self.handle_error(scopes, options, e));
                let token = result.and_then(|r| self.handle_result(scopes, options, r));
                match &token {
                    Ok(_) => logger.info(format_success(scopes)),
                    Err(e) => logger.warning(format_error(Some(scopes), e)),
                }
                token
            }
            other => other,
        }
    }

    // Cancels the identity client requests of this call when `signal` is
    // cancelled. The watch stops when the returned guard is dropped.
    fn watch_abort(
        &self,
        signal: &tokio_util::sync::CancellationToken,
        correlation_id: &str,
    ) -> tokio_util::sync::DropGuard {
        let done = tokio_util::sync::CancellationToken::new();
        let (signal, finished) = (signal.clone(), done.clone());
        let client = self.identity_client.clone();
        let id = correlation_id.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = signal.cancelled() => client.abort_requests(Some(&id)),
                _ = finished.cancelled() => {},
            }
        });
        done.drop_guard()
    }

    // Claims in a request replace the cached claims, requests without claims
    // replay the last ones seen.
    fn claims(&self, claims: Option<&str>) -> Option<String> {
        let Ok(mut state) = self.state.lock() else {
            return claims.map(str::to_string);
        };
        if let Some(c) = claims {
            state.cached_claims = Some(c.to_string());
        }
        state.cached_claims.clone()
    }

    // Creates the applications of the requested mode, once.
    fn init(&self, enable_cae: bool) -> Result<Applications> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| CredentialsError::configuration("the credential state is poisoned"))?;
        let slot = if enable_cae {
            &mut state.cae
        } else {
            &mut state.standard
        };
        if let Some(applications) = slot {
            return Ok(applications.clone());
        }
        if self.flow.requires_confidential_client() && self.client_credential.is_none() {
            return Err(CredentialsError::configuration(
                MISSING_CONFIDENTIAL_CREDENTIAL_MESSAGE,
            ));
        }
        self.logger.info(format!(
            "Initializing the {} application.",
            if enable_cae { "CAE" } else { "standard" }
        ));
        let config = EngineConfig {
            client_id: self.client_id.clone(),
            authority: get_authority(&self.tenant_id, Some(&self.authority_host)),
            known_authorities: self.known_authorities.clone(),
            client_capabilities: if enable_cae {
                vec![CAE_CLIENT_CAPABILITY.to_string()]
            } else {
                Vec::new()
            },
            client_credential: None,
            azure_region: self.azure_region.clone(),
            cache_name: format!(
                "{}{}",
                self.cache_name,
                if enable_cae {
                    CACHE_CAE_SUFFIX
                } else {
                    CACHE_NON_CAE_SUFFIX
                }
            ),
            persistence: self.persistence.clone(),
            identity_client: self.identity_client.clone(),
        };
        let create = |config: EngineConfig| {
            self.factory
                .create(config)
                .map_err(|e| CredentialsError::configuration(e.message().to_string()))
        };
        let confidential = match &self.client_credential {
            None => None,
            Some(credential) => Some(create(EngineConfig {
                client_credential: Some(credential.clone()),
                ..config.clone()
            })?),
        };
        let applications = Applications {
            public: create(config)?,
            confidential,
        };
        *slot = Some(applications.clone());
        Ok(applications)
    }

    // The cached account, or the only account in the engine cache.
    async fn active_engine_account(&self, applications: &Applications) -> Option<AuthenticationRecord> {
        if let Some(account) = self.active_account() {
            return Some(account);
        }
        let accounts = match applications.preferred().accounts().await {
            Ok(a) => a,
            Err(e) => {
                self.logger
                    .verbose(format!("cannot read the accounts in the cache: {e}"));
                return None;
            }
        };
        match accounts.as_slice() {
            [account] => {
                let record = AuthenticationRecord::from_engine_account(&self.client_id, account);
                self.set_account(record.clone());
                Some(record)
            }
            [] => None,
            _ => {
                self.logger.info(MULTIPLE_ACCOUNTS_MESSAGE);
                None
            }
        }
    }

    async fn get_token_silent(
        &self,
        applications: &Applications,
        request: &TokenRequest,
        scopes: &[String],
        options: &GetTokenOptions,
    ) -> Result<AccessToken> {
        let Some(account) = self.active_engine_account(applications).await else {
            return Err(CredentialsError::authentication_required(
                NO_ACCOUNT_MESSAGE,
                scopes,
                options,
            ));
        };
        let result = applications
            .preferred()
            .acquire_token_silent(&account.to_engine_account(), request)
            .await
            .map_err(|e| self.handle_error(scopes, options, FlowError::Engine(e)))?;
        let token = self.handle_result(scopes, options, result)?;
        self.logger.get_token().info(format_success(scopes));
        Ok(token)
    }

    /// Converts an engine result into a token, rejecting incomplete results.
    fn handle_result(
        &self,
        scopes: &[String],
        options: &GetTokenOptions,
        result: Option<AuthenticationResult>,
    ) -> Result<AccessToken> {
        let required =
            |message: &str| CredentialsError::authentication_required(message, scopes, options);
        let Some(result) = result else {
            return Err(required("No response"));
        };
        if let Some(account) = &result.account {
            self.set_account(AuthenticationRecord::from_engine_account(
                &self.client_id,
                account,
            ));
        }
        let expires_on = result
            .expires_on
            .ok_or_else(|| required(r#"Response had no "expiresOn" property."#))?;
        let token = result
            .access_token
            .ok_or_else(|| required(r#"Response had no "accessToken" property."#))?;
        Ok(AccessToken::new(token, expires_on))
    }

    /// Normalizes flow and engine errors into the crate taxonomy.
    fn handle_error(
        &self,
        scopes: &[String],
        options: &GetTokenOptions,
        error: FlowError,
    ) -> CredentialsError {
        let error = match error {
            FlowError::Credentials(e) => return e,
            FlowError::Engine(e) => e,
        };
        match error.kind() {
            EngineErrorKind::EndpointsResolution => {
                return CredentialsError::unavailable(error.message());
            }
            EngineErrorKind::DeviceCodePollingCancelled => {
                return CredentialsError::aborted(
                    "The authentication has been aborted by the caller.",
                );
            }
            EngineErrorKind::ClientConfiguration | EngineErrorKind::BrowserConfiguration => {
                return CredentialsError::configuration(error.message());
            }
            EngineErrorKind::Abort => return CredentialsError::aborted(error.message()),
            EngineErrorKind::InteractionRequired
            | EngineErrorKind::ConsentRequired
            | EngineErrorKind::LoginRequired => self.logger.info(format!(
                "Authentication returned errorCode {}",
                error.kind().error_code()
            )),
            _ => self.logger.info(format!(
                "An unexpected error occurred while authenticating: {}",
                error.message()
            )),
        }
        CredentialsError::authentication_required(error.message(), scopes, options)
    }
}
