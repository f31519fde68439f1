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

//! Visual Studio Code credentials.
//!
//! Developers signed in with the Azure Account extension of Visual Studio Code
//! have a refresh token in the operating system's credential store. This
//! credential redeems that refresh token.
//!
//! Reading the credential store is platform specific, the application
//! provides it with a [VsCodeCredentialFinder], see
//! [TokenCredentialOptions::with_vs_code_credential_finder]. Without a finder
//! the credential is unavailable.
//!
//! The cloud and the tenant come from the `azure.cloud` and `azure.tenant`
//! settings of Visual Studio Code, when present.
//!
//! ```
//! # use azure_identity::credentials::visual_studio_code::{
//! #     Builder, VsCodeCredentialFinder, VsCodeStoredCredential,
//! # };
//! # use azure_identity::credentials::TokenCredentialOptions;
//! #[derive(Debug)]
//! struct MyKeychain;
//!
//! #[async_trait::async_trait]
//! impl VsCodeCredentialFinder for MyKeychain {
//!     async fn find_credentials(
//!         &self,
//!     ) -> azure_identity::credentials::Result<Vec<VsCodeStoredCredential>> {
//!         // Read the "VS Code Azure" service of the system keychain.
//!         Ok(Vec::new())
//!     }
//! }
//!
//! # fn sample() -> azure_identity::BuildResult<()> {
//! let options = TokenCredentialOptions::default().with_vs_code_credential_finder(MyKeychain);
//! let credential = Builder::default().with_options(options).build()?;
//! # let _ = credential;
//! # Ok(()) }
//! ```

use crate::BuildResult;
use crate::authority::AzureAuthorityHosts;
use crate::build_errors::Error as BuildError;
use crate::cli::ensure_valid_scope;
use crate::constants::{ADFS_TENANT_ID, DEFAULT_TENANT_ID};
use crate::credentials::{GetTokenOptions, Result, TokenCredential, TokenCredentialOptions};
use crate::env::Environment;
use crate::errors::CredentialsError;
use crate::identity_client::{IdentityClient, RequestOptions};
use crate::logging::{CredentialLogger, format_error, format_success};
use crate::tenant::{self, TenantRequest, validate_tenant_id};
use crate::token::AccessToken;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

const CREDENTIAL_NAME: &str = "VisualStudioCodeCredential";

/// The client id of the Azure Account extension.
const AZURE_ACCOUNT_CLIENT_ID: &str = "aebc6443-996d-45c2-90f0-388ff96faa56";
const DEFAULT_CLOUD: &str = "AzureCloud";
const CLOUD_SETTING: &str = "azure.cloud";
const TENANT_SETTING: &str = "azure.tenant";
const APPDATA: &str = "APPDATA";
const HOME: &str = "HOME";

const ADFS_MESSAGE: &str =
    "The VisualStudioCodeCredential does not support authentication with ADFS tenants.";
const NO_FINDER_MESSAGE: &str = "No implementation of `VisualStudioCodeCredential` is available. You must provide a `VsCodeCredentialFinder` using `TokenCredentialOptions::with_vs_code_credential_finder` before creating a `VisualStudioCodeCredential`. To troubleshoot, visit https://aka.ms/azsdk/js/identity/vscodecredential/troubleshoot.";
const NO_REFRESH_TOKEN_MESSAGE: &str = "Could not retrieve the token associated with Visual Studio Code. Did you connect using the 'Azure Account' extension? To troubleshoot, visit https://aka.ms/azsdk/js/identity/vscodecredential/troubleshoot.";
const REFRESH_FAILED_MESSAGE: &str = "Could not retrieve the token associated with Visual Studio Code. Have you connected using the 'Azure Account' extension recently? To troubleshoot, visit https://aka.ms/azsdk/js/identity/vscodecredential/troubleshoot.";

/// An entry of the Visual Studio Code credential store.
///
/// The Azure Account extension saves one entry per cloud. The `account` is
/// the cloud name, such as `AzureCloud`, and the `password` is the refresh
/// token.
#[derive(Clone, PartialEq)]
pub struct VsCodeStoredCredential {
    pub account: String,
    pub password: String,
}

impl std::fmt::Debug for VsCodeStoredCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VsCodeStoredCredential")
            .field("account", &self.account)
            .field("password", &"[censored]")
            .finish()
    }
}

/// Reads the credentials saved by the Azure Account extension.
#[async_trait::async_trait]
pub trait VsCodeCredentialFinder: std::fmt::Debug + Send + Sync {
    /// Returns every entry saved by the extension, possibly none.
    async fn find_credentials(&self) -> Result<Vec<VsCodeStoredCredential>>;
}

/// A builder for [VisualStudioCodeCredential].
#[derive(Default)]
pub struct Builder {
    tenant_id: Option<String>,
    settings_path: Option<PathBuf>,
    options: TokenCredentialOptions,
    identity_client: Option<IdentityClient>,
}

impl Builder {
    /// Sets the tenant, the default is `common`.
    ///
    /// The `azure.tenant` setting of Visual Studio Code takes precedence.
    pub fn with_tenant_id<V: Into<String>>(mut self, v: V) -> Self {
        self.tenant_id = Some(v.into());
        self
    }

    /// Reads the Visual Studio Code settings from `v`.
    ///
    /// The default is the `User/settings.json` file of the `Code`
    /// configuration directory of the current user.
    pub fn with_settings_path<V: Into<PathBuf>>(mut self, v: V) -> Self {
        self.settings_path = Some(v.into());
        self
    }

    /// Sets the options shared by all credentials.
    pub fn with_options(mut self, v: TokenCredentialOptions) -> Self {
        self.options = v;
        self
    }

    #[cfg(test)]
    fn with_identity_client(mut self, v: IdentityClient) -> Self {
        self.identity_client = Some(v);
        self
    }

    /// Creates the credential.
    ///
    /// Fails if the tenant id is malformed or names an ADFS tenant, or if the
    /// authority host does not use `https`.
    pub fn build(self) -> BuildResult<VisualStudioCodeCredential> {
        let env = self.options.environment();
        let logger = CredentialLogger::new(CREDENTIAL_NAME);
        let settings_path = self.settings_path.or_else(|| well_known_settings(&env));
        let cloud_name = settings_path
            .as_deref()
            .and_then(|p| read_setting_sync(p, CLOUD_SETTING))
            .unwrap_or_else(|| DEFAULT_CLOUD.to_string());

        let tenant_id = match self.tenant_id {
            Some(t) => {
                validate_tenant_id(&t)?;
                t
            }
            None => DEFAULT_TENANT_ID.to_string(),
        };
        if tenant_id == ADFS_TENANT_ID {
            return Err(BuildError::invalid(ADFS_MESSAGE));
        }

        let identity_client = match self.identity_client {
            Some(c) => c,
            None => {
                let host = self
                    .options
                    .authority_host
                    .clone()
                    .or_else(|| cloud_authority_host(&cloud_name).map(String::from));
                let host = crate::authority::resolve_authority_host(host.as_deref(), &env)?;
                IdentityClient::builder()
                    .with_authority_host(host)
                    .with_allow_logging_account_identifiers(
                        self.options.allow_logging_account_identifiers,
                    )
                    .build()
                    .map_err(BuildError::loading)?
            }
        };

        Ok(VisualStudioCodeCredential {
            logger,
            cloud_name,
            tenant_id,
            settings_path,
            settings_tenant: OnceCell::new(),
            additionally_allowed: self.options.additionally_allowed_tenants.clone(),
            multi_tenant_disabled: env.multi_tenant_disabled(),
            finder: self.options.vs_code_credential_finder.clone(),
            identity_client,
        })
    }
}

/// Authenticates with the account of the Azure Account extension of Visual
/// Studio Code.
#[derive(Debug)]
pub struct VisualStudioCodeCredential {
    logger: CredentialLogger,
    cloud_name: String,
    tenant_id: String,
    settings_path: Option<PathBuf>,
    // The `azure.tenant` setting, read on the first request.
    settings_tenant: OnceCell<Option<String>>,
    additionally_allowed: Vec<String>,
    multi_tenant_disabled: bool,
    finder: Option<Arc<dyn VsCodeCredentialFinder>>,
    identity_client: IdentityClient,
}

impl VisualStudioCodeCredential {
    async fn configured_tenant(&self) -> Result<&str> {
        let settings = self
            .settings_tenant
            .get_or_init(|| async {
                match &self.settings_path {
                    Some(p) => read_setting(p, TENANT_SETTING).await,
                    None => None,
                }
            })
            .await;
        let tenant = settings.as_deref().unwrap_or(&self.tenant_id);
        if tenant == ADFS_TENANT_ID {
            return Err(CredentialsError::unavailable(ADFS_MESSAGE));
        }
        Ok(tenant)
    }

    async fn refresh(&self, scopes: &[String], options: &GetTokenOptions) -> Result<AccessToken> {
        let configured = self.configured_tenant().await?;
        let tenant = tenant::resolve(
            TenantRequest {
                configured: Some(configured),
                requested: options.tenant_id.as_deref(),
                additionally_allowed: &self.additionally_allowed,
                multi_tenant_disabled: self.multi_tenant_disabled,
            },
            &self.logger,
        )?
        .unwrap_or_else(|| configured.to_string());

        let Some(finder) = &self.finder else {
            return Err(CredentialsError::unavailable(NO_FINDER_MESSAGE));
        };

        let mut scope = scopes.join(" ");
        ensure_valid_scope(&scope, &self.logger)?;
        if !scope.contains("offline_access") {
            scope.push_str(" offline_access");
        }

        let credentials = finder.find_credentials().await?;
        let refresh_token = credentials
            .iter()
            .find(|c| c.account == self.cloud_name)
            .or_else(|| credentials.first())
            .map(|c| c.password.as_str())
            .filter(|p| !p.is_empty());
        let Some(refresh_token) = refresh_token else {
            return Err(CredentialsError::unavailable(NO_REFRESH_TOKEN_MESSAGE));
        };

        let request_options = RequestOptions::default()
            .with_correlation_id(options.correlation_id.clone())
            .with_abort_signal(options.abort_signal.clone());
        let response = self
            .identity_client
            .refresh_access_token(
                &tenant,
                AZURE_ACCOUNT_CLIENT_ID,
                &scope,
                Some(refresh_token),
                &[],
                &request_options,
            )
            .await?;
        response
            .map(|r| r.access_token)
            .ok_or_else(|| CredentialsError::unavailable(REFRESH_FAILED_MESSAGE))
    }
}

#[async_trait::async_trait]
impl TokenCredential for VisualStudioCodeCredential {
    async fn get_token(
        &self,
        scopes: &[String],
        options: &GetTokenOptions,
    ) -> Result<AccessToken> {
        options.check_aborted()?;
        let result = self.refresh(scopes, options).await;
        match &result {
            Ok(_) => self.logger.get_token().info(format_success(scopes)),
            Err(e) => self.logger.get_token().info(format_error(Some(scopes), e)),
        }
        result
    }
}

/// Maps the `azure.cloud` setting to an authority host.
fn cloud_authority_host(cloud_name: &str) -> Option<&'static str> {
    let host = match cloud_name {
        "AzureCloud" => AzureAuthorityHosts::AzurePublicCloud,
        "AzureChina" => AzureAuthorityHosts::AzureChina,
        "AzureGermanCloud" => AzureAuthorityHosts::AzureGermany,
        "AzureUSGovernment" => AzureAuthorityHosts::AzureGovernment,
        _ => return None,
    };
    Some(host.as_str())
}

/// Returns the path of the user settings of Visual Studio Code.
fn well_known_settings(env: &Environment) -> Option<PathBuf> {
    let mut path = PathBuf::new();
    if cfg!(windows) {
        path.push(env.get(APPDATA)?);
    } else if cfg!(target_os = "macos") {
        path.push(env.get(HOME)?);
        path.push("Library");
        path.push("Application Support");
    } else {
        path.push(env.get(HOME)?);
        path.push(".config");
    }
    path.push("Code");
    path.push("User");
    path.push("settings.json");
    Some(path)
}

fn parse_setting(path: &Path, contents: std::io::Result<String>, name: &str) -> Option<String> {
    let settings = contents
        .map_err(|e| e.to_string())
        .and_then(|c| serde_json::from_str::<serde_json::Value>(&c).map_err(|e| e.to_string()));
    match settings {
        Ok(s) => s.get(name).and_then(|v| v.as_str()).map(str::to_string),
        Err(e) => {
            tracing::info!(
                "{CREDENTIAL_NAME}: Failed to load the Visual Studio Code configuration file {}. Error: {e}",
                path.display()
            );
            None
        }
    }
}

fn read_setting_sync(path: &Path, name: &str) -> Option<String> {
    parse_setting(path, std::fs::read_to_string(path), name)
}

async fn read_setting(path: &Path, name: &str) -> Option<String> {
    parse_setting(path, tokio::fs::read_to_string(path).await, name)
}
