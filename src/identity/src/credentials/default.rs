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


//! The default credential chain.
//!
//! [DefaultAzureCredential] tries, in order:
//!
//! 1. [EnvironmentCredential][super::environment::EnvironmentCredential]
//! 2. [WorkloadIdentityCredential][super::workload_identity::WorkloadIdentityCredential]
//! 3. [ManagedIdentityCredential][super::managed_identity::ManagedIdentityCredential]
//! 4. [AzureCliCredential][super::azure_cli::AzureCliCredential]
//! 5. [AzurePowerShellCredential][super::azure_powershell::AzurePowerShellCredential]
//! 6. [AzureDeveloperCliCredential][super::azure_developer_cli::AzureDeveloperCliCredential]
//!
//! The same code authenticates with a managed identity when deployed to
//! Azure, and with the developer's account when running locally.
//!
//! Credentials that cannot be created in the current environment, such as
//! the workload identity credential without its environment variables, are
//! replaced by a placeholder that always reports the construction error as
//! unavailable. Thus building the chain does not fail.
//!
//! ```
//! # use azure_identity::credentials::default::Builder;
//! # use std::time::Duration;
//! # fn sample() -> azure_identity::BuildResult<()> {
//! let credential = Builder::default()
//!     .with_managed_identity_client_id("00000000-0000-0000-0000-000000000000")
//!     .with_process_timeout(Duration::from_secs(30))
//!     .build()?;
//! # let _ = credential;
//! # Ok(()) }
//! ```

use crate::BuildResult;
use crate::credentials::chained::ChainedTokenCredential;
use crate::credentials::{
    GetTokenOptions, Result, TokenCredential, TokenCredentialOptions, azure_cli,
    azure_developer_cli, azure_powershell, environment, managed_identity, workload_identity,
};
use crate::env::{AZURE_CLIENT_ID, AZURE_FEDERATED_TOKEN_FILE, AZURE_TENANT_ID, Environment};
use crate::errors::CredentialsError;
use crate::logging::CredentialLogger;
use crate::token::AccessToken;
use std::sync::Arc;
use std::time::Duration;

const CREDENTIAL_NAME: &str = "DefaultAzureCredential";

/// A builder for [DefaultAzureCredential].
#[derive(Default)]
pub struct Builder {
    tenant_id: Option<String>,
    managed_identity_client_id: Option<String>,
    managed_identity_resource_id: Option<String>,
    workload_identity_client_id: Option<String>,
    process_timeout: Option<Duration>,
    options: TokenCredentialOptions,
}

impl Builder {
    /// Sets the tenant of the workload identity and developer tool
    /// credentials.
    ///
    /// The default for workload identity is `AZURE_TENANT_ID`.
    pub fn with_tenant_id<V: Into<String>>(mut self, v: V) -> Self {
        self.tenant_id = Some(v.into());
        self
    }

    /// Use the user-assigned managed identity with this client id.
    ///
    /// The default is `AZURE_CLIENT_ID`, or the system-assigned identity if
    /// that is not set.
    pub fn with_managed_identity_client_id<V: Into<String>>(mut self, v: V) -> Self {
        self.managed_identity_client_id = Some(v.into());
        self
    }

    /// Use the user-assigned managed identity with this Azure resource id.
    ///
    /// Takes precedence over the managed identity client id.
    pub fn with_managed_identity_resource_id<V: Into<String>>(mut self, v: V) -> Self {
        self.managed_identity_resource_id = Some(v.into());
        self
    }

    /// Sets the client id of the workload identity credential.
    ///
    /// The default is the managed identity client id.
    pub fn with_workload_identity_client_id<V: Into<String>>(mut self, v: V) -> Self {
        self.workload_identity_client_id = Some(v.into());
        self
    }

    /// Sets the time allowed for the developer tools to answer.
    pub fn with_process_timeout(mut self, v: Duration) -> Self {
        self.process_timeout = Some(v);
        self
    }

    /// Sets the options shared by all credentials in the chain.
    pub fn with_options(mut self, v: TokenCredentialOptions) -> Self {
        self.options = v;
        self
    }

    /// Creates the credential chain.
    pub fn build(self) -> BuildResult<DefaultAzureCredential> {
        let env = self.options.environment();
        let options = self.options.clone().with_environment(env.clone());
        let ids = Identities::new(&self, &env);
        let logger = CredentialLogger::new(CREDENTIAL_NAME);

        let sources = vec![
            source(
                "EnvironmentCredential",
                environment::Builder::default()
                    .with_options(options.clone())
                    .build(),
                &logger,
            ),
            source(
                "WorkloadIdentityCredential",
                ids.workload_identity(&options),
                &logger,
            ),
            source(
                "ManagedIdentityCredential",
                ids.managed_identity(&options),
                &logger,
            ),
            source(
                "AzureCliCredential",
                self.developer_tool(azure_cli::Builder::default(), &options),
                &logger,
            ),
            source(
                "AzurePowerShellCredential",
                self.developer_tool(azure_powershell::Builder::default(), &options),
                &logger,
            ),
            source(
                "AzureDeveloperCliCredential",
                self.developer_tool(azure_developer_cli::Builder::default(), &options),
                &logger,
            ),
        ];
        Ok(DefaultAzureCredential {
            inner: ChainedTokenCredential::with_logger(sources, logger),
        })
    }

    fn developer_tool<B: DeveloperToolBuilder>(
        &self,
        builder: B,
        options: &TokenCredentialOptions,
    ) -> BuildResult<B::Credential> {
        let mut builder = builder.with_options(options.clone());
        if let Some(tenant_id) = &self.tenant_id {
            builder = builder.with_tenant_id(tenant_id.clone());
        }
        if let Some(timeout) = self.process_timeout {
            builder = builder.with_process_timeout(timeout);
        }
        builder.build()
    }
}

// The developer tool builders share the same configuration.
trait DeveloperToolBuilder: Sized {
    type Credential: TokenCredential + 'static;
    fn with_tenant_id(self, v: String) -> Self;
    fn with_process_timeout(self, v: Duration) -> Self;
    fn with_options(self, v: TokenCredentialOptions) -> Self;
    fn build(self) -> BuildResult<Self::Credential>;
}

macro_rules! developer_tool_builder {
    ($module:ident, $credential:ident) => {
        impl DeveloperToolBuilder for $module::Builder {
            type Credential = $module::$credential;
            fn with_tenant_id(self, v: String) -> Self {
                $module::Builder::with_tenant_id(self, v)
            }
            fn with_process_timeout(self, v: Duration) -> Self {
                $module::Builder::with_process_timeout(self, v)
            }
            fn with_options(self, v: TokenCredentialOptions) -> Self {
                $module::Builder::with_options(self, v)
            }
            fn build(self) -> BuildResult<Self::Credential> {
                $module::Builder::build(self)
            }
        }
    };
}

developer_tool_builder!(azure_cli, AzureCliCredential);
developer_tool_builder!(azure_powershell, AzurePowerShellCredential);
developer_tool_builder!(azure_developer_cli, AzureDeveloperCliCredential);

/// The identities used by the workload and managed identity credentials.
#[derive(Debug, PartialEq)]
struct Identities {
    tenant_id: Option<String>,
    workload_client_id: Option<String>,
    managed_identity: ManagedIdentity,
}

#[derive(Debug, PartialEq)]
enum ManagedIdentity {
    SystemAssigned,
    ClientId(String),
    ResourceId(String),
}

impl Identities {
    fn new(builder: &Builder, env: &Environment) -> Self {
        let client_id = builder
            .managed_identity_client_id
            .clone()
            .or_else(|| env.get_string(AZURE_CLIENT_ID));
        let workload_client_id = builder
            .workload_identity_client_id
            .clone()
            .or_else(|| client_id.clone());
        let managed_identity = match (
            &builder.managed_identity_resource_id,
            &workload_client_id,
            &client_id,
        ) {
            (Some(resource_id), _, _) => ManagedIdentity::ResourceId(resource_id.clone()),
            (None, Some(workload), _) if env.is_set(AZURE_FEDERATED_TOKEN_FILE) => {
                ManagedIdentity::ClientId(workload.clone())
            }
            (None, _, Some(client_id)) => ManagedIdentity::ClientId(client_id.clone()),
            (None, _, None) => ManagedIdentity::SystemAssigned,
        };
        Self {
            tenant_id: builder
                .tenant_id
                .clone()
                .or_else(|| env.get_string(AZURE_TENANT_ID)),
            workload_client_id,
            managed_identity,
        }
    }

    fn workload_identity(
        &self,
        options: &TokenCredentialOptions,
    ) -> BuildResult<workload_identity::WorkloadIdentityCredential> {
        let mut builder = workload_identity::Builder::default().with_options(options.clone());
        if let Some(tenant_id) = &self.tenant_id {
            builder = builder.with_tenant_id(tenant_id.clone());
        }
        if let Some(client_id) = &self.workload_client_id {
            builder = builder.with_client_id(client_id.clone());
        }
        builder.build()
    }

    fn managed_identity(
        &self,
        options: &TokenCredentialOptions,
    ) -> BuildResult<managed_identity::ManagedIdentityCredential> {
        let builder = managed_identity::Builder::default().with_options(options.clone());
        match &self.managed_identity {
            ManagedIdentity::SystemAssigned => builder,
            ManagedIdentity::ClientId(id) => builder.with_client_id(id.clone()),
            ManagedIdentity::ResourceId(id) => builder.with_resource_id(id.clone()),
        }
        .build()
    }
}

fn source<T>(
    name: &'static str,
    credential: BuildResult<T>,
    logger: &CredentialLogger,
) -> Arc<dyn TokenCredential>
where
    T: TokenCredential + 'static,
{
    match credential {
        Ok(c) => Arc::new(c),
        Err(e) => {
            logger.warning(format!(
                "Skipped {name} because of an error creating the credential: {e}"
            ));
            Arc::new(UnavailableCredential {
                message: format!("{name}: {e}"),
            })
        }
    }
}

/// Stands in for a credential that could not be created.
#[derive(Debug)]
struct UnavailableCredential {
    message: String,
}

#[async_trait::async_trait]
impl TokenCredential for UnavailableCredential {
    async fn get_token(
        &self,
        _scopes: &[String],
        _options: &GetTokenOptions,
    ) -> Result<AccessToken> {
        Err(CredentialsError::unavailable(self.message.clone()))
    }
}

/// Tries the credentials that work in most Azure and development
/// environments.
#[derive(Clone, Debug)]
pub struct DefaultAzureCredential {
    inner: ChainedTokenCredential,
}

#[async_trait::async_trait]
impl TokenCredential for DefaultAzureCredential {
    async fn get_token(
        &self,
        scopes: &[String],
        options: &GetTokenOptions,
    ) -> Result<AccessToken> {
        self.inner.get_token(scopes, options).await
    }
}
