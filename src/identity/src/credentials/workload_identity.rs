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

//! Workload identity credentials.
//!
//! Workloads running in Kubernetes with [Microsoft Entra Workload ID]
//! receive a federated token in a file, typically a projected service account
//! token. This credential uses the contents of that file as the client
//! assertion of a [ClientAssertionCredential].
//!
//! By default the tenant, the client id and the token file come from the
//! `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and `AZURE_FEDERATED_TOKEN_FILE`
//! environment variables, which the workload identity webhook injects.
//!
//! [Microsoft Entra Workload ID]: https://learn.microsoft.com/azure/aks/workload-identity-overview

use crate::BuildResult;
use crate::credentials::client_assertion::{
    Builder as AssertionBuilder, ClientAssertionCredential, ClientAssertionProvider,
};
use crate::credentials::{GetTokenOptions, Result, TokenCredential, TokenCredentialOptions};
use crate::env::{AZURE_CLIENT_ID, AZURE_FEDERATED_TOKEN_FILE, AZURE_TENANT_ID};
use crate::errors::CredentialsError;
use crate::logging::CredentialLogger;
use crate::token::AccessToken;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const CREDENTIAL_NAME: &str = "WorkloadIdentityCredential";
const REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);
const REQUIRED_PARAMETERS_MESSAGE: &str = "WorkloadIdentityCredential: is unavailable. tenantId, clientId, and federatedTokenFilePath are required parameters. In DefaultAzureCredential and ManagedIdentityCredential, these can be provided as environment variables - \"AZURE_TENANT_ID\", \"AZURE_CLIENT_ID\", \"AZURE_FEDERATED_TOKEN_FILE\". See the troubleshooting guide for more information: https://aka.ms/azsdk/js/identity/workloadidentitycredential/troubleshoot";

/// Reads the client assertion from a file, caching it for five minutes.
pub(crate) struct FileAssertion {
    path: PathBuf,
    cache: Mutex<Option<(String, Instant)>>,
}

impl FileAssertion {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            cache: Mutex::new(None),
        }
    }
}

impl std::fmt::Debug for FileAssertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileAssertion")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl ClientAssertionProvider for FileAssertion {
    async fn get_assertion(&self) -> Result<String> {
        let mut cache = self.cache.lock().await;
        if let Some((assertion, read_at)) = cache.as_ref() {
            if read_at.elapsed() < REFRESH_INTERVAL {
                return Ok(assertion.clone());
            }
        }
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            CredentialsError::unavailable_from_source(
                format!(
                    "{CREDENTIAL_NAME}: cannot read the token file {}",
                    self.path.display()
                ),
                e,
            )
        })?;
        let assertion = contents.trim();
        if assertion.is_empty() {
            return Err(CredentialsError::unavailable(format!(
                "No content on the file {}.",
                self.path.display()
            )));
        }
        *cache = Some((assertion.to_string(), Instant::now()));
        Ok(assertion.to_string())
    }
}

/// A builder for [WorkloadIdentityCredential].
#[derive(Default)]
pub struct Builder {
    tenant_id: Option<String>,
    client_id: Option<String>,
    token_file_path: Option<PathBuf>,
    options: TokenCredentialOptions,
}

impl Builder {
    /// Sets the tenant, the default is the value of `AZURE_TENANT_ID`.
    pub fn with_tenant_id<V: Into<String>>(mut self, v: V) -> Self {
        self.tenant_id = Some(v.into());
        self
    }

    /// Sets the client id, the default is the value of `AZURE_CLIENT_ID`.
    pub fn with_client_id<V: Into<String>>(mut self, v: V) -> Self {
        self.client_id = Some(v.into());
        self
    }

    /// Sets the path of the federated token file, the default is the value
    /// of `AZURE_FEDERATED_TOKEN_FILE`.
    pub fn with_token_file_path<V: Into<PathBuf>>(mut self, v: V) -> Self {
        self.token_file_path = Some(v.into());
        self
    }

    /// Sets the options shared by all credentials.
    pub fn with_options(mut self, v: TokenCredentialOptions) -> Self {
        self.options = v;
        self
    }

    /// Creates the credential.
    ///
    /// If the tenant, client id, or token file are neither configured nor set
    /// in the environment the credential is unavailable, and every call to
    /// `get_token()` fails with an unavailable error. Fails if the values are
    /// present but invalid.
    pub fn build(self) -> BuildResult<WorkloadIdentityCredential> {
        let env = self.options.environment();
        let logger = CredentialLogger::new(CREDENTIAL_NAME);
        logger.env_vars(
            &[AZURE_TENANT_ID, AZURE_CLIENT_ID, AZURE_FEDERATED_TOKEN_FILE],
            &env,
        );
        let tenant_id = self.tenant_id.or_else(|| env.get_string(AZURE_TENANT_ID));
        let client_id = self.client_id.or_else(|| env.get_string(AZURE_CLIENT_ID));
        let path = self
            .token_file_path
            .or_else(|| env.get_string(AZURE_FEDERATED_TOKEN_FILE).map(PathBuf::from));
        let (Some(tenant_id), Some(client_id), Some(path)) = (tenant_id, client_id, path) else {
            logger.info(REQUIRED_PARAMETERS_MESSAGE);
            return Ok(WorkloadIdentityCredential { inner: None });
        };
        logger.info(format!(
            "Invoking ClientAssertionCredential with tenant ID: {tenant_id}, clientId: {client_id} and federated token path: [REDACTED]"
        ));
        let inner = AssertionBuilder::from_provider(
            tenant_id,
            client_id,
            Arc::new(FileAssertion::new(path)),
        )
        .with_options(self.options.with_environment(env))
        .build_with_logger(logger)?;
        Ok(WorkloadIdentityCredential { inner: Some(inner) })
    }
}

/// Authenticates with a federated token file.
#[derive(Debug)]
pub struct WorkloadIdentityCredential {
    // `None` when the required parameters are missing.
    inner: Option<ClientAssertionCredential>,
}

impl WorkloadIdentityCredential {
    #[cfg(test)]
    pub(crate) fn client_id(&self) -> Option<&str> {
        self.inner.as_ref().map(ClientAssertionCredential::client_id)
    }
}

#[async_trait::async_trait]
impl TokenCredential for WorkloadIdentityCredential {
    async fn get_token(
        &self,
        scopes: &[String],
        options: &GetTokenOptions,
    ) -> Result<AccessToken> {
        match &self.inner {
            Some(inner) => inner.get_token(scopes, options).await,
            None => Err(CredentialsError::unavailable(REQUIRED_PARAMETERS_MESSAGE)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::tests::scopes;
    use crate::engine::ClientCredential;
    use crate::engine::TokenEngine;
    use crate::engine::tests::{MockEngine, MockFactory, result};
    use crate::env::Environment;
    use std::io::Write;

    type TestResult = anyhow::Result<()>;

    fn options(env: Environment) -> TokenCredentialOptions {
        TokenCredentialOptions::default().with_environment(env)
    }

    #[tokio::test]
    async fn missing_parameters_are_unavailable() -> TestResult {
        let credential = Builder::default()
            .with_options(options(Environment::default()))
            .build()?;
        assert_eq!(credential.client_id(), None);
        let err = credential
            .get_token(&scopes(&["a"]), &GetTokenOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_unavailable(), "{err:?}");
        assert!(err.to_string().contains("AZURE_FEDERATED_TOKEN_FILE"), "{err}");

        let credential = Builder::default()
            .with_tenant_id("tenant")
            .with_client_id("client")
            .with_options(options(Environment::default()))
            .build()?;
        let err = credential
            .get_token(&scopes(&["a"]), &GetTokenOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_unavailable(), "{err:?}");
        Ok(())
    }

    #[tokio::test]
    async fn unconfigured_credential_in_chain() -> TestResult {
        use crate::credentials::chained::ChainedTokenCredential;
        use crate::credentials::tests::MockCredential;

        let workload = Builder::default()
            .with_options(options(Environment::default()))
            .build()?;
        let mut next = MockCredential::new();
        next.expect_get_token()
            .times(1)
            .returning(|_, _| Ok(AccessToken::new("next-token", i64::MAX)));
        let chain = ChainedTokenCredential::new(vec![Arc::new(workload), Arc::new(next)]);
        let token = chain
            .get_token(&scopes(&["a"]), &GetTokenOptions::default())
            .await?;
        assert_eq!(token.token, "next-token");
        Ok(())
    }

    #[test]
    fn invalid_tenant() {
        let err = Builder::default()
            .with_tenant_id("not a tenant!")
            .with_client_id("client")
            .with_token_file_path("/var/run/token")
            .with_options(options(Environment::default()))
            .build()
            .unwrap_err();
        assert!(err.is_invalid(), "{err:?}");
    }

    #[test]
    fn from_environment() -> TestResult {
        let env = Environment::from_pairs([
            (AZURE_TENANT_ID, "tenant"),
            (AZURE_CLIENT_ID, "env-client"),
            (AZURE_FEDERATED_TOKEN_FILE, "/var/run/token"),
        ]);
        let credential = Builder::default().with_options(options(env.clone())).build()?;
        assert_eq!(credential.client_id(), Some("env-client"));

        let credential = Builder::default()
            .with_client_id("explicit-client")
            .with_options(options(env))
            .build()?;
        assert_eq!(credential.client_id(), Some("explicit-client"));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn file_assertion_cache() -> TestResult {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(b"first-assertion\n")?;
        let provider = FileAssertion::new(file.path().to_path_buf());
        assert_eq!(provider.get_assertion().await?, "first-assertion");

        std::fs::write(file.path(), "second-assertion")?;
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(provider.get_assertion().await?, "first-assertion");

        tokio::time::advance(REFRESH_INTERVAL).await;
        assert_eq!(provider.get_assertion().await?, "second-assertion");

        let fmt = format!("{provider:?}");
        assert!(!fmt.contains("second-assertion"), "{fmt}");
        Ok(())
    }

    #[tokio::test]
    async fn file_assertion_errors() -> TestResult {
        let provider = FileAssertion::new(PathBuf::from("/this/file/does/not/exist"));
        let err = provider.get_assertion().await.unwrap_err();
        assert!(err.is_unavailable(), "{err:?}");

        let file = tempfile::NamedTempFile::new()?;
        let provider = FileAssertion::new(file.path().to_path_buf());
        let err = provider.get_assertion().await.unwrap_err();
        assert!(err.to_string().contains("No content on the file"), "{err}");
        Ok(())
    }

    #[tokio::test]
    async fn get_token() -> TestResult {
        let mut engine = MockEngine::new();
        engine.expect_accounts().returning(|| Ok(Vec::new()));
        engine
            .expect_acquire_token_by_client_credential()
            .times(1)
            .returning(|_| Ok(Some(result("workload-token"))));
        let engine: Arc<dyn TokenEngine> = Arc::new(engine);
        let mut factory = MockFactory::new();
        factory
            .expect_create()
            .withf(|c| {
                c.authority == "https://login.microsoftonline.com/tenant"
                    && matches!(c.client_credential, None | Some(ClientCredential::Assertion(_)))
            })
            .returning(move |_| Ok(engine.clone()));
        let credential = Builder::default()
            .with_tenant_id("tenant")
            .with_client_id("client")
            .with_token_file_path("/var/run/token")
            .with_options(options(Environment::default()).with_engine_factory(factory))
            .build()?;
        let token = credential
            .get_token(&scopes(&["a"]), &GetTokenOptions::default())
            .await?;
        assert_eq!(token.token, "workload-token");
        Ok(())
    }
}
