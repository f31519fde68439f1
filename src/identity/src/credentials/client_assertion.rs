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

//! Client assertion credentials.
//!
//! The application authenticates with a signed JWT, the client assertion,
//! produced by an external party on demand. Federated identities, such as a
//! Kubernetes service account token, are the typical source of assertions.
//!
//! ```
//! # use azure_identity::credentials::client_assertion::{Builder, ClientAssertionProvider};
//! # use azure_identity::credentials::Result;
//! #[derive(Debug)]
//! struct MyAssertion;
//!
//! #[async_trait::async_trait]
//! impl ClientAssertionProvider for MyAssertion {
//!     async fn get_assertion(&self) -> Result<String> {
//!         Ok("a-signed-jwt".to_string())
//!     }
//! }
//!
//! let credential = Builder::new("my-tenant-id", "my-client-id", MyAssertion).build()?;
//! # Ok::<(), azure_identity::build_errors::Error>(())
//! ```

use crate::BuildResult;
use crate::adapter::{AdapterConfig, ClientCredentialFlow, EngineAdapter};
use crate::build_errors::Error as BuildError;
use crate::credentials::{GetTokenOptions, Result, TokenCredential, TokenCredentialOptions};
use crate::engine::ClientCredential;
use crate::logging::CredentialLogger;
use crate::tenant::resolve_tenant_id;
use crate::token::AccessToken;
use std::sync::Arc;

const CREDENTIAL_NAME: &str = "ClientAssertionCredential";

/// Produces client assertions.
///
/// The credential calls this for every token request sent to the identity
/// provider. Implementations should cache the assertion if producing it is
/// expensive.
#[async_trait::async_trait]
pub trait ClientAssertionProvider: std::fmt::Debug + Send + Sync {
    /// Returns a signed JWT identifying the application.
    async fn get_assertion(&self) -> Result<String>;
}

/// A builder for [ClientAssertionCredential].
pub struct Builder {
    tenant_id: String,
    client_id: String,
    provider: Arc<dyn ClientAssertionProvider>,
    options: TokenCredentialOptions,
}

impl Builder {
    /// Creates a builder for the app registration `client_id` in `tenant_id`,
    /// using `provider` to obtain assertions.
    pub fn new<T, C, P>(tenant_id: T, client_id: C, provider: P) -> Self
    where
        T: Into<String>,
        C: Into<String>,
        P: ClientAssertionProvider + 'static,
    {
        Self::from_provider(tenant_id, client_id, Arc::new(provider))
    }

    pub(crate) fn from_provider<T, C>(
        tenant_id: T,
        client_id: C,
        provider: Arc<dyn ClientAssertionProvider>,
    ) -> Self
    where
        T: Into<String>,
        C: Into<String>,
    {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            provider,
            options: TokenCredentialOptions::default(),
        }
    }

    /// Sets the options shared by all credentials.
    pub fn with_options(mut self, v: TokenCredentialOptions) -> Self {
        self.options = v;
        self
    }

    /// Creates the credential.
    pub fn build(self) -> BuildResult<ClientAssertionCredential> {
        self.build_with_logger(CredentialLogger::new(CREDENTIAL_NAME))
    }

    pub(crate) fn build_with_logger(
        self,
        logger: CredentialLogger,
    ) -> BuildResult<ClientAssertionCredential> {
        if self.tenant_id.is_empty() {
            return Err(BuildError::missing_field("tenant_id"));
        }
        if self.client_id.is_empty() {
            return Err(BuildError::missing_field("client_id"));
        }
        let tenant_id = resolve_tenant_id(Some(&self.tenant_id), Some(&self.client_id))?;
        let config = AdapterConfig::new(logger, self.client_id, tenant_id)
            .with_client_credential(ClientCredential::Assertion(self.provider))
            .with_options(self.options);
        Ok(ClientAssertionCredential {
            adapter: EngineAdapter::new(config, ClientCredentialFlow)?,
        })
    }
}

/// Authenticates an application with client assertions.
#[derive(Debug)]
pub struct ClientAssertionCredential {
    adapter: EngineAdapter<ClientCredentialFlow>,
}

impl ClientAssertionCredential {
    #[cfg(test)]
    pub(crate) fn client_id(&self) -> &str {
        self.adapter.client_id()
    }
}

#[async_trait::async_trait]
impl TokenCredential for ClientAssertionCredential {
    async fn get_token(
        &self,
        scopes: &[String],
        options: &GetTokenOptions,
    ) -> Result<AccessToken> {
        self.adapter.get_token(scopes, options).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::credentials::tests::scopes;
    use crate::engine::TokenEngine;
    use crate::engine::tests::{MockEngine, MockFactory, result};
    use crate::env::Environment;

    mockall::mock! {
        #[derive(Debug)]
        pub Provider {}

        #[async_trait::async_trait]
        impl ClientAssertionProvider for Provider {
            async fn get_assertion(&self) -> Result<String>;
        }
    }

    fn options() -> TokenCredentialOptions {
        TokenCredentialOptions::default().with_environment(Environment::default())
    }

    #[test]
    fn missing_fields() {
        let err = Builder::new("", "client", MockProvider::new())
            .with_options(options())
            .build()
            .unwrap_err();
        assert!(err.is_missing_field(), "{err:?}");
        let err = Builder::new("tenant", "", MockProvider::new())
            .with_options(options())
            .build()
            .unwrap_err();
        assert!(err.is_missing_field(), "{err:?}");
    }

    #[tokio::test]
    async fn get_token() -> anyhow::Result<()> {
        let mut engine = MockEngine::new();
        engine.expect_accounts().returning(|| Ok(Vec::new()));
        engine
            .expect_acquire_token_by_client_credential()
            .times(1)
            .returning(|_| Ok(Some(result("test-token"))));
        let engine: Arc<dyn TokenEngine> = Arc::new(engine);
        let mut factory = MockFactory::new();
        factory
            .expect_create()
            .withf(|c| {
                c.client_id == "client"
                    && matches!(c.client_credential, None | Some(ClientCredential::Assertion(_)))
            })
            .returning(move |_| Ok(engine.clone()));
        let credential = Builder::new("tenant", "client", MockProvider::new())
            .with_options(options().with_engine_factory(factory))
            .build()?;
        assert_eq!(credential.client_id(), "client");
        let token = credential
            .get_token(&scopes(&["a"]), &GetTokenOptions::default())
            .await?;
        assert_eq!(token.token, "test-token");
        Ok(())
    }
}
