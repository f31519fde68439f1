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

//! Client secret credentials.
//!
//! An application registered in Microsoft Entra ID authenticates as itself
//! using a secret generated for the app registration. This is the OAuth 2.0
//! client credentials grant: no user is involved and every token represents
//! the application.
//!
//! ```
//! # use azure_identity::credentials::client_secret::Builder;
//! # use azure_identity::credentials::{GetTokenOptions, TokenCredential};
//! # tokio_test::block_on(async {
//! let credential = Builder::new("my-tenant-id", "my-client-id", "my-client-secret").build()?;
//! # Ok::<(), azure_identity::build_errors::Error>(())
//! # });
//! ```

use crate::BuildResult;
use crate::adapter::{AdapterConfig, ClientCredentialFlow, EngineAdapter};
use crate::authority::RegionalAuthority;
use crate::build_errors::Error as BuildError;
use crate::credentials::{GetTokenOptions, Result, TokenCredential, TokenCredentialOptions};
use crate::engine::ClientCredential;
use crate::logging::CredentialLogger;
use crate::tenant::resolve_tenant_id;
use crate::token::AccessToken;

const CREDENTIAL_NAME: &str = "ClientSecretCredential";

/// A builder for [ClientSecretCredential].
pub struct Builder {
    tenant_id: String,
    client_id: String,
    client_secret: String,
    regional_authority: Option<RegionalAuthority>,
    options: TokenCredentialOptions,
}

impl Builder {
    /// Creates a builder for the app registration `client_id` in `tenant_id`.
    pub fn new<T, C, S>(tenant_id: T, client_id: C, client_secret: S) -> Self
    where
        T: Into<String>,
        C: Into<String>,
        S: Into<String>,
    {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            regional_authority: None,
            options: TokenCredentialOptions::default(),
        }
    }

    /// Request tokens from a regional endpoint.
    ///
    /// The default is the value of `AZURE_REGIONAL_AUTHORITY_NAME`, if set.
    pub fn with_regional_authority(mut self, v: RegionalAuthority) -> Self {
        self.regional_authority = Some(v);
        self
    }

    /// Sets the options shared by all credentials.
    pub fn with_options(mut self, v: TokenCredentialOptions) -> Self {
        self.options = v;
        self
    }

    /// Creates the credential.
    ///
    /// Fails if any of the tenant id, client id, or client secret are empty,
    /// or if the tenant id is malformed.
    pub fn build(self) -> BuildResult<ClientSecretCredential> {
        if self.tenant_id.is_empty() {
            return Err(BuildError::missing_field("tenant_id"));
        }
        if self.client_id.is_empty() {
            return Err(BuildError::missing_field("client_id"));
        }
        if self.client_secret.is_empty() {
            return Err(BuildError::missing_field("client_secret"));
        }
        let tenant_id = resolve_tenant_id(Some(&self.tenant_id), Some(&self.client_id))?;
        let config = AdapterConfig::new(
            CredentialLogger::new(CREDENTIAL_NAME),
            self.client_id,
            tenant_id,
        )
        .with_client_credential(ClientCredential::Secret(self.client_secret))
        .with_regional_authority(self.regional_authority)
        .with_options(self.options);
        Ok(ClientSecretCredential {
            adapter: EngineAdapter::new(config, ClientCredentialFlow)?,
        })
    }
}

/// Authenticates an application with a client secret.
#[derive(Debug)]
pub struct ClientSecretCredential {
    adapter: EngineAdapter<ClientCredentialFlow>,
}

#[async_trait::async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn get_token(
        &self,
        scopes: &[String],
        options: &GetTokenOptions,
    ) -> Result<AccessToken> {
        self.adapter.get_token(scopes, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::tests::scopes;
    use crate::engine::tests::{MockEngine, MockFactory, result};
    use crate::engine::{EngineError, EngineErrorKind, TokenEngine};
    use crate::env::Environment;
    use std::sync::Arc;
    use test_case::test_case;

    fn options() -> TokenCredentialOptions {
        TokenCredentialOptions::default().with_environment(Environment::default())
    }

    #[test_case("", "client", "secret", "tenant_id")]
    #[test_case("tenant", "", "secret", "client_id")]
    #[test_case("tenant", "client", "", "client_secret")]
    fn missing_fields(tenant: &str, client: &str, secret: &str, field: &str) {
        let err = Builder::new(tenant, client, secret)
            .with_options(options())
            .build()
            .unwrap_err();
        assert!(err.is_missing_field(), "{err:?}");
        assert!(err.to_string().contains(field), "{err}");
    }

    #[test]
    fn invalid_tenant() {
        let err = Builder::new("bad tenant!", "client", "secret")
            .with_options(options())
            .build()
            .unwrap_err();
        assert!(err.is_invalid(), "{err:?}");
    }

    #[test]
    fn insecure_authority() {
        let err = Builder::new("tenant", "client", "secret")
            .with_options(options().with_authority_host("http://login.example.com"))
            .build()
            .unwrap_err();
        assert!(err.is_invalid(), "{err:?}");
    }

    #[test]
    fn debug_censors_secret() {
        let credential = Builder::new("tenant", "client", "super-secret-value")
            .with_options(options())
            .build()
            .unwrap();
        let fmt = format!("{credential:?}");
        assert!(!fmt.contains("super-secret-value"), "{fmt}");
    }

    #[tokio::test]
    async fn get_token() -> anyhow::Result<()> {
        let mut engine = MockEngine::new();
        engine.expect_accounts().returning(|| Ok(Vec::new()));
        engine
            .expect_acquire_token_by_client_credential()
            .times(1)
            .withf(|r| r.scopes == ["https://vault.azure.net/.default"])
            .returning(|_| Ok(Some(result("test-token"))));
        let engine: Arc<dyn TokenEngine> = Arc::new(engine);
        let mut factory = MockFactory::new();
        factory
            .expect_create()
            .withf(|c| {
                c.client_id == "client"
                    && c.authority == "https://login.microsoftonline.com/tenant"
                    && matches!(&c.client_credential, Some(ClientCredential::Secret(s)) if s == "secret")
            })
            .returning(move |_| Ok(engine.clone()));
        factory
            .expect_create()
            .withf(|c| !c.is_confidential())
            .returning(|_| {
                let mut public = MockEngine::new();
                public.expect_accounts().never();
                Ok(Arc::new(public))
            });
        let credential = Builder::new("tenant", "client", "secret")
            .with_options(options().with_engine_factory(factory))
            .build()?;
        let token = credential
            .get_token(
                &scopes(&["https://vault.azure.net/.default"]),
                &GetTokenOptions::default(),
            )
            .await?;
        assert_eq!(token.token, "test-token");
        Ok(())
    }

    #[tokio::test]
    async fn invalid_client() -> anyhow::Result<()> {
        let mut engine = MockEngine::new();
        engine.expect_accounts().returning(|| Ok(Vec::new()));
        engine
            .expect_acquire_token_by_client_credential()
            .returning(|_| {
                Err(EngineError::new(
                    EngineErrorKind::Server,
                    "invalid_client Status code: 401",
                ))
            });
        let credential = Builder::new("tenant", "client", "secret")
            .with_options(
                options().with_engine_factory(crate::engine::tests::factory(engine)),
            )
            .build()?;
        let err = credential
            .get_token(&scopes(&["a"]), &GetTokenOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_authentication_required(), "{err:?}");
        assert!(err.to_string().contains("invalid_client"), "{err}");
        Ok(())
    }

    #[test]
    fn regional_authority() {
        let credential = Builder::new("tenant", "client", "secret")
            .with_regional_authority(RegionalAuthority::USWest2)
            .with_options(options())
            .build();
        assert!(credential.is_ok(), "{credential:?}");
    }
}
