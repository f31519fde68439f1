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

//! Username and password credentials.
//!
//! Exchanges the user name and password of a user for tokens, using the
//! resource owner password grant. This grant does not support multi-factor
//! authentication, and requires the application to handle the user's
//! password. Prefer an interactive credential where possible.

use crate::BuildResult;
use crate::adapter::{AdapterConfig, EngineAdapter, FlowResult, TokenFlow};
use crate::auth_record::AuthenticationRecord;
use crate::build_errors::Error as BuildError;
use crate::credentials::{GetTokenOptions, Result, TokenCredential, TokenCredentialOptions};
use crate::engine::{TokenEngine, TokenRequest};
use crate::logging::CredentialLogger;
use crate::tenant::resolve_tenant_id;
use crate::token::AccessToken;

const CREDENTIAL_NAME: &str = "UsernamePasswordCredential";

/// A builder for [UsernamePasswordCredential].
pub struct Builder {
    tenant_id: String,
    client_id: String,
    username: String,
    password: String,
    options: TokenCredentialOptions,
}

impl Builder {
    /// Creates a builder for `username` signing in to the app registration
    /// `client_id` in `tenant_id`.
    pub fn new<T, C, U, P>(tenant_id: T, client_id: C, username: U, password: P) -> Self
    where
        T: Into<String>,
        C: Into<String>,
        U: Into<String>,
        P: Into<String>,
    {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            username: username.into(),
            password: password.into(),
            options: TokenCredentialOptions::default(),
        }
    }

    /// Sets the options shared by all credentials.
    pub fn with_options(mut self, v: TokenCredentialOptions) -> Self {
        self.options = v;
        self
    }

    /// Creates the credential.
    pub fn build(self) -> BuildResult<UsernamePasswordCredential> {
        self.build_with_logger(CredentialLogger::new(CREDENTIAL_NAME))
    }

    pub(crate) fn build_with_logger(
        self,
        logger: CredentialLogger,
    ) -> BuildResult<UsernamePasswordCredential> {
        if self.tenant_id.is_empty()
            || self.client_id.is_empty()
            || self.username.is_empty()
            || self.password.is_empty()
        {
            return Err(BuildError::invalid(format!(
                "{CREDENTIAL_NAME}: tenantId, clientId, username and password are required parameters. To troubleshoot, visit https://aka.ms/azsdk/js/identity/usernamepasswordcredential/troubleshoot."
            )));
        }
        let tenant_id = resolve_tenant_id(Some(&self.tenant_id), Some(&self.client_id))?;
        let config =
            AdapterConfig::new(logger, self.client_id, tenant_id).with_options(self.options);
        let flow = UsernamePasswordFlow {
            username: self.username,
            password: self.password,
        };
        Ok(UsernamePasswordCredential {
            adapter: EngineAdapter::new(config, flow)?,
        })
    }
}

struct UsernamePasswordFlow {
    username: String,
    password: String,
}

impl std::fmt::Debug for UsernamePasswordFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsernamePasswordFlow")
            .field("username", &self.username)
            .field("password", &"[censored]")
            .finish()
    }
}

#[async_trait::async_trait]
impl TokenFlow for UsernamePasswordFlow {
    async fn do_get_token(&self, engine: &dyn TokenEngine, request: &TokenRequest) -> FlowResult {
        Ok(engine
            .acquire_token_by_username_password(request, &self.username, &self.password)
            .await?)
    }
}

/// Authenticates a user with their user name and password.
#[derive(Debug)]
pub struct UsernamePasswordCredential {
    adapter: EngineAdapter<UsernamePasswordFlow>,
}

impl UsernamePasswordCredential {
    /// Signs in the user and returns the record of the signed in account.
    pub async fn authenticate(
        &self,
        scopes: &[String],
        options: &GetTokenOptions,
    ) -> Result<Option<AuthenticationRecord>> {
        self.adapter.authenticate(scopes, options).await
    }
}

#[async_trait::async_trait]
impl TokenCredential for UsernamePasswordCredential {
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
    use crate::engine::tests::{MockEngine, factory, result};
    use crate::engine::{AuthenticationResult, EngineAccount};
    use crate::env::Environment;
    use test_case::test_case;

    fn options() -> TokenCredentialOptions {
        TokenCredentialOptions::default().with_environment(Environment::default())
    }

    #[test_case("", "client", "user", "pass")]
    #[test_case("tenant", "", "user", "pass")]
    #[test_case("tenant", "client", "", "pass")]
    #[test_case("tenant", "client", "user", "")]
    fn required_parameters(tenant: &str, client: &str, user: &str, pass: &str) {
        let err = Builder::new(tenant, client, user, pass)
            .with_options(options())
            .build()
            .unwrap_err();
        assert!(err.is_invalid(), "{err:?}");
    }

    #[test]
    fn debug_censors_password() {
        let credential = Builder::new("tenant", "client", "user", "hunter2")
            .with_options(options())
            .build()
            .unwrap();
        let fmt = format!("{credential:?}");
        assert!(!fmt.contains("hunter2"), "{fmt}");
        assert!(fmt.contains("user"), "{fmt}");
    }

    #[tokio::test]
    async fn authenticate() -> anyhow::Result<()> {
        let mut engine = MockEngine::new();
        engine.expect_accounts().returning(|| Ok(Vec::new()));
        engine
            .expect_acquire_token_by_username_password()
            .times(1)
            .withf(|_, u, p| u == "user@contoso.com" && p == "hunter2")
            .returning(|_, _, _| {
                Ok(Some(AuthenticationResult {
                    account: Some(EngineAccount {
                        home_account_id: "oid.tid".into(),
                        tenant_id: "tid".into(),
                        username: "user@contoso.com".into(),
                        ..Default::default()
                    }),
                    ..result("user-token")
                }))
            });
        let credential = Builder::new("tenant", "client", "user@contoso.com", "hunter2")
            .with_options(options().with_engine_factory(factory(engine)))
            .build()?;
        let record = credential
            .authenticate(&scopes(&["a"]), &GetTokenOptions::default())
            .await?
            .unwrap();
        assert_eq!(record.username, "user@contoso.com");
        assert_eq!(record.client_id, "client");
        Ok(())
    }
}
