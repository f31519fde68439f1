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

//! Device code credentials.
//!
//! The user signs in on another device: the credential displays a code and a
//! URL, the user opens the URL in any browser, enters the code, and
//! completes the sign-in there. Meanwhile the credential polls the identity
//! provider until the sign-in completes. This works on devices without a
//! browser, such as remote shells.
//!
//! ```no_run
//! # use azure_identity::credentials::device_code::Builder;
//! # use azure_identity::credentials::GetTokenOptions;
//! # tokio_test::block_on(async {
//! let credential = Builder::default()
//!     .with_user_prompt_callback(|info| eprintln!("{}", info.message))
//!     .build()?;
//! let scopes = vec!["https://graph.microsoft.com/.default".to_string()];
//! let record = credential.authenticate(&scopes, &GetTokenOptions::default()).await?;
//! # Ok::<(), anyhow::Error>(())
//! # });
//! ```

use crate::BuildResult;
use crate::adapter::{AdapterConfig, EngineAdapter, FlowResult, TokenFlow};
use crate::auth_record::AuthenticationRecord;
use crate::constants::DEVELOPER_SIGN_ON_CLIENT_ID;
use crate::credentials::{GetTokenOptions, Result, TokenCredential, TokenCredentialOptions};
use crate::engine::{DeviceCodeInfo, DeviceCodePromptCallback, TokenEngine, TokenRequest};
use crate::logging::CredentialLogger;
use crate::tenant::resolve_tenant_id;
use crate::token::AccessToken;
use std::sync::Arc;

const CREDENTIAL_NAME: &str = "DeviceCodeCredential";

/// Prints the device code message to stdout.
pub fn default_user_prompt_callback(info: &DeviceCodeInfo) {
    println!("{}", info.message);
}

/// A builder for [DeviceCodeCredential].
#[derive(Default)]
pub struct Builder {
    tenant_id: Option<String>,
    client_id: Option<String>,
    user_prompt_callback: Option<DeviceCodePromptCallback>,
    disable_automatic_authentication: bool,
    authentication_record: Option<AuthenticationRecord>,
    options: TokenCredentialOptions,
}

impl Builder {
    /// Sets the tenant.
    ///
    /// The default is `organizations`, or `common` if a client id is set.
    pub fn with_tenant_id<V: Into<String>>(mut self, v: V) -> Self {
        self.tenant_id = Some(v.into());
        self
    }

    /// Sets the client id of the app registration.
    ///
    /// The default is the client id of the Azure development tools.
    pub fn with_client_id<V: Into<String>>(mut self, v: V) -> Self {
        self.client_id = Some(v.into());
        self
    }

    /// Sets the function that shows the device code to the user.
    ///
    /// The default prints the message to stdout.
    pub fn with_user_prompt_callback<F>(mut self, v: F) -> Self
    where
        F: Fn(&DeviceCodeInfo) + Send + Sync + 'static,
    {
        self.user_prompt_callback = Some(Arc::new(v));
        self
    }

    /// Fail instead of prompting the user when no cached token is usable.
    ///
    /// Use [DeviceCodeCredential::authenticate] to prompt the user
    /// explicitly.
    pub fn with_disable_automatic_authentication(mut self, v: bool) -> Self {
        self.disable_automatic_authentication = v;
        self
    }

    /// Start with the account of a previous authentication.
    pub fn with_authentication_record(mut self, v: AuthenticationRecord) -> Self {
        self.authentication_record = Some(v);
        self
    }

    /// Sets the options shared by all credentials.
    pub fn with_options(mut self, v: TokenCredentialOptions) -> Self {
        self.options = v;
        self
    }

    /// Creates the credential.
    pub fn build(self) -> BuildResult<DeviceCodeCredential> {
        let tenant_id = resolve_tenant_id(self.tenant_id.as_deref(), self.client_id.as_deref())?;
        let client_id = self
            .client_id
            .unwrap_or_else(|| DEVELOPER_SIGN_ON_CLIENT_ID.to_string());
        let config = AdapterConfig::new(
            CredentialLogger::new(CREDENTIAL_NAME),
            client_id,
            tenant_id,
        )
        .with_disable_automatic_authentication(self.disable_automatic_authentication)
        .with_authentication_record(self.authentication_record)
        .with_options(self.options);
        let flow = DeviceCodeFlow {
            prompt: self
                .user_prompt_callback
                .unwrap_or_else(|| Arc::new(default_user_prompt_callback)),
        };
        Ok(DeviceCodeCredential {
            adapter: EngineAdapter::new(config, flow)?,
        })
    }
}

struct DeviceCodeFlow {
    prompt: DeviceCodePromptCallback,
}

impl std::fmt::Debug for DeviceCodeFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCodeFlow").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl TokenFlow for DeviceCodeFlow {
    async fn do_get_token(&self, engine: &dyn TokenEngine, request: &TokenRequest) -> FlowResult {
        Ok(engine
            .acquire_token_by_device_code(request, self.prompt.clone())
            .await?)
    }
}

/// Authenticates a user with the device code flow.
#[derive(Debug)]
pub struct DeviceCodeCredential {
    adapter: EngineAdapter<DeviceCodeFlow>,
}

impl DeviceCodeCredential {
    /// Signs in the user, even if automatic authentication is disabled, and
    /// returns the record of the signed in account.
    pub async fn authenticate(
        &self,
        scopes: &[String],
        options: &GetTokenOptions,
    ) -> Result<Option<AuthenticationRecord>> {
        self.adapter.authenticate(scopes, options).await
    }
}

#[async_trait::async_trait]
impl TokenCredential for DeviceCodeCredential {
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
    use crate::engine::tests::{MockEngine, MockFactory, factory, result};
    use crate::engine::{AuthenticationResult, EngineAccount, EngineError, EngineErrorKind};
    use crate::env::Environment;
    use std::sync::Mutex;

    fn options() -> TokenCredentialOptions {
        TokenCredentialOptions::default().with_environment(Environment::default())
    }

    fn account() -> EngineAccount {
        EngineAccount {
            home_account_id: "oid.tid".into(),
            local_account_id: "oid".into(),
            environment: "login.microsoftonline.com".into(),
            tenant_id: "tid".into(),
            username: "user@contoso.com".into(),
        }
    }

    #[tokio::test]
    async fn defaults() -> anyhow::Result<()> {
        let mut factory = MockFactory::new();
        factory
            .expect_create()
            .withf(|c| {
                c.client_id == DEVELOPER_SIGN_ON_CLIENT_ID
                    && c.authority == "https://login.microsoftonline.com/organizations"
                    && !c.is_confidential()
            })
            .returning(|_| {
                let mut engine = MockEngine::new();
                engine.expect_accounts().returning(|| Ok(Vec::new()));
                engine
                    .expect_acquire_token_by_device_code()
                    .returning(|_, _| Ok(Some(result("t"))));
                Ok(Arc::new(engine))
            });
        let credential = Builder::default()
            .with_options(options().with_engine_factory(factory))
            .build()?;
        credential
            .get_token(&scopes(&["a"]), &GetTokenOptions::default())
            .await?;
        Ok(())
    }

    #[test]
    fn client_id_defaults_to_common() {
        let credential = Builder::default()
            .with_client_id("my-app")
            .with_options(options())
            .build();
        assert!(credential.is_ok(), "{credential:?}");
        let err = Builder::default()
            .with_tenant_id("not a tenant")
            .with_options(options())
            .build()
            .unwrap_err();
        assert!(err.is_invalid(), "{err:?}");
    }

    #[tokio::test]
    async fn prompts_user() -> anyhow::Result<()> {
        let mut engine = MockEngine::new();
        engine.expect_accounts().returning(|| Ok(Vec::new()));
        engine
            .expect_acquire_token_by_device_code()
            .times(1)
            .returning(|_, prompt| {
                prompt(&DeviceCodeInfo {
                    user_code: "ABC-123".into(),
                    verification_uri: "https://microsoft.com/devicelogin".into(),
                    message: "enter ABC-123".into(),
                });
                Ok(Some(AuthenticationResult {
                    account: Some(account()),
                    ..result("user-token")
                }))
            });
        engine
            .expect_acquire_token_silent()
            .times(1)
            .returning(|_, _| Ok(Some(result("silent-token"))));
        let shown = Arc::new(Mutex::new(Vec::new()));
        let captured = shown.clone();
        let credential = Builder::default()
            .with_user_prompt_callback(move |info| {
                captured.lock().unwrap().push(info.user_code.clone())
            })
            .with_options(options().with_engine_factory(factory(engine)))
            .build()?;
        let token = credential
            .get_token(&scopes(&["a"]), &GetTokenOptions::default())
            .await?;
        assert_eq!(token.token, "user-token");
        assert_eq!(*shown.lock().unwrap(), vec!["ABC-123".to_string()]);

        // The second request uses the signed in account.
        let token = credential
            .get_token(&scopes(&["a"]), &GetTokenOptions::default())
            .await?;
        assert_eq!(token.token, "silent-token");
        Ok(())
    }

    #[tokio::test]
    async fn authenticate() -> anyhow::Result<()> {
        let mut engine = MockEngine::new();
        engine.expect_accounts().returning(|| Ok(Vec::new()));
        engine
            .expect_acquire_token_by_device_code()
            .times(1)
            .returning(|_, _| {
                Ok(Some(AuthenticationResult {
                    account: Some(account()),
                    ..result("user-token")
                }))
            });
        let credential = Builder::default()
            .with_disable_automatic_authentication(true)
            .with_options(options().with_engine_factory(factory(engine)))
            .build()?;
        let err = credential
            .get_token(&scopes(&["a"]), &GetTokenOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_authentication_required(), "{err:?}");

        let record = credential
            .authenticate(&scopes(&["a"]), &GetTokenOptions::default())
            .await?
            .unwrap();
        assert_eq!(record.username, "user@contoso.com");
        assert_eq!(record.client_id, DEVELOPER_SIGN_ON_CLIENT_ID);
        Ok(())
    }

    #[tokio::test]
    async fn cancelled() -> anyhow::Result<()> {
        let mut engine = MockEngine::new();
        engine.expect_accounts().returning(|| Ok(Vec::new()));
        engine
            .expect_acquire_token_by_device_code()
            .returning(|_, _| {
                Err(EngineError::new(
                    EngineErrorKind::DeviceCodePollingCancelled,
                    "polling cancelled",
                ))
            });
        let credential = Builder::default()
            .with_options(options().with_engine_factory(factory(engine)))
            .build()?;
        let err = credential
            .get_token(&scopes(&["a"]), &GetTokenOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_aborted(), "{err:?}");
        assert_eq!(
            err.to_string(),
            "The authentication has been aborted by the caller."
        );
        Ok(())
    }
}
