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


//! Workload identity token exchange, used in Kubernetes.

use super::{MsiContext, MsiSource};
use crate::credentials::workload_identity::{Builder, WorkloadIdentityCredential};
use crate::credentials::{Result, TokenCredential, TokenCredentialOptions};
use crate::env::{AZURE_CLIENT_ID, AZURE_FEDERATED_TOKEN_FILE, AZURE_TENANT_ID};
use crate::errors::CredentialsError;
use crate::token::AccessToken;
use tokio::sync::OnceCell;

const NAME: &str = "ManagedIdentityCredential - Token Exchange";

#[derive(Debug)]
pub(crate) struct TokenExchange {
    options: TokenCredentialOptions,
    credential: OnceCell<WorkloadIdentityCredential>,
}

impl TokenExchange {
    pub(crate) fn new(options: TokenCredentialOptions) -> Self {
        Self {
            options: options.with_disable_instance_discovery(true),
            credential: OnceCell::new(),
        }
    }

    async fn credential(&self, context: &MsiContext<'_>) -> Result<&WorkloadIdentityCredential> {
        self.credential
            .get_or_try_init(|| async {
                let mut builder = Builder::default()
                    .with_options(self.options.clone().with_environment(context.env.clone()));
                if let Some(client_id) = context.client_id {
                    builder = builder.with_client_id(client_id);
                }
                builder.build().map_err(CredentialsError::from)
            })
            .await
    }
}

#[async_trait::async_trait]
impl MsiSource for TokenExchange {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn is_available(&self, context: &MsiContext<'_>) -> bool {
        let env = context.env;
        let client_id = context.client_id.or_else(|| env.get(AZURE_CLIENT_ID));
        let available = client_id.is_some()
            && env.is_set(AZURE_TENANT_ID)
            && env.is_set(AZURE_FEDERATED_TOKEN_FILE);
        if !available {
            tracing::info!(
                "{NAME}: Unavailable. The environment variables needed are: AZURE_CLIENT_ID (or the client ID sent through the parameters), AZURE_TENANT_ID and AZURE_FEDERATED_TOKEN_FILE"
            );
        }
        available
    }

    async fn get_token(&self, context: &MsiContext<'_>) -> Result<Option<AccessToken>> {
        let credential = self.credential(context).await?;
        credential.get_token(context.scopes, context.options).await.map(Some)
    }

    // The workload identity credential has its own cache.
    fn uses_cache(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::GetTokenOptions;
    use crate::credentials::managed_identity::tests::{context, test_clients};
    use crate::credentials::tests::scopes;
    use crate::engine::TokenEngine;
    use crate::engine::tests::{MockEngine, MockFactory, result};
    use crate::env::Environment;
    use std::sync::Arc;

    type TestResult = anyhow::Result<()>;

    fn env() -> Environment {
        Environment::from_pairs([
            (AZURE_TENANT_ID, "tenant"),
            (AZURE_CLIENT_ID, "env-client"),
            (AZURE_FEDERATED_TOKEN_FILE, "/var/run/secrets/token"),
        ])
    }

    #[tokio::test]
    async fn availability() {
        let clients = test_clients();
        let options = GetTokenOptions::default();
        let scopes = scopes(&["a"]);
        let source = TokenExchange::new(TokenCredentialOptions::default());

        let full = env();
        assert!(source.is_available(&context(&scopes, &full, &clients, &options)).await);

        let no_client = Environment::from_pairs([
            (AZURE_TENANT_ID, "tenant"),
            (AZURE_FEDERATED_TOKEN_FILE, "/var/run/secrets/token"),
        ]);
        assert!(!source.is_available(&context(&scopes, &no_client, &clients, &options)).await);
        let explicit = MsiContext {
            client_id: Some("client"),
            ..context(&scopes, &no_client, &clients, &options)
        };
        assert!(source.is_available(&explicit).await);
        assert!(!source.uses_cache());
    }

    #[tokio::test]
    async fn get_token() -> TestResult {
        let mut engine = MockEngine::new();
        engine.expect_accounts().returning(|| Ok(Vec::new()));
        engine
            .expect_acquire_token_by_client_credential()
            .times(2)
            .returning(|_| Ok(Some(result("exchanged-token"))));
        let engine: Arc<dyn TokenEngine> = Arc::new(engine);
        let mut factory = MockFactory::new();
        factory
            .expect_create()
            .withf(|c| c.client_id == "explicit-client")
            .returning(move |_| Ok(engine.clone()));
        let source = TokenExchange::new(TokenCredentialOptions::default().with_engine_factory(factory));

        let clients = test_clients();
        let options = GetTokenOptions::default();
        let scopes = scopes(&["a"]);
        let env = env();
        let context = MsiContext {
            client_id: Some("explicit-client"),
            ..context(&scopes, &env, &clients, &options)
        };
        for _ in 0..2 {
            let token = source.get_token(&context).await?;
            assert_eq!(token.map(|t| t.token).as_deref(), Some("exchanged-token"));
        }
        Ok(())
    }
}
