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


//! Service Fabric.
//!
//! The Service Fabric endpoint uses a self-signed certificate, identified by
//! its thumbprint in `IDENTITY_SERVER_THUMBPRINT`.

use super::{MsiContext, MsiSource};
use crate::credentials::Result;
use crate::env::{IDENTITY_ENDPOINT, IDENTITY_HEADER, IDENTITY_SERVER_THUMBPRINT};
use crate::errors::CredentialsError;
use crate::token::AccessToken;

const NAME: &str = "ManagedIdentityCredential - Fabric MSI";
const API_VERSION: &str = "2019-07-01-preview";

#[derive(Debug)]
pub(crate) struct ServiceFabric;

#[async_trait::async_trait]
impl MsiSource for ServiceFabric {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn is_available(&self, context: &MsiContext<'_>) -> bool {
        if context.resource().is_none() {
            tracing::info!("{NAME}: Unavailable. Multiple scopes are not supported.");
            return false;
        }
        let available = [IDENTITY_ENDPOINT, IDENTITY_HEADER, IDENTITY_SERVER_THUMBPRINT]
            .iter()
            .all(|name| context.env.is_set(name));
        if !available {
            tracing::info!(
                "{NAME}: Unavailable. The environment variables needed are: IDENTITY_ENDPOINT, IDENTITY_HEADER and IDENTITY_SERVER_THUMBPRINT"
            );
        }
        available
    }

    async fn get_token(&self, context: &MsiContext<'_>) -> Result<Option<AccessToken>> {
        let resource = context.require_resource(NAME)?;
        if context.resource_id.is_some() {
            tracing::warn!(
                "{NAME}: user defined managed Identity by resource Id is not supported. Argument resourceId will be ignored."
            );
        }
        let (Some(endpoint), Some(header)) = (
            context.env.get(IDENTITY_ENDPOINT),
            context.env.get(IDENTITY_HEADER),
        ) else {
            return Err(CredentialsError::unavailable(format!(
                "{NAME}: Missing environment variables: IDENTITY_ENDPOINT or IDENTITY_HEADER"
            )));
        };
        tracing::info!(
            "{NAME}: Using the endpoint and the secret coming from the environment variables: IDENTITY_ENDPOINT={endpoint}, IDENTITY_HEADER=[REDACTED] and IDENTITY_SERVER_THUMBPRINT=[REDACTED]."
        );

        let mut query = vec![("resource", resource), ("api-version", API_VERSION)];
        if let Some(client_id) = context.client_id {
            query.push(("client_id", client_id));
        }
        if let Some(resource_id) = context.resource_id {
            query.push(("msi_res_id", resource_id));
        }
        let client = &context.clients.insecure;
        let request = client
            .get(endpoint)
            .query(&query)
            .header("Accept", "application/json")
            .header("secret", header);
        context.send_token_request(client, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::GetTokenOptions;
    use crate::credentials::managed_identity::tests::{context, test_clients, token_body};
    use crate::credentials::tests::scopes;
    use crate::env::Environment;
    use httptest::{Expectation, Server, matchers::*, responders::*};

    type TestResult = anyhow::Result<()>;

    fn env(endpoint: String) -> Environment {
        Environment::default()
            .with(IDENTITY_ENDPOINT, endpoint)
            .with(IDENTITY_HEADER, "fabric-secret")
            .with(IDENTITY_SERVER_THUMBPRINT, "0123456789abcdef")
    }

    #[tokio::test]
    async fn availability() {
        let clients = test_clients();
        let options = GetTokenOptions::default();
        let scopes = scopes(&["https://vault.azure.net/.default"]);
        let full = env("https://localhost:2377/token".to_string());
        assert!(
            ServiceFabric
                .is_available(&context(&scopes, &full, &clients, &options))
                .await
        );
        let partial = Environment::default()
            .with(IDENTITY_ENDPOINT, "https://localhost:2377/token")
            .with(IDENTITY_HEADER, "fabric-secret");
        assert!(
            !ServiceFabric
                .is_available(&context(&scopes, &partial, &clients, &options))
                .await
        );
    }

    #[tokio::test]
    async fn get_token() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/token"),
                request::query(url_decoded(contains(("resource", "https://vault.azure.net")))),
                request::query(url_decoded(contains(("api-version", API_VERSION)))),
                request::query(url_decoded(contains(("client_id", "client")))),
                request::headers(contains(("secret", "fabric-secret"))),
            ])
            .times(1)
            .respond_with(json_encoded(token_body("fabric-token"))),
        );
        let clients = test_clients();
        let options = GetTokenOptions::default();
        let scopes = scopes(&["https://vault.azure.net/.default"]);
        let env = env(server.url_str("/token"));
        let context = MsiContext {
            client_id: Some("client"),
            ..context(&scopes, &env, &clients, &options)
        };
        let token = ServiceFabric.get_token(&context).await?;
        assert_eq!(token.map(|t| t.token).as_deref(), Some("fabric-token"));
        Ok(())
    }
}
