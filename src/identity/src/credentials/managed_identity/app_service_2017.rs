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


//! App Service and Azure Functions, using the 2017-09-01 API.

use super::{MsiContext, MsiSource};
use crate::credentials::Result;
use crate::env::{MSI_ENDPOINT, MSI_SECRET};
use crate::errors::CredentialsError;
use crate::token::AccessToken;

const NAME: &str = "ManagedIdentityCredential - AppServiceMSI 2017";
const API_VERSION: &str = "2017-09-01";

#[derive(Debug)]
pub(crate) struct AppService2017;

#[async_trait::async_trait]
impl MsiSource for AppService2017 {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn is_available(&self, context: &MsiContext<'_>) -> bool {
        if context.resource().is_none() {
            tracing::info!("{NAME}: Unavailable. Multiple scopes are not supported.");
            return false;
        }
        let available = context.env.is_set(MSI_ENDPOINT) && context.env.is_set(MSI_SECRET);
        if !available {
            tracing::info!(
                "{NAME}: Unavailable. The environment variables needed are: MSI_ENDPOINT and MSI_SECRET."
            );
        }
        available
    }

    async fn get_token(&self, context: &MsiContext<'_>) -> Result<Option<AccessToken>> {
        let resource = context.require_resource(NAME)?;
        if context.resource_id.is_some() {
            tracing::warn!(
                "{NAME}: managed Identity by resource Id is not supported. Argument resourceId might be ignored by the service."
            );
        }
        let (Some(endpoint), Some(secret)) =
            (context.env.get(MSI_ENDPOINT), context.env.get(MSI_SECRET))
        else {
            return Err(CredentialsError::unavailable(format!(
                "{NAME}: Missing environment variables: MSI_ENDPOINT or MSI_SECRET"
            )));
        };
        tracing::info!("{NAME}: Using the endpoint and the secret coming form the environment variables: MSI_ENDPOINT={endpoint} and MSI_SECRET=[REDACTED].");

        let mut query = vec![("resource", resource), ("api-version", API_VERSION)];
        if let Some(client_id) = context.client_id {
            query.push(("clientid", client_id));
        }
        let client = &context.clients.default;
        let request = client
            .get(endpoint)
            .query(&query)
            .header("Accept", "application/json")
            .header("secret", secret);
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

    #[tokio::test]
    async fn availability() {
        let clients = test_clients();
        let options = GetTokenOptions::default();
        let scopes = scopes(&["https://vault.azure.net/.default"]);
        let env = Environment::default()
            .with(MSI_ENDPOINT, "http://localhost/token")
            .with(MSI_SECRET, "secret");
        assert!(
            AppService2017
                .is_available(&context(&scopes, &env, &clients, &options))
                .await
        );
        let env = Environment::default().with(MSI_ENDPOINT, "http://localhost/token");
        assert!(
            !AppService2017
                .is_available(&context(&scopes, &env, &clients, &options))
                .await
        );
    }

    #[tokio::test]
    async fn get_token() -> TestResult {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/msi/token"),
                request::query(url_decoded(contains(("resource", "https://vault.azure.net")))),
                request::query(url_decoded(contains(("api-version", API_VERSION)))),
                request::query(url_decoded(contains(("clientid", "client")))),
                request::headers(contains(("secret", "the-secret"))),
            ])
            .times(1)
            .respond_with(json_encoded(token_body("app-service-token"))),
        );
        let clients = test_clients();
        let options = GetTokenOptions::default();
        let scopes = scopes(&["https://vault.azure.net/.default"]);
        let env = Environment::default()
            .with(MSI_ENDPOINT, server.url_str("/msi/token"))
            .with(MSI_SECRET, "the-secret");
        let context = MsiContext {
            client_id: Some("client"),
            ..context(&scopes, &env, &clients, &options)
        };
        let token = AppService2017.get_token(&context).await?;
        assert_eq!(token.map(|t| t.token).as_deref(), Some("app-service-token"));
        Ok(())
    }

    #[tokio::test]
    async fn server_error() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/msi/token"))
                .times(1)
                .respond_with(status_code(403).body(r#"{"error": "forbidden"}"#)),
        );
        let clients = test_clients();
        let options = GetTokenOptions::default();
        let scopes = scopes(&["https://vault.azure.net/.default"]);
        let env = Environment::default()
            .with(MSI_ENDPOINT, server.url_str("/msi/token"))
            .with(MSI_SECRET, "the-secret");
        let err = AppService2017
            .get_token(&context(&scopes, &env, &clients, &options))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(403), "{err:?}");
    }
}
