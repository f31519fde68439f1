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


//! Azure Arc enabled servers.
//!
//! The Arc agent protects its endpoint with a challenge: the first request
//! fails with a 401 whose `www-authenticate` header names a file readable by
//! the local administrators. The contents of that file authenticate the
//! second request.

use super::{MsiContext, MsiSource};
use crate::credentials::Result;
use crate::env::{IDENTITY_ENDPOINT, IMDS_ENDPOINT};
use crate::errors::CredentialsError;
use crate::token::AccessToken;

const NAME: &str = "ManagedIdentityCredential - Azure Arc MSI";
const API_VERSION: &str = "2019-11-01";

#[derive(Debug)]
pub(crate) struct AzureArc;

/// Extracts the key file path from a `Basic realm=<path>` challenge.
fn challenge_path(header: &str) -> Option<&str> {
    header
        .split('=')
        .nth(1)
        .map(str::trim)
        .filter(|p| !p.is_empty())
}

#[async_trait::async_trait]
impl MsiSource for AzureArc {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn is_available(&self, context: &MsiContext<'_>) -> bool {
        if context.resource().is_none() {
            tracing::info!("{NAME}: Unavailable. Multiple scopes are not supported.");
            return false;
        }
        let available = context.env.is_set(IMDS_ENDPOINT) && context.env.is_set(IDENTITY_ENDPOINT);
        if !available {
            tracing::info!(
                "{NAME}: The environment variables needed are: IMDS_ENDPOINT and IDENTITY_ENDPOINT"
            );
        }
        available
    }

    async fn get_token(&self, context: &MsiContext<'_>) -> Result<Option<AccessToken>> {
        let resource = context.require_resource(NAME)?;
        if context.client_id.is_some() || context.resource_id.is_some() {
            tracing::warn!(
                "{NAME}: user-assigned identities not supported. The argument clientId or resourceId might be ignored by the service."
            );
        }
        let Some(endpoint) = context.env.get(IDENTITY_ENDPOINT) else {
            return Err(CredentialsError::unavailable(format!(
                "{NAME}: Missing environment variable: IDENTITY_ENDPOINT"
            )));
        };
        tracing::info!("{NAME}: Authenticating.");

        let mut query = vec![("resource", resource), ("api-version", API_VERSION)];
        if let Some(client_id) = context.client_id {
            query.push(("client_id", client_id));
        }
        if let Some(resource_id) = context.resource_id {
            query.push(("msi_res_id", resource_id));
        }
        let client = &context.clients.default;
        let request = || {
            client
                .get(endpoint)
                .query(&query)
                .header("Accept", "application/json")
                .header("Metadata", "true")
        };

        let challenge = client
            .send_request(request(), &context.request_options())
            .await?;
        if challenge.status.as_u16() != 401 {
            return Err(CredentialsError::authentication(
                challenge.status.as_u16(),
                &format!(
                    "{NAME}: To authenticate with Azure Arc MSI, status code 401 is expected on the first request. Response: {}",
                    challenge.body
                ),
            ));
        }
        let path = challenge
            .headers
            .get(reqwest::header::WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(challenge_path)
            .ok_or_else(|| {
                CredentialsError::unavailable(format!("{NAME}: Failed to find the token file."))
            })?;
        let key = tokio::fs::read_to_string(path).await.map_err(|e| {
            CredentialsError::unavailable_from_source(
                format!("{NAME}: Failed to read the token file."),
                e,
            )
        })?;

        let request = request().header("Authorization", format!("Basic {key}"));
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
    use std::io::Write;

    type TestResult = anyhow::Result<()>;

    fn env(endpoint: String) -> Environment {
        Environment::default()
            .with(IDENTITY_ENDPOINT, endpoint)
            .with(IMDS_ENDPOINT, "http://localhost:40342")
    }

    #[test]
    fn challenge() {
        assert_eq!(
            challenge_path("Basic realm=/var/opt/azcmagent/tokens/abc.key"),
            Some("/var/opt/azcmagent/tokens/abc.key")
        );
        assert_eq!(challenge_path("Basic realm="), None);
        assert_eq!(challenge_path("Basic"), None);
    }

    #[tokio::test]
    async fn availability() {
        let clients = test_clients();
        let options = GetTokenOptions::default();
        let scopes = scopes(&["https://vault.azure.net/.default"]);
        let full = env("http://localhost:40342/metadata/identity/oauth2/token".to_string());
        assert!(
            AzureArc
                .is_available(&context(&scopes, &full, &clients, &options))
                .await
        );
        let partial = Environment::default().with(IMDS_ENDPOINT, "http://localhost:40342");
        assert!(
            !AzureArc
                .is_available(&context(&scopes, &partial, &clients, &options))
                .await
        );
    }

    #[tokio::test]
    async fn challenge_flow() -> TestResult {
        let mut key_file = tempfile::NamedTempFile::new()?;
        key_file.write_all(b"secret-key")?;
        let challenge = format!("Basic realm={}", key_file.path().display());

        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/metadata/identity/oauth2/token"),
                request::query(url_decoded(contains(("api-version", API_VERSION)))),
                request::headers(contains(("metadata", "true"))),
                request::headers(not(contains(("authorization", any())))),
            ])
            .times(1)
            .respond_with(status_code(401).insert_header("www-authenticate", challenge)),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/metadata/identity/oauth2/token"),
                request::headers(contains(("authorization", "Basic secret-key"))),
            ])
            .times(1)
            .respond_with(json_encoded(token_body("arc-token"))),
        );

        let clients = test_clients();
        let options = GetTokenOptions::default();
        let scopes = scopes(&["https://vault.azure.net/.default"]);
        let env = env(server.url_str("/metadata/identity/oauth2/token"));
        let token = AzureArc
            .get_token(&context(&scopes, &env, &clients, &options))
            .await?;
        assert_eq!(token.map(|t| t.token).as_deref(), Some("arc-token"));
        Ok(())
    }

    #[tokio::test]
    async fn missing_challenge() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/token"))
                .times(1)
                .respond_with(status_code(200).body("{}")),
        );
        let clients = test_clients();
        let options = GetTokenOptions::default();
        let scopes = scopes(&["https://vault.azure.net/.default"]);
        let env = env(server.url_str("/token"));
        let err = AzureArc
            .get_token(&context(&scopes, &env, &clients, &options))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(200), "{err:?}");
        assert!(
            err.to_string().contains("status code 401 is expected"),
            "{err}"
        );
    }

    #[tokio::test]
    async fn missing_token_file() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/token"))
                .times(1)
                .respond_with(status_code(401).insert_header("www-authenticate", "Basic realm=")),
        );
        let clients = test_clients();
        let options = GetTokenOptions::default();
        let scopes = scopes(&["https://vault.azure.net/.default"]);
        let env = env(server.url_str("/token"));
        let err = AzureArc
            .get_token(&context(&scopes, &env, &clients, &options))
            .await
            .unwrap_err();
        assert!(err.is_unavailable(), "{err:?}");
        assert!(err.to_string().contains("Failed to find the token file"), "{err}");
    }
}
