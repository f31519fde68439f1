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


//! The Azure Instance Metadata Service (IMDS).
//!
//! Virtual machines, scale sets and most other compute services expose
//! managed identities through IMDS. There is no environment variable to
//! detect the service, so availability is determined by sending a request,
//! with a short timeout, to the well-known address.

use super::{MsiContext, MsiSource};
use crate::credentials::Result;
use crate::env::AZURE_POD_IDENTITY_AUTHORITY_HOST;
use crate::errors::CredentialsError;
use crate::identity_client::{IdentityClient, RequestOptions};
use crate::retry::ExponentialBackoff;
use crate::token::AccessToken;
use std::time::Duration;

const NAME: &str = "ManagedIdentityCredential - IMDS";
const API_VERSION: &str = "2018-02-01";
const DEFAULT_HOST: &str = "http://169.254.169.254";
const TOKEN_PATH: &str = "/metadata/identity/oauth2/token";
const PING_TIMEOUT: Duration = Duration::from_millis(300);

#[derive(Debug, Default)]
pub(crate) struct Imds {
    // Retries requests while the identity is being assigned to the VM.
    backoff: ExponentialBackoff,
}

fn token_url(context: &MsiContext<'_>) -> Result<url::Url> {
    let host = context
        .env
        .get(AZURE_POD_IDENTITY_AUTHORITY_HOST)
        .unwrap_or(DEFAULT_HOST);
    url::Url::parse(host)
        .and_then(|u| u.join(TOKEN_PATH))
        .map_err(|e| CredentialsError::configuration_from_source(format!("{NAME}: invalid host {host}"), e))
}

/// Returns true if anything answers at `url`.
///
/// The ping omits the `Metadata` header, IMDS rejects such requests
/// immediately with a 400.
async fn ping(client: &IdentityClient, url: url::Url, options: RequestOptions) -> bool {
    let options = options.with_timeout(PING_TIMEOUT).with_disable_retry(true);
    match client.send_request(client.get(url), &options).await {
        Ok(response) => {
            tracing::info!("{NAME}: The Azure IMDS endpoint is available, status {}", response.status);
            true
        }
        Err(e) => {
            tracing::info!("{NAME}: The Azure IMDS endpoint is unavailable: {e}");
            false
        }
    }
}

#[async_trait::async_trait]
impl MsiSource for Imds {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn is_available(&self, context: &MsiContext<'_>) -> bool {
        if context.resource().is_none() {
            tracing::info!("{NAME}: Unavailable. Multiple scopes are not supported.");
            return false;
        }
        if context.env.is_set(AZURE_POD_IDENTITY_AUTHORITY_HOST) {
            return true;
        }
        let Ok(url) = token_url(context) else {
            return false;
        };
        ping(&context.clients.ping, url, context.request_options()).await
    }

    async fn get_token(&self, context: &MsiContext<'_>) -> Result<Option<AccessToken>> {
        let resource = context.require_resource(NAME)?;
        let url = token_url(context)?;
        tracing::info!("{NAME}: Using the Azure IMDS endpoint {url}.");

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
                .get(url.clone())
                .query(&query)
                .header("Accept", "application/json")
                .header("Metadata", "true")
        };
        let attempts = self.backoff.max_retries();
        self.backoff
            .retry(
                move || context.send_token_request(client, request()),
                |e| e.status_code() == Some(404),
                || {
                    CredentialsError::authentication(
                        404,
                        &format!("{NAME}: Failed to retrieve IMDS token after {attempts} retries."),
                    )
                },
            )
            .await
    }
}
