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

//! App Service and Azure Functions, using the 2019-08-01 API.

use super::{MsiContext, MsiSource};
use crate::credentials::Result;
use crate::env::{IDENTITY_ENDPOINT, IDENTITY_HEADER};
use crate::errors::CredentialsError;
use crate::token::AccessToken;

const NAME: &str = "ManagedIdentityCredential - AppServiceMSI 2019";
const API_VERSION: &str = "2019-08-01";

#[derive(Debug)]
pub(crate) struct AppService2019;

#[async_trait::async_trait]
impl MsiSource for AppService2019 {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn is_available(&self, context: &MsiContext<'_>) -> bool {
        if context.resource().is_none() {
            tracing::info!("{NAME}: Unavailable. Multiple scopes are not supported.");
            return false;
        }
        let available = context.env.is_set(IDENTITY_ENDPOINT) && context.env.is_set(IDENTITY_HEADER);
        if !available {
            tracing::info!(
                "{NAME}: Unavailable. The environment variables needed are: IDENTITY_ENDPOINT and IDENTITY_HEADER."
            );
        }
        available
    }

    async fn get_token(&self, context: &MsiContext<'_>) -> Result<Option<AccessToken>> {
        let resource = context.require_resource(NAME)?;
        let (Some(endpoint), Some(header)) = (
            context.env.get(IDENTITY_ENDPOINT),
            context.env.get(IDENTITY_HEADER),
        ) else {
            return Err(CredentialsError::unavailable(format!(
                "{NAME}: Missing environment variables: IDENTITY_ENDPOINT or IDENTITY_HEADER"
            )));
        };
        tracing::info!("{NAME}: Using the endpoint and the secret coming from the environment variables: IDENTITY_ENDPOINT={endpoint} and IDENTITY_HEADER=[REDACTED].");

        let mut query = vec![("resource", resource), ("api-version", API_VERSION)];
        if let Some(client_id) = context.client_id {
            query.push(("client_id", client_id));
        }
        if let Some(resource_id) = context.resource_id {
            query.push(("mi_res_id", resource_id));
        }
        let client = &context.clients.default;
        let request = client
            .get(endpoint)
            .query(&query)
            .header("Accept", "application/json")
            .header("X-IDENTITY-HEADER", header);
        context.send_token_request(client, request).await
    }
}
