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


//! Azure Cloud Shell.

use super::{MsiContext, MsiSource};
use crate::credentials::Result;
use crate::env::MSI_ENDPOINT;
use crate::errors::CredentialsError;
use crate::token::AccessToken;

const NAME: &str = "ManagedIdentityCredential - CloudShellMSI";

#[derive(Debug)]
pub(crate) struct CloudShell;

#[async_trait::async_trait]
impl MsiSource for CloudShell {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn is_available(&self, context: &MsiContext<'_>) -> bool {
        if context.resource().is_none() {
            tracing::info!("{NAME}: Unavailable. Multiple scopes are not supported.");
            return false;
        }
        let available = context.env.is_set(MSI_ENDPOINT);
        if !available {
            tracing::info!("{NAME}: Unavailable. The environment variable MSI_ENDPOINT is needed.");
        }
        available
    }

    async fn get_token(&self, context: &MsiContext<'_>) -> Result<Option<AccessToken>> {
        let resource = context.require_resource(NAME)?;
        if context.client_id.is_some() {
            tracing::warn!(
                "{NAME}: user-assigned identities not supported. The argument clientId might be ignored by the service."
            );
        }
        if context.resource_id.is_some() {
            tracing::warn!(
                "{NAME}: user defined managed Identity by resource Id not supported. The argument resourceId might be ignored by the service."
            );
        }
        let Some(endpoint) = context.env.get(MSI_ENDPOINT) else {
            return Err(CredentialsError::unavailable(format!(
                "{NAME}: Missing environment variable: MSI_ENDPOINT"
            )));
        };
        tracing::info!("{NAME}: Using the endpoint coming form the environment variable MSI_ENDPOINT = {endpoint}.");

        let mut form = vec![("resource", resource)];
        if let Some(client_id) = context.client_id {
            form.push(("client_id", client_id));
        }
        if let Some(resource_id) = context.resource_id {
            form.push(("msi_res_id", resource_id));
        }
        let client = &context.clients.default;
        let request = client
            .post(endpoint)
            .form(&form)
            .header("Accept", "application/json")
            .header("Metadata", "true");
        context.send_token_request(client, request).await
    }
}
