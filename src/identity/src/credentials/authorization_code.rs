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

//! Authorization code credentials.
//!
//! Web applications obtain an authorization code when the user signs in
//! through the application's own redirect endpoint. This credential redeems
//! that code for tokens. The code can only be redeemed once: later requests
//! are served from the cache of the signed in account.
//!
//! ```
//! # use azure_identity::credentials::authorization_code::Builder;
//! let credential = Builder::new(
//!     "my-tenant-id",
//!     "my-client-id",
//!     "the-authorization-code",
//!     "https://my-app.example.com/redirect",
//! )
//! .with_client_secret("my-client-secret")
//! .build()?;
//! # Ok::<(), azure_identity::build_errors::Error>(())
//! ```

use crate::BuildResult;
use crate::adapter::{AdapterConfig, EngineAdapter, FlowResult, TokenFlow};
use crate::build_errors::Error as BuildError;
use crate::credentials::{GetTokenOptions, Result, TokenCredential, TokenCredentialOptions};
use crate::engine::{AuthorizationCodeRequest, ClientCredential, TokenEngine, TokenRequest};
use crate::logging::CredentialLogger;
use crate::tenant::resolve_tenant_id;
use crate::token::AccessToken;

const CREDENTIAL_NAME: &str = "AuthorizationCodeCredential";

/// A builder for [AuthorizationCodeCredential].
pub struct Builder {
    tenant_id: String,
    client_id: String,
    authorization_code: String,
    redirect_uri: String,
    client_secret: Option<String>,
    options: TokenCredentialOptions,
}

impl Builder {
    /// Creates a builder redeeming `authorization_code`.
    ///
    /// The `redirect_uri` must be the one used to obtain the code.
    pub fn new<T, C, A, R>(tenant_id: T, client_id: C, authorization_code: A, redirect_uri: R) -> Self
    where
        T: Into<String>,
        C: Into<String>,
        A: Into<String>,
        R: Into<String>,
    {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            authorization_code: authorization_code.into(),
            redirect_uri: redirect_uri.into(),
            client_secret: None,
            options: TokenCredentialOptions::default(),
        }
    }

    /// Redeem the code as a confidential client using this secret.
    pub fn with_client_secret<V: Into<String>>(mut self, v: V) -> Self {
        self.client_secret = Some(v.into());
        self
    }

    /// Sets the options shared by all credentials.
    pub fn with_options(mut self, v: TokenCredentialOptions) -> Self {
        self.options = v;
        self
    }

    /// Creates the credential.
    pub fn build(self) -> BuildResult<AuthorizationCodeCredential> {
        if self.client_id.is_empty() {
            return Err(BuildError::missing_field("client_id"));
        }
        if self.authorization_code.is_empty() {
            return Err(BuildError::missing_field("authorization_code"));
        }
        if self.redirect_uri.is_empty() {
            return Err(BuildError::missing_field("redirect_uri"));
        }
        let tenant_id = resolve_tenant_id(Some(&self.tenant_id), Some(&self.client_id))?;
        let mut config = AdapterConfig::new(
            CredentialLogger::new(CREDENTIAL_NAME),
            self.client_id,
            tenant_id,
        )
        .with_options(self.options);
        if let Some(secret) = self.client_secret {
            config = config.with_client_credential(ClientCredential::Secret(secret));
        }
        let flow = AuthorizationCodeFlow {
            code: AuthorizationCodeRequest {
                code: self.authorization_code,
                redirect_uri: self.redirect_uri,
                code_verifier: None,
            },
        };
        Ok(AuthorizationCodeCredential {
            adapter: EngineAdapter::new(config, flow)?,
        })
    }
}

#[derive(Debug)]
struct AuthorizationCodeFlow {
    code: AuthorizationCodeRequest,
}

#[async_trait::async_trait]
impl TokenFlow for AuthorizationCodeFlow {
    async fn do_get_token(&self, engine: &dyn TokenEngine, request: &TokenRequest) -> FlowResult {
        Ok(engine.acquire_token_by_code(request, &self.code).await?)
    }
}

/// Redeems an authorization code obtained by a web application.
#[derive(Debug)]
pub struct AuthorizationCodeCredential {
    adapter: EngineAdapter<AuthorizationCodeFlow>,
}

#[async_trait::async_trait]
impl TokenCredential for AuthorizationCodeCredential {
    async fn get_token(
        &self,
        scopes: &[String],
        options: &GetTokenOptions,
    ) -> Result<AccessToken> {
        self.adapter.get_token(scopes, options).await
    }
}
