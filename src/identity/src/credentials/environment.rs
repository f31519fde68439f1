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

//! Credentials configured through environment variables.
//!
//! [EnvironmentCredential] selects a credential from the variables that are
//! set, in this order:
//!
//! 1. A service principal with a secret: `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`
//!    and `AZURE_CLIENT_SECRET`.
//! 2. A service principal with a certificate: `AZURE_TENANT_ID`,
//!    `AZURE_CLIENT_ID`, `AZURE_CLIENT_CERTIFICATE_PATH` and optionally
//!    `AZURE_CLIENT_CERTIFICATE_PASSWORD` and
//!    `AZURE_CLIENT_SEND_CERTIFICATE_CHAIN`.
//! 3. A user: `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`, `AZURE_USERNAME` and
//!    `AZURE_PASSWORD`.
//!
//! ```
//! # use azure_identity::credentials::environment::Builder;
//! # use azure_identity::credentials::{GetTokenOptions, TokenCredential};
//! # tokio_test::block_on(async {
//! let credential = Builder::default().build()?;
//! let scopes = ["https://vault.azure.net/.default".to_string()];
//! match credential.get_token(&scopes, &GetTokenOptions::default()).await {
//!     Ok(token) => println!("token expires at {}", token.expires_on_timestamp),
//!     Err(e) if e.is_unavailable() => println!("not configured: {e}"),
//!     Err(e) => println!("authentication failed: {e}"),
//! }
//! # Ok::<(), azure_identity::build_errors::Error>(())
//! # });
//! ```

use crate::BuildResult;
use crate::credentials::client_certificate::Builder as CertificateBuilder;
use crate::credentials::client_secret::Builder as SecretBuilder;
use crate::credentials::username_password::Builder as UserBuilder;
use crate::credentials::{GetTokenOptions, Result, TokenCredential, TokenCredentialOptions};
use crate::env::{
    AZURE_CLIENT_CERTIFICATE_PASSWORD, AZURE_CLIENT_CERTIFICATE_PATH, AZURE_CLIENT_ID,
    AZURE_CLIENT_SECRET, AZURE_CLIENT_SEND_CERTIFICATE_CHAIN, AZURE_PASSWORD, AZURE_TENANT_ID,
    AZURE_USERNAME,
};
use crate::errors::{AuthenticationErrorResponse, CredentialsError};
use crate::logging::{CredentialLogger, format_error, format_success};
use crate::token::AccessToken;
use std::sync::Arc;

const CREDENTIAL_NAME: &str = "EnvironmentCredential";
const AUTHENTICATION_FAILED: &str = "EnvironmentCredential authentication failed. To troubleshoot, visit https://aka.ms/azsdk/js/identity/environmentcredential/troubleshoot.";
const UNAVAILABLE: &str = "EnvironmentCredential is unavailable. No underlying credential could be used. To troubleshoot, visit https://aka.ms/azsdk/js/identity/environmentcredential/troubleshoot.";

const ALL_VARIABLES: [&str; 8] = [
    AZURE_TENANT_ID,
    AZURE_CLIENT_ID,
    AZURE_CLIENT_SECRET,
    AZURE_CLIENT_CERTIFICATE_PATH,
    AZURE_CLIENT_CERTIFICATE_PASSWORD,
    AZURE_CLIENT_SEND_CERTIFICATE_CHAIN,
    AZURE_USERNAME,
    AZURE_PASSWORD,
];

/// A builder for [EnvironmentCredential].
#[derive(Default)]
pub struct Builder {
    options: TokenCredentialOptions,
}

impl Builder {
    /// Sets the options shared by all credentials.
    ///
    /// The variables are read from [TokenCredentialOptions::with_environment]
    /// when set, and from the process environment otherwise.
    pub fn with_options(mut self, v: TokenCredentialOptions) -> Self {
        self.options = v;
        self
    }

    /// Creates the credential.
    ///
    /// Missing variables are not an error, the credential reports itself as
    /// unavailable when used. Variables that select a credential but fail
    /// to configure it, such as an unreadable certificate, are reported here.
    pub fn build(self) -> BuildResult<EnvironmentCredential> {
        let env = self.options.environment();
        let logger = CredentialLogger::new(CREDENTIAL_NAME);
        logger.env_vars(&ALL_VARIABLES, &env);
        let options = self.options.with_environment(env.clone());

        let (Some(tenant_id), Some(client_id)) =
            (env.get(AZURE_TENANT_ID), env.get(AZURE_CLIENT_ID))
        else {
            warn_missing(&logger, &[AZURE_TENANT_ID, AZURE_CLIENT_ID], &env);
            return Ok(EnvironmentCredential::new(logger, None));
        };

        if let Some(secret) = env.get(AZURE_CLIENT_SECRET) {
            logger.info(format!(
                "Invoking ClientSecretCredential with tenant ID: {tenant_id}, clientId: {client_id} and clientSecret: [REDACTED]"
            ));
            let inner = SecretBuilder::new(tenant_id, client_id, secret)
                .with_options(options)
                .build()?;
            return Ok(EnvironmentCredential::new(logger, Some(Arc::new(inner))));
        }

        if let Some(path) = env.get(AZURE_CLIENT_CERTIFICATE_PATH) {
            logger.info(format!(
                "Invoking ClientCertificateCredential with tenant ID: {tenant_id}, clientId: {client_id} and certificatePath: {path}"
            ));
            let mut builder = CertificateBuilder::new(tenant_id, client_id)
                .with_certificate_path(path)
                .with_send_certificate_chain(
                    env.get(AZURE_CLIENT_SEND_CERTIFICATE_CHAIN)
                        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true")),
                );
            if let Some(password) = env.get(AZURE_CLIENT_CERTIFICATE_PASSWORD) {
                builder = builder.with_certificate_password(password);
            }
            let inner = builder.with_options(options).build()?;
            return Ok(EnvironmentCredential::new(logger, Some(Arc::new(inner))));
        }

        if let (Some(username), Some(password)) = (env.get(AZURE_USERNAME), env.get(AZURE_PASSWORD))
        {
            logger.info(format!(
                "Invoking UsernamePasswordCredential with tenant ID: {tenant_id}, clientId: {client_id} and username: {username}"
            ));
            let inner = UserBuilder::new(tenant_id, client_id, username, password)
                .with_options(options)
                .build_with_logger(CredentialLogger::new(CREDENTIAL_NAME))?;
            return Ok(EnvironmentCredential::new(logger, Some(Arc::new(inner))));
        }

        warn_missing(
            &logger,
            &[
                AZURE_CLIENT_SECRET,
                AZURE_CLIENT_CERTIFICATE_PATH,
                AZURE_USERNAME,
                AZURE_PASSWORD,
            ],
            &env,
        );
        Ok(EnvironmentCredential::new(logger, None))
    }
}

fn warn_missing(logger: &CredentialLogger, names: &[&str], env: &crate::env::Environment) {
    let missing = names
        .iter()
        .filter(|n| !env.is_set(n))
        .copied()
        .collect::<Vec<_>>();
    logger.warning(format!(
        "Incomplete environment configuration. The missing variables are: {}",
        missing.join(", ")
    ));
}

/// Authenticates with the credential configured in the environment.
#[derive(Debug)]
pub struct EnvironmentCredential {
    logger: CredentialLogger,
    inner: Option<Arc<dyn TokenCredential>>,
}

impl EnvironmentCredential {
    fn new(logger: CredentialLogger, inner: Option<Arc<dyn TokenCredential>>) -> Self {
        Self { logger, inner }
    }
}

#[async_trait::async_trait]
impl TokenCredential for EnvironmentCredential {
    async fn get_token(
        &self,
        scopes: &[String],
        options: &GetTokenOptions,
    ) -> Result<AccessToken> {
        let logger = self.logger.get_token();
        let Some(inner) = &self.inner else {
            let error = CredentialsError::unavailable(UNAVAILABLE);
            logger.info(format_error(Some(scopes), &error));
            return Err(error);
        };
        match inner.get_token(scopes, options).await {
            Ok(token) => {
                logger.info(format_success(scopes));
                Ok(token)
            }
            Err(e) if e.is_aborted() => Err(e),
            Err(e) => {
                let error = CredentialsError::authentication_from_response(
                    400,
                    AuthenticationErrorResponse::new(
                        AUTHENTICATION_FAILED,
                        e.to_string().replace("More details:", ""),
                    ),
                );
                logger.info(format_error(Some(scopes), &error));
                Err(error)
            }
        }
    }
}
